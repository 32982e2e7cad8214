//! Error types for sqlmancer operations.

use std::fmt;

/// The primary error type for all sqlmancer operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, disconnect)
    Connection(ConnectionError),
    /// Query execution errors reported by the database
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Registry configuration errors
    Config(ConfigError),
    /// Errors raised while compiling a builder into SQL
    Compile(CompileError),
    /// Create/update input validation errors
    Validation(ValidationError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Lock contention
    Busy,
    /// Cancelled
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// BEGIN issued while a transaction is open
    AlreadyActive,
    /// COMMIT/ROLLBACK issued with no open transaction
    NotActive,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// The error raised for a reference to a model that is not in the registry.
    pub fn unknown_model(name: &str) -> Self {
        Self::new(format!(
            "\"{name}\" isn't a valid model. Did you include the @model directive?"
        ))
    }
}

/// Error raised while turning builder state into a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// A sort directive referenced a field or association the model does not expose
    InvalidFieldName,
    /// A sort direction other than ASC/DESC
    InvalidDirection,
    /// Structurally malformed builder input (wrong JSON shape)
    InvalidInput,
}

impl CompileError {
    pub fn invalid_field_name(name: &str) -> Self {
        Self {
            kind: CompileErrorKind::InvalidFieldName,
            message: format!("Invalid field name \"{name}\""),
        }
    }

    pub fn invalid_direction(value: &str) -> Self {
        Self {
            kind: CompileErrorKind::InvalidDirection,
            message: format!("Invalid sort direction \"{value}\", expected ASC or DESC"),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::InvalidInput,
            message: message.into(),
        }
    }
}

/// Validation error for create/update inputs.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The errors, in input order
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// The field name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field is missing/null
    Required,
    /// Field is not part of the input surface
    Unknown,
    /// Value does not fit the field's semantic type
    Type,
    /// Enum value outside the declared set
    EnumValue,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a field validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Add a required field error.
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(field, ValidationErrorKind::Required, "is required");
    }

    /// Add an unknown field error.
    pub fn add_unknown(&mut self, field: impl Into<String>) {
        self.add(field, ValidationErrorKind::Unknown, "is not an input field");
    }

    /// Add a type mismatch error.
    pub fn add_type(&mut self, field: impl Into<String>, expected: &str) {
        self.add(
            field,
            ValidationErrorKind::Type,
            format!("must be {expected}"),
        );
    }

    /// Add an unknown enum value error.
    pub fn add_enum_value(&mut self, field: impl Into<String>, enum_name: &str, actual: &str) {
        self.add(
            field,
            ValidationErrorKind::EnumValue,
            format!("'{actual}' is not a value of enum {enum_name}"),
        );
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl Error {
    /// Is this an error produced before any SQL reached the database?
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Error::Compile(_) | Error::Validation(_))
    }

    /// Get the compile error kind, if this is a compile error.
    pub fn compile_kind(&self) -> Option<CompileErrorKind> {
        match self {
            Error::Compile(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Compile(e) => write!(f, "{}", e.message),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else if self.errors.len() == 1 {
            let err = &self.errors[0];
            write!(f, "validation error on '{}': {}", err.field, err.message)
        } else {
            writeln!(f, "validation errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {}: {}", err.field, err.message)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Compile(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for sqlmancer operations.
pub type Result<T> = std::result::Result<T, Error>;
