//! Dialect adapter: every syntax decision that differs between databases.

use serde::{Deserialize, Serialize};

/// SQL dialect the registry compiles for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dialect {
    /// PostgreSQL (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// MySQL (uses ? placeholders)
    Mysql,
    /// MariaDB (uses ? placeholders)
    Mariadb,
    /// SQLite (uses ?1, ?2 placeholders)
    Sqlite,
}

/// How generated primary keys are recovered after an INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// `INSERT ... RETURNING pk`, one key per inserted row.
    Returning,
    /// Driver-reported last insert id. A multi-row insert yields the first
    /// id; the rest are `first + 1 .. first + n`.
    LastInsertId,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql | Dialect::Mariadb => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled. Dotted names (`schema.table`)
    /// are quoted per segment.
    pub fn quote_identifier(self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote an alias or column name verbatim, dots included.
    pub fn quote_alias(self, name: &str) -> String {
        self.quote_part(name)
    }

    fn quote_part(self, part: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                let escaped = part.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql | Dialect::Mariadb => {
                let escaped = part.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// Check if this dialect supports ILIKE / NOT ILIKE.
    pub const fn supports_ilike(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Check if JSON document operators are available.
    pub const fn supports_json_ops(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Strategy for recovering generated ids on insert.
    pub const fn id_strategy(self) -> IdStrategy {
        match self {
            Dialect::Postgres | Dialect::Sqlite | Dialect::Mariadb => IdStrategy::Returning,
            Dialect::Mysql => IdStrategy::LastInsertId,
        }
    }

    /// LIMIT clause to emit when only an OFFSET was requested.
    ///
    /// SQLite and MySQL reject a bare OFFSET.
    pub const fn offset_only_limit(self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => None,
            Dialect::Sqlite => Some("-1"),
            Dialect::Mysql | Dialect::Mariadb => Some("18446744073709551615"),
        }
    }

    /// Human-readable dialect name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mariadb => "mariadb",
            Dialect::Sqlite => "sqlite",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
        assert_eq!(Dialect::Mariadb.placeholder(1), "?");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Postgres.quote_identifier("film"), "\"film\"");
        assert_eq!(
            Dialect::Postgres.quote_identifier("public.film"),
            "\"public\".\"film\""
        );
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("fi`lm"), "`fi``lm`");
        assert_eq!(Dialect::Mariadb.quote_alias("a.b"), "`a.b`");
    }

    #[test]
    fn test_capabilities() {
        assert!(Dialect::Postgres.supports_ilike());
        assert!(!Dialect::Mysql.supports_ilike());
        assert!(!Dialect::Sqlite.supports_json_ops());
        assert!(Dialect::Mariadb.supports_json_ops());
        assert_eq!(Dialect::Mysql.id_strategy(), IdStrategy::LastInsertId);
        assert_eq!(Dialect::Mariadb.id_strategy(), IdStrategy::Returning);
        assert_eq!(Dialect::Sqlite.offset_only_limit(), Some("-1"));
        assert_eq!(Dialect::Postgres.offset_only_limit(), None);
    }

    #[test]
    fn test_deserialize() {
        let d: Dialect = serde_json::from_str("\"MARIADB\"").unwrap();
        assert_eq!(d, Dialect::Mariadb);
        let d: Dialect = serde_json::from_str("\"SQLITE\"").unwrap();
        assert_eq!(d, Dialect::Sqlite);
    }
}
