//! Operator type system.
//!
//! For a field's semantic type, its list-ness and the active dialect there is
//! exactly one closed set of legal comparison operators. The sets are static
//! slices picked by a `match`; nothing is computed or mutated at query time.

use crate::dialect::Dialect;
use crate::types::{FieldType, ScalarType};

/// A comparison operator as named in a filter's operator map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    ILike,
    NotILike,
    Contains,
    ContainedBy,
    Overlaps,
    HasKey,
    HasAnyKeys,
    HasAllKeys,
}

impl Operator {
    /// Parse an operator-map key. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "equal" => Operator::Equal,
            "notEqual" => Operator::NotEqual,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "greaterThan" => Operator::GreaterThan,
            "greaterThanOrEqual" => Operator::GreaterThanOrEqual,
            "lessThan" => Operator::LessThan,
            "lessThanOrEqual" => Operator::LessThanOrEqual,
            "like" => Operator::Like,
            "notLike" => Operator::NotLike,
            "iLike" => Operator::ILike,
            "notILike" => Operator::NotILike,
            "contains" => Operator::Contains,
            "containedBy" => Operator::ContainedBy,
            "overlaps" => Operator::Overlaps,
            "hasKey" => Operator::HasKey,
            "hasAnyKeys" => Operator::HasAnyKeys,
            "hasAllKeys" => Operator::HasAllKeys,
            _ => return None,
        };
        Some(op)
    }

    /// The operator-map key for this operator.
    pub const fn name(self) -> &'static str {
        match self {
            Operator::Equal => "equal",
            Operator::NotEqual => "notEqual",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqual => "greaterThanOrEqual",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqual => "lessThanOrEqual",
            Operator::Like => "like",
            Operator::NotLike => "notLike",
            Operator::ILike => "iLike",
            Operator::NotILike => "notILike",
            Operator::Contains => "contains",
            Operator::ContainedBy => "containedBy",
            Operator::Overlaps => "overlaps",
            Operator::HasKey => "hasKey",
            Operator::HasAnyKeys => "hasAnyKeys",
            Operator::HasAllKeys => "hasAllKeys",
        }
    }

    /// Operators whose operand is a list literal rather than a scalar.
    pub const fn takes_list(self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::HasAnyKeys | Operator::HasAllKeys
        )
    }
}

use Operator::{
    ContainedBy, Contains, Equal, GreaterThan, GreaterThanOrEqual, HasAllKeys, HasAnyKeys, HasKey,
    ILike, In, LessThan, LessThanOrEqual, Like, NotEqual, NotILike, NotIn, NotLike, Overlaps,
};

const EQUALITY: &[Operator] = &[Equal, NotEqual];
const MEMBERSHIP: &[Operator] = &[Equal, NotEqual, In, NotIn];
const RANGE: &[Operator] = &[
    Equal,
    NotEqual,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
];
const STRING: &[Operator] = &[
    Equal,
    NotEqual,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
];
const STRING_CI: &[Operator] = &[
    Equal,
    NotEqual,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    ILike,
    NotILike,
];
const JSON: &[Operator] = &[
    Equal,
    NotEqual,
    Contains,
    ContainedBy,
    HasKey,
    HasAnyKeys,
    HasAllKeys,
];
const LIST: &[Operator] = &[Equal, NotEqual, Contains, ContainedBy, Overlaps];

/// The closed set of legal operators for a field type under a dialect.
pub fn operators_for(ty: &FieldType, dialect: Dialect) -> &'static [Operator] {
    if ty.list {
        return LIST;
    }
    match ty.scalar {
        ScalarType::Id | ScalarType::Number | ScalarType::Date => RANGE,
        ScalarType::Boolean | ScalarType::Enum(_) => MEMBERSHIP,
        ScalarType::String if dialect.supports_ilike() => STRING_CI,
        ScalarType::String => STRING,
        ScalarType::Json if dialect.supports_json_ops() => JSON,
        ScalarType::Json => EQUALITY,
    }
}

/// Operators legal on an aggregate value (`count`, `avg`, `sum`).
pub fn numeric_aggregate_operators() -> &'static [Operator] {
    RANGE
}

/// Whether `op` may be applied to a field of type `ty`.
pub fn is_legal(op: Operator, ty: &FieldType, dialect: Dialect) -> bool {
    operators_for(ty, dialect).contains(&op)
}
