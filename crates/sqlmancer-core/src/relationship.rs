//! Association metadata.
//!
//! An association links an owning model to a target model, either directly
//! through one foreign-key pair or through a junction table with two pairs.

/// One column equality of a join: `owner.from = target.to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPair {
    /// Column on the owning side of this hop
    pub from: String,
    /// Column on the target side of this hop
    pub to: String,
}

/// How the owning model reaches the target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationJoin {
    /// `owner.from = target.to`
    Direct(JoinPair),
    /// `owner.from = through.to` then `through.from = target.to`
    Through { table: String, pairs: [JoinPair; 2] },
}

/// Whether an association resolves to one record or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Metadata about a relationship from one model to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Association name on the owning model
    pub name: String,
    /// Target model name
    pub model: String,
    pub join: AssociationJoin,
    pub cardinality: Cardinality,
    /// Resolves to a Page instead of a list
    pub paginated: bool,
}

impl Association {
    /// Column on the owning model the association hangs off.
    pub fn parent_key(&self) -> &str {
        match &self.join {
            AssociationJoin::Direct(pair) => &pair.from,
            AssociationJoin::Through { pairs, .. } => &pairs[0].from,
        }
    }

    /// Whether the resolved value fans out over many target rows.
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many || self.paginated
    }

    /// The junction table, for many-to-many associations.
    pub fn through_table(&self) -> Option<&str> {
        match &self.join {
            AssociationJoin::Through { table, .. } => Some(table),
            AssociationJoin::Direct(_) => None,
        }
    }
}
