//! Hierarchical resource addressing.
//!
//! Addresses follow the ownership chain of the store, for example
//! `dbs/inventory/colls/orders/sprocs/bulkImport`. They are deterministic:
//! the same parent and identity always produce the same address, which is
//! what lets the provisioning orchestrator probe before it creates.

use crate::error::{Error, Result};
use std::fmt;

/// Kind of resource an address points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Database (root of the hierarchy)
    Database,
    /// Collection inside a database
    Collection,
    /// Stored procedure inside a collection
    StoredProcedure,
    /// Trigger inside a collection
    Trigger,
    /// User defined function inside a collection
    UserDefinedFunction,
    /// Document inside a collection
    Document,
    /// User inside a database
    User,
    /// Permission owned by a user
    Permission,
}

impl ResourceKind {
    /// Path segment that precedes identities of this kind.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Database => "dbs",
            Self::Collection => "colls",
            Self::StoredProcedure => "sprocs",
            Self::Trigger => "triggers",
            Self::UserDefinedFunction => "udfs",
            Self::Document => "docs",
            Self::User => "users",
            Self::Permission => "permissions",
        }
    }

    /// The kind that must own resources of this kind, `None` for databases.
    pub fn parent(self) -> Option<ResourceKind> {
        match self {
            Self::Database => None,
            Self::Collection | Self::User => Some(Self::Database),
            Self::StoredProcedure | Self::Trigger | Self::UserDefinedFunction | Self::Document => {
                Some(Self::Collection)
            }
            Self::Permission => Some(Self::User),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Immutable address of a resource or of the account root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    path: Vec<(ResourceKind, String)>,
}

impl ResourceAddress {
    /// The account root, parent of every database.
    pub fn root() -> Self {
        Self { path: Vec::new() }
    }

    /// Address of a database.
    pub fn database(id: &str) -> Result<Self> {
        Self::root().child(ResourceKind::Database, id)
    }

    /// Address of a collection.
    pub fn collection(database: &str, collection: &str) -> Result<Self> {
        Self::database(database)?.child(ResourceKind::Collection, collection)
    }

    /// Derive the address of a child resource.
    ///
    /// Fails when the identity is not addressable or when `kind` cannot be
    /// owned by this address.
    pub fn child(&self, kind: ResourceKind, id: &str) -> Result<Self> {
        validate_id(id)?;

        if kind.parent() != self.kind() {
            return Err(Error::InvalidAddress(format!(
                "a {} cannot live under '{}'",
                kind.segment(),
                self
            )));
        }

        let mut path = self.path.clone();
        path.push((kind, id.to_string()));
        Ok(Self { path })
    }

    /// Kind of the addressed resource, `None` for the root.
    pub fn kind(&self) -> Option<ResourceKind> {
        self.path.last().map(|(kind, _)| *kind)
    }

    /// Identity of the addressed resource, `None` for the root.
    pub fn id(&self) -> Option<&str> {
        self.path.last().map(|(_, id)| id.as_str())
    }

    /// Address of the owner, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.path.is_empty() {
            return None;
        }
        Some(Self {
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Whether this is the account root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, id) in &self.path {
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{}/{}", kind.segment(), id)?;
            first = false;
        }
        Ok(())
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidAddress("resource id is empty".to_string()));
    }
    if let Some(c) = id.chars().find(|c| matches!(c, '/' | '\\' | '?' | '#')) {
        return Err(Error::InvalidAddress(format!(
            "resource id '{id}' contains reserved character '{c}'"
        )));
    }
    if id.ends_with(' ') {
        return Err(Error::InvalidAddress(format!(
            "resource id '{id}' ends with a space"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_nested_address_rendering() {
        let sproc = ResourceAddress::collection("inventory", "orders")
            .and_then(|c| c.child(ResourceKind::StoredProcedure, "bulkImport"))
            .unwrap();

        assert_eq!(sproc.to_string(), "dbs/inventory/colls/orders/sprocs/bulkImport");
        assert_eq!(sproc.kind(), Some(ResourceKind::StoredProcedure));
        assert_eq!(sproc.id(), Some("bulkImport"));
        assert_eq!(
            sproc.parent().unwrap(),
            ResourceAddress::collection("inventory", "orders").unwrap()
        );
    }

    #[test]
    fn test_addresses_are_deterministic_and_case_sensitive() {
        let a = ResourceAddress::collection("db", "Orders").unwrap();
        let b = ResourceAddress::collection("db", "Orders").unwrap();
        let c = ResourceAddress::collection("db", "orders").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_reserved_characters_rejected() {
        for id in ["a/b", "a\\b", "a?b", "a#b", "", "trailing "] {
            assert_matches!(
                ResourceAddress::database(id),
                Err(Error::InvalidAddress(_)),
                "id {id:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_kind_must_match_owner() {
        let db = ResourceAddress::database("db").unwrap();
        assert_matches!(
            db.child(ResourceKind::Trigger, "t"),
            Err(Error::InvalidAddress(_))
        );
        assert_matches!(
            ResourceAddress::root().child(ResourceKind::Collection, "c"),
            Err(Error::InvalidAddress(_))
        );
        assert!(db.child(ResourceKind::User, "alice").is_ok());
    }

    #[test]
    fn test_root_has_no_parent() {
        let root = ResourceAddress::root();
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.to_string(), "");
    }
}
