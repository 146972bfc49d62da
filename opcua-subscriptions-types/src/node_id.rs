use std::fmt;

use crate::string::UAString;

/// The kind of identifier held by a [`NodeId`]: numeric, string, GUID or
/// opaque byte string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Numeric node ID identifier, `i=123`.
    Numeric(u32),
    /// String node ID identifier, `s=...`.
    String(UAString),
    /// GUID node ID identifier, `g=...`.
    Guid([u8; 16]),
    /// Opaque node ID identifier, `b=...`.
    ByteString(Vec<u8>),
}

/// Identifies a node in the address space: a namespace index plus an
/// identifier of one of four kinds, per Part 3 §8.2.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Namespace index.
    pub namespace: u16,
    /// The identifier itself.
    pub identifier: Identifier,
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "ns={};i={}", self.namespace, v),
            Identifier::String(v) => write!(f, "ns={};s={}", self.namespace, v),
            Identifier::Guid(v) => write!(f, "ns={};g={:?}", self.namespace, v),
            Identifier::ByteString(v) => write!(f, "ns={};b={}len", self.namespace, v.len()),
        }
    }
}

impl NodeId {
    /// Construct a numeric node id.
    pub fn new(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Construct a string node id.
    pub fn from_string(namespace: u16, value: &str) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// The null node id, `ns=0;i=0`.
    pub fn null() -> Self {
        Self::new(0, 0)
    }

    /// True if this is the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && matches!(self.identifier, Identifier::Numeric(0))
    }
}
