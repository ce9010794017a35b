//! Error types for stage operations.

use thiserror::Error;

use crate::NodeId;

/// Errors raised to the caller by [`crate::Stage`] operations.
///
/// Invalid zoom input is not an error: `zoom` returns the prior window unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A user-assigned identifier is already taken by another live node.
    #[error("duplicate node id '{id}' (already used by {existing:?})")]
    DuplicateId { id: String, existing: NodeId },

    /// The handle does not refer to a live node (never allocated or already disposed).
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    /// A data operation was addressed to a node that owns no data.
    #[error("node {0:?} is not a data component")]
    NotADataComponent(NodeId),

    /// A child was added to a leaf node.
    #[error("node {0:?} cannot hold children")]
    NotAContainer(NodeId),

    /// Re-parenting would make a node its own ancestor.
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    CyclicParent { parent: NodeId, child: NodeId },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
