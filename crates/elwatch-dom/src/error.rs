#![forbid(unsafe_code)]

//! Errors raised by the in-memory document.

use crate::node::NodeId;

/// Errors from tree edits, selector evaluation, and observer delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The selector is empty or uses syntax the engine does not support.
    InvalidSelector { selector: String, reason: String },
    /// The node id does not belong to this document.
    UnknownNode(NodeId),
    /// The edit would produce an invalid tree.
    HierarchyRequest(&'static str),
}

impl DomError {
    pub(crate) fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.to_owned(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for DomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSelector { selector, reason } => {
                write!(f, "invalid selector '{selector}': {reason}")
            }
            Self::UnknownNode(id) => write!(f, "unknown node {id}"),
            Self::HierarchyRequest(msg) => write!(f, "hierarchy request error: {msg}"),
        }
    }
}

impl std::error::Error for DomError {}
