use crate::document::{NodeId, NodeKind};
use crate::identity::Identifier;
use std::fmt;
use thiserror::Error;

/// Why a value handed to `render` is not a usable element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementDiagnosis {
    /// Plain text where an element was expected.
    LooksLikeString(String),
    /// A component kind was passed instead of an element built from it.
    LooksLikeConstructor(&'static str),
    /// A value shaped like an element from some other element factory.
    LooksLikeForeignElement(String),
    /// A tag name that cannot be written as markup.
    InvalidTagName(String),
    /// An attribute name that cannot be written as markup.
    InvalidAttributeName(String),
}

impl fmt::Display for ElementDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementDiagnosis::LooksLikeString(text) => write!(
                f,
                "got text {:?}; wrap it in a host element such as `Element::host(\"span\")`",
                excerpt(text)
            ),
            ElementDiagnosis::LooksLikeConstructor(name) => write!(
                f,
                "got the component kind `{}`; build an element with `Element::component(..)` instead",
                name
            ),
            ElementDiagnosis::LooksLikeForeignElement(summary) => write!(
                f,
                "got a value that looks like an element from another factory: {}",
                summary
            ),
            ElementDiagnosis::InvalidTagName(name) => write!(
                f,
                "tag name {:?} may only contain ASCII letters, digits, `-`, `_` and `:`",
                excerpt(name)
            ),
            ElementDiagnosis::InvalidAttributeName(name) => write!(
                f,
                "attribute name {:?} may only contain ASCII letters, digits, `-`, `_` and `:`",
                excerpt(name)
            ),
        }
    }
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 32;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(MAX).collect();
        short.push('…');
        short
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("malformed markup at byte {offset}: {message}")]
    MalformedMarkup { offset: usize, message: String },

    #[error("node {0:?} is no longer part of the document")]
    StaleNode(NodeId),

    #[error("node {0:?} cannot hold children")]
    NotAParent(NodeId),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("invalid element: {0}")]
    InvalidElement(ElementDiagnosis),

    #[error("target container {node:?} is not an element or document node (found {kind:?})")]
    InvalidContainer { node: NodeId, kind: Option<NodeKind> },

    #[error("two valid but unequal nodes carry the identifier `{0}`")]
    IdentifierCollision(Identifier),

    #[error("identifier attribute of `{id}` was modified outside the reconciler (found {found:?})")]
    UnexpectedExternalMutation { id: Identifier, found: Option<String> },

    #[error(
        "unable to find node `{target}` beneath {ancestor:?}; the document was probably mutated outside the reconciler"
    )]
    ComponentNotFound {
        target: Identifier,
        ancestor: Option<Identifier>,
    },

    #[error("refusing to replace the document root: {reason}")]
    DocumentRootMismatch {
        reason: String,
        offset: Option<usize>,
    },

    #[error("no container is registered for root `{0}`")]
    UnregisteredRoot(Identifier),

    #[error("instance `{0}` is not mounted in this render context")]
    StaleInstance(Identifier),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
