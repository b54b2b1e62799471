//! Error types for layer merging.

use thiserror::Error;

/// Errors that can occur while recomputing a projection.
///
/// Skips (hidden layers, empty rectangles, ...) are not errors; they are
/// reported as [`crate::merge::Visit::Skipped`].
#[derive(Error, Debug)]
pub enum MergeError {
    /// The visitor has no destination projection to composite into.
    #[error("no destination projection while merging `{node}`")]
    MissingProjection { node: String },

    /// An adjustment layer has no filter configuration.
    #[error("adjustment layer `{node}` has no filter configuration")]
    MissingFilterConfiguration { node: String },

    /// The configuration names a filter the registry does not know.
    #[error("unknown filter `{name}`")]
    UnknownFilter { name: String },

    /// A node id that is not (or no longer) in the tree.
    #[error("node not found in layer tree")]
    UnknownNode,

    /// Children were requested from, or added to, a node that is not a group.
    #[error("node `{node}` is not a group")]
    NotAGroup { node: String },

    /// A clone layer shows itself, directly or through a group.
    #[error("clone cycle through layer `{node}`")]
    CloneCycle { node: String },

    /// An embedded document failed to render.
    #[error("embedded document failed: {0}")]
    Document(String),

    /// Filesystem error at the command-line edge.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or encode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A filter configuration could not be encoded or decoded.
    #[error("filter configuration encoding failed: {0}")]
    Config(#[from] bincode::Error),
}

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
