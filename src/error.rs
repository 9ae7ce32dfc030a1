use thiserror::Error;

/// Errors surfaced by namespace registration, resolution, ordering and the
/// archive store. All of these propagate to the immediate caller of the
/// failing operation; nothing is retried besides the bounded fixpoint loops
/// in resolution and ordering.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// Two distinct components claim the same local name within one category.
    #[error("name {local_name:?} is already bound to a different component in category {category:?}")]
    NameCollision {
        category: String,
        local_name: String,
    },

    /// The resolution work list made no progress over a full pass.
    #[error("no progress in component resolution:\n  {}", .components.join("\n  "))]
    ResolutionCycle { components: Vec<String> },

    /// The dependency orderer made no progress over a full pass.
    #[error("no progress in dependency order calculation:\n  {}", .candidates.join("\n  "))]
    OrderingStagnation { candidates: Vec<String> },

    /// Caller misuse rather than bad input: serializing an absent namespace,
    /// binding a prefix to a user-created namespace, re-entering schema load
    /// or validation, merging archive data into a non-empty namespace.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An archive carries a format version this reader does not understand.
    #[error("got archive format version {found}, require {expected}")]
    FormatMismatch { found: u32, expected: u32 },

    /// A qualified name carries a prefix with no in-scope declaration.
    #[error("prefix {prefix:?} of QName {name:?} is not declared")]
    UnboundPrefix { prefix: String, name: String },

    #[error("archive I/O failed")]
    Io(#[from] std::io::Error),

    #[error("archive encoding failed")]
    Codec(#[from] bincode::Error),
}
