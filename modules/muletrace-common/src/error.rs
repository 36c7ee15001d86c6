use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuletraceError {
    /// Per-entity validation failure. Recovered at the batch boundary:
    /// the entity is dropped with a log line, the batch continues.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Every candidate entity in a batch failed validation. The batch is
    /// skipped and reported; this is not a system fault.
    #[error("No valid entities in batch")]
    NoValidData,

    /// The graph store is unreachable. Fatal for the current operation;
    /// retry policy lives with the caller.
    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    /// A transfer referenced a key that resolves to no entity of any kind.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Rejected before querying: unknown entity kind or out-of-range
    /// priority bound in a filter specification.
    #[error("Malformed filter: {0}")]
    MalformedFilter(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
