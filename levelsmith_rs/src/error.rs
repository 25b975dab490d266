use thiserror::Error;

/// Typed engine failures. Everything else in the crate propagates through
/// `anyhow` with context; this enum exists for the conditions callers are
/// expected to match on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The extremum table and its paired alive/close matrix no longer share
    /// row identity. This is a caller contract violation, fatal to the
    /// current symbol's run.
    #[error(
        "extremum table and alive matrix rows are misaligned for '{symbol}': \
         table ids {table_ids:?}, matrix ids {matrix_ids:?}"
    )]
    ContractViolation {
        symbol: String,
        table_ids: Vec<u32>,
        matrix_ids: Vec<u32>,
    },
}
