pub mod core;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error types for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{what} range out of bounds: offset {offset} + length {length} exceeds capacity {capacity}")]
    OutOfBounds {
        what: &'static str,
        offset: usize,
        length: usize,
        capacity: usize,
    },

    #[error("Authoritative thread already registered: {existing}")]
    AlreadyRegistered { existing: String },

    #[error("Failed to spawn authoritative thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Check that `offset..offset + length` fits within `capacity`
pub(crate) fn check_range(
    what: &'static str,
    offset: usize,
    length: usize,
    capacity: usize,
) -> EngineResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(EngineError::OutOfBounds {
            what,
            offset,
            length,
            capacity,
        }),
    }
}
