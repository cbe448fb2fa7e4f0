use thiserror::Error;

/// Failures surfaced by a native stack implementation.
///
/// `NotReady` is the important one: every hardware-facing component treats
/// it as "assume the device is gone" rather than an abort.
#[derive(Debug, Error)]
pub enum StackError {
    /// Adapter off, absent, or the driver refused the operation.
    #[error("bluetooth adapter not ready")]
    NotReady,

    /// The stack rejected a second concurrent inquiry or search.
    #[error("a hardware operation is already in flight")]
    Busy,

    /// Pairing was refused or failed.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The operation is not available on this stack.
    #[error("unsupported on this stack: {0}")]
    Unsupported(String),

    /// Anything else the driver reported.
    #[error("stack I/O error: {0}")]
    Io(String),
}
