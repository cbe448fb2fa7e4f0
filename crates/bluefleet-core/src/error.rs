use thiserror::Error;

use bluefleet_stack::StackKind;

/// Engine-level failures.
///
/// Deliberately small: per the containment policy, component-local faults
/// (a garbled callback, a failed pairing, an unreadable name file) never
/// propagate as errors — they are logged and converted into the
/// conservative state transition for that component. Only conditions that
/// prevent the engine from running at all surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The native stack is not one the engine is known to work against.
    #[error("the bluetooth stack '{kind}' is not supported")]
    UnsupportedStack { kind: StackKind },
}
