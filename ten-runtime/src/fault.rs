//! What happens when an extension breaks an invariant.

use ten_core::{ExtensionName, TenError};

/// Receives unrecoverable errors: invalid lifecycle transitions,
/// correlation protocol violations and panics in extension code.
///
/// The runtime logs the error with full context before calling
/// [`escalate`](FaultPolicy::escalate). The production policy,
/// [`AbortOnFault`], ends the process. Tests install a policy that
/// records the fault instead so the scenario can be asserted on.
pub trait FaultPolicy: Send + Sync {
    /// Handle an unrecoverable error raised by `extension`.
    fn escalate(&self, extension: &ExtensionName, error: &TenError);
}

/// Fail fast: abort the process on the first fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnFault;

impl FaultPolicy for AbortOnFault {
    fn escalate(&self, extension: &ExtensionName, error: &TenError) {
        tracing::error!(
            extension = %extension,
            code = %error.code(),
            error = %error,
            "ten.fault.abort"
        );
        std::process::abort();
    }
}
