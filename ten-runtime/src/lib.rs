//! # ten-runtime: extension host for the TEN runtime
//!
//! Hosts extensions, routes envelopes between them and correlates
//! command results back to their senders.
//!
//! | Component | Types | What it does |
//! |-----------|-------|-------------|
//! | Execution slot | [`Extension`], [`TenEnv`] | One task per extension: lifecycle ladder, one callback at a time |
//! | Router | [`TenEnv::send_cmd`], [`TenEnv::send_data`] | Explicit destinations or graph connections, fan-out |
//! | Correlator | [`ResultHandler`], [`CmdResultStream`] | Single and multi result modes, result return policies, teardown drain |
//! | Host | [`App`], [`AppBuilder`], [`AddonRegistry`] | Builds slots from a graph, start waves, close cascade with grace period |
//! | Async | [`AsyncExtension`], [`AsyncTenEnv`] | `async` hooks on a dedicated task |
//! | Testing | [`ExtensionTester`], [`Tester`], [`TenEnvTester`] | Run extensions against a scripted peer |
//!
//! ## Failure model
//!
//! Recoverable errors (no destination, missing property, destroyed
//! context) reach the caller through its handler or return value.
//! Broken invariants (a `*_done` at the wrong time, a result after the
//! final one, a panic in extension code) go to the app's
//! [`FaultPolicy`], which by default aborts the process.

#![deny(missing_docs)]

pub mod addon;
pub mod app;
pub mod async_env;
pub mod async_extension;
pub mod callback;
pub mod env;
pub mod extension;
pub mod fault;
pub mod logging;
pub mod tester;

mod context;
mod path;
mod router;
mod slot;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use addon::{Addon, AddonRegistry};
pub use app::{App, AppBuilder, CloseReport, RunMode};
pub use async_env::{AsyncTenEnv, CmdResultStream};
pub use async_extension::{AsyncAdapter, AsyncExtension};
pub use callback::{ErrorHandler, ResultHandler};
pub use env::TenEnv;
pub use extension::Extension;
pub use fault::{AbortOnFault, FaultPolicy};
pub use tester::{ExtensionTester, TESTER_EXTENSION_NAME, TenEnvTester, Tester, TesterError};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn handles_are_send_and_sync() {
        _assert_send_sync::<TenEnv>();
        _assert_send_sync::<AsyncTenEnv>();
        _assert_send_sync::<App>();
        _assert_send_sync::<TenEnvTester>();
        _assert_send_sync::<AddonRegistry>();
    }
}
