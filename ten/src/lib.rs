#![deny(missing_docs)]
//! # ten: umbrella crate
//!
//! A single import surface for the TEN extension runtime. Re-exports
//! the protocol crate and the host behind feature flags, plus a
//! `prelude` for the happy path.

#[cfg(feature = "core")]
pub use ten_core;
#[cfg(feature = "runtime")]
pub use ten_runtime;

/// Happy-path imports for writing and hosting extensions.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use ten_core::{
        AppConfig, AudioFrame, Cmd, CmdResult, Data, Envelope, ErrorCode, ExtensionName,
        ExtensionState, GraphDefinition, Loc, ResultReturnPolicy, StatusCode, TenError, Value,
        VideoFrame,
    };

    #[cfg(feature = "runtime")]
    pub use ten_runtime::{
        AddonRegistry, App, AppBuilder, AsyncAdapter, AsyncExtension, AsyncTenEnv, CloseReport,
        ErrorHandler, Extension, ExtensionTester, ResultHandler, RunMode, TenEnv, TenEnvTester,
        Tester, TesterError,
    };
}
