//! Handlers the runtime calls back on an extension's slot.

use crate::env::TenEnv;
use std::fmt;
use ten_core::{CmdResult, TenError};

type ResultFn = dyn FnMut(&TenEnv, Result<CmdResult, TenError>) + Send;
type ErrorFn = dyn FnOnce(&TenEnv, Result<(), TenError>) + Send;

/// Receives the results of a command.
///
/// Called with `Ok(result)` for each result the sender is given, or
/// once with `Err` if the command could not be delivered or the slot
/// was torn down first.
pub struct ResultHandler(Box<ResultFn>);

impl ResultHandler {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(&TenEnv, Result<CmdResult, TenError>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn call(&mut self, env: &TenEnv, outcome: Result<CmdResult, TenError>) {
        (self.0)(env, outcome)
    }
}

impl fmt::Debug for ResultHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResultHandler")
    }
}

/// Told, exactly once, whether a one-way send or a `return_result`
/// was accepted.
pub struct ErrorHandler(Box<ErrorFn>);

impl ErrorHandler {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&TenEnv, Result<(), TenError>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn call(self, env: &TenEnv, outcome: Result<(), TenError>) {
        (self.0)(env, outcome)
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler")
    }
}

/// What to call back, dispatched by match on the slot that owns it.
#[derive(Debug)]
pub(crate) enum Callback {
    Result(ResultHandler),
    Error(ErrorHandler),
    None,
}

impl Callback {
    pub(crate) fn for_result(handler: Option<ResultHandler>) -> Self {
        handler.map_or(Callback::None, Callback::Result)
    }

    pub(crate) fn for_error(handler: Option<ErrorHandler>) -> Self {
        handler.map_or(Callback::None, Callback::Error)
    }

    /// Report the outcome of an operation that produces no result.
    ///
    /// A result handler only hears about failures; success for a
    /// command means its results will follow.
    pub(crate) fn complete(self, env: &TenEnv, outcome: Result<(), TenError>) {
        match (self, outcome) {
            (Callback::Error(h), outcome) => h.call(env, outcome),
            (Callback::Result(mut h), Err(e)) => h.call(env, Err(e)),
            (Callback::Result(_), Ok(())) => {}
            (Callback::None, Err(e)) => {
                tracing::debug!(
                    extension = %env.extension_name(),
                    error = %e,
                    "ten.callback.unobserved_error"
                );
            }
            (Callback::None, Ok(())) => {}
        }
    }
}
