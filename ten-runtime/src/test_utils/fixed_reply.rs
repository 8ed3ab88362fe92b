//! FixedReply: answers every command with the same result.

use crate::env::TenEnv;
use crate::extension::Extension;
use ten_core::{Cmd, CmdResult, StatusCode};

/// Answers every command with one final result of `status` carrying
/// `detail`.
#[derive(Debug, Clone)]
pub struct FixedReply {
    status: StatusCode,
    detail: String,
}

impl FixedReply {
    /// Answer OK with `detail`.
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            detail: detail.into(),
        }
    }

    /// Answer ERROR with `detail`.
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Error,
            detail: detail.into(),
        }
    }
}

impl Extension for FixedReply {
    fn on_cmd(&mut self, env: &TenEnv, cmd: Cmd) {
        let result = CmdResult::new(self.status, &cmd).with_detail(self.detail.as_str());
        env.return_result(result, &cmd, None);
    }
}
