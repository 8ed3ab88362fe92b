use super::{Cmd, MsgHeader, impl_envelope};
use crate::id::CmdId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome carried by a [`CmdResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The command succeeded.
    Ok,
    /// The command failed.
    Error,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => f.write_str("ok"),
            StatusCode::Error => f.write_str("error"),
        }
    }
}

const DETAIL: &str = "detail";

/// A result correlated to one [`Cmd`].
///
/// `is_final` is set by the extension returning it. `is_completed` is
/// set by the runtime when the result is handed to the sender: it is
/// true on the last result the sender will see for the command.
#[derive(Debug, Clone)]
pub struct CmdResult {
    pub(crate) header: MsgHeader,
    status: StatusCode,
    is_final: bool,
    is_completed: bool,
    cmd_id: Option<CmdId>,
    original_cmd_name: String,
}

impl CmdResult {
    /// A final result for `target`.
    pub fn new(status: StatusCode, target: &Cmd) -> Self {
        use super::Envelope;
        Self {
            header: MsgHeader::new(target.name()),
            status,
            is_final: true,
            is_completed: false,
            cmd_id: target.cmd_id().cloned(),
            original_cmd_name: target.name().to_owned(),
        }
    }

    /// A final OK result for `target`.
    pub fn ok(target: &Cmd) -> Self {
        Self::new(StatusCode::Ok, target)
    }

    /// A final ERROR result for `target`.
    pub fn error(target: &Cmd) -> Self {
        Self::new(StatusCode::Error, target)
    }

    /// An ERROR result for a command known only by id and name, used
    /// by the runtime when it answers on an extension's behalf.
    pub fn error_for(cmd_id: CmdId, cmd_name: &str) -> Self {
        Self {
            header: MsgHeader::new(cmd_name),
            status: StatusCode::Error,
            is_final: true,
            is_completed: false,
            cmd_id: Some(cmd_id),
            original_cmd_name: cmd_name.to_owned(),
        }
    }

    /// Attach a `detail` property.
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.set_detail(detail);
        self
    }

    /// Set the `detail` property.
    pub fn set_detail(&mut self, detail: impl Into<Value>) {
        let _ = self.header.properties.set(DETAIL, detail);
    }

    /// The `detail` property, if any.
    pub fn detail(&self) -> Option<&Value> {
        self.header.properties.get_ref(DETAIL)
    }

    /// The `detail` property as a string, if it is one.
    pub fn detail_str(&self) -> Option<&str> {
        match self.detail() {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Status code.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Whether this is the last result the command will produce.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Mark as non-final (streamed) or final.
    pub fn set_final(&mut self, is_final: bool) {
        self.is_final = is_final;
    }

    /// Whether this is the last result the sender will be given.
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    /// Set by the runtime on delivery.
    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
    }

    /// Correlation id of the originating command.
    pub fn cmd_id(&self) -> Option<&CmdId> {
        self.cmd_id.as_ref()
    }

    /// Re-address the result to another command id. Used when relaying
    /// results of a forwarded command upstream.
    pub fn set_cmd_id(&mut self, cmd_id: CmdId) {
        self.cmd_id = Some(cmd_id);
    }

    /// Name of the originating command.
    pub fn original_cmd_name(&self) -> &str {
        &self.original_cmd_name
    }
}

impl_envelope!(CmdResult, crate::msg::MsgKind::CmdResult);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{Envelope, ResultMode};

    #[test]
    fn result_copies_target_identity() {
        let mut cmd = Cmd::new("hello");
        let id = CmdId::generate();
        cmd.stamp(id.clone(), None, ResultMode::Single);

        let result = CmdResult::ok(&cmd).with_detail("x");
        assert_eq!(result.status_code(), StatusCode::Ok);
        assert_eq!(result.cmd_id(), Some(&id));
        assert_eq!(result.original_cmd_name(), "hello");
        assert_eq!(result.detail_str(), Some("x"));
        assert!(result.is_final());
        assert!(!result.is_completed());
        assert_eq!(result.get_property_string("detail").unwrap(), "x");
    }

    #[test]
    fn non_final_results() {
        let cmd = Cmd::new("stream");
        let mut result = CmdResult::new(StatusCode::Ok, &cmd);
        result.set_final(false);
        assert!(!result.is_final());
        assert!(result.detail().is_none());
    }
}
