use super::{MsgHeader, impl_envelope};
use crate::id::CmdId;
use serde::{Deserialize, Serialize};

/// How the sender of a [`Cmd`] wants its results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    /// Exactly one (final) result; `send_cmd`.
    #[default]
    Single,
    /// Zero or more non-final results then one final result; `send_cmd_ex`.
    Multi,
}

/// A command: an envelope that expects results.
#[derive(Debug, Clone)]
pub struct Cmd {
    pub(crate) header: MsgHeader,
    cmd_id: Option<CmdId>,
    parent_cmd_id: Option<CmdId>,
    result_mode: ResultMode,
}

impl Cmd {
    /// A new command named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::new(name),
            cmd_id: None,
            parent_cmd_id: None,
            result_mode: ResultMode::Single,
        }
    }

    /// Correlation id, assigned when the command is sent.
    pub fn cmd_id(&self) -> Option<&CmdId> {
        self.cmd_id.as_ref()
    }

    /// Correlation id of the command this one was forwarded from.
    pub fn parent_cmd_id(&self) -> Option<&CmdId> {
        self.parent_cmd_id.as_ref()
    }

    /// Result mode chosen by the sender.
    pub fn result_mode(&self) -> ResultMode {
        self.result_mode
    }

    /// Remove and return the current correlation id.
    pub fn take_cmd_id(&mut self) -> Option<CmdId> {
        self.cmd_id.take()
    }

    /// Stamp the correlation data. Called by the runtime at send time.
    pub fn stamp(&mut self, cmd_id: CmdId, parent: Option<CmdId>, mode: ResultMode) {
        self.cmd_id = Some(cmd_id);
        self.parent_cmd_id = parent;
        self.result_mode = mode;
    }
}

impl_envelope!(Cmd, crate::msg::MsgKind::Cmd);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loc::Loc;
    use crate::msg::{Envelope, MsgKind};

    #[test]
    fn fresh_cmd_has_no_identity() {
        let cmd = Cmd::new("hello");
        assert_eq!(cmd.name(), "hello");
        assert_eq!(cmd.kind(), MsgKind::Cmd);
        assert!(cmd.cmd_id().is_none());
        assert!(cmd.dests().is_empty());
        assert_eq!(cmd.result_mode(), ResultMode::Single);
    }

    #[test]
    fn stamp_and_take() {
        let mut cmd = Cmd::new("hello");
        cmd.add_dest(Loc::extension("b"));
        let id = CmdId::generate();
        cmd.stamp(id.clone(), None, ResultMode::Multi);
        assert_eq!(cmd.cmd_id(), Some(&id));
        assert_eq!(cmd.result_mode(), ResultMode::Multi);

        let taken = cmd.take_cmd_id();
        assert_eq!(taken, Some(id));
        assert!(cmd.cmd_id().is_none());
        assert_eq!(cmd.dests().len(), 1);
    }

    #[test]
    fn properties_are_per_instance() {
        let mut a = Cmd::new("x");
        a.set_property("k", 1i64).unwrap();
        let mut b = a.clone();
        b.set_property("k", 2i64).unwrap();
        assert_eq!(a.get_property_int("k").unwrap(), 1);
        assert_eq!(b.get_property_int("k").unwrap(), 2);
    }
}
