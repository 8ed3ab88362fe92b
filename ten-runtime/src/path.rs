//! Result correlation: the per-slot path table.
//!
//! Every slot keeps two sides of the table on its own task, so no lock
//! guards it:
//!
//! - **out paths**: commands this extension sent and still expects
//!   results for. A command fanned out to several destinations is one
//!   *group* whose members each carry their own correlation id; the
//!   group's [`ResultReturnPolicy`] decides what the sender sees.
//! - **in paths**: commands this extension received and has not yet
//!   answered finally. They enforce the sender's [`ResultMode`] on
//!   `return_result`.
//!
//! Settled ids are remembered for a while so a late result can be told
//! apart from one that never had a path.

use crate::callback::Callback;
use std::collections::{HashMap, HashSet, VecDeque};
use ten_core::{CmdId, CmdResult, ExtensionName, ResultMode, ResultReturnPolicy, StatusCode};

const SETTLED_CAPACITY: usize = 1024;

/// A command about to be sent, registered before it leaves the slot.
#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) cmd_name: String,
    pub(crate) mode: ResultMode,
    pub(crate) policy: ResultReturnPolicy,
    pub(crate) callback: Callback,
    /// Correlation id of the received command this one forwards.
    pub(crate) parent: Option<CmdId>,
    pub(crate) members: Vec<CmdId>,
}

#[derive(Debug)]
pub(crate) struct OutGroup {
    pub(crate) cmd_name: String,
    pub(crate) mode: ResultMode,
    policy: ResultReturnPolicy,
    pub(crate) callback: Callback,
    pub(crate) parent: Option<CmdId>,
    members: Vec<CmdId>,
    finished: HashSet<CmdId>,
}

impl OutGroup {
    fn all_finished(&self) -> bool {
        self.finished.len() == self.members.len()
    }
}

/// A received command awaiting its final result.
#[derive(Debug, Clone)]
pub(crate) struct InPath {
    pub(crate) sender: ExtensionName,
    pub(crate) cmd_name: String,
    pub(crate) mode: ResultMode,
}

/// Outcome of feeding a result to the out side.
#[derive(Debug)]
pub(crate) enum Accepted {
    /// The result belongs to `group`. `deliver` is what the sender
    /// should see (already marked completed or not); `retire` means the
    /// group is settled and must be removed after delivery.
    Group {
        group: u64,
        deliver: Option<CmdResult>,
        retire: bool,
    },
    /// No path. `after_final` is true when the id already received its
    /// final result, which is a protocol error on the returning side.
    Orphan { after_final: bool },
}

/// Outcome of checking a `return_result` against the in side.
#[derive(Debug, PartialEq)]
pub(crate) enum ReturnCheck {
    /// Forward to `sender`. The in path is gone if the result was final.
    Route { sender: ExtensionName },
    /// The command already got its final result.
    AfterFinal,
    /// A non-final result for a single-result command.
    NonFinalInSingleMode,
    /// No such received command.
    Unknown,
}

#[derive(Debug, Default)]
struct Settled<V> {
    entries: VecDeque<(CmdId, V)>,
}

impl<V: Copy> Settled<V> {
    fn push(&mut self, id: CmdId, value: V) {
        if self.entries.len() == SETTLED_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((id, value));
    }

    fn get(&self, id: &CmdId) -> Option<V> {
        self.entries
            .iter()
            .rev()
            .find(|(settled, _)| settled == id)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug, Default)]
pub(crate) struct PathTable {
    out_index: HashMap<CmdId, u64>,
    groups: HashMap<u64, OutGroup>,
    next_group: u64,
    /// Member ids no longer expected; `true` when the member had
    /// already received its final result.
    settled_out: Settled<bool>,
    in_paths: HashMap<CmdId, InPath>,
    settled_in: Settled<()>,
}

impl PathTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, reg: Registration) -> u64 {
        let id = self.next_group;
        self.next_group += 1;
        for member in &reg.members {
            self.out_index.insert(member.clone(), id);
        }
        self.groups.insert(
            id,
            OutGroup {
                cmd_name: reg.cmd_name,
                mode: reg.mode,
                policy: reg.policy,
                callback: reg.callback,
                parent: reg.parent,
                members: reg.members,
                finished: HashSet::new(),
            },
        );
        id
    }

    pub(crate) fn group_mut(&mut self, group: u64) -> Option<&mut OutGroup> {
        self.groups.get_mut(&group)
    }

    #[cfg(test)]
    pub(crate) fn pending_out(&self) -> usize {
        self.groups.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_in(&self) -> usize {
        self.in_paths.len()
    }

    /// Fold a result returned to this extension into its group.
    pub(crate) fn accept(&mut self, mut result: CmdResult) -> Accepted {
        let Some(cmd_id) = result.cmd_id().cloned() else {
            return Accepted::Orphan { after_final: false };
        };
        let Some(&group_id) = self.out_index.get(&cmd_id) else {
            return Accepted::Orphan {
                after_final: self.settled_out.get(&cmd_id).unwrap_or(false),
            };
        };
        let Some(group) = self.groups.get_mut(&group_id) else {
            return Accepted::Orphan { after_final: false };
        };

        let is_final = result.is_final();
        if is_final {
            group.finished.insert(cmd_id.clone());
            self.out_index.remove(&cmd_id);
            self.settled_out.push(cmd_id, true);
        }

        let (deliver, retire) = if group.members.len() == 1 {
            result.set_completed(is_final);
            (Some(result), is_final)
        } else {
            match group.policy {
                ResultReturnPolicy::EachOkAndError => {
                    let done = is_final && group.all_finished();
                    result.set_completed(done);
                    (Some(result), done)
                }
                ResultReturnPolicy::FirstErrorOrFirstOk => {
                    if is_final {
                        result.set_completed(true);
                        (Some(result), true)
                    } else {
                        (None, false)
                    }
                }
                ResultReturnPolicy::FirstErrorOrLastOk => {
                    if !is_final {
                        (None, false)
                    } else if result.status_code() == StatusCode::Error || group.all_finished() {
                        result.set_completed(true);
                        (Some(result), true)
                    } else {
                        (None, false)
                    }
                }
            }
        };

        let mode = group.mode;
        Accepted::Group {
            group: group_id,
            deliver: deliver.filter(|r| mode == ResultMode::Multi || r.is_completed()),
            retire,
        }
    }

    /// Remove a settled group. Members still outstanding become
    /// stragglers whose results are dropped quietly.
    pub(crate) fn retire(&mut self, group: u64) -> Option<OutGroup> {
        let removed = self.groups.remove(&group)?;
        for member in &removed.members {
            if !removed.finished.contains(member) {
                self.out_index.remove(member);
                self.settled_out.push(member.clone(), false);
            }
        }
        Some(removed)
    }

    /// Take every pending group, for teardown.
    pub(crate) fn drain_out(&mut self) -> Vec<OutGroup> {
        self.out_index.clear();
        let mut groups: Vec<(u64, OutGroup)> = self.groups.drain().collect();
        groups.sort_by_key(|(id, _)| *id);
        groups.into_iter().map(|(_, g)| g).collect()
    }

    pub(crate) fn insert_in(&mut self, cmd_id: CmdId, path: InPath) {
        self.in_paths.insert(cmd_id, path);
    }

    pub(crate) fn check_return(&mut self, cmd_id: &CmdId, is_final: bool) -> ReturnCheck {
        match self.in_paths.get(cmd_id) {
            None if self.settled_in.get(cmd_id).is_some() => ReturnCheck::AfterFinal,
            None => ReturnCheck::Unknown,
            Some(path) if path.mode == ResultMode::Single && !is_final => {
                ReturnCheck::NonFinalInSingleMode
            }
            Some(path) => {
                let sender = path.sender.clone();
                if is_final {
                    self.in_paths.remove(cmd_id);
                    self.settled_in.push(cmd_id.clone(), ());
                }
                ReturnCheck::Route { sender }
            }
        }
    }

    /// Take every unanswered received command, for teardown.
    pub(crate) fn drain_in(&mut self) -> Vec<(CmdId, InPath)> {
        let drained: Vec<_> = self.in_paths.drain().collect();
        for (id, _) in &drained {
            self.settled_in.push(id.clone(), ());
        }
        drained
    }
}
