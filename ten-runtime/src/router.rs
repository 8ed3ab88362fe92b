//! Destination resolution.
//!
//! Explicit destinations on the envelope win; otherwise the graph's
//! connections for the sender decide. Only slots in `Started` accept
//! envelopes. Delivery itself is a push onto the target slot's FIFO
//! queue, which keeps envelopes from one sender to one target in send
//! order.

use crate::lock;
use crate::slot::SlotShared;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use ten_core::{
    ExtensionName, GraphDefinition, Loc, MsgKind, ResultReturnPolicy, TenError,
};

/// Where an envelope goes.
pub(crate) struct Route {
    pub(crate) targets: Vec<Arc<SlotShared>>,
    pub(crate) policy: ResultReturnPolicy,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field(
                "targets",
                &self.targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

pub(crate) struct Router {
    app_uri: String,
    graph: GraphDefinition,
    slots: HashMap<ExtensionName, Arc<SlotShared>>,
    warned: Mutex<HashSet<(ExtensionName, MsgKind, String)>>,
}

impl Router {
    pub(crate) fn new(
        app_uri: String,
        graph: GraphDefinition,
        slots: impl IntoIterator<Item = Arc<SlotShared>>,
    ) -> Self {
        Self {
            app_uri,
            graph,
            slots: slots
                .into_iter()
                .map(|slot| (slot.name.clone(), slot))
                .collect(),
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn slot(&self, name: &ExtensionName) -> Option<&Arc<SlotShared>> {
        self.slots.get(name)
    }

    pub(crate) fn resolve(
        &self,
        src: &ExtensionName,
        kind: MsgKind,
        name: &str,
        dests: &[Loc],
    ) -> Result<Route, TenError> {
        let (locs, policy) = if !dests.is_empty() {
            (dests, ResultReturnPolicy::default())
        } else {
            match self.graph.flow_for(src.as_str(), kind, name) {
                Some(flow) if !flow.dest.is_empty() => (
                    flow.dest.as_slice(),
                    flow.result_return_policy.unwrap_or_default(),
                ),
                _ => return Err(self.no_destination(src, kind, name)),
            }
        };

        let mut targets = Vec::with_capacity(locs.len());
        for loc in locs {
            let slot = loc
                .extension
                .as_ref()
                .filter(|_| loc.is_local_to(&self.app_uri))
                .and_then(|ext| self.slots.get(ext));
            let Some(slot) = slot else {
                return Err(self.no_destination(src, kind, name));
            };
            let state = slot.state();
            if !state.accepts_messages() {
                return Err(TenError::TargetNotReady {
                    extension: slot.name.to_string(),
                    state,
                });
            }
            targets.push(Arc::clone(slot));
        }
        Ok(Route { targets, policy })
    }

    fn no_destination(&self, src: &ExtensionName, kind: MsgKind, name: &str) -> TenError {
        let first = lock(&self.warned).insert((src.clone(), kind, name.to_owned()));
        if first {
            tracing::warn!(
                extension = %src,
                kind = %kind,
                msg_name = name,
                "ten.router.no_destination"
            );
        } else {
            tracing::debug!(
                extension = %src,
                kind = %kind,
                msg_name = name,
                "ten.router.no_destination"
            );
        }
        TenError::NoDestination {
            kind,
            name: name.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ten_core::{ErrorCode, ExtensionState, GraphConnection, GraphNode, MsgFlow};

    fn router(states: &[(&str, ExtensionState)], graph: GraphDefinition) -> Router {
        let slots = states.iter().map(|(name, state)| {
            let (slot, _rx) = SlotShared::new(ExtensionName::from(*name), Loc::extension(*name));
            slot.set_state(*state);
            slot
        });
        Router::new("localhost".into(), graph, slots)
    }

    fn graph() -> GraphDefinition {
        GraphDefinition {
            nodes: vec![
                GraphNode::new("a", "x"),
                GraphNode::new("b", "x"),
                GraphNode::new("c", "x"),
            ],
            connections: vec![
                GraphConnection::from_extension("a")
                    .with_flow(MsgKind::Cmd, MsgFlow::to_extensions("hello", ["b"]))
                    .with_flow(MsgKind::Cmd, MsgFlow::to_extensions("both", ["b", "c"])),
            ],
        }
    }

    #[test]
    fn graph_connection_resolves() {
        let r = router(
            &[
                ("a", ExtensionState::Started),
                ("b", ExtensionState::Started),
                ("c", ExtensionState::Started),
            ],
            graph(),
        );
        let a = ExtensionName::from("a");
        let route = r.resolve(&a, MsgKind::Cmd, "hello", &[]).unwrap();
        assert_eq!(route.targets.len(), 1);
        assert_eq!(route.targets[0].name.as_str(), "b");

        let route = r.resolve(&a, MsgKind::Cmd, "both", &[]).unwrap();
        assert_eq!(route.targets.len(), 2);
        assert_eq!(route.policy, ResultReturnPolicy::FirstErrorOrLastOk);
    }

    #[test]
    fn explicit_destination_bypasses_graph() {
        let r = router(
            &[("a", ExtensionState::Started), ("c", ExtensionState::Started)],
            graph(),
        );
        let route = r
            .resolve(
                &ExtensionName::from("a"),
                MsgKind::Data,
                "anything",
                &[Loc::extension("c")],
            )
            .unwrap();
        assert_eq!(route.targets[0].name.as_str(), "c");
    }

    #[test]
    fn unconnected_message_has_no_destination() {
        let r = router(&[("a", ExtensionState::Started)], graph());
        let err = r
            .resolve(&ExtensionName::from("a"), MsgKind::Cmd, "unconnected_cmd", &[])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoDestination);
        // second failure for the same name only logs at debug level
        let err = r
            .resolve(&ExtensionName::from("a"), MsgKind::Cmd, "unconnected_cmd", &[])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoDestination);
    }

    #[test]
    fn remote_or_unknown_destination_is_unreachable() {
        let r = router(&[("a", ExtensionState::Started)], graph());
        let a = ExtensionName::from("a");
        let remote = Loc::extension("a").with_app("msgpack://10.0.0.1:8001/");
        assert_eq!(
            r.resolve(&a, MsgKind::Cmd, "x", &[remote]).unwrap_err().code(),
            ErrorCode::NoDestination
        );
        assert_eq!(
            r.resolve(&a, MsgKind::Cmd, "x", &[Loc::extension("ghost")])
                .unwrap_err()
                .code(),
            ErrorCode::NoDestination
        );
    }

    #[test]
    fn target_not_started_is_rejected() {
        let r = router(
            &[
                ("a", ExtensionState::Started),
                ("b", ExtensionState::Starting),
            ],
            graph(),
        );
        let err = r
            .resolve(&ExtensionName::from("a"), MsgKind::Cmd, "hello", &[])
            .unwrap_err();
        assert!(matches!(
            err,
            TenError::TargetNotReady {
                state: ExtensionState::Starting,
                ..
            }
        ));
        assert!(err.is_recoverable());
    }
}
