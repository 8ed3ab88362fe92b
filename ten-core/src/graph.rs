//! Graph documents: which extensions exist and how messages flow
//! between them.
//!
//! ```json
//! {
//!   "nodes": [
//!     {"type": "extension", "name": "a", "addon": "a_addon", "extension_group": "g"},
//!     {"type": "extension", "name": "b", "addon": "b_addon", "property": {"k": 1}}
//!   ],
//!   "connections": [
//!     {"extension": "a", "cmd": [{"name": "hello", "dest": [{"extension": "b"}]}]}
//!   ]
//! }
//! ```
//!
//! A flow named `"*"` matches every message name of its kind; an exact
//! name takes precedence over it.

use crate::error::TenError;
use crate::loc::Loc;
use crate::msg::MsgKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Flow name matching any message name.
pub const WILDCARD: &str = "*";

/// How the results of a command fanned out to several destinations are
/// folded into what the sender sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReturnPolicy {
    /// The first error, or else the first OK.
    FirstErrorOrFirstOk,
    /// The first error, or else the last OK once every destination answered.
    #[default]
    FirstErrorOrLastOk,
    /// Every result; only the last one is marked completed.
    EachOkAndError,
}

/// Node type. Only extensions exist today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An extension instance.
    #[default]
    Extension,
}

/// One extension instance in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node type.
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// Instance name, unique within the graph.
    pub name: String,
    /// Addon that creates the instance.
    pub addon: String,
    /// Extension group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_group: Option<String>,
    /// App URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Initial properties of the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<serde_json::Value>,
}

impl GraphNode {
    /// A node for `name` created by `addon`.
    pub fn new(name: impl Into<String>, addon: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Extension,
            name: name.into(),
            addon: addon.into(),
            extension_group: None,
            app: None,
            property: None,
        }
    }

    /// Attach initial properties.
    pub fn with_property(mut self, property: serde_json::Value) -> Self {
        self.property = Some(property);
        self
    }
}

/// Messages of one name (or `"*"`) and where they go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgFlow {
    /// Message name or [`WILDCARD`].
    pub name: String,
    /// Destinations.
    #[serde(default)]
    pub dest: Vec<Loc>,
    /// Fan-out policy for commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_return_policy: Option<ResultReturnPolicy>,
}

impl MsgFlow {
    /// A flow of `name` to the extensions in `dests`.
    pub fn to_extensions<I, S>(name: impl Into<String>, dests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dest: dests
                .into_iter()
                .map(|d| Loc::extension(d.into()))
                .collect(),
            result_return_policy: None,
        }
    }
}

/// Outgoing flows of one extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConnection {
    /// App URI of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Extension group of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_group: Option<String>,
    /// Source extension.
    pub extension: String,
    /// Command flows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<MsgFlow>,
    /// Data flows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<MsgFlow>,
    /// Audio frame flows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_frame: Vec<MsgFlow>,
    /// Video frame flows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_frame: Vec<MsgFlow>,
}

impl GraphConnection {
    /// No flows yet from `extension`.
    pub fn from_extension(extension: impl Into<String>) -> Self {
        Self {
            app: None,
            extension_group: None,
            extension: extension.into(),
            cmd: Vec::new(),
            data: Vec::new(),
            audio_frame: Vec::new(),
            video_frame: Vec::new(),
        }
    }

    /// The flows of one kind. Results never flow through the graph.
    pub fn flows(&self, kind: MsgKind) -> &[MsgFlow] {
        match kind {
            MsgKind::Cmd => &self.cmd,
            MsgKind::Data => &self.data,
            MsgKind::AudioFrame => &self.audio_frame,
            MsgKind::VideoFrame => &self.video_frame,
            MsgKind::CmdResult => &[],
        }
    }

    /// The flows of one kind, mutably.
    pub fn flows_mut(&mut self, kind: MsgKind) -> Option<&mut Vec<MsgFlow>> {
        match kind {
            MsgKind::Cmd => Some(&mut self.cmd),
            MsgKind::Data => Some(&mut self.data),
            MsgKind::AudioFrame => Some(&mut self.audio_frame),
            MsgKind::VideoFrame => Some(&mut self.video_frame),
            MsgKind::CmdResult => None,
        }
    }

    /// Add a flow of `kind`.
    pub fn with_flow(mut self, kind: MsgKind, flow: MsgFlow) -> Self {
        if let Some(flows) = self.flows_mut(kind) {
            flows.push(flow);
        }
        self
    }

    fn all_flows(&self) -> impl Iterator<Item = &MsgFlow> {
        self.cmd
            .iter()
            .chain(&self.data)
            .chain(&self.audio_frame)
            .chain(&self.video_frame)
    }
}

/// A whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Extension instances.
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Message flows.
    #[serde(default)]
    pub connections: Vec<GraphConnection>,
}

impl GraphDefinition {
    /// Parse and validate a graph document.
    pub fn from_json(json: &str) -> Result<Self, TenError> {
        let graph: GraphDefinition = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Serialize to a JSON document.
    pub fn to_json(&self) -> Result<String, TenError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// The flow a message of `kind` named `name` from `src` follows.
    ///
    /// Exact names win over [`WILDCARD`]. Connections for the same
    /// source are searched in order.
    pub fn flow_for(&self, src: &str, kind: MsgKind, name: &str) -> Option<&MsgFlow> {
        let mut wildcard = None;
        let flows = self
            .connections
            .iter()
            .filter(|c| c.extension == src)
            .flat_map(|c| c.flows(kind));
        for flow in flows {
            if flow.name == name {
                return Some(flow);
            }
            if wildcard.is_none() && flow.name == WILDCARD {
                wildcard = Some(flow);
            }
        }
        wildcard
    }

    /// Check the graph is self-consistent: node names are unique and
    /// non-empty, and every connection source and destination names a
    /// node.
    pub fn validate(&self) -> Result<(), TenError> {
        let invalid = |msg: String| Err(TenError::InvalidArgument(msg));
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return invalid("graph node with an empty name".into());
            }
            if node.addon.is_empty() {
                return invalid(format!("graph node '{}' has no addon", node.name));
            }
            if !names.insert(node.name.as_str()) {
                return invalid(format!("duplicate graph node '{}'", node.name));
            }
        }
        for conn in &self.connections {
            if !names.contains(conn.extension.as_str()) {
                return invalid(format!(
                    "connection from unknown extension '{}'",
                    conn.extension
                ));
            }
            for flow in conn.all_flows() {
                if flow.name.is_empty() {
                    return invalid(format!(
                        "connection from '{}' has a flow with no name",
                        conn.extension
                    ));
                }
                for dest in &flow.dest {
                    let known = dest
                        .extension
                        .as_ref()
                        .is_some_and(|e| names.contains(e.as_str()));
                    if !known {
                        return invalid(format!(
                            "flow '{}' from '{}' targets unknown destination {dest}",
                            flow.name, conn.extension
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
