//! App configuration, read from the `_ten` section of the app property
//! document.
//!
//! ```json
//! {
//!   "_ten": {
//!     "uri": "localhost",
//!     "log_level": "info",
//!     "close_grace_ms": 3000,
//!     "predefined_graphs": [{"name": "default", "auto_start": true, "nodes": [], "connections": []}]
//!   },
//!   "greeting": "hello"
//! }
//! ```

use crate::error::TenError;
use crate::graph::GraphDefinition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TEN_SECTION: &str = "_ten";

/// A graph declared in the app configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredefinedGraph {
    /// Graph name.
    pub name: String,
    /// Start this graph when the app starts.
    #[serde(default)]
    pub auto_start: bool,
    /// Nodes and connections.
    #[serde(flatten)]
    pub graph: GraphDefinition,
}

/// Configuration for an app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// URI of this app. Destinations naming another app are unreachable.
    pub uri: String,

    /// Log filter directive, e.g. `"info"` or `"ten_runtime=debug"`.
    /// When set, the app installs a global `tracing` subscriber.
    pub log_level: Option<String>,

    /// Keep running when the last graph stops.
    pub long_running_mode: bool,

    /// How long `close()` waits for the stop/deinit cascade before
    /// tearing the remaining extensions down by force.
    pub close_grace_ms: u64,

    /// Graphs known to the app.
    pub predefined_graphs: Vec<PredefinedGraph>,

    /// Every other top level key of the property document.
    #[serde(skip)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            uri: "localhost".into(),
            log_level: None,
            long_running_mode: false,
            close_grace_ms: 5_000,
            predefined_graphs: Vec::new(),
            properties: serde_json::Map::new(),
        }
    }
}

impl AppConfig {
    /// Parse an app property document.
    ///
    /// A missing `_ten` section yields the defaults; graphs in it are
    /// validated.
    pub fn from_property_json(json: &str) -> Result<Self, TenError> {
        let doc: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(mut map) = doc else {
            return Err(TenError::InvalidArgument(
                "app property document must be an object".into(),
            ));
        };
        let mut config = match map.remove(TEN_SECTION) {
            Some(section) => serde_json::from_value::<AppConfig>(section)?,
            None => AppConfig::default(),
        };
        for graph in &config.predefined_graphs {
            graph.graph.validate()?;
        }
        config.properties = map;
        Ok(config)
    }

    /// The close grace period.
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// The first graph marked `auto_start`.
    pub fn auto_start_graph(&self) -> Option<&PredefinedGraph> {
        self.predefined_graphs.iter().find(|g| g.auto_start)
    }

    /// Set the URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Set the close grace period.
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the log filter.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }
}
