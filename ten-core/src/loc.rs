//! Addresses of extensions.

use crate::id::ExtensionName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an envelope comes from or goes to.
///
/// Only the extension name is needed to reach a slot of the local app;
/// the other parts are carried for logs and for graph documents, which
/// spell destinations as `{"app", "extension_group", "extension"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Loc {
    /// App URI. `None` means the local app.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Graph id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    /// Extension group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_group: Option<String>,
    /// Extension name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionName>,
}

impl Loc {
    /// Address an extension of the local app.
    pub fn extension(name: impl Into<ExtensionName>) -> Self {
        Self {
            extension: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the app URI.
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Set the extension group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.extension_group = Some(group.into());
        self
    }

    /// Whether this address points into the app identified by `uri`.
    pub fn is_local_to(&self, uri: &str) -> bool {
        self.app.as_deref().is_none_or(|app| app == uri)
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.app.as_deref().unwrap_or("localhost"),
            self.extension_group.as_deref().unwrap_or("-"),
            self.extension.as_ref().map(|e| e.as_str()).unwrap_or("-")
        )
    }
}
