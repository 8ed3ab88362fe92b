//! Typed string identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtypes over `String` so a command id cannot be passed where an
/// extension name is expected.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(CmdId, "Correlation id linking a command to its results.");
typed_id!(ExtensionName, "Name of an extension instance, unique within a graph.");
typed_id!(AddonName, "Name under which an extension factory is registered.");

impl CmdId {
    /// A fresh random id, assigned when a command is sent.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = CmdId::generate();
        let b = CmdId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn serializes_as_plain_string() {
        let name = ExtensionName::from("hello_1");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"hello_1\"");
        let back: ExtensionName = serde_json::from_str("\"hello_1\"").unwrap();
        assert_eq!(back, name);
    }
}
