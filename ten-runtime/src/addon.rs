//! Addons: named factories for extension instances.

use crate::extension::Extension;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use ten_core::{AddonName, PropertySchema, TenError};

/// Creates extension instances for graph nodes.
pub trait Addon: Send + Sync {
    /// Build the instance for the graph node `name`.
    fn create_instance(&self, name: &str) -> Result<Box<dyn Extension>, TenError>;

    /// Property schema applied to every instance before graph
    /// properties are merged in.
    fn property_schema(&self) -> Option<PropertySchema> {
        None
    }
}

impl<F, E> Addon for F
where
    F: Fn(&str) -> E + Send + Sync,
    E: Extension,
{
    fn create_instance(&self, name: &str) -> Result<Box<dyn Extension>, TenError> {
        Ok(Box::new(self(name)))
    }
}

/// Addons known to an app, by name.
///
/// Registration closes when the app is built; the registry is
/// destroyed after the app closes.
#[derive(Default, Clone)]
pub struct AddonRegistry {
    addons: BTreeMap<AddonName, Arc<dyn Addon>>,
    frozen: bool,
}

impl fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonRegistry")
            .field("addons", &self.addons.keys().collect::<Vec<_>>())
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl AddonRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an addon under `name`.
    pub fn register(
        &mut self,
        name: impl Into<AddonName>,
        addon: impl Addon + 'static,
    ) -> Result<(), TenError> {
        let name = name.into();
        if self.frozen {
            return Err(TenError::InvalidArgument(format!(
                "addon '{name}' registered after the registry was frozen"
            )));
        }
        if self.addons.contains_key(&name) {
            return Err(TenError::InvalidArgument(format!(
                "addon '{name}' is already registered"
            )));
        }
        tracing::debug!(addon = %name, "ten.addon.registered");
        self.addons.insert(name, Arc::new(addon));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, name: impl Into<AddonName>, addon: impl Addon + 'static) -> Result<Self, TenError> {
        self.register(name, addon)?;
        Ok(self)
    }

    /// Close registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether registration is closed.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Look up an addon.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Addon>> {
        self.addons.get(&AddonName::from(name))
    }

    /// Registered addon names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.addons.keys().map(AddonName::as_str)
    }

    /// Number of registered addons.
    pub fn len(&self) -> usize {
        self.addons.len()
    }

    /// Whether no addon is registered.
    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }

    /// Create an instance through the addon `addon` for node `name`.
    pub fn create(
        &self,
        addon: &str,
        name: &str,
    ) -> Result<(Box<dyn Extension>, Option<PropertySchema>), TenError> {
        let factory = self.get(addon).ok_or_else(|| {
            TenError::InvalidArgument(format!("addon '{addon}' is not registered"))
        })?;
        let instance = factory.create_instance(name)?;
        Ok((instance, factory.property_schema()))
    }

    /// Drop every addon.
    pub fn destroy(&mut self) {
        if !self.addons.is_empty() {
            tracing::debug!(count = self.addons.len(), "ten.addon.destroyed");
        }
        self.addons.clear();
        self.frozen = true;
    }
}
