use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{presets, Variant, VariantConfig};
use crate::CoreError;

/// Name to finalized-variant map.
#[derive(Debug, Default)]
pub struct VariantRegistry {
    variants: HashMap<String, Arc<Variant>>,
}

impl VariantRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in sample variant.
    ///
    /// # Errors
    ///
    /// Propagates a finalization failure of a built-in preset.
    pub fn with_builtins() -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for config in presets::all() {
            registry.register(config)?;
        }
        Ok(registry)
    }

    /// Finalizes `config` and stores it under its name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateVariant`] when the name is taken, or the
    /// finalization error when the descriptor is inconsistent.
    pub fn register(&mut self, config: VariantConfig) -> Result<Arc<Variant>, CoreError> {
        if self.variants.contains_key(&config.name) {
            return Err(CoreError::DuplicateVariant(config.name));
        }
        let variant = Arc::new(Variant::finalize(config)?);
        log::debug!("registered core variant `{}`", variant.name());
        self.variants
            .insert(variant.name().to_owned(), Arc::clone(&variant));
        Ok(variant)
    }

    /// Looks up a variant by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] when nothing is registered under
    /// `name`.
    pub fn get(&self, name: &str) -> Result<Arc<Variant>, CoreError> {
        self.variants
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownVariant(name.to_owned()))
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variants.keys().cloned().collect();
        names.sort();
        names
    }
}

// Built-ins are seeded one at a time so a rejected preset cannot take the
// others down with it.
static GLOBAL: Lazy<Mutex<VariantRegistry>> = Lazy::new(|| {
    let mut registry = VariantRegistry::new();
    for config in presets::all() {
        let name = config.name.clone();
        if let Err(err) = registry.register(config) {
            log::error!("built-in variant `{name}` rejected: {err}");
        }
    }
    Mutex::new(registry)
});

/// Registers a variant in the process-wide registry.
///
/// # Errors
///
/// See [`VariantRegistry::register`].
pub fn register_variant(config: VariantConfig) -> Result<Arc<Variant>, CoreError> {
    GLOBAL.lock().register(config)
}

/// Looks up a variant in the process-wide registry.
///
/// # Errors
///
/// Returns [`CoreError::UnknownVariant`] for unregistered names.
pub fn find_variant(name: &str) -> Result<Arc<Variant>, CoreError> {
    GLOBAL.lock().get(name)
}
