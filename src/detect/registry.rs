use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::SegmentationBackend;
use super::backends::{StubBackend, ThresholdBackend};
use crate::config::ModelSettings;

/// Shared handle to one registered backend.
pub type SharedBackend = Arc<Mutex<dyn SegmentationBackend>>;

/// Thread-safe registry of segmentation backends.
///
/// Backends are wrapped in `Mutex` because `SegmentationBackend::predict` takes `&mut self`.
pub struct ModelRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend this build supports, defaulting to `settings.backend`.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(ThresholdBackend::new(settings.threshold));
        registry.register(StubBackend::new());
        register_onnx(&mut registry, settings)?;
        registry.set_default(&settings.backend)?;
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: SegmentationBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Default backend, or an error naming what is registered.
    pub fn require_default(&self) -> Result<SharedBackend> {
        self.default_backend().ok_or_else(|| {
            anyhow!(
                "no default segmentation backend (registered: {:?})",
                self.list()
            )
        })
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Warm up every registered backend.
    pub fn warm_up_all(&self) -> Result<()> {
        for (name, backend) in &self.backends {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend '{}' lock poisoned", name))?;
            guard.warm_up()?;
        }
        Ok(())
    }
}

#[cfg(feature = "backend-tract")]
fn register_onnx(registry: &mut ModelRegistry, settings: &ModelSettings) -> Result<()> {
    if let Some(path) = settings.onnx_path.as_ref() {
        registry.register(super::backends::TractBackend::new(
            path,
            settings.native_width,
            settings.native_height,
        )?);
    }
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_onnx(_registry: &mut ModelRegistry, settings: &ModelSettings) -> Result<()> {
    if settings.onnx_path.is_some() {
        log::warn!("model.onnx_path is set but this build lacks the backend-tract feature");
    }
    Ok(())
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
