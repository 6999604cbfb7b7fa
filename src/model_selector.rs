//! Active model selection from the configured allow-list.

use std::sync::{PoisonError, RwLock};

use tracing::info;

use crate::errors::ModelError;

/// Process-wide active model, restricted to an allow-list
#[derive(Debug)]
pub struct ModelSelector {
    models: Vec<String>,
    current: RwLock<usize>,
}

impl ModelSelector {
    /// The first model of `models` becomes active
    ///
    /// Fails with `UnknownModel` when the allow-list is empty.
    pub fn new(models: Vec<String>) -> Result<Self, ModelError> {
        if models.is_empty() {
            return Err(ModelError::UnknownModel(String::new()));
        }
        Ok(Self {
            models,
            current: RwLock::new(0),
        })
    }

    pub fn set(&self, name: &str) -> Result<(), ModelError> {
        let index = self
            .models
            .iter()
            .position(|model| model == name.trim())
            .ok_or_else(|| ModelError::UnknownModel(name.trim().to_string()))?;
        self.activate(index);
        Ok(())
    }

    /// Select by position in the allow-list (inline keyboard path)
    pub fn set_index(&self, index: usize) -> Result<(), ModelError> {
        if index >= self.models.len() {
            return Err(ModelError::UnknownModel(index.to_string()));
        }
        self.activate(index);
        Ok(())
    }

    fn activate(&self, index: usize) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = index;
        info!(model = %self.models[index], "Active model changed");
    }

    pub fn current(&self) -> String {
        let index = *self.current.read().unwrap_or_else(PoisonError::into_inner);
        self.models[index].clone()
    }

    pub fn available(&self) -> &[String] {
        &self.models
    }
}
