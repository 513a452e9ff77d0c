//! Experiment recipe URL registry
//!
//! Test drivers park the recipe URL of the experiment under test here so that
//! other processes in the same run can find it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of `POST /experiment`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentUrlRequest {
    pub experiment_url: String,
}

/// Ordered list of registered experiment URLs
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    urls: Mutex<Vec<String>>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: String) {
        info!(url = %url, "Experiment URL registered");
        self.urls.lock().push(url);
    }

    pub fn list(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.urls.lock()).len();
        info!(removed, "Experiment URLs cleared");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_list_clear() {
        let registry = ExperimentRegistry::new();
        registry.register("https://example.test/recipe-a".to_string());
        registry.register("https://example.test/recipe-b".to_string());

        assert_eq!(
            registry.list(),
            vec![
                "https://example.test/recipe-a".to_string(),
                "https://example.test/recipe-b".to_string(),
            ]
        );
        assert_eq!(registry.clear(), 2);
        assert!(registry.list().is_empty());
    }
}
