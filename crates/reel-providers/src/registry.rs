//! Name-to-adapter lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{
    ArkProvider, ChatfireProvider, MinimaxProvider, PikaProvider, RunwayProvider, SoraProvider,
};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::VideoProvider;

/// Registered providers keyed by lowercase name, plus aliases.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn VideoProvider>>,
    aliases: HashMap<String, String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. Replaces any previous entry.
    pub fn register(&mut self, provider: Arc<dyn VideoProvider>) {
        let name = provider.name().to_ascii_lowercase();
        self.providers.insert(name, provider);
    }

    pub fn alias(&mut self, alias: &str, target: &str) {
        self.aliases
            .insert(alias.to_ascii_lowercase(), target.to_ascii_lowercase());
    }

    /// Look up a provider by name or alias, case-insensitively.
    pub fn get(&self, name: &str) -> ProviderResult<Arc<dyn VideoProvider>> {
        let key = name.trim().to_ascii_lowercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.providers
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build a registry from every provider with credentials in the environment.
    pub fn from_env() -> Self {
        let mut registry = Self::new();
        registry.alias("doubao", "ark");
        registry.alias("volces", "ark");
        registry.alias("volcengine", "ark");
        registry.alias("openai", "sora");

        let attempts: Vec<(&str, ProviderResult<Arc<dyn VideoProvider>>)> = vec![
            ("chatfire", ChatfireProvider::from_env().map(|p| Arc::new(p) as Arc<dyn VideoProvider>)),
            ("ark", ArkProvider::from_env().map(|p| Arc::new(p) as Arc<dyn VideoProvider>)),
            ("sora", SoraProvider::from_env().map(|p| Arc::new(p) as Arc<dyn VideoProvider>)),
            ("minimax", MinimaxProvider::from_env().map(|p| Arc::new(p) as Arc<dyn VideoProvider>)),
            ("runway", RunwayProvider::from_env().map(|p| Arc::new(p) as Arc<dyn VideoProvider>)),
            ("pika", PikaProvider::from_env().map(|p| Arc::new(p) as Arc<dyn VideoProvider>)),
        ];

        for (name, attempt) in attempts {
            match attempt {
                Ok(provider) => {
                    info!(provider = name, "Registered video provider");
                    registry.register(provider);
                }
                Err(ProviderError::NotConfigured(_)) => {}
                Err(e) => warn!(provider = name, error = %e, "Failed to initialize video provider"),
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProviderSettings;

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(
            ArkProvider::new(ProviderSettings::new("k", "https://ark.local")).unwrap(),
        ));
        registry.register(Arc::new(
            SoraProvider::new(ProviderSettings::new("k", "https://oai.local")).unwrap(),
        ));
        registry.alias("doubao", "ark");
        registry.alias("openai", "sora");
        registry
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let registry = registry();
        assert_eq!(registry.get("ark").unwrap().name(), "ark");
        assert_eq!(registry.get("Doubao").unwrap().name(), "ark");
        assert_eq!(registry.get(" openai ").unwrap().name(), "sora");
        assert_eq!(registry.names(), vec!["ark".to_string(), "sora".to_string()]);
    }

    #[test]
    fn test_unknown_provider() {
        let err = registry().get("veo").err().expect("expected error");
        assert_eq!(err.to_string(), "Unknown video provider: veo");
        assert!(!registry().contains("veo"));
    }
}
