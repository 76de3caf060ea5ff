use super::CycleError;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tradefleet_llm::ChatClient;

/// Process-wide registry mapping provider ids onto chat clients.
///
/// Providers are registered at startup from the stored provider rows and can
/// be disabled without deregistration.
#[derive(Default)]
pub struct LlmProviderRegistry {
    providers: RwLock<HashMap<String, ProviderEntry>>,
}

#[derive(Clone)]
struct ProviderEntry {
    client: Arc<dyn ChatClient>,
    enabled: bool,
}

impl LlmProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Into<String>>(&self, provider_id: S, client: Arc<dyn ChatClient>) {
        self.providers.write().insert(
            provider_id.into(),
            ProviderEntry {
                client,
                enabled: true,
            },
        );
    }

    /// Enable or disable a provider; returns false when unknown.
    pub fn set_enabled(&self, provider_id: &str, enabled: bool) -> bool {
        match self.providers.write().get_mut(provider_id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Resolve an agent's provider id onto its chat client.
    pub fn resolve(&self, provider_id: Option<&str>) -> Result<Arc<dyn ChatClient>, CycleError> {
        let provider_id = provider_id.ok_or(CycleError::ProviderNotConfigured)?;

        let providers = self.providers.read();
        let entry = providers
            .get(provider_id)
            .ok_or_else(|| CycleError::ProviderNotFound(provider_id.to_string()))?;
        if !entry.enabled {
            return Err(CycleError::ProviderDisabled(provider_id.to_string()));
        }
        Ok(Arc::clone(&entry.client))
    }
}

impl std::fmt::Debug for LlmProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers = self.providers.read();
        f.debug_struct("LlmProviderRegistry")
            .field("providers", &providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
