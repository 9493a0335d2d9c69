//! Provider router: selects the model provider based on config.

use std::collections::HashMap;
use std::sync::Arc;
use clinicdesk_core::error::ProviderError;
use clinicdesk_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes model requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// Every configured provider speaks the OpenAI-compatible protocol. A
/// provider without an `api_url` must be one whose endpoint is well known.
pub fn build_from_config(
    config: &clinicdesk_config::AppConfig,
) -> Result<ProviderRouter, ProviderError> {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let base_url = match &provider_config.api_url {
            Some(url) => url.clone(),
            None => default_base_url(name)
                .ok_or_else(|| ProviderError::NotConfigured(format!("{name}: api_url is required")))?
                .to_string(),
        };
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_else(|| local_api_key(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key)),
        );
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let name = &config.default_provider;
        let base_url = default_base_url(name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "{name}: add [providers.{name}] with an api_url"
            ))
        })?;
        let api_key = config.api_key.clone().unwrap_or_else(|| local_api_key(name));
        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name, base_url, &api_key)),
        );
    }

    Ok(router)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    let url = match provider_name {
        "lmstudio" => "http://localhost:1234/v1",
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url)
}

/// Local servers accept any bearer token but still expect the header.
fn local_api_key(provider_name: &str) -> String {
    match provider_name {
        "ollama" => "ollama".into(),
        _ => "localhost".into(),
    }
}
