//! Chat-completion providers for CopyCat.
//!
//! All providers implement the `copycat_core::Provider` trait.

pub mod openai_compat;

use std::sync::Arc;

use copycat_config::AppConfig;
use copycat_core::Provider;
use copycat_core::error::ProviderError;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Fails when no API key is available from the config file or environment.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = &config.provider;
    let api_key = provider.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key; set COPYCAT_API_KEY or OPENAI_API_KEY".into(),
        )
    })?;

    Ok(Arc::new(
        OpenAiCompatProvider::new(&provider.name, &provider.base_url, api_key)
            .with_observation_role(&provider.observation_role)
            .with_timeout(std::time::Duration::from_secs(provider.request_timeout_secs)),
    ))
}
