// ABOUTME: Provider module aggregating the LLM client adapters.
// ABOUTME: create_llm_client resolves a provider name into a configured client via environment variables.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use crate::llm::LlmClient;

pub use anthropic::AnthropicClient;
pub use openai::OpenAIClient;

/// Create an LLM client for the given provider name.
///
/// Configuration is read from environment variables:
/// - anthropic: `ANTHROPIC_API_KEY` (required), `ANTHROPIC_BASE_URL`
/// - openai: `OPENAI_API_KEY` (required), `OPENAI_BASE_URL`
///
/// The model is not resolved here: every agent definition carries its own
/// model id, which travels with each request.
pub fn create_llm_client(provider: &str) -> Result<Arc<dyn LlmClient>, anyhow::Error> {
    match provider {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_env()?)),
        "openai" => Ok(Arc::new(OpenAIClient::from_env()?)),
        unknown => Err(anyhow::anyhow!("unsupported LLM provider: {}", unknown)),
    }
}
