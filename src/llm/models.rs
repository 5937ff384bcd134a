//! Model definitions available to the LLM reply generator

use super::{AnthropicService, LlmError, LlmService};
use std::sync::Arc;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID, matched against `llm_models.name`
    pub id: &'static str,
    /// API name used by the provider
    pub api_name: &'static str,
    pub description: &'static str,
}

impl ModelDef {
    pub fn build(&self, api_key: &str, gateway: Option<&str>) -> Result<Arc<dyn LlmService>, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::auth(format!(
                "{} requires ANTHROPIC_API_KEY or a gateway",
                self.id
            )));
        }
        Ok(Arc::new(AnthropicService::new(
            api_key.to_string(),
            self.id,
            self.api_name,
            gateway,
        )?))
    }
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "claude-4.5-sonnet",
            api_name: "claude-sonnet-4-5-20250929",
            description: "Claude Sonnet 4.5 (balanced performance)",
        },
        ModelDef {
            id: "claude-4.5-haiku",
            api_name: "claude-haiku-4-5-20251001",
            description: "Claude Haiku 4.5 (fast, efficient)",
        },
        ModelDef {
            id: "claude-4.5-opus",
            api_name: "claude-opus-4-5-20251101",
            description: "Claude Opus 4.5 (most capable, slower)",
        },
    ]
}
