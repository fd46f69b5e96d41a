//! Session configuration.
//!
//! Serialised as JSON. Every field has a default, so `{}` is a valid config
//! and reproduces the stock chat behaviour.

use serde::{Deserialize, Serialize};

use crate::credential::TOKEN_ENV_VAR;
use crate::error::ChatError;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Draw from the distribution; `false` means greedy decoding.
    pub do_sample: bool,
    pub temperature: f64,
    /// Keep the `top_k` most likely tokens (0 disables the filter).
    pub top_k: usize,
    /// Nucleus mass in (0, 1]; 1.0 disables the filter.
    pub top_p: f64,
    /// New tokens per turn, on top of the encoded transcript.
    pub max_new_tokens: usize,
    /// 1.0 disables the penalty.
    pub repetition_penalty: f64,
    /// How many recent tokens the penalty looks at.
    pub repetition_window: usize,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            do_sample: true,
            temperature: 0.7,
            top_k: 50,
            top_p: 0.9,
            max_new_tokens: 100,
            repetition_penalty: 1.0,
            repetition_window: 64,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ChatError> {
        if !(self.temperature >= 0.0) {
            return Err(ChatError::Config(format!(
                "temperature must be >= 0, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ChatError::Config(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if !(self.repetition_penalty > 0.0) {
            return Err(ChatError::Config(format!(
                "repetition_penalty must be > 0, got {}",
                self.repetition_penalty
            )));
        }
        if self.max_new_tokens == 0 {
            return Err(ChatError::Config("max_new_tokens must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a chat session needs besides the model identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Environment variable holding the hub token.
    pub token_env_var: String,
    /// Hub revision (branch, tag or commit).
    pub revision: String,
    /// Skip accelerator detection.
    pub force_cpu: bool,
    /// Weight dtype: `f32`, `f16` or `bf16`. `None` means `f32`.
    pub dtype: Option<String>,
    /// Undo the user turn when its generation fails, instead of leaving a
    /// dangling `Model:` marker in the transcript.
    pub rollback_failed_turns: bool,
    pub generation: GenerationConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token_env_var: TOKEN_ENV_VAR.to_string(),
            revision: "main".to_string(),
            force_cpu: false,
            dtype: None,
            rollback_failed_turns: true,
            generation: GenerationConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.token_env_var.is_empty() {
            return Err(ChatError::Config("token_env_var must not be empty".into()));
        }
        if let Some(dtype) = &self.dtype {
            if !matches!(dtype.as_str(), "f32" | "f16" | "bf16") {
                return Err(ChatError::Config(format!(
                    "unsupported dtype `{dtype}` (expected f32, f16 or bf16)"
                )));
            }
        }
        self.generation.validate()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_sampling() {
        let g = GenerationConfig::default();
        assert!(g.do_sample);
        assert_eq!(g.top_p, 0.9);
        assert_eq!(g.top_k, 50);
        assert_eq!(g.temperature, 0.7);
        assert_eq!(g.max_new_tokens, 100);
        assert_eq!(g.repetition_penalty, 1.0);
    }

    #[test]
    fn empty_json_is_default() {
        let loaded: ChatConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, ChatConfig::default());
        assert_eq!(loaded.token_env_var, "HUGGINGFACE_API_TOKEN");
        assert!(loaded.rollback_failed_turns);
    }

    #[test]
    fn partial_generation_block_keeps_other_defaults() {
        let json = r#"{ "revision": "v2", "generation": { "top_k": 10, "seed": 7 } }"#;
        let loaded: ChatConfig = serde_json::from_str(json).unwrap();
        assert_eq!(loaded.revision, "v2");
        assert_eq!(loaded.generation.top_k, 10);
        assert_eq!(loaded.generation.seed, Some(7));
        assert_eq!(loaded.generation.top_p, 0.9);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        let config = ChatConfig {
            force_cpu: true,
            dtype: Some("bf16".into()),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ChatConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn validation_rejects_out_of_range() {
        let mut c = ChatConfig::default();
        assert!(c.validate().is_ok());

        c.generation.top_p = 0.0;
        assert!(c.validate().is_err());

        c.generation.top_p = 0.9;
        c.generation.temperature = -1.0;
        assert!(c.validate().is_err());

        c.generation.temperature = 0.7;
        c.dtype = Some("int8".into());
        let err = c.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("int8"));
    }
}
