//! Causal language models behind one interface.
//!
//! The primary path reads `config.json`, dispatches on `model_type` and maps
//! safetensors weights onto the device. The generic fallback loads a GGUF
//! checkpoint as a quantized llama-family decoder.

use std::path::Path;

use anyhow::{bail, Context};
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{
    gemma, gemma2, llama, mistral, phi, phi3, quantized_llama, qwen2,
};
use serde::Deserialize;

use crate::source::ModelSource;

/// Architectures the causal path knows how to build.
pub const SUPPORTED_ARCHITECTURES: &[&str] =
    &["llama", "mistral", "qwen2", "phi", "phi3", "gemma", "gemma2"];

/// A loaded decoder bound to one device.
pub enum CausalLm {
    Llama {
        model: llama::Llama,
        cache: llama::Cache,
        config: llama::Config,
        dtype: DType,
        device: Device,
    },
    Mistral(mistral::Model),
    Qwen2(qwen2::ModelForCausalLM),
    Phi(phi::Model),
    Phi3(phi3::Model),
    Gemma(gemma::Model),
    Gemma2(gemma2::Model),
    Gguf(quantized_llama::ModelWeights),
}

/// The bits of `config.json` needed before picking an architecture.
#[derive(Debug, Deserialize)]
struct ConfigHeader {
    model_type: Option<String>,
    #[serde(default)]
    eos_token_id: Option<serde_json::Value>,
}

impl CausalLm {
    /// Build the architecture named by `config.json` from safetensors weights.
    pub fn load_causal(
        source: &ModelSource,
        dtype: DType,
        device: &Device,
    ) -> anyhow::Result<Self> {
        let config_path = source.get("config.json")?;
        let raw = std::fs::read(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let header: ConfigHeader =
            serde_json::from_slice(&raw).context("parse config.json")?;
        let Some(model_type) = header.model_type else {
            bail!("config.json has no `model_type`");
        };
        if !SUPPORTED_ARCHITECTURES.contains(&model_type.as_str()) {
            bail!(
                "architecture `{model_type}` is not supported for causal generation \
                 (supported: {})",
                SUPPORTED_ARCHITECTURES.join(", ")
            );
        }

        let weights = source.safetensors()?;
        tracing::info!(
            model_type = %model_type,
            shards = weights.len(),
            ?dtype,
            "mapping safetensors"
        );
        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, device)? };

        let model = match model_type.as_str() {
            "llama" => {
                let cfg: llama::LlamaConfig = serde_json::from_slice(&raw)?;
                let config = cfg.into_config(false);
                let model = llama::Llama::load(vb, &config)?;
                let cache = llama::Cache::new(true, dtype, &config, device)?;
                Self::Llama {
                    model,
                    cache,
                    config,
                    dtype,
                    device: device.clone(),
                }
            }
            "mistral" => {
                let cfg: mistral::Config = serde_json::from_slice(&raw)?;
                Self::Mistral(mistral::Model::new(&cfg, vb)?)
            }
            "qwen2" => {
                let cfg: qwen2::Config = serde_json::from_slice(&raw)?;
                Self::Qwen2(qwen2::ModelForCausalLM::new(&cfg, vb)?)
            }
            "phi" => {
                let cfg: phi::Config = serde_json::from_slice(&raw)?;
                Self::Phi(phi::Model::new(&cfg, vb)?)
            }
            "phi3" => {
                let cfg: phi3::Config = serde_json::from_slice(&raw)?;
                Self::Phi3(phi3::Model::new(&cfg, vb)?)
            }
            "gemma" => {
                let cfg: gemma::Config = serde_json::from_slice(&raw)?;
                Self::Gemma(gemma::Model::new(false, &cfg, vb)?)
            }
            "gemma2" => {
                let cfg: gemma2::Config = serde_json::from_slice(&raw)?;
                Self::Gemma2(gemma2::Model::new(false, &cfg, vb)?)
            }
            other => bail!("architecture `{other}` is not supported for causal generation"),
        };
        Ok(model)
    }

    /// Load the first `.gguf` file in the source as a quantized llama decoder.
    pub fn load_generic(source: &ModelSource, device: &Device) -> anyhow::Result<Self> {
        let Some(name) = source.files()?.into_iter().find(|f| f.ends_with(".gguf")) else {
            bail!("no .gguf weights found in {}", source.describe());
        };
        let path = source.get(&name)?;
        tracing::info!(file = %name, "loading quantized weights");
        let mut file =
            std::fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(&path))?;
        let model = quantized_llama::ModelWeights::from_gguf(content, &mut file, device)?;
        Ok(Self::Gguf(model))
    }

    pub fn architecture(&self) -> &'static str {
        match self {
            Self::Llama { .. } => "llama",
            Self::Mistral(_) => "mistral",
            Self::Qwen2(_) => "qwen2",
            Self::Phi(_) => "phi",
            Self::Phi3(_) => "phi3",
            Self::Gemma(_) => "gemma",
            Self::Gemma2(_) => "gemma2",
            Self::Gguf(_) => "gguf-llama",
        }
    }

    /// Run `input` (shape `(1, seq_len)`) starting at position `pos`.
    /// Returns the logits of the last position as a 1-D tensor.
    pub fn forward(&mut self, input: &Tensor, pos: usize) -> candle_core::Result<Tensor> {
        let logits = match self {
            Self::Llama { model, cache, .. } => model.forward(input, pos, cache)?,
            Self::Mistral(m) => m.forward(input, pos)?,
            Self::Qwen2(m) => m.forward(input, pos)?,
            // Tracks its own position through the KV cache.
            Self::Phi(m) => m.forward(input)?,
            Self::Phi3(m) => m.forward(input, pos)?,
            Self::Gemma(m) => m.forward(input, pos)?,
            Self::Gemma2(m) => m.forward(input, pos)?,
            Self::Gguf(m) => m.forward(input, pos)?,
        };
        // Batch is always 1 and every model returns only the last position.
        logits.flatten_all()
    }

    /// Forget all cached keys/values so the next forward starts at position 0.
    pub fn clear_cache(&mut self) -> candle_core::Result<()> {
        match self {
            Self::Llama {
                cache,
                config,
                dtype,
                device,
                ..
            } => *cache = llama::Cache::new(true, *dtype, config, device)?,
            Self::Mistral(m) => m.clear_kv_cache(),
            Self::Qwen2(m) => m.clear_kv_cache(),
            Self::Phi(m) => m.clear_kv_cache(),
            Self::Phi3(m) => m.clear_kv_cache(),
            Self::Gemma(m) => m.clear_kv_cache(),
            Self::Gemma2(m) => m.clear_kv_cache(),
            // Resets its own cache whenever a forward starts at position 0.
            Self::Gguf(_) => {}
        }
        Ok(())
    }
}

/// EOS ids declared in `config.json` (`eos_token_id` may be an int or a list).
pub fn config_eos_ids(config_json: &Path) -> Vec<u32> {
    let Ok(raw) = std::fs::read(config_json) else {
        return Vec::new();
    };
    match serde_json::from_slice::<ConfigHeader>(&raw) {
        Ok(header) => header.eos_token_id.map(|v| eos_ids_from_json(&v)).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn eos_ids_from_json(value: &serde_json::Value) -> Vec<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|id| vec![id as u32]).unwrap_or_default(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_u64())
            .map(|id| id as u32)
            .collect(),
        _ => Vec::new(),
    }
}
