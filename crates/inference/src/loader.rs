//! Startup loading: tokenizer, device, model (causal path with generic
//! fallback). Every failure here is fatal to the session.

use std::io::Write;
use std::time::Duration;

use candle_core::{DType, Device};
use indicatif::{ProgressBar, ProgressStyle};
use tokenizers::Tokenizer;

use hfchat_common::{ChatConfig, ChatError, Credential, Result};

use crate::model::{config_eos_ids, CausalLm};
use crate::runtime::InferenceRuntime;
use crate::sampler::SamplerConfig;
use crate::source::ModelSource;

/// Builds a text generator for a model identifier.
pub trait ModelLoader {
    type Generator: crate::runtime::TextGenerator;

    /// Load `model`. Non-fatal progress notes (e.g. a fallback attempt) are
    /// written to `out`.
    fn load(
        &self,
        model: &str,
        credential: &Credential,
        out: &mut dyn Write,
    ) -> Result<Self::Generator>;
}

/// Pick CUDA, then Metal, then CPU.
pub fn select_device(force_cpu: bool) -> anyhow::Result<Device> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    if candle_core::utils::cuda_is_available() {
        return Ok(Device::new_cuda(0)?);
    }
    if candle_core::utils::metal_is_available() {
        return Ok(Device::new_metal(0)?);
    }
    Ok(Device::Cpu)
}

pub fn parse_dtype(name: Option<&str>) -> anyhow::Result<DType> {
    match name {
        None | Some("f32") => Ok(DType::F32),
        Some("f16") => Ok(DType::F16),
        Some("bf16") => Ok(DType::BF16),
        Some(other) => anyhow::bail!("unsupported dtype `{other}`"),
    }
}

pub fn load_tokenizer(source: &ModelSource) -> anyhow::Result<Tokenizer> {
    let path = source.get("tokenizer.json")?;
    Tokenizer::from_file(&path).map_err(anyhow::Error::msg)
}

/// Try `primary`; if it fails, report it on `out` and try `fallback`.
/// Only the fallback's failure is returned.
pub fn load_with_fallback<M>(
    model: &str,
    out: &mut dyn Write,
    primary: impl FnOnce() -> anyhow::Result<M>,
    fallback: impl FnOnce() -> anyhow::Result<M>,
) -> Result<M> {
    match primary() {
        Ok(m) => Ok(m),
        Err(e) => {
            tracing::warn!("causal load failed: {e:#}");
            writeln!(out, "Error loading model as causal LM: {e:#}")?;
            writeln!(out, "Attempting to load as generic model...")?;
            fallback().map_err(|e| ChatError::ModelLoad {
                model: model.to_string(),
                cause: format!("{e:#}"),
            })
        }
    }
}

/// Loads models from the hub or a local directory with candle.
#[derive(Debug, Clone)]
pub struct HubLoader {
    pub config: ChatConfig,
}

impl HubLoader {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for HubLoader {
    type Generator = InferenceRuntime;

    fn load(
        &self,
        model: &str,
        credential: &Credential,
        out: &mut dyn Write,
    ) -> Result<InferenceRuntime> {
        let tokenizer_err = |e: anyhow::Error| ChatError::TokenizerLoad {
            model: model.to_string(),
            cause: format!("{e:#}"),
        };
        let source = ModelSource::resolve(model, &self.config.revision, credential)
            .map_err(tokenizer_err)?;
        let tokenizer = load_tokenizer(&source).map_err(tokenizer_err)?;

        let device =
            select_device(self.config.force_cpu).map_err(|e| ChatError::Device(format!("{e:#}")))?;
        let dtype = parse_dtype(self.config.dtype.as_deref())
            .map_err(|e| ChatError::Config(format!("{e:#}")))?;
        tracing::info!(?device, ?dtype, "device selected");

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("loading {model}"));
        spinner.enable_steady_tick(Duration::from_millis(120));

        let loaded = load_with_fallback(
            model,
            out,
            || CausalLm::load_causal(&source, dtype, &device),
            || CausalLm::load_generic(&source, &device),
        );
        spinner.finish_and_clear();
        let lm = loaded?;

        let config_eos = source
            .get("config.json")
            .map(|p| config_eos_ids(&p))
            .unwrap_or_default();
        let generation = &self.config.generation;
        Ok(InferenceRuntime::new(
            lm,
            tokenizer,
            device,
            SamplerConfig::from(generation),
            config_eos,
            generation.max_new_tokens,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_cpu() {
        assert!(matches!(select_device(true).unwrap(), Device::Cpu));
    }

    #[test]
    fn dtype_names() {
        assert_eq!(parse_dtype(None).unwrap(), DType::F32);
        assert_eq!(parse_dtype(Some("bf16")).unwrap(), DType::BF16);
        assert!(parse_dtype(Some("q4")).is_err());
    }

    #[test]
    fn primary_success_skips_fallback() {
        let mut out = Vec::new();
        let got = load_with_fallback(
            "m",
            &mut out,
            || Ok(1),
            || -> anyhow::Result<i32> { panic!("fallback must not run") },
        )
        .unwrap();
        assert_eq!(got, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn fallback_used_after_primary_failure() {
        let mut out = Vec::new();
        let got = load_with_fallback(
            "m",
            &mut out,
            || anyhow::bail!("unknown architecture"),
            || Ok(2),
        )
        .unwrap();
        assert_eq!(got, 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Error loading model as causal LM: unknown architecture"));
        assert!(text.contains("Attempting to load as generic model..."));
    }

    #[test]
    fn both_paths_failing_is_fatal() {
        let mut out = Vec::new();
        let err = load_with_fallback::<()>(
            "org/model",
            &mut out,
            || anyhow::bail!("no config"),
            || anyhow::bail!("no gguf"),
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Error loading model as generic model: no gguf");
    }

    #[test]
    fn missing_tokenizer_is_reported_as_tokenizer_failure() {
        let dir = tempfile::tempdir().unwrap();
        let loader = HubLoader::new(ChatConfig {
            force_cpu: true,
            ..Default::default()
        });
        let id = dir.path().to_str().unwrap();
        let mut out = Vec::new();
        let err = loader
            .load(id, &Credential::new("hf_x"), &mut out)
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::TokenizerLoad { .. }));
        assert!(err.to_string().starts_with(&format!("Error loading tokenizer from '{id}'")));
    }
}
