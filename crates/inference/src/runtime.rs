//! Inference runtime: a loaded model, its tokenizer and the device it lives on.
//!
//! Each call re-encodes the whole prompt, runs one prefill pass that fills the
//! KV cache, then decodes one token per step reusing the cache.

use std::time::Instant;

use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use crate::model::CausalLm;
use crate::sampler::{Sampler, SamplerConfig};

/// Tokens treated as end-of-sequence when present in the vocabulary.
const EOS_CANDIDATES: &[&str] = &[
    "</s>",
    "<|endoftext|>",
    "<|end_of_text|>",
    "<|eot_id|>",
    "<|im_end|>",
    "<|end|>",
];

/// Something that continues a text prompt.
pub trait TextGenerator {
    /// Generate a continuation of `prompt` and return the full decoded text,
    /// prompt included.
    fn generate(&mut self, prompt: &str) -> anyhow::Result<String>;
}

/// High-level inference runtime.
pub struct InferenceRuntime {
    model: CausalLm,
    tokenizer: Tokenizer,
    sampler: Sampler,
    device: Device,
    eos_token_ids: Vec<u32>,
    max_new_tokens: usize,
}

impl InferenceRuntime {
    pub fn new(
        model: CausalLm,
        tokenizer: Tokenizer,
        device: Device,
        sampler_config: SamplerConfig,
        config_eos: Vec<u32>,
        max_new_tokens: usize,
    ) -> Self {
        let runtime = Self {
            eos_token_ids: resolve_eos(&tokenizer, config_eos),
            model,
            tokenizer,
            sampler: Sampler::new(sampler_config),
            device,
            max_new_tokens,
        };
        tracing::info!(
            architecture = runtime.model.architecture(),
            device = ?runtime.device,
            eos = ?runtime.eos_token_ids,
            pad = ?runtime.pad_token_id(),
            "runtime ready"
        );
        runtime
    }

    /// Pad id for a single-sequence batch: the first EOS id.
    pub fn pad_token_id(&self) -> Option<u32> {
        self.eos_token_ids.first().copied()
    }

    fn is_eos(&self, token: u32) -> bool {
        self.eos_token_ids.contains(&token)
    }

    fn generate_ids(&mut self, prompt: &str) -> anyhow::Result<Vec<u32>> {
        let enc = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow::anyhow!("encode: {e}"))?;
        let mut tokens: Vec<u32> = enc.get_ids().to_vec();
        if tokens.is_empty() {
            anyhow::bail!("prompt encoded to zero tokens");
        }
        let prompt_len = tokens.len();

        self.sampler.reset();
        self.sampler.observe(&tokens);
        self.model.clear_cache()?;

        // Prefill: the whole prompt in one pass.
        let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&input, 0)?;
        let mut next_token = self.sampler.sample(&logits)?;

        // Decode: one token at a time, until EOS or the length cap.
        for _ in 0..self.max_new_tokens {
            if self.is_eos(next_token) {
                break;
            }
            tokens.push(next_token);
            if tokens.len() - prompt_len == self.max_new_tokens {
                break;
            }
            let input = Tensor::new(&[next_token], &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, tokens.len() - 1)?;
            next_token = self.sampler.sample(&logits)?;
        }

        Ok(tokens)
    }
}

impl TextGenerator for InferenceRuntime {
    fn generate(&mut self, prompt: &str) -> anyhow::Result<String> {
        let start = Instant::now();
        let tokens = self.generate_ids(prompt)?;
        let output = self
            .tokenizer
            .decode(&tokens, true)
            .map_err(|e| anyhow::anyhow!("decode: {e}"))?;
        tracing::debug!(
            total_tokens = tokens.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(output)
    }
}

/// Merge EOS ids from the model config with well-known EOS tokens the
/// tokenizer knows about. Config ids come first.
fn resolve_eos(tokenizer: &Tokenizer, config_eos: Vec<u32>) -> Vec<u32> {
    let mut ids = config_eos;
    for tok in EOS_CANDIDATES {
        if let Some(id) = tokenizer.token_to_id(tok) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarBuilder;
    use candle_transformers::models::llama;
    use std::collections::HashMap;
    use tokenizers::models::wordlevel::WordLevel;

    fn word_tokenizer(words: &[&str]) -> Tokenizer {
        let vocab: HashMap<String, u32> = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.to_string(), i as u32))
            .collect();
        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token("<unk>".to_string())
            .build()
            .unwrap();
        Tokenizer::new(model)
    }

    #[test]
    fn eos_merges_config_and_vocab() {
        let tok = word_tokenizer(&["<unk>", "hello", "</s>", "<|im_end|>"]);
        assert_eq!(resolve_eos(&tok, vec![7]), vec![7, 2, 3]);
        assert_eq!(resolve_eos(&tok, vec![2]), vec![2, 3]);
    }

    #[test]
    fn no_eos_in_vocab() {
        let tok = word_tokenizer(&["<unk>", "hello"]);
        assert!(resolve_eos(&tok, Vec::new()).is_empty());
    }

    /// One-layer llama with all-zero weights: every position yields zero
    /// logits, so greedy decoding always picks the last vocab id.
    fn zero_llama(vocab_size: usize) -> CausalLm {
        let cfg: llama::LlamaConfig = serde_json::from_value(serde_json::json!({
            "hidden_size": 8,
            "intermediate_size": 16,
            "vocab_size": vocab_size,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "num_key_value_heads": 2,
            "rms_norm_eps": 1e-5,
            "max_position_embeddings": 64
        }))
        .unwrap();
        let config = cfg.into_config(false);
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = llama::Llama::load(vb, &config).unwrap();
        let cache = llama::Cache::new(true, DType::F32, &config, &Device::Cpu).unwrap();
        CausalLm::Llama {
            model,
            cache,
            config,
            dtype: DType::F32,
            device: Device::Cpu,
        }
    }

    const VOCAB: &[&str] = &["<unk>", "hi", "a", "b", "c"];

    fn greedy_runtime(config_eos: Vec<u32>, max_new_tokens: usize) -> InferenceRuntime {
        let sampler = SamplerConfig {
            do_sample: false,
            ..Default::default()
        };
        InferenceRuntime::new(
            zero_llama(VOCAB.len()),
            word_tokenizer(VOCAB),
            Device::Cpu,
            sampler,
            config_eos,
            max_new_tokens,
        )
    }

    #[test]
    fn runs_to_length_cap_without_eos() {
        let mut rt = greedy_runtime(Vec::new(), 3);
        assert_eq!(rt.pad_token_id(), None);
        assert_eq!(rt.generate_ids("hi").unwrap(), vec![1, 4, 4, 4]);
    }

    #[test]
    fn eos_as_first_prediction_adds_nothing() {
        let mut rt = greedy_runtime(vec![4], 3);
        assert_eq!(rt.pad_token_id(), Some(4));
        assert_eq!(rt.generate_ids("hi").unwrap(), vec![1]);
    }

    #[test]
    fn cache_is_reset_between_calls() {
        let mut rt = greedy_runtime(Vec::new(), 5);
        let first = rt.generate_ids("hi").unwrap();
        let second = rt.generate_ids("hi").unwrap();
        assert_eq!(first.len(), 6);
        assert_eq!(first, second);

        let text = rt.generate("hi").unwrap();
        assert!(text.starts_with("hi"), "{text}");
    }
}
