//! Decoding strategies: greedy, top-k, top-p, temperature, repetition penalty.

use candle_core::{DType, Result, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hfchat_common::GenerationConfig;

/// Sampling configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub do_sample: bool,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub repetition_window: usize,
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        (&GenerationConfig::default()).into()
    }
}

impl From<&GenerationConfig> for SamplerConfig {
    fn from(g: &GenerationConfig) -> Self {
        Self {
            do_sample: g.do_sample,
            temperature: g.temperature,
            top_k: g.top_k,
            top_p: g.top_p,
            repetition_penalty: g.repetition_penalty,
            repetition_window: g.repetition_window,
            seed: g.seed,
        }
    }
}

pub struct Sampler {
    config: SamplerConfig,
    rng: StdRng,
    recent_tokens: Vec<u32>,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            recent_tokens: Vec::new(),
        }
    }

    /// Sample one token from logits (1-D tensor of vocab_size, any float dtype).
    pub fn sample(&mut self, logits: &Tensor) -> Result<u32> {
        let logits: Vec<f32> = logits.to_dtype(DType::F32)?.to_vec1()?;
        Ok(self.sample_slice(logits))
    }

    /// Seed the repetition window with tokens already in the context.
    pub fn observe(&mut self, tokens: &[u32]) {
        self.recent_tokens.extend_from_slice(tokens);
    }

    pub fn reset(&mut self) {
        self.recent_tokens.clear();
    }

    fn sample_slice(&mut self, mut logits: Vec<f32>) -> u32 {
        if logits.is_empty() {
            return 0;
        }

        if self.config.repetition_penalty != 1.0 {
            let penalty = self.config.repetition_penalty as f32;
            let window_start = self
                .recent_tokens
                .len()
                .saturating_sub(self.config.repetition_window);
            for &tok in &self.recent_tokens[window_start..] {
                if let Some(v) = logits.get_mut(tok as usize) {
                    if *v > 0.0 {
                        *v /= penalty;
                    } else {
                        *v *= penalty;
                    }
                }
            }
        }

        if !self.config.do_sample || self.config.temperature < 1e-6 {
            let token = argmax(&logits);
            self.recent_tokens.push(token);
            return token;
        }

        let temp = self.config.temperature as f32;
        for v in &mut logits {
            *v /= temp;
        }

        // Top-k: everything below the k-th largest logit is masked out.
        let k = self.config.top_k;
        if k > 0 && k < logits.len() {
            let mut sorted = logits.clone();
            sorted.sort_unstable_by(|a, b| b.total_cmp(a));
            let threshold = sorted[k - 1];
            for v in &mut logits {
                if *v < threshold {
                    *v = f32::NEG_INFINITY;
                }
            }
        }

        let mut probs = softmax(&logits);

        // Top-p: keep the smallest high-probability prefix whose mass reaches p.
        if self.config.top_p < 1.0 {
            let mut order: Vec<usize> = (0..probs.len()).collect();
            order.sort_unstable_by(|&a, &b| probs[b].total_cmp(&probs[a]));
            let mut cumsum = 0.0f32;
            let mut cutoff = order.len();
            for (rank, &idx) in order.iter().enumerate() {
                cumsum += probs[idx];
                if cumsum >= self.config.top_p as f32 {
                    cutoff = rank + 1;
                    break;
                }
            }
            for &idx in &order[cutoff..] {
                probs[idx] = 0.0;
            }
        }

        let token = self.weighted_sample(&probs);
        self.recent_tokens.push(token);
        token
    }

    fn weighted_sample(&mut self, probs: &[f32]) -> u32 {
        let total: f32 = probs.iter().sum();
        if !(total > 0.0) {
            return argmax(probs);
        }
        let r = self.rng.gen::<f32>() * total;
        let mut cumsum = 0.0;
        for (i, &p) in probs.iter().enumerate() {
            cumsum += p;
            if p > 0.0 && cumsum >= r {
                return i as u32;
            }
        }
        // Rounding left `r` past the last bucket: take the last live token.
        probs.iter().rposition(|&p| p > 0.0).unwrap_or(0) as u32
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_val = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits.iter().map(|&v| (v - max_val).exp()).collect();
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        for p in &mut probs {
            *p /= sum;
        }
    }
    probs
}

fn argmax(v: &[f32]) -> u32 {
    v.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}
