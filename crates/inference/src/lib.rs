//! # hfchat-infer - Model Runtime and Chat Loop
//!
//! * **[`ModelSource`]** - local directory or hub repository (`hf-hub`).
//! * **[`CausalLm`]** - llama, mistral, qwen2, phi, phi3, gemma and gemma2
//!   from safetensors, or a quantized GGUF llama as the generic fallback.
//! * **[`HubLoader`]** - tokenizer, device selection and model loading.
//! * **[`InferenceRuntime`]** - encode, prefill + cached decode, decode.
//! * **[`Sampler`]** - top-k, top-p, temperature, repetition penalty.
//! * **[`ChatSession`]** / **[`app::run`]** - the interactive loop and startup.

pub mod app;
pub mod chat;
pub mod loader;
pub mod model;
pub mod runtime;
pub mod sampler;
pub mod source;

pub use app::StartupOptions;
pub use chat::{is_quit_command, ChatSession, Turn};
pub use loader::{load_with_fallback, select_device, HubLoader, ModelLoader};
pub use model::CausalLm;
pub use runtime::{InferenceRuntime, TextGenerator};
pub use sampler::{Sampler, SamplerConfig};
pub use source::ModelSource;
