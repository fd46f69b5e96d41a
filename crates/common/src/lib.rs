//! # hfchat-common - Shared Primitives
//!
//! Types shared by the inference runtime and the CLI:
//!
//! * **[`ChatConfig`]** / **[`GenerationConfig`]** - session and sampling settings (JSON).
//! * **[`Credential`]** - the Hub access token, read from the environment or `.env`.
//! * **[`Transcript`]** - the running conversation and reply extraction.
//! * **[`ChatError`]** - fatal vs. per-turn failures, with exit codes.

pub mod config;
pub mod credential;
pub mod error;
pub mod transcript;

pub use config::{ChatConfig, GenerationConfig};
pub use credential::{load_dotenv, read_credential, Credential, TOKEN_ENV_VAR};
pub use error::{ChatError, ErrorKind, Result};
pub use transcript::{extract_reply, Checkpoint, Transcript, MODEL_TAG, USER_TAG};
