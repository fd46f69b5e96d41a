//! Error taxonomy for a chat session.
//!
//! Every failure is either fatal to the process (a startup precondition that
//! did not hold) or confined to a single conversation turn.

use std::process::ExitCode;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

/// How the session reacts to a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Print the cause and terminate with a non-zero status.
    FatalPrecondition,
    /// Print the cause and keep accepting input.
    RecoverableTurnFailure,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(
        "Hugging Face API token not found in environment variables.\n\
         Please set '{var}' in your .env file."
    )]
    MissingCredential { var: String },

    #[error("No model name or path provided. Exiting.")]
    NoModelSelected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Error loading tokenizer from '{model}': {cause}")]
    TokenizerLoad { model: String, cause: String },

    /// Both the causal-LM path and the generic fallback failed; `cause` is the
    /// fallback's error (the primary one has already been reported).
    #[error("Error loading model as generic model: {cause}")]
    ModelLoad { model: String, cause: String },

    #[error("Error selecting compute device: {0}")]
    Device(String),

    #[error("Error during generation: {0}")]
    Generation(String),

    #[error("Console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Generation(_) => ErrorKind::RecoverableTurnFailure,
            _ => ErrorKind::FatalPrecondition,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::FatalPrecondition
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::FatalPrecondition => ExitCode::from(1),
            ErrorKind::RecoverableTurnFailure => ExitCode::SUCCESS,
        }
    }

    /// Wrap a generation failure, keeping the full `anyhow` context chain.
    pub fn generation(err: &anyhow::Error) -> Self {
        Self::Generation(format!("{err:#}"))
    }
}
