//! Startup sequence: credential, model selection, load, chat.

use std::io::{BufRead, Write};

use hfchat_common::{read_credential, ChatError, Result};

use crate::chat::ChatSession;
use crate::loader::ModelLoader;

/// What the startup sequence needs beyond the loader.
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Environment variable holding the hub token.
    pub token_var: String,
    /// Identifier given on the command line; skips the prompt.
    pub model: Option<String>,
    pub rollback_failed_turns: bool,
}

/// Ask the operator for a model identifier. One attempt; empty is fatal.
pub fn select_model<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<String> {
    writeln!(out, "Enter the Hugging Face model name or local path.")?;
    writeln!(
        out,
        "Examples: 'TinyLlama/TinyLlama-1.1B-Chat-v1.0', 'Qwen/Qwen2.5-0.5B-Instruct', \
         './models/local_model'"
    )?;
    write!(out, "Model name or path: ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    checked_model(&line)
}

fn checked_model(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ChatError::NoModelSelected);
    }
    Ok(name.to_string())
}

/// Run the whole program against the given console streams.
///
/// `lookup` reads configuration values (normally the process environment).
/// Fatal errors are returned; per-turn failures are handled inside the loop.
pub fn run<L, F, R, W>(
    loader: &L,
    lookup: F,
    options: &StartupOptions,
    mut input: R,
    out: &mut W,
) -> Result<()>
where
    L: ModelLoader,
    F: Fn(&str) -> Option<String>,
    R: BufRead,
    W: Write,
{
    let credential = read_credential(&options.token_var, lookup)?;

    let model = match &options.model {
        Some(name) => checked_model(name)?,
        None => select_model(&mut input, out)?,
    };
    tracing::info!(model = %model, "loading");

    let generator = loader.load(&model, &credential, out)?;

    let mut session = ChatSession::new(generator, options.rollback_failed_turns);
    session.run(input, out)
}
