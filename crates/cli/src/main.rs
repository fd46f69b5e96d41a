use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use hfchat_common::{load_dotenv, ChatConfig, ChatError};
use hfchat_infer::{app, HubLoader, StartupOptions};

#[derive(Parser, Debug)]
#[command(name = "hfchat", about = "Chat with a pretrained causal language model")]
struct Args {
    /// Hub repository id or local directory; prompted for when omitted.
    #[arg(long)]
    model: Option<String>,
    /// JSON chat config (missing fields use defaults).
    #[arg(long)]
    config: Option<PathBuf>,
    /// `.env` file to seed the environment from.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Hub revision (branch, tag or commit).
    #[arg(long)]
    revision: Option<String>,
    /// Run on the CPU even when an accelerator is available.
    #[arg(long)]
    cpu: bool,
    #[arg(long, value_parser = ["f32", "f16", "bf16"])]
    dtype: Option<String>,
    /// Seed for reproducible sampling.
    #[arg(long)]
    seed: Option<u64>,
    /// Leave a failed turn's `User: ... Model:` in the transcript.
    #[arg(long)]
    keep_failed_turns: bool,
}

impl Args {
    fn chat_config(&self) -> Result<ChatConfig, ChatError> {
        let mut config = match &self.config {
            Some(path) => ChatConfig::load(path)
                .map_err(|e| ChatError::Config(format!("{}: {e:#}", path.display())))?,
            None => ChatConfig::default(),
        };
        if let Some(revision) = &self.revision {
            config.revision = revision.clone();
        }
        if self.cpu {
            config.force_cpu = true;
        }
        if self.dtype.is_some() {
            config.dtype = self.dtype.clone();
        }
        if self.seed.is_some() {
            config.generation.seed = self.seed;
        }
        if self.keep_failed_turns {
            config.rollback_failed_turns = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(kind = ?e.kind(), "session aborted");
            println!("{e}");
            e.exit_code()
        }
    }
}

fn run(args: Args) -> Result<(), ChatError> {
    load_dotenv(args.env_file.as_deref());
    let config = args.chat_config()?;

    let options = StartupOptions {
        token_var: config.token_env_var.clone(),
        model: args.model,
        rollback_failed_turns: config.rollback_failed_turns,
    };
    let loader = HubLoader::new(config);

    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    app::run(
        &loader,
        |var| std::env::var(var).ok(),
        &options,
        stdin,
        &mut stdout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let args = Args::parse_from([
            "hfchat",
            "--cpu",
            "--seed",
            "9",
            "--revision",
            "refs/pr/1",
            "--keep-failed-turns",
        ]);
        let config = args.chat_config().unwrap();
        assert!(config.force_cpu);
        assert_eq!(config.generation.seed, Some(9));
        assert_eq!(config.revision, "refs/pr/1");
        assert!(!config.rollback_failed_turns);
    }

    #[test]
    fn unreadable_config_is_fatal() {
        let args = Args::parse_from(["hfchat", "--config", "/nonexistent/chat.json"]);
        let err = args.chat_config().unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn dtype_is_restricted() {
        assert!(Args::try_parse_from(["hfchat", "--dtype", "int4"]).is_err());
    }
}
