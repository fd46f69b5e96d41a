//! The interactive chat loop.
//!
//! ```text
//! AwaitingInput --quit/EOF--> Terminated
//!       |  ^
//!  line |  | reply printed, or error printed
//!       v  |
//!    Generating
//! ```

use std::io::{BufRead, Write};

use hfchat_common::{extract_reply, ChatError, Result, Transcript};

use crate::runtime::TextGenerator;

const FAREWELL: &str = "Exiting chat.";

/// Outcome of feeding one input line to the session.
#[derive(Debug)]
pub enum Turn {
    Quit,
    Reply(String),
    /// Always [`ChatError::Generation`]; the session can keep going.
    Failed(ChatError),
}

/// `exit` or `quit`, any letter case. The line is not trimmed.
pub fn is_quit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

pub struct ChatSession<G> {
    generator: G,
    transcript: Transcript,
    rollback_failed_turns: bool,
}

impl<G: TextGenerator> ChatSession<G> {
    pub fn new(generator: G, rollback_failed_turns: bool) -> Self {
        Self {
            generator,
            transcript: Transcript::new(),
            rollback_failed_turns,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Handle one operator line.
    pub fn turn(&mut self, line: &str) -> Turn {
        if is_quit_command(line) {
            return Turn::Quit;
        }

        let checkpoint = self.transcript.push_user(line);
        match self.generator.generate(self.transcript.as_str()) {
            Ok(decoded) => {
                let reply = extract_reply(&decoded, self.transcript.as_str());
                self.transcript.push_reply(&reply);
                Turn::Reply(reply)
            }
            Err(e) => {
                if self.rollback_failed_turns {
                    self.transcript.rollback(checkpoint);
                }
                Turn::Failed(ChatError::generation(&e))
            }
        }
    }

    /// Prompt, read and answer until a quit command or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> Result<()> {
        writeln!(out, "\nYou can start chatting with the model. Type 'exit' to quit.\n")?;
        loop {
            write!(out, "User: ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                writeln!(out, "{FAREWELL}")?;
                return Ok(());
            }
            let line = line.strip_suffix('\n').unwrap_or(&line);
            let line = line.strip_suffix('\r').unwrap_or(line);

            match self.turn(line) {
                Turn::Quit => {
                    writeln!(out, "{FAREWELL}")?;
                    return Ok(());
                }
                Turn::Reply(reply) => writeln!(out, "Model: {reply}\n")?,
                Turn::Failed(e) => {
                    tracing::warn!("turn failed: {e}");
                    writeln!(out, "{e}")?;
                }
            }
        }
    }
}
