//! Conversation transcript and reply extraction.
//!
//! The transcript is plain text of alternating `User: ...` / `Model: ...`
//! segments. It is re-encoded in full on every turn, so the model always sees
//! the whole conversation.

pub const USER_TAG: &str = "User:";
pub const MODEL_TAG: &str = "Model:";

/// Append-only conversation buffer (append-only except for [`Transcript::rollback`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

/// Transcript length before a user turn was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Checkpoint(usize);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append `User: <line>\nModel:`; the transcript is now awaiting a reply.
    pub fn push_user(&mut self, line: &str) -> Checkpoint {
        let checkpoint = Checkpoint(self.text.len());
        self.text.push_str(USER_TAG);
        self.text.push(' ');
        self.text.push_str(line);
        self.text.push('\n');
        self.text.push_str(MODEL_TAG);
        checkpoint
    }

    /// Complete the pending model segment with ` <reply>\n`.
    pub fn push_reply(&mut self, reply: &str) {
        self.text.push(' ');
        self.text.push_str(reply);
        self.text.push('\n');
    }

    /// Drop everything appended since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.text.truncate(checkpoint.0);
    }
}

/// Pull the model's reply out of a full decode.
///
/// `prompt` is the transcript that was encoded. Its length in characters is
/// skipped from the start of `decoded` (an offset, not a prefix match, so a
/// tokenizer that normalises whitespace can shift it). Whatever follows is cut
/// at the first `User:` and trimmed.
pub fn extract_reply(decoded: &str, prompt: &str) -> String {
    let skip = prompt.chars().count();
    let start = decoded
        .char_indices()
        .nth(skip)
        .map_or(decoded.len(), |(i, _)| i);
    let continuation = &decoded[start..];
    let reply = continuation
        .find(USER_TAG)
        .map_or(continuation, |end| &continuation[..end]);
    reply.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turn_leaves_dangling_marker() {
        let mut t = Transcript::new();
        let _ = t.push_user("hello");
        assert_eq!(t.as_str(), "User: hello\nModel:");

        t.push_reply("hi there");
        assert_eq!(t.as_str(), "User: hello\nModel: hi there\n");
    }

    #[test]
    fn rollback_restores_previous_turn() {
        let mut t = Transcript::new();
        let _ = t.push_user("one");
        t.push_reply("first");
        let before = t.clone();

        let cp = t.push_user("two");
        t.rollback(cp);
        assert_eq!(t, before);
    }

    #[test]
    fn reply_is_cut_at_next_user_tag() {
        let prompt = "User: hi\nModel:";
        let decoded = format!("{prompt} Hello!\nUser: and then Model: more");
        assert_eq!(extract_reply(&decoded, prompt), "Hello!");
    }

    #[test]
    fn short_decode_gives_empty_reply() {
        assert_eq!(extract_reply("User: hi", "User: hi\nModel:"), "");
    }

    #[test]
    fn offset_counts_characters_not_bytes() {
        let prompt = "User: héllo wörld\nModel:";
        let decoded = format!("{prompt} ça va");
        assert_eq!(extract_reply(&decoded, prompt), "ça va");
    }

    #[test]
    fn appended_reply_is_recovered_from_later_decode() {
        let mut t = Transcript::new();
        let _ = t.push_user("what is rust?");
        let prompt = t.as_str().to_string();

        for reply in ["A systems language.", "multi\nline reply", "ünïcode ✓"] {
            let mut next = Transcript::new();
            let _ = next.push_user("what is rust?");
            next.push_reply(reply);
            let _ = next.push_user("thanks");

            // A later decode echoes the whole transcript, including the reply.
            assert_eq!(extract_reply(next.as_str(), &prompt), reply);
        }
    }
}
