//! Mock reply generation and fragmenting.

use std::time::Duration;

/// Fragment length, in characters, used when streaming a reply.
pub const DEFAULT_FRAGMENT_CHARS: usize = 12;

/// Pause before each fragment is emitted.
pub const DEFAULT_FRAGMENT_DELAY: Duration = Duration::from_millis(40);

/// Produces the assistant reply for a user message.
///
/// Implementations must be deterministic for a given input.
pub trait ReplySource: Send + Sync {
    /// Build the full reply text for `user_text`.
    fn reply(&self, user_text: &str) -> String;
}

/// Canned acknowledgement that quotes the user's text back.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockReply;

impl ReplySource for MockReply {
    fn reply(&self, user_text: &str) -> String {
        format!(
            "Sain su sõnumi: \"{user_text}\". \
             See on mock-streaming. \
             Järgmises etapis ühendame päris LLM-i ja saadame tokenid reaalajas."
        )
    }
}

/// Split `text` into consecutive fragments of at most `size` characters.
///
/// Counts Unicode scalar values, so multi-byte characters are never split.
/// A `size` of zero is treated as one. The fragments concatenate back to
/// `text` exactly; empty input yields no fragments.
pub fn fragment(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut fragments = Vec::with_capacity(text.len() / size + 1);
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            fragments.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}
