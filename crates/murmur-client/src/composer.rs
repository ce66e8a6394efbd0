//! Message composer: an input buffer with Enter / modified-Enter handling.
//!
//! Plain Enter submits the buffer. Modified Enter (Shift+Enter in a GUI, a
//! trailing `\` on a terminal line) inserts a literal newline instead.

/// A single key event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyInput {
    /// A printable character.
    Char(char),
    /// Delete the last character.
    Backspace,
    /// Enter, possibly with a modifier held.
    Enter {
        /// Whether a modifier (e.g. Shift) was held.
        modified: bool,
    },
}

/// What the composer did with a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComposerAction {
    /// Buffer unchanged.
    None,
    /// Buffer edited.
    Edited,
    /// Buffer taken for submission; the composer is now empty.
    Submit(String),
}

/// Input buffer for the next user message.
#[derive(Clone, Debug, Default)]
pub struct Composer {
    buffer: String,
}

impl Composer {
    /// Empty composer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current buffer contents.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Apply one key.
    pub fn press(&mut self, key: KeyInput) -> ComposerAction {
        match key {
            KeyInput::Char(c) => {
                self.buffer.push(c);
                ComposerAction::Edited
            }
            KeyInput::Backspace => match self.buffer.pop() {
                Some(_) => ComposerAction::Edited,
                None => ComposerAction::None,
            },
            KeyInput::Enter { modified: true } => {
                self.buffer.push('\n');
                ComposerAction::Edited
            }
            KeyInput::Enter { modified: false } => {
                ComposerAction::Submit(std::mem::take(&mut self.buffer))
            }
        }
    }

    /// Apply one line read from a terminal.
    ///
    /// A line ending in `\` continues the message: the backslash becomes a
    /// newline. Any other line submits.
    pub fn feed_line(&mut self, line: &str) -> ComposerAction {
        let line = line.trim_end_matches(['\r', '\n']);
        let (body, modified) = match line.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (line, false),
        };
        for c in body.chars() {
            let _ = self.press(KeyInput::Char(c));
        }
        self.press(KeyInput::Enter { modified })
    }
}
