//! Terminal front end: renders [`ViewChange`]s as text and drives an
//! interactive chat over a [`channel`](crate::channel).

use std::io::Write;

use murmur_core::protocol::Role;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::channel::{self, ChannelEvent, ChannelHandle};
use crate::composer::{Composer, ComposerAction};
use crate::errors::ClientError;
use crate::transcript::{ChatState, Delivery, ViewChange};

/// First assistant message shown before anything is sent.
pub const GREETING: &str = "Tere! Kirjuta midagi — vastan streaminguga.";

/// Default server address.
pub const DEFAULT_URL: &str = "ws://localhost:8080";

/// Writes chat state changes to a terminal.
pub struct Console<W: Write> {
    out: W,
}

impl<W: Write> Console<W> {
    /// Render to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Print the whole transcript.
    pub fn transcript(&mut self, state: &ChatState) -> std::io::Result<()> {
        for message in state.messages() {
            writeln!(self.out, "{}: {}", prefix(message.role), message.content)?;
        }
        self.out.flush()
    }

    /// Print one change.
    pub fn render(&mut self, state: &ChatState, change: &ViewChange) -> std::io::Result<()> {
        match change {
            ViewChange::None | ViewChange::Typing(false) => return Ok(()),
            ViewChange::Status(status) => writeln!(self.out, "[status: {status}]")?,
            ViewChange::Typing(true) => writeln!(self.out, "[assistant is typing...]")?,
            ViewChange::MessageAdded(index) => {
                // User input is already on screen; assistant text streams in.
                match state.messages().get(*index) {
                    Some(message) if message.role == Role::Assistant => {
                        write!(self.out, "{}: {}", prefix(message.role), message.content)?;
                    }
                    _ => return Ok(()),
                }
            }
            ViewChange::Appended { delta, .. } => write!(self.out, "{delta}")?,
            ViewChange::StreamEnded(Some(_)) => writeln!(self.out)?,
            ViewChange::StreamEnded(None) => return Ok(()),
            ViewChange::Delivery { delivery, .. } => match delivery {
                Delivery::Failed => writeln!(self.out, "[not sent: connection is not open]")?,
                Delivery::Pending | Delivery::Sent => return Ok(()),
            },
            ViewChange::Hello(message) => writeln!(self.out, "[{message}]")?,
            ViewChange::ServerError(message) => {
                // Break out of a partially streamed line first.
                if state.streaming_index().is_some() {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "[error: {message}]")?;
            }
        }
        self.out.flush()
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn prefix(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
    }
}

/// Run an interactive chat against `url`.
///
/// Lines from `input` go through a [`Composer`]; a line ending in `\`
/// continues the message on the next line. At end of input the session
/// waits for any reply still owed, then closes the channel.
///
/// If the server closes the channel first, input is still read until it
/// ends: new messages stay in the transcript, marked as not delivered.
pub async fn run_chat<R, W>(url: &str, input: R, output: W) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut state = ChatState::new().with_greeting(GREETING);
    let mut console = Console::new(output);
    console.transcript(&state)?;
    console.render(&state, &ViewChange::Status(state.status()))?;

    let (handle, mut events) = match channel::connect(url).await {
        Ok(pair) => pair,
        Err(e) => {
            let change = state.on_transport_error();
            console.render(&state, &change)?;
            return Err(e);
        }
    };
    // `Opened` is queued before `connect` returns; take it before reading input.
    if let Some(ChannelEvent::Opened) = events.recv().await {
        let change = state.on_open();
        console.render(&state, &change)?;
    }

    let mut lines = input.lines();
    let mut composer = Composer::new();
    let mut input_open = true;
    let mut channel_open = true;
    let mut owed_replies = 0usize;

    while input_open || channel_open {
        tokio::select! {
            event = events.recv(), if channel_open => {
                let change = match event {
                    Some(ChannelEvent::Opened) => state.on_open(),
                    Some(ChannelEvent::Frame(frame)) => state.apply_frame(&frame),
                    Some(ChannelEvent::Failed(reason)) => {
                        debug!(%reason, "channel failed");
                        state.on_transport_error()
                    }
                    Some(ChannelEvent::Closed) | None => {
                        channel_open = false;
                        owed_replies = 0;
                        state.on_close()
                    }
                };
                if change == ViewChange::Typing(false) {
                    owed_replies = owed_replies.saturating_sub(1);
                }
                console.render(&state, &change)?;
            }
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) => {
                        if let ComposerAction::Submit(text) = composer.feed_line(&line) {
                            for change in submit(&mut state, &handle, &text) {
                                if is_sent(&change) {
                                    owed_replies += 1;
                                }
                                console.render(&state, &change)?;
                            }
                        }
                    }
                    None => input_open = false,
                }
            }
        }

        if !input_open && owed_replies == 0 && handle.is_open() {
            handle.close();
        }
    }

    Ok(())
}

fn is_sent(change: &ViewChange) -> bool {
    matches!(
        change,
        ViewChange::Delivery {
            delivery: Delivery::Sent,
            ..
        }
    )
}

/// Record the submission and hand it to the channel.
fn submit(state: &mut ChatState, handle: &ChannelHandle, text: &str) -> Vec<ViewChange> {
    let Some(submission) = state.submit(text) else {
        return Vec::new();
    };
    let mut changes = vec![ViewChange::MessageAdded(submission.index)];

    let delivery = match submission.event {
        Some(event) => match handle.send(&event) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                debug!(error = %e, "send failed");
                Delivery::Failed
            }
        },
        None => Delivery::Failed,
    };
    changes.push(state.mark_delivery(submission.index, delivery));
    changes
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use murmur_core::protocol::ServerEvent;
    use murmur_core::reply::{MockReply, ReplySource};
    use murmur_server::{MurmurServer, ServerConfig};

    use super::*;

    fn rendered(state: &ChatState, changes: &[ViewChange]) -> String {
        let mut console = Console::new(Vec::new());
        for change in changes {
            console.render(state, change).unwrap();
        }
        String::from_utf8(console.into_inner()).unwrap()
    }

    #[test]
    fn transcript_prefixes_roles() {
        let state = ChatState::new().with_greeting(GREETING);
        let mut console = Console::new(Vec::new());
        console.transcript(&state).unwrap();
        let text = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(text, format!("assistant: {GREETING}\n"));
    }

    #[test]
    fn streamed_reply_renders_inline() {
        let mut state = ChatState::new();
        let mut changes = vec![state.on_open()];
        changes.push(state.apply(ServerEvent::Typing { value: true }));
        changes.push(state.apply(ServerEvent::Start {
            role: Role::Assistant,
        }));
        changes.push(state.apply(ServerEvent::Delta { delta: "ab".into() }));
        changes.push(state.apply(ServerEvent::Delta { delta: "cd".into() }));
        changes.push(state.apply(ServerEvent::End));
        changes.push(state.apply(ServerEvent::Typing { value: false }));

        assert_eq!(
            rendered(&state, &changes),
            "[status: connected]\n[assistant is typing...]\nassistant: abcd\n"
        );
    }

    #[test]
    fn errors_and_hello_are_notices() {
        let mut state = ChatState::new();
        let changes = [
            state.apply(ServerEvent::hello()),
            state.apply(ServerEvent::error("Invalid JSON")),
        ];
        assert_eq!(
            rendered(&state, &changes),
            "[WebSocket connection established]\n[error: Invalid JSON]\n"
        );
    }

    #[test]
    fn mid_stream_error_starts_a_new_line() {
        let mut state = ChatState::new();
        let changes = [
            state.apply(ServerEvent::Start {
                role: Role::Assistant,
            }),
            state.apply(ServerEvent::Delta { delta: "ab".into() }),
            state.apply(ServerEvent::error("Streaming failed")),
            state.apply(ServerEvent::Typing { value: false }),
        ];
        assert_eq!(
            rendered(&state, &changes),
            "assistant: ab\n[error: Streaming failed]\n"
        );
        assert_eq!(state.last_error(), Some("Streaming failed"));
        assert_eq!(state.messages()[0].content, "ab");
    }

    #[test]
    fn failed_delivery_is_reported() {
        let mut state = ChatState::new();
        let _ = state.on_close();
        let sub = state.submit("hi").unwrap();
        let change = state.mark_delivery(sub.index, Delivery::Failed);
        let text = rendered(&state, &[ViewChange::MessageAdded(sub.index), change]);
        assert_eq!(text, "[not sent: connection is not open]\n");
    }

    #[tokio::test]
    async fn run_chat_streams_reply_then_exits() {
        let server = MurmurServer::new(ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            fragment_delay_ms: 1,
            ..ServerConfig::default()
        });
        let (addr, _handle) = server.listen().await.unwrap();

        let input: &[u8] = b"  \nhi\n";
        let mut output = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            run_chat(&format!("ws://{addr}"), input, &mut output),
        )
        .await
        .expect("chat did not finish")
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with(&format!("assistant: {GREETING}\n")));
        assert!(text.contains("[status: connected]"));
        assert!(text.contains(&format!("assistant: {}\n", MockReply.reply("hi"))));
        assert!(text.trim_end().ends_with("[status: disconnected]"));
    }

    #[tokio::test]
    async fn input_after_server_shutdown_is_kept_as_undelivered() {
        use tokio::io::AsyncWriteExt;

        let server = MurmurServer::new(ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            fragment_delay_ms: 1,
            ..ServerConfig::default()
        });
        let (addr, _handle) = server.listen().await.unwrap();
        let url = format!("ws://{addr}");

        let (mut writer, reader) = tokio::io::duplex(256);
        let mut output = Vec::new();
        let chat = run_chat(&url, tokio::io::BufReader::new(reader), &mut output);
        let drive = async {
            writer.write_all(b"hi\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            server.begin_shutdown();
            tokio::time::sleep(Duration::from_millis(300)).await;
            writer.write_all(b"late\n").await.unwrap();
            drop(writer);
        };

        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(chat, drive)
        })
        .await
        .expect("chat did not finish");
        result.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains(&format!("assistant: {}\n", MockReply.reply("hi"))));
        let closed = text.find("[status: disconnected]").expect("no disconnect");
        let undelivered = text
            .find("[not sent: connection is not open]")
            .expect("no delivery failure");
        assert!(closed < undelivered);
    }

    #[tokio::test]
    async fn run_chat_reports_connect_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let input: &[u8] = b"";
        let mut output = Vec::new();
        let err = run_chat(&format!("ws://{addr}"), input, &mut output)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[status: error]"));
    }
}
