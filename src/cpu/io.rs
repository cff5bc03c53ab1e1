//! Input and output capabilities handed to the engine.
//!
//! READ is the only instruction that waits on the outside world. It asks
//! its [`InputSource`] for one line and awaits the answer, so a host can
//! keep its own event loop turning while the program is blocked. Output
//! is fire-and-forget through an [`OutputSink`].

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, oneshot};

/// A boxed, pinned, send-safe future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can answer a request for one line of text.
pub trait InputSource: Send {
    /// Request one line. At most one request is outstanding at a time.
    fn read_line(&mut self) -> BoxFuture<'_, Result<String, InputError>>;
}

/// Something that accepts one line of text per call.
pub trait OutputSink: Send {
    fn write_line(&mut self, line: &str);
}

impl<T: InputSource + ?Sized> InputSource for Box<T> {
    fn read_line(&mut self) -> BoxFuture<'_, Result<String, InputError>> {
        (**self).read_line()
    }
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn write_line(&mut self, line: &str) {
        (**self).write_line(line)
    }
}

// ============================================================================
// Input sources
// ============================================================================

/// Pre-supplied input lines, consumed front to back.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Lines not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self) -> BoxFuture<'_, Result<String, InputError>> {
        let next = self.lines.pop_front();
        Box::pin(async move { next.ok_or(InputError::Exhausted) })
    }
}

/// Line input from the process's standard input.
pub struct StdinInput {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for StdinInput {
    fn read_line(&mut self) -> BoxFuture<'_, Result<String, InputError>> {
        Box::pin(async move {
            match self.lines.next_line().await {
                Ok(Some(line)) => Ok(line),
                Ok(None) => Err(InputError::Closed),
                Err(e) => Err(InputError::Io(e.to_string())),
            }
        })
    }
}

/// One outstanding request for input, handed to the host.
///
/// Fulfilling consumes the request, so it can be answered at most once.
#[derive(Debug)]
pub struct InputRequest {
    reply: oneshot::Sender<String>,
}

impl InputRequest {
    /// Answer the request. Fails if the engine has gone away meanwhile.
    pub fn fulfill(self, line: impl Into<String>) -> Result<(), InputError> {
        self.reply.send(line.into()).map_err(|_| InputError::Cancelled)
    }

    /// Whether the engine has stopped waiting for this answer.
    pub fn is_cancelled(&self) -> bool {
        self.reply.is_closed()
    }

    /// Resolve once the engine stops waiting for this answer.
    pub async fn cancelled(&mut self) {
        self.reply.closed().await
    }
}

/// Input source that forwards each request to a host over a channel.
#[derive(Debug, Clone)]
pub struct ChannelInput {
    requests: mpsc::UnboundedSender<InputRequest>,
}

/// Create a connected engine-side source and host-side request stream.
pub fn channel_input() -> (ChannelInput, mpsc::UnboundedReceiver<InputRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelInput { requests: tx }, rx)
}

impl InputSource for ChannelInput {
    fn read_line(&mut self) -> BoxFuture<'_, Result<String, InputError>> {
        let (reply, answer) = oneshot::channel();
        let sent = self.requests.send(InputRequest { reply });

        Box::pin(async move {
            sent.map_err(|_| InputError::Closed)?;
            answer.await.map_err(|_| InputError::Abandoned)
        })
    }
}

/// Host-side holder for the (single) pending input request.
#[derive(Debug, Default)]
pub struct InputSlot {
    pending: Option<InputRequest>,
}

impl InputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request until the user answers it.
    pub fn offer(&mut self, request: InputRequest) -> Result<(), InputError> {
        if self.is_pending() {
            return Err(InputError::AlreadyPending);
        }
        self.pending = Some(request);
        Ok(())
    }

    /// Whether a live request is waiting. Requests the engine gave up on
    /// are discarded first.
    pub fn is_pending(&mut self) -> bool {
        if self.pending.as_ref().is_some_and(InputRequest::is_cancelled) {
            self.pending = None;
        }
        self.pending.is_some()
    }

    /// Answer the pending request, if any.
    pub fn provide(&mut self, line: impl Into<String>) -> Result<(), InputError> {
        let request = self.pending.take().ok_or(InputError::NoPendingRequest)?;
        request.fulfill(line)
    }

    /// Drop the pending request; the waiting READ fails with `Abandoned`.
    pub fn abandon(&mut self) {
        self.pending = None;
    }
}

// ============================================================================
// Output sinks
// ============================================================================

/// Prints every line to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }
}

impl OutputSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Forwards every line to a host over a channel.
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    lines: mpsc::UnboundedSender<String>,
}

pub fn channel_output() -> (ChannelOutput, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelOutput { lines: tx }, rx)
}

impl OutputSink for ChannelOutput {
    fn write_line(&mut self, line: &str) {
        // A closed receiver means the host is gone; nobody is left to read.
        let _ = self.lines.send(line.to_string());
    }
}

/// Errors raised while obtaining input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("no more input lines available")]
    Exhausted,

    #[error("input stream closed")]
    Closed,

    #[error("input request dropped without an answer")]
    Abandoned,

    #[error("the machine is no longer waiting for input")]
    Cancelled,

    #[error("no input request is pending")]
    NoPendingRequest,

    #[error("an input request is already pending")]
    AlreadyPending,

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_input_in_order() {
        let mut input = ScriptedInput::new(["5", "-3"]);

        assert_eq!(input.read_line().await.unwrap(), "5");
        assert_eq!(input.read_line().await.unwrap(), "-3");
        assert_eq!(input.read_line().await, Err(InputError::Exhausted));
    }

    #[tokio::test]
    async fn test_channel_handshake() {
        let (mut input, mut requests) = channel_input();

        let reader = tokio::spawn(async move { input.read_line().await });

        let request = requests.recv().await.unwrap();
        request.fulfill("42").unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), "42");
    }

    #[tokio::test]
    async fn test_dropped_request_is_abandoned() {
        let (mut input, mut requests) = channel_input();

        let reader = tokio::spawn(async move { input.read_line().await });
        drop(requests.recv().await.unwrap());

        assert_eq!(reader.await.unwrap(), Err(InputError::Abandoned));
    }

    #[tokio::test]
    async fn test_slot_answers_once() {
        let (mut input, mut requests) = channel_input();
        let mut slot = InputSlot::new();

        let reader = tokio::spawn(async move { input.read_line().await });
        slot.offer(requests.recv().await.unwrap()).unwrap();
        assert!(slot.is_pending());

        slot.provide("7").unwrap();
        assert_eq!(slot.provide("8"), Err(InputError::NoPendingRequest));
        assert_eq!(reader.await.unwrap().unwrap(), "7");
    }

    #[tokio::test]
    async fn test_fulfill_after_engine_gone() {
        let (mut input, mut requests) = channel_input();

        let pending = input.read_line();
        drop(pending);
        drop(input);

        let request = requests.recv().await.unwrap();
        assert_eq!(request.fulfill("1"), Err(InputError::Cancelled));
    }

    #[tokio::test]
    async fn test_slot_discards_cancelled_request() {
        let (mut input, mut requests) = channel_input();
        let mut slot = InputSlot::new();

        drop(input.read_line());
        slot.offer(requests.recv().await.unwrap()).unwrap();

        assert!(!slot.is_pending());
        assert_eq!(slot.provide("1"), Err(InputError::NoPendingRequest));
    }

    #[test]
    fn test_channel_output() {
        let (mut sink, mut lines) = channel_output();
        sink.write_line("Output: 1");
        sink.write_line("Program finished");

        assert_eq!(lines.try_recv().unwrap(), "Output: 1");
        assert_eq!(lines.try_recv().unwrap(), "Program finished");
    }
}
