use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use super::consts::ERROR_RESPONSE_TEXT;
use super::conversation::Conversation;
use super::message::{
    Message,
    MessageId,
};
use super::parser::{
    ResponseParser,
    StreamEvent,
    WireFormat,
};
use crate::api_client::ApiClientError;
use crate::api_client::send_message_output::SendMessageOutput;

/// Where an in-flight bot message currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPhase {
    /// Stream opened, nothing received yet.
    #[default]
    Idle,
    ToolUse,
    Thinking,
    Streaming,
    /// The stream ended; the message is frozen.
    Final,
}

impl TurnPhase {
    /// Derives the phase of a message that is still being streamed.
    pub fn of(message: &Message) -> Self {
        if message.tool_use {
            TurnPhase::ToolUse
        } else if message.is_thinking {
            TurnPhase::Thinking
        } else if message.tool_done || !message.content.is_empty() {
            TurnPhase::Streaming
        } else {
            TurnPhase::Idle
        }
    }
}

/// Applies one stream event to the bot message being streamed.
///
/// Control events never contribute text. The first token after a finished tool invocation marks
/// the tools as done.
pub fn apply_event(message: &mut Message, event: &StreamEvent) {
    match event {
        StreamEvent::ToolStart => {
            message.tool_use = true;
            message.tool_done = false;
            message.is_thinking = false;
        },
        StreamEvent::ToolEnd => {
            message.tool_use = false;
            message.tool_done = false;
            message.is_thinking = true;
        },
        StreamEvent::Token(text) => {
            message.content.push_str(text);
            if message.is_thinking {
                message.is_thinking = false;
                message.tool_done = true;
            }
        },
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply streamed to its end.
    Completed,
    /// The request or the stream failed and the error reply was appended.
    Failed,
    /// The user interrupted the turn.
    Cancelled,
}

/// Per-session state of the turn currently in flight.
#[derive(Debug)]
pub struct TurnContext {
    streaming: bool,
    active_message_id: Option<MessageId>,
    phase: TurnPhase,
    cancel: CancellationToken,
}

impl TurnContext {
    pub fn new() -> Self {
        Self {
            streaming: false,
            active_message_id: None,
            phase: TurnPhase::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// The bot message the current (or most recent) turn streams into.
    pub fn active_message_id(&self) -> Option<MessageId> {
        self.active_message_id
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Token that cancels the next (or current) turn.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn begin(&mut self) {
        self.streaming = true;
        self.active_message_id = None;
        self.phase = TurnPhase::Idle;
    }

    fn finish(&mut self) {
        self.streaming = false;
        self.phase = TurnPhase::Final;
        // A used token stays cancelled, so every turn gets a fresh one.
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }
}

impl Default for TurnContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives progress of a turn, typically to render it.
pub trait TurnObserver {
    /// Called once the bot message of the turn has been created.
    fn on_stream_start(&mut self, _message: &Message) {}

    /// Called after every update of the bot message.
    fn on_update(&mut self, _message: &Message) {}

    /// Called with the error reply appended after a failure.
    fn on_error_message(&mut self, _message: &Message) {}

    /// Called exactly once at the end of the turn, with the bot message if one was streamed.
    fn on_end(&mut self, _message: Option<&Message>, _outcome: TurnOutcome) {}
}

impl TurnObserver for () {}

/// Drives one request/response cycle.
///
/// The user message is appended first. If the request cannot be opened, a single error reply is
/// appended instead of a bot message. Otherwise a bot message is created and every decoded event
/// is applied to it in arrival order. The streaming flag is cleared however the turn ends.
pub async fn run_turn<S>(
    conversation: &mut Conversation,
    ctx: &mut TurnContext,
    content: impl Into<String>,
    send: S,
    wire_format: WireFormat,
    observer: &mut impl TurnObserver,
) -> TurnOutcome
where
    S: Future<Output = Result<SendMessageOutput, ApiClientError>>,
{
    conversation.push_user(content);
    ctx.begin();
    let cancel = ctx.cancel.clone();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("turn cancelled before the response arrived");
            TurnOutcome::Cancelled
        },
        result = send => match result {
            Ok(output) => stream_reply(conversation, ctx, output, wire_format, &cancel, observer).await,
            Err(err) => {
                error!(?err, "failed to send the message");
                push_error_message(conversation, observer);
                TurnOutcome::Failed
            },
        },
    };

    ctx.finish();
    let streamed = ctx.active_message_id.and_then(|id| conversation.get(id));
    observer.on_end(streamed, outcome);
    debug!(?outcome, "turn finished");
    outcome
}

async fn stream_reply(
    conversation: &mut Conversation,
    ctx: &mut TurnContext,
    output: SendMessageOutput,
    wire_format: WireFormat,
    cancel: &CancellationToken,
    observer: &mut impl TurnObserver,
) -> TurnOutcome {
    let id = conversation.push_bot("");
    ctx.active_message_id = Some(id);
    if let Some(message) = conversation.get(id) {
        observer.on_stream_start(message);
    }

    let mut parser = ResponseParser::new(output, wire_format);
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%id, "turn cancelled while streaming");
                return TurnOutcome::Cancelled;
            },
            event = parser.recv() => event,
        };

        match event {
            Ok(Some(event)) => {
                if let Some(message) = conversation.update(id, |m| apply_event(m, &event)) {
                    ctx.phase = TurnPhase::of(message);
                    observer.on_update(message);
                }
            },
            Ok(None) => return TurnOutcome::Completed,
            Err(err) => {
                warn!(%err, %id, "the response stream failed");
                push_error_message(conversation, observer);
                return TurnOutcome::Failed;
            },
        }
    }
}

fn push_error_message(conversation: &mut Conversation, observer: &mut impl TurnObserver) {
    let id = conversation.push_bot(ERROR_RESPONSE_TEXT);
    if let Some(message) = conversation.get(id) {
        observer.on_error_message(message);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::cli::chat::message::Role;

    #[derive(Default)]
    struct Recorder {
        started: Vec<Message>,
        updates: Vec<Message>,
        errors: usize,
        outcomes: Vec<TurnOutcome>,
    }

    impl TurnObserver for Recorder {
        fn on_stream_start(&mut self, message: &Message) {
            self.started.push(message.clone());
        }

        fn on_update(&mut self, message: &Message) {
            self.updates.push(message.clone());
        }

        fn on_error_message(&mut self, _message: &Message) {
            self.errors += 1;
        }

        fn on_end(&mut self, _message: Option<&Message>, outcome: TurnOutcome) {
            self.outcomes.push(outcome);
        }
    }

    async fn turn(chunks: &[&'static str]) -> (Conversation, TurnContext, Recorder, TurnOutcome) {
        turn_with("question", chunks).await
    }

    async fn turn_with(
        content: &str,
        chunks: &[&'static str],
    ) -> (Conversation, TurnContext, Recorder, TurnOutcome) {
        let mut conversation = Conversation::new();
        let mut ctx = TurnContext::new();
        let mut recorder = Recorder::default();
        let output = SendMessageOutput::mock(chunks.iter().copied());
        let outcome = run_turn(
            &mut conversation,
            &mut ctx,
            content,
            async move { Ok(output) },
            WireFormat::Legacy,
            &mut recorder,
        )
        .await;
        (conversation, ctx, recorder, outcome)
    }

    fn bot(content: &str) -> Message {
        Message::new_bot(MessageId::new(0), content)
    }

    #[test]
    fn test_markers_never_contribute_text() {
        let mut message = bot("");
        apply_event(&mut message, &StreamEvent::ToolStart);
        assert!(message.tool_use && !message.tool_done && !message.is_thinking);
        assert_eq!(TurnPhase::of(&message), TurnPhase::ToolUse);

        apply_event(&mut message, &StreamEvent::ToolEnd);
        assert!(!message.tool_use && !message.tool_done && message.is_thinking);
        assert_eq!(TurnPhase::of(&message), TurnPhase::Thinking);
        assert!(message.content.is_empty());

        apply_event(&mut message, &StreamEvent::Token("Sunny".into()));
        assert!(!message.tool_use && message.tool_done && !message.is_thinking);
        assert_eq!(TurnPhase::of(&message), TurnPhase::Streaming);
        assert_eq!(message.content, "Sunny");
    }

    #[test]
    fn test_tool_done_only_set_after_thinking() {
        let mut message = bot("");
        apply_event(&mut message, &StreamEvent::Token("a".into()));
        apply_event(&mut message, &StreamEvent::Token("b".into()));
        assert!(!message.tool_done);

        // A token during tool use is appended without touching the flags.
        apply_event(&mut message, &StreamEvent::ToolStart);
        apply_event(&mut message, &StreamEvent::Token("c".into()));
        assert!(message.tool_use && !message.tool_done);
        assert_eq!(message.content, "abc");

        // Several tool rounds in a row.
        apply_event(&mut message, &StreamEvent::ToolEnd);
        apply_event(&mut message, &StreamEvent::ToolStart);
        assert_eq!(TurnPhase::of(&message), TurnPhase::ToolUse);
        apply_event(&mut message, &StreamEvent::ToolEnd);
        apply_event(&mut message, &StreamEvent::Token("d".into()));
        assert!(message.tool_done);
    }

    #[test]
    fn test_tool_use_and_thinking_are_exclusive() {
        let events = [
            StreamEvent::ToolStart,
            StreamEvent::Token("x".into()),
            StreamEvent::ToolEnd,
            StreamEvent::ToolStart,
            StreamEvent::ToolEnd,
            StreamEvent::Token("y".into()),
        ];
        let mut message = bot("");
        for event in &events {
            apply_event(&mut message, event);
            assert!(!(message.tool_use && message.is_thinking));
        }
    }

    #[tokio::test]
    async fn test_plain_reply_is_concatenated() {
        let (conversation, ctx, recorder, outcome) = turn(&["Hel", "lo", " world"]).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(!ctx.is_streaming());
        assert_eq!(ctx.phase(), TurnPhase::Final);

        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "question");
        assert_eq!(messages[1].content, "Hello world");
        assert_eq!(ctx.active_message_id(), Some(messages[1].id));
        assert_eq!(recorder.updates.len(), 3);
        assert_eq!(recorder.outcomes, vec![TurnOutcome::Completed]);
    }

    #[tokio::test]
    async fn test_reply_keeps_end_turn_in_store() {
        let (conversation, _, recorder, outcome) = turn_with("hello", &["Hi", " there", "END_TURN"]).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");

        assert_eq!(recorder.started.len(), 1);
        let started = &recorder.started[0];
        assert_eq!(started.id, messages[1].id);
        assert_eq!(started.role, Role::Bot);
        assert_eq!(started.content, "");
        assert!(!started.tool_use && !started.tool_done && !started.is_thinking);

        assert_eq!(messages[1].content, "Hi thereEND_TURN");
        assert_eq!(messages[1].display_content(), "Hi there");
        assert!(!messages[1].tool_use && !messages[1].tool_done && !messages[1].is_thinking);
    }

    #[tokio::test]
    async fn test_tool_result_reply() {
        let (conversation, _, recorder, outcome) = turn(&["TOOL_USE", "DONE", "Result: 42", "END_TURN"]).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(recorder.started[0].content, "");
        let reply = conversation.last_bot_message().unwrap();
        assert!(!reply.tool_use);
        assert!(reply.tool_done);
        assert!(!reply.is_thinking);
        assert_eq!(reply.content, "Result: 42END_TURN");
        assert_eq!(reply.display_content(), "Result: 42");
    }

    #[tokio::test]
    async fn test_tool_round_scenario() {
        let (conversation, _, recorder, outcome) =
            turn(&["Let me check.", "TOOL_USE", "DONE", " It is sunny.", "END_TURN"]).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let reply = conversation.last_bot_message().unwrap();
        assert_eq!(reply.content, "Let me check. It is sunny.END_TURN");
        assert_eq!(reply.display_content(), "Let me check. It is sunny.");
        assert!(reply.tool_done && !reply.tool_use && !reply.is_thinking);

        let phases: Vec<_> = recorder.updates.iter().map(TurnPhase::of).collect();
        assert_eq!(phases, vec![
            TurnPhase::Streaming,
            TurnPhase::ToolUse,
            TurnPhase::Thinking,
            TurnPhase::Streaming,
            TurnPhase::Streaming,
        ]);
    }

    #[tokio::test]
    async fn test_tool_use_without_text_scenario() {
        let (conversation, _, _, _) = turn(&["TOOL_USE", "DONE"]).await;

        let reply = conversation.last_bot_message().unwrap();
        assert_eq!(reply.content, "");
        assert!(reply.is_thinking && !reply.tool_done && !reply.tool_use);
    }

    #[tokio::test]
    async fn test_send_failure_appends_one_error_message() {
        let mut conversation = Conversation::new();
        let mut ctx = TurnContext::new();
        let mut recorder = Recorder::default();

        let outcome = run_turn(
            &mut conversation,
            &mut ctx,
            "hello",
            async { Err(ApiClientError::StreamInterrupted("connection refused".into())) },
            WireFormat::Legacy,
            &mut recorder,
        )
        .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert!(!ctx.is_streaming());
        assert_eq!(ctx.active_message_id(), None);
        assert_eq!(recorder.errors, 1);

        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Bot);
        assert_eq!(messages[1].content, ERROR_RESPONSE_TEXT);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_reply() {
        let mut conversation = Conversation::new();
        let mut ctx = TurnContext::new();
        let output = SendMessageOutput::mock_results(vec![
            Ok(Bytes::from("Partial")),
            Err(ApiClientError::StreamInterrupted("reset".into())),
        ]);

        let outcome = run_turn(
            &mut conversation,
            &mut ctx,
            "hello",
            async move { Ok(output) },
            WireFormat::Legacy,
            &mut (),
        )
        .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert!(!ctx.is_streaming());
        let contents: Vec<_> = conversation.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "Partial", ERROR_RESPONSE_TEXT]);
    }

    #[tokio::test]
    async fn test_cancelled_turn() {
        let mut conversation = Conversation::new();
        let mut ctx = TurnContext::new();
        let token = ctx.cancellation_token();
        token.cancel();

        let outcome = run_turn(
            &mut conversation,
            &mut ctx,
            "hello",
            std::future::pending::<Result<SendMessageOutput, ApiClientError>>(),
            WireFormat::Legacy,
            &mut (),
        )
        .await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(!ctx.is_streaming());
        assert_eq!(conversation.len(), 1);
        assert!(!ctx.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_ndjson_turn() {
        let mut conversation = Conversation::new();
        let mut ctx = TurnContext::new();
        let output = SendMessageOutput::mock([
            "{\"type\":\"tool_start\"}\n{\"type\":\"tool_end\"}\n",
            "{\"type\":\"token\",\"data\":\"All DONE\"}\n",
        ]);

        run_turn(
            &mut conversation,
            &mut ctx,
            "hello",
            async move { Ok(output) },
            WireFormat::Ndjson,
            &mut (),
        )
        .await;

        let reply = conversation.last_bot_message().unwrap();
        assert_eq!(reply.content, "All DONE");
        assert!(reply.tool_done);
    }
}
