use std::io::Write;
use std::time::Duration;

use crossterm::style::{
    Color,
    Stylize,
};
use crossterm::{
    cursor,
    queue,
    style,
    terminal,
};
use spinners::{
    Spinner,
    Spinners,
};
use tracing::warn;

use super::super::consts::{
    END_TURN_MARKER,
    THINKING_INDICATOR_TEXT,
    TOOL_USE_INDICATOR_TEXT,
    TOOLS_USED_TEXT,
};
use super::super::ingest::{
    TurnObserver,
    TurnOutcome,
};
use super::super::message::Message;
use super::super::uploads::{
    Upload,
    format_file_size,
};
use super::shared_writer::SharedWriter;

/// Status shown next to a bot message while tools are involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolIndicator {
    UsingTools,
    Thinking,
    ToolsUsed,
}

impl ToolIndicator {
    pub fn of(message: &Message) -> Option<Self> {
        if message.tool_use {
            Some(ToolIndicator::UsingTools)
        } else if message.is_thinking {
            Some(ToolIndicator::Thinking)
        } else if message.tool_done {
            Some(ToolIndicator::ToolsUsed)
        } else {
            None
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            ToolIndicator::UsingTools => TOOL_USE_INDICATOR_TEXT,
            ToolIndicator::Thinking => THINKING_INDICATOR_TEXT,
            ToolIndicator::ToolsUsed => TOOLS_USED_TEXT,
        }
    }

    /// Whether the indicator describes work still in progress.
    pub fn is_pending(&self) -> bool {
        matches!(self, ToolIndicator::UsingTools | ToolIndicator::Thinking)
    }
}

/// Turns the growing content of a streamed message into printable deltas.
///
/// The end of turn sentinel is never printed. A trailing fragment that could be the start of the
/// sentinel is held back until the next update settles it.
#[derive(Debug, Default)]
pub struct DisplayBuffer {
    /// Byte offset into the raw content up to which everything has been handled.
    consumed: usize,
    sentinel_stripped: bool,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text to print since the previous call.
    pub fn delta(&mut self, content: &str) -> String {
        self.take(content, false)
    }

    /// Returns everything not printed yet, including a held back fragment.
    pub fn finish(&mut self, content: &str) -> String {
        self.take(content, true)
    }

    fn take(&mut self, content: &str, finished: bool) -> String {
        let Some(new) = content.get(self.consumed..) else {
            return String::new();
        };

        if !self.sentinel_stripped {
            if let Some(idx) = new.find(END_TURN_MARKER) {
                self.sentinel_stripped = true;
                self.consumed = content.len();
                return format!("{}{}", &new[..idx], &new[idx + END_TURN_MARKER.len()..]);
            }

            if !finished {
                let held = held_back_len(new);
                let printable = &new[..new.len() - held];
                self.consumed += printable.len();
                return printable.to_string();
            }
        }

        self.consumed = content.len();
        new.to_string()
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of the sentinel.
fn held_back_len(text: &str) -> usize {
    (1..END_TURN_MARKER.len())
        .rev()
        .find(|len| text.ends_with(&END_TURN_MARKER[..*len]))
        .unwrap_or(0)
}

/// Prints `text` one character at a time.
pub async fn type_out(output: &mut impl Write, text: &str, delay: Duration) -> std::io::Result<()> {
    for c in text.chars() {
        write!(output, "{c}")?;
        output.flush()?;
        tokio::time::sleep(delay).await;
    }
    writeln!(output)?;
    output.flush()
}

/// Lists the pending attachments.
pub fn print_uploads(output: &mut impl Write, uploads: &[Upload]) -> std::io::Result<()> {
    if uploads.is_empty() {
        queue!(output, style::Print("No files attached.\n".dark_grey()))?;
        return output.flush();
    }

    for upload in uploads {
        queue!(
            output,
            style::Print(format!("{} ", upload.kind.icon())),
            style::SetForegroundColor(Color::Cyan),
            style::Print(&upload.file.name),
            style::SetForegroundColor(Color::Reset),
            style::Print(format!(
                "  {} · {}  ",
                upload.kind.label(),
                format_file_size(upload.file.size)
            )),
            style::Print(format!("[{}]\n", upload.id.short()).dark_grey()),
        )?;

        if let Some(preview) = &upload.preview {
            queue!(output, style::Print(format!("    preview: {preview}\n").dark_grey()))?;
        }

        if let Some(lines) = upload.file.text_snippet() {
            for line in lines {
                queue!(output, style::Print(format!("    │ {line}\n").dark_grey()))?;
            }
        }
    }

    output.flush()
}

/// Renders a streamed reply as it arrives.
pub struct TurnRenderer {
    output: SharedWriter,
    display: DisplayBuffer,
    /// Latest content of the streamed message.
    content: String,
    indicator: Option<ToolIndicator>,
    spinner: Option<Spinner>,
    spinners_enabled: bool,
    prefix_printed: bool,
    /// Reply text was printed without a trailing newline.
    line_open: bool,
}

impl TurnRenderer {
    pub fn new(output: SharedWriter, spinners_enabled: bool) -> Self {
        Self {
            output,
            display: DisplayBuffer::new(),
            content: String::new(),
            indicator: None,
            spinner: None,
            spinners_enabled,
            prefix_printed: false,
            line_open: false,
        }
    }

    /// Shows a spinner while waiting for the response headers.
    pub fn start_waiting(&mut self) {
        self.start_spinner(THINKING_INDICATOR_TEXT);
    }

    fn start_spinner(&mut self, text: &str) {
        self.stop_spinner();
        if self.spinners_enabled {
            self.spinner = Some(Spinner::new(Spinners::Dots, text.to_owned()));
        } else {
            self.print(|out| queue!(out, style::Print(format!("{}\n", text.dark_grey()))));
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            drop(spinner);
            self.print(|out| {
                queue!(
                    out,
                    terminal::Clear(terminal::ClearType::CurrentLine),
                    cursor::MoveToColumn(0),
                    cursor::Show
                )
            });
        }
    }

    fn print_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.stop_spinner();
        let prefix = !self.prefix_printed && !text.trim().is_empty();
        if prefix {
            self.prefix_printed = true;
        }
        self.line_open = !text.ends_with('\n');
        self.print(|out| {
            if prefix {
                queue!(out, style::Print("> ".green()))?;
            }
            queue!(out, style::Print(text))
        });
    }

    fn close_line(&mut self) {
        if self.line_open {
            self.line_open = false;
            self.print(|out| queue!(out, style::Print("\n")));
        }
    }

    fn print(&mut self, f: impl FnOnce(&mut SharedWriter) -> std::io::Result<()>) {
        let result = f(&mut self.output).and_then(|()| self.output.flush());
        if let Err(err) = result {
            warn!(?err, "failed to write to the terminal");
        }
    }
}

impl TurnObserver for TurnRenderer {
    fn on_stream_start(&mut self, message: &Message) {
        self.display = DisplayBuffer::new();
        self.content.clone_from(&message.content);
        self.indicator = None;
        self.prefix_printed = false;
        self.line_open = false;
    }

    fn on_update(&mut self, message: &Message) {
        let indicator = ToolIndicator::of(message);
        if indicator != self.indicator {
            self.indicator = indicator;
            match indicator {
                Some(indicator) if indicator.is_pending() => {
                    self.close_line();
                    self.start_spinner(indicator.text());
                },
                Some(indicator) => {
                    self.stop_spinner();
                    self.print(|out| queue!(out, style::Print(format!("{}\n", indicator.text().green()))));
                },
                None => self.stop_spinner(),
            }
        }

        self.content.clone_from(&message.content);
        let delta = self.display.delta(&message.content);
        self.print_text(&delta);
    }

    fn on_error_message(&mut self, message: &Message) {
        self.stop_spinner();
        let rest = self.display.finish(&self.content);
        self.print_text(&rest);
        self.close_line();
        let text = message.display_content();
        self.print(|out| queue!(out, style::Print(format!("{}\n", text.red()))));
    }

    fn on_end(&mut self, message: Option<&Message>, outcome: TurnOutcome) {
        self.stop_spinner();
        if let Some(message) = message {
            let rest = self.display.finish(&message.content);
            self.print_text(&rest);
        }
        self.close_line();
        if outcome == TurnOutcome::Cancelled {
            self.print(|out| queue!(out, style::Print("(interrupted)\n".dark_grey())));
        }
        self.print(|out| queue!(out, style::Print("\n")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::chat::message::MessageId;
    use crate::cli::chat::util::shared_writer::TestWriterWithSink;

    #[test]
    fn test_tool_indicator() {
        let mut message = Message::new_bot(MessageId::new(1), "");
        assert_eq!(ToolIndicator::of(&message), None);

        message.tool_use = true;
        assert_eq!(ToolIndicator::of(&message).unwrap().text(), "Using tools...");

        message.tool_use = false;
        message.is_thinking = true;
        assert_eq!(ToolIndicator::of(&message).unwrap().text(), "Thinking...");

        message.is_thinking = false;
        message.tool_done = true;
        let indicator = ToolIndicator::of(&message).unwrap();
        assert_eq!(indicator.text(), "✓ Tools used");
        assert!(!indicator.is_pending());
    }

    #[test]
    fn test_display_buffer_hides_sentinel() {
        let mut buffer = DisplayBuffer::new();
        let mut out = String::new();
        for content in ["Hello", "Hello wor", "Hello world END_", "Hello world END_TURN", "Hello world END_TURN!"] {
            out.push_str(&buffer.delta(content));
        }
        out.push_str(&buffer.finish("Hello world END_TURN!"));
        assert_eq!(out, "Hello world !");
    }

    #[test]
    fn test_display_buffer_releases_false_alarm() {
        let mut buffer = DisplayBuffer::new();
        assert_eq!(buffer.delta("Press E"), "Press ");
        assert_eq!(buffer.delta("Press ENTER"), "ENTER");
        assert_eq!(buffer.delta("Press ENTER to END"), " to ");
        assert_eq!(buffer.finish("Press ENTER to END"), "END");
    }

    #[test]
    fn test_display_buffer_strips_only_first_sentinel() {
        let mut buffer = DisplayBuffer::new();
        let content = "a END_TURN b END_TURN";
        let mut out = buffer.delta(content);
        out.push_str(&buffer.finish(content));
        assert_eq!(out, Message::new_bot(MessageId::new(1), content).display_content());
    }

    #[tokio::test]
    async fn test_type_out() {
        let mut sink = TestWriterWithSink::default();
        type_out(&mut sink, "Gracii here", Duration::ZERO).await.unwrap();
        assert_eq!(sink.get_text(), "Gracii here\n");
    }

    #[test]
    fn test_renderer_prints_reply_and_indicators() {
        let sink = TestWriterWithSink::default();
        let mut renderer = TurnRenderer::new(SharedWriter::new(sink.clone()), false);

        let mut message = Message::new_bot(MessageId::new(2), "");
        renderer.on_stream_start(&message);

        message.content.push_str("Let me check.");
        renderer.on_update(&message);
        message.tool_use = true;
        renderer.on_update(&message);
        message.tool_use = false;
        message.is_thinking = true;
        renderer.on_update(&message);
        message.is_thinking = false;
        message.tool_done = true;
        message.content.push_str(" Sunny.END_TURN");
        renderer.on_update(&message);
        renderer.on_end(Some(&message), TurnOutcome::Completed);

        let text = sink.get_text();
        assert_eq!(
            text,
            "> Let me check.\nUsing tools...\nThinking...\n✓ Tools used\n Sunny.\n\n"
        );
    }

    #[test]
    fn test_partial_reply_printed_before_error() {
        let sink = TestWriterWithSink::default();
        let mut renderer = TurnRenderer::new(SharedWriter::new(sink.clone()), false);

        let mut message = Message::new_bot(MessageId::new(2), "");
        renderer.on_stream_start(&message);
        message.content.push_str("Partial END_T");
        renderer.on_update(&message);

        let error = Message::new_bot(MessageId::new(3), "Something went wrong");
        renderer.on_error_message(&error);
        renderer.on_end(Some(&message), TurnOutcome::Failed);

        assert_eq!(sink.get_text(), "> Partial END_T\nSomething went wrong\n\n");
    }
}
