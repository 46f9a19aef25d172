use std::time::Duration;

/// Maximum number of files that may be attached at once.
pub const MAX_UPLOADS: usize = 5;

/// Notice shown when an attachment would exceed [MAX_UPLOADS].
pub const UPLOAD_LIMIT_NOTICE: &str = "Maximum 5 files allowed";

/// Bot message appended whenever a turn fails.
pub const ERROR_RESPONSE_TEXT: &str = "Sorry, there was an error processing your request.";

pub const GREETING: &str = "Gracii here, what's up?";

pub const GREETING_CHAR_DELAY: Duration = Duration::from_millis(50);

// In-band control markers sent by the backend.
pub const TOOL_USE_MARKER: &str = "TOOL_USE";
pub const DONE_MARKER: &str = "DONE";
pub const END_TURN_MARKER: &str = "END_TURN";

pub const TOOL_USE_INDICATOR_TEXT: &str = "Using tools...";
pub const THINKING_INDICATOR_TEXT: &str = "Thinking...";
pub const TOOLS_USED_TEXT: &str = "✓ Tools used";

pub const TEXT_SNIPPET_MAX_LINES: usize = 6;
pub const TEXT_SNIPPET_MAX_LINE_CHARS: usize = 15;
