use std::borrow::Cow;

use rustyline::completion::{
    Completer,
    FilenameCompleter,
    extract_word,
};
use rustyline::error::ReadlineError;
use rustyline::highlight::{
    CmdKind,
    Highlighter,
};
use rustyline::history::FileHistory;
use rustyline::hint::Hinter as RustylineHinter;
use rustyline::{
    Cmd,
    Completer,
    CompletionType,
    Config,
    Context,
    EditMode,
    Editor,
    EventHandler,
    Helper,
    Hinter,
    KeyCode,
    KeyEvent,
    Modifiers,
    Validator,
};

pub const COMMANDS: &[&str] = &[
    "/attach",
    "/remove",
    "/uploads",
    "/copy",
    "/clear",
    "/help",
    "/quit",
];

/// Complete commands that start with a slash
fn complete_command(word: &str, start: usize) -> (usize, Vec<String>) {
    (
        start,
        COMMANDS
            .iter()
            .filter(|p| p.starts_with(word))
            .map(|s| (*s).to_owned())
            .collect(),
    )
}

pub struct ChatCompleter {
    filename_completer: FilenameCompleter,
}

impl ChatCompleter {
    fn new() -> Self {
        Self {
            filename_completer: FilenameCompleter::new(),
        }
    }
}

impl Completer for ChatCompleter {
    type Candidate = String;

    fn complete(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Result<(usize, Vec<Self::Candidate>), ReadlineError> {
        let (start, word) = extract_word(line, pos, None, char::is_whitespace);

        if start == 0 && word.starts_with('/') {
            return Ok(complete_command(word, start));
        }

        // Only the argument of /attach is a path.
        if line.starts_with("/attach ") {
            let (pos, pairs) = self.filename_completer.complete(line, pos, ctx)?;
            return Ok((pos, pairs.into_iter().map(|pair| pair.replacement).collect()));
        }

        Ok((start, Vec::new()))
    }
}

/// Suggests the rest of a slash command as shadow text.
pub struct ChatHinter;

impl RustylineHinter for ChatHinter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() || !line.starts_with('/') {
            return None;
        }

        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

#[derive(Helper, Completer, Hinter, Validator)]
pub struct ChatHelper {
    #[rustyline(Completer)]
    completer: ChatCompleter,
    #[rustyline(Hinter)]
    hinter: ChatHinter,
}

impl Highlighter for ChatHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[38;5;240m{hint}\x1b[m"))
    }

    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Borrowed(line)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        false
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        use crossterm::style::Stylize;

        // An attachment count like "[2 attached] " precedes the prompt symbol.
        match prompt.strip_suffix("> ") {
            Some(rest) if !rest.is_empty() => Cow::Owned(format!("{}{}", rest.cyan(), "> ".magenta())),
            Some(_) => Cow::Owned("> ".magenta().to_string()),
            None => Cow::Borrowed(prompt),
        }
    }
}

/// Builds the prompt shown before each line of input.
pub fn generate_prompt(upload_count: usize) -> String {
    match upload_count {
        0 => "> ".to_string(),
        count => format!("[{count} attached] > "),
    }
}

pub fn rl() -> Result<Editor<ChatHelper, FileHistory>, ReadlineError> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let helper = ChatHelper {
        completer: ChatCompleter::new(),
        hinter: ChatHinter,
    };

    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(helper));

    // Alt+Enter inserts a newline instead of sending.
    rl.bind_sequence(
        KeyEvent(KeyCode::Enter, Modifiers::ALT),
        EventHandler::Simple(Cmd::Insert(1, "\n".to_string())),
    );

    // Ctrl+F accepts the hint, like fish.
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('f'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::CompleteHint),
    );

    Ok(rl)
}

#[cfg(test)]
mod tests {
    use rustyline::history::DefaultHistory;

    use super::*;

    #[test]
    fn test_chat_completer_command_completion() {
        let completer = ChatCompleter::new();
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);

        let (start, completions) = completer.complete("/re", 3, &ctx).unwrap();
        assert_eq!(start, 0);
        assert_eq!(completions, vec!["/remove".to_string()]);

        let (_, completions) = completer.complete("/", 1, &ctx).unwrap();
        assert_eq!(completions.len(), COMMANDS.len());
    }

    #[test]
    fn test_chat_completer_ignores_plain_text() {
        let completer = ChatCompleter::new();
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);

        let (_, completions) = completer.complete("what is /re", 11, &ctx).unwrap();
        assert!(completions.is_empty());
    }

    #[test]
    fn test_hinter() {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);

        assert_eq!(ChatHinter.hint("/up", 3, &ctx), Some("loads".to_string()));
        assert_eq!(ChatHinter.hint("/uploads", 8, &ctx), None);
        assert_eq!(ChatHinter.hint("hello", 5, &ctx), None);
    }

    #[test]
    fn test_highlight_prompt() {
        use crossterm::style::Stylize;

        let helper = ChatHelper {
            completer: ChatCompleter::new(),
            hinter: ChatHinter,
        };

        assert_eq!(helper.highlight_prompt("> ", true), "> ".magenta().to_string());
        assert_eq!(
            helper.highlight_prompt("[2 attached] > ", true),
            format!("{}{}", "[2 attached] ".cyan(), "> ".magenta())
        );
    }

    #[test]
    fn test_generate_prompt() {
        assert_eq!(generate_prompt(0), "> ");
        assert_eq!(generate_prompt(2), "[2 attached] > ");
    }
}
