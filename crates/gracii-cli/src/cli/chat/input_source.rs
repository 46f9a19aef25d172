use std::path::PathBuf;

use rustyline::error::ReadlineError;
use tracing::{
    debug,
    warn,
};

use super::prompt::rl;

#[derive(Debug)]
pub struct InputSource(inner::Inner);

mod inner {
    use std::path::PathBuf;

    use rustyline::Editor;
    use rustyline::history::FileHistory;

    use super::super::prompt::ChatHelper;

    #[derive(Debug)]
    pub enum Inner {
        Readline {
            rl: Editor<ChatHelper, FileHistory>,
            history_path: Option<PathBuf>,
        },
        Mock {
            index: usize,
            lines: Vec<String>,
        },
    }
}

impl InputSource {
    /// A line editor whose history persists at `history_path` when one is given.
    pub fn new(history_path: Option<PathBuf>) -> Result<Self, ReadlineError> {
        let mut rl = rl()?;
        if let Some(path) = &history_path {
            if path.exists() {
                if let Err(err) = rl.load_history(path) {
                    warn!(?err, ?path, "failed to load the chat history");
                }
            }
        }
        Ok(Self(inner::Inner::Readline { rl, history_path }))
    }

    pub fn new_mock(lines: Vec<String>) -> Self {
        Self(inner::Inner::Mock { index: 0, lines })
    }

    /// Reads the next line, with `initial` already typed into the buffer.
    ///
    /// Returns `None` once the user quits with Ctrl+C or Ctrl+D.
    pub fn read_line(&mut self, prompt: &str, initial: &str) -> Result<Option<String>, ReadlineError> {
        match &mut self.0 {
            inner::Inner::Readline { rl, history_path } => {
                let curr_line = match initial.is_empty() {
                    true => rl.readline(prompt),
                    false => rl.readline_with_initial(prompt, (initial, "")),
                };
                match curr_line {
                    Ok(line) => {
                        let _ = rl.add_history_entry(line.as_str());
                        if let Some(path) = history_path {
                            if let Err(err) = rl.save_history(path) {
                                debug!(?err, "failed to save the chat history");
                            }
                        }
                        Ok(Some(line))
                    },
                    Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
                    Err(err) => Err(err),
                }
            },
            inner::Inner::Mock { index, lines } => {
                *index += 1;
                Ok(lines.get(*index - 1).cloned())
            },
        }
    }
}
