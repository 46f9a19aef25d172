use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Ask { prompt: String },
    Attach { path: PathBuf },
    Remove { id_prefix: String },
    Uploads,
    Copy,
    Clear,
    Help,
    Quit,
}

pub const HELP_TEXT: &str = color_print::cstr! {"
<magenta,em>gracii</magenta,em>

<cyan,em>Commands:</cyan,em>
<em>/attach <<path>></em>  <black!>Attach a document, data file or image (max 5)</black!>
<em>/remove <<id>></em>    <black!>Remove an attachment by the first characters of its id</black!>
<em>/uploads</em>        <black!>List the attached files</black!>
<em>/copy</em>           <black!>Copy the last reply to the clipboard</black!>
<em>/clear</em>          <black!>Remove every attachment and the pending text</black!>
<em>/help</em>           <black!>Show this help dialogue</black!>
<em>/quit</em>           <black!>Quit the application</black!>

<cyan,em>Tips:</cyan,em>
<em>Ctrl(^) + c</em>     <black!>Interrupt the reply being streamed</black!>
<em>\\/text</em>          <black!>Send a message that starts with a slash</black!>
"};

impl Command {
    /// Plain text is kept as typed so the stored user message matches the input.
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();

        // A leading backslash escapes a literal slash.
        if let Some(escaped) = trimmed.strip_prefix('\\') {
            if escaped.starts_with('/') {
                return Ok(Self::Ask {
                    prompt: escaped.to_string(),
                });
            }
        }

        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(Self::Ask {
                prompt: input.to_string(),
            });
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        Ok(match name.to_lowercase().as_str() {
            "attach" => {
                let args = shlex::split(rest).ok_or_else(|| format!("Could not parse the path: {rest}"))?;
                match args.as_slice() {
                    [path] => Self::Attach { path: path.into() },
                    [] => return Err("Usage: /attach <path>".to_string()),
                    _ => return Err("Only one file can be attached at a time. Quote paths that contain spaces.".to_string()),
                }
            },
            "remove" | "rm" => {
                if rest.is_empty() {
                    return Err("Usage: /remove <id>".to_string());
                }
                Self::Remove {
                    id_prefix: rest.to_string(),
                }
            },
            "uploads" | "files" => Self::Uploads,
            "copy" => Self::Copy,
            "clear" => Self::Clear,
            "help" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            "" => return Err("Empty command".to_string()),
            other => return Err(format!("Unknown command: /{other}. Type /help to list the commands.")),
        })
    }
}
