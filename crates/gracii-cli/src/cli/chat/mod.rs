pub mod command;
mod consts;
pub mod conversation;
pub mod ingest;
mod input_source;
pub mod message;
pub mod parser;
mod prompt;
pub mod uploads;
pub mod util;

use std::io::{
    IsTerminal,
    Read,
};
use std::path::Path;
use std::process::ExitCode;

use clap::Args;
use command::{
    Command,
    HELP_TEXT,
};
use consts::GREETING_CHAR_DELAY;
use conversation::Conversation;
use crossterm::style::Stylize;
use crossterm::{
    execute,
    style,
};
use eyre::{
    Result,
    bail,
};
use ingest::{
    TurnContext,
    TurnOutcome,
    run_turn,
};
use input_source::InputSource;
use parser::WireFormat;
use thiserror::Error;
use tracing::{
    debug,
    error,
    info,
    warn,
};
use uploads::{
    FileData,
    TempFilePreviews,
    UploadError,
    UploadManager,
};
use util::shared_writer::SharedWriter;
use util::ui::{
    TurnRenderer,
    print_uploads,
    type_out,
};
use util::{
    copy_to_clipboard,
    play_notification_bell,
};

use self::consts::{
    GREETING,
    UPLOAD_LIMIT_NOTICE,
};
use self::prompt::generate_prompt;
use crate::api_client::ApiClient;
use crate::database::Database;
use crate::database::settings::Setting;
use crate::util::directories::chat_history_path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
pub struct ChatArgs {
    /// Address of the chat backend, for example http://localhost:8000
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,
    /// How the backend frames the events of a streamed reply
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub wire_format: Option<WireFormat>,
    /// Start without the greeting
    #[arg(long)]
    pub no_greeting: bool,
    /// Whether the command should run without expecting user input
    #[arg(long, alias = "no-interactive")]
    pub non_interactive: bool,
    /// The first question to ask
    pub input: Option<String>,
}

impl ChatArgs {
    pub async fn execute(self, database: &mut Database) -> Result<ExitCode> {
        let mut input = self.input;

        if self.non_interactive && input.is_none() {
            if !std::io::stdin().is_terminal() {
                let mut buffer = String::new();
                match std::io::stdin().read_to_string(&mut buffer) {
                    Ok(_) => {
                        if !buffer.trim().is_empty() {
                            input = Some(buffer.trim().to_string());
                        }
                    },
                    Err(e) => {
                        eprintln!("Error reading from stdin: {}", e);
                    },
                }
            }

            if input.is_none() {
                bail!("Input must be supplied when running in non-interactive mode");
            }
        }

        let settings = &database.settings;
        let wire_format = match self.wire_format {
            Some(wire_format) => wire_format,
            None => match settings.get_string(Setting::ChatWireFormat) {
                Some(value) => value.parse().unwrap_or_else(|_| {
                    warn!(%value, "unknown wire format in the settings, falling back to the default");
                    WireFormat::default()
                }),
                None => WireFormat::default(),
            },
        };

        let client = ApiClient::from_settings(self.endpoint.as_deref(), settings)?;
        info!(endpoint = %client.endpoint().url(), %wire_format, "starting chat");

        let interactive = !self.non_interactive;
        let options = SessionOptions {
            wire_format,
            interactive,
            greeting: interactive
                && !self.no_greeting
                && settings.get_bool(Setting::ChatGreetingEnabled).unwrap_or(true),
            notifications: settings.get_bool(Setting::ChatEnableNotifications).unwrap_or(false),
            spinners: interactive && std::io::stdout().is_terminal(),
        };

        let input_source = match interactive {
            true => InputSource::new(chat_history_path().ok())?,
            false => InputSource::new_mock(Vec::new()),
        };

        let uploads = UploadManager::new(TempFilePreviews::in_previews_dir()?);

        let mut session = ChatSession::new(SharedWriter::stdout(), input_source, client, uploads, options, input);
        Ok(session.spawn().await?)
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Std(#[from] std::io::Error),
    #[error("{0}")]
    Readline(#[from] rustyline::error::ReadlineError),
    #[error("{0}")]
    Clipboard(#[from] arboard::Error),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Behavior switches for a chat session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub wire_format: WireFormat,
    /// Read further input after the first question.
    pub interactive: bool,
    pub greeting: bool,
    /// Ring the terminal bell when a reply completes.
    pub notifications: bool,
    pub spinners: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatState {
    PromptUser,
    Exit,
}

pub struct ChatSession {
    output: SharedWriter,
    input_source: InputSource,
    client: ApiClient,
    conversation: Conversation,
    turn: TurnContext,
    uploads: UploadManager,
    renderer: TurnRenderer,
    options: SessionOptions,
    initial_input: Option<String>,
    last_outcome: Option<TurnOutcome>,
}

impl ChatSession {
    pub fn new(
        output: SharedWriter,
        input_source: InputSource,
        client: ApiClient,
        uploads: UploadManager,
        options: SessionOptions,
        initial_input: Option<String>,
    ) -> Self {
        let conversation = Conversation::new();
        info!(conversation_id = %conversation.conversation_id(), "generated new conversation id");

        Self {
            renderer: TurnRenderer::new(output.clone(), options.spinners),
            output,
            input_source,
            client,
            conversation,
            turn: TurnContext::new(),
            uploads,
            options,
            initial_input,
            last_outcome: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Runs the session until the user quits, or after the first turn when not interactive.
    pub async fn spawn(&mut self) -> Result<ExitCode, ChatError> {
        if self.options.greeting {
            type_out(&mut self.output, GREETING, GREETING_CHAR_DELAY).await?;
            execute!(self.output, style::Print("\n"))?;
        }

        if let Some(input) = self.initial_input.take() {
            if self.options.interactive {
                execute!(self.output, style::Print(format!("{}{input}\n", "> ".magenta())))?;
            }
            if self.handle_input(input).await? == ChatState::Exit {
                return Ok(ExitCode::SUCCESS);
            }
        }

        if !self.options.interactive {
            return Ok(match self.last_outcome {
                Some(TurnOutcome::Failed | TurnOutcome::Cancelled) => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            });
        }

        loop {
            let prompt = generate_prompt(self.uploads.len());
            let initial = self.uploads.pending_input().to_string();
            let Some(line) = self.input_source.read_line(&prompt, &initial)? else {
                debug!("input closed, ending the session");
                break;
            };

            if self.handle_input(line).await? == ChatState::Exit {
                break;
            }
        }

        Ok(ExitCode::SUCCESS)
    }

    async fn handle_input(&mut self, input: String) -> Result<ChatState, ChatError> {
        let command = match Command::parse(&input) {
            Ok(command) => command,
            Err(err) => {
                execute!(self.output, style::Print(format!("{}\n\n", err.red())))?;
                return Ok(ChatState::PromptUser);
            },
        };

        match command {
            Command::Ask { prompt } => self.ask(prompt).await?,
            Command::Attach { path } => {
                if let Err(err) = self.attach(&path).await {
                    warn!(?err, ?path, "failed to attach a file");
                    let text = match err {
                        UploadError::LimitReached => UPLOAD_LIMIT_NOTICE.yellow().to_string(),
                        err => format!("Could not attach {}: {err}", path.display()).red().to_string(),
                    };
                    execute!(self.output, style::Print(format!("{text}\n\n")))?;
                }
            },
            Command::Remove { id_prefix } => {
                match self.uploads.find_by_prefix(&id_prefix).and_then(|id| self.uploads.remove(id)) {
                    Some(upload) => execute!(
                        self.output,
                        style::Print(format!("Removed {}\n\n", upload.file.name.as_str().cyan()))
                    )?,
                    None => execute!(
                        self.output,
                        style::Print(format!("{}\n\n", format!("No single attachment matches `{id_prefix}`").red()))
                    )?,
                }
            },
            Command::Uploads => {
                print_uploads(&mut self.output, self.uploads.uploads())?;
                execute!(self.output, style::Print("\n"))?;
            },
            Command::Copy => self.copy_last_reply()?,
            Command::Clear => {
                self.uploads.clear();
                execute!(self.output, style::Print("Cleared the attachments.\n\n".dark_grey()))?;
            },
            Command::Help => execute!(self.output, style::Print(format!("{HELP_TEXT}\n")))?,
            Command::Quit => return Ok(ChatState::Exit),
        }

        Ok(ChatState::PromptUser)
    }

    async fn ask(&mut self, prompt: String) -> Result<(), ChatError> {
        if prompt.trim().is_empty() {
            return Ok(());
        }

        if self.turn.is_streaming() {
            warn!("a reply is still streaming, ignoring the new message");
            return Ok(());
        }

        // Kept until the turn completes so a failed message can be edited and sent again.
        self.uploads.set_pending_input(prompt.as_str());

        if self.options.spinners {
            self.renderer.start_waiting();
        }

        let token = self.turn.cancellation_token();
        let conversation_id = self.conversation.conversation_id().to_string();
        let send = self.client.send_message(&conversation_id, &prompt);
        let turn = run_turn(
            &mut self.conversation,
            &mut self.turn,
            prompt.as_str(),
            send,
            self.options.wire_format,
            &mut self.renderer,
        );
        tokio::pin!(turn);

        let outcome = tokio::select! {
            outcome = &mut turn => outcome,
            Ok(()) = tokio::signal::ctrl_c() => {
                token.cancel();
                turn.await
            },
        };

        if outcome == TurnOutcome::Completed {
            self.uploads.clear();
            play_notification_bell(&mut self.output, self.options.notifications)?;
        }

        self.last_outcome = Some(outcome);
        Ok(())
    }

    async fn attach(&mut self, path: &Path) -> Result<(), UploadError> {
        let file = FileData::from_path(path).await?;
        let upload = self.uploads.add(file)?;
        let text = format!(
            "Attached {} {} {}\n\n",
            upload.kind.icon(),
            upload.file.name.as_str().cyan(),
            format!("[{}]", upload.id.short()).dark_grey()
        );
        execute!(self.output, style::Print(text))?;
        Ok(())
    }

    fn copy_last_reply(&mut self) -> Result<(), ChatError> {
        let Some(text) = self.conversation.last_bot_message().map(|message| message.copy_text()) else {
            execute!(self.output, style::Print("There is no reply to copy yet.\n\n".dark_grey()))?;
            return Ok(());
        };

        match copy_to_clipboard(&text) {
            Ok(()) => execute!(self.output, style::Print("Copied the last reply.\n\n".dark_grey()))?,
            Err(err) => {
                error!(?err, "failed to copy to the clipboard");
                execute!(
                    self.output,
                    style::Print(format!("{}\n\n", format!("Failed to copy: {err}").red()))
                )?;
            },
        }

        Ok(())
    }
}
