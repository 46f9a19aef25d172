mod chat;
mod history;
mod settings;

use std::fmt::Display;
use std::io::{
    Write as _,
    stdout,
};
use std::process::ExitCode;

use anstream::println;
use clap::{
    ArgAction,
    CommandFactory,
    Parser,
    Subcommand,
    ValueEnum,
};
use eyre::Result;
use serde::Serialize;
use tracing::debug;

use crate::cli::chat::ChatArgs;
use crate::cli::history::{
    DeleteArgs,
    HistoryArgs,
};
use crate::database::Database;
use crate::database::settings::Setting;
use crate::logging::{
    LogArgs,
    LogLevelSources,
    initialize_logging,
};
use crate::util::directories::logs_dir;
use crate::util::env_var::{
    GRACII_LOG_LEVEL,
    GRACII_LOG_STDOUT,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs the results as plain text
    #[default]
    Plain,
    /// Outputs the results as JSON
    Json,
    /// Outputs the results as pretty print JSON
    JsonPretty,
}

impl OutputFormat {
    pub fn print<T, TFn, J, JFn>(&self, text_fn: TFn, json_fn: JFn) -> Result<()>
    where
        T: std::fmt::Display,
        TFn: FnOnce() -> T,
        J: Serialize,
        JFn: FnOnce() -> J,
    {
        match self {
            OutputFormat::Plain => println!("{}", text_fn()),
            OutputFormat::Json => println!("{}", serde_json::to_string(&json_fn())?),
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&json_fn())?),
        }
        Ok(())
    }
}

/// The Gracii chat client
#[deny(missing_docs)]
#[derive(Debug, PartialEq, Subcommand)]
pub enum RootSubcommand {
    /// Chat with Gracii in your terminal
    Chat(ChatArgs),
    /// Customize appearance & behavior
    #[command(alias("setting"))]
    Settings(settings::SettingsArgs),
    /// Print the history the backend keeps for a conversation
    History(HistoryArgs),
    /// Delete a conversation on the backend
    Delete(DeleteArgs),
    /// Version
    #[command(hide = true)]
    Version,
}

impl RootSubcommand {
    pub async fn execute(self, database: &mut Database) -> Result<ExitCode> {
        match self {
            Self::Chat(args) => args.execute(database).await,
            Self::Settings(settings_args) => settings_args.execute(database).await,
            Self::History(args) => args.execute(database).await,
            Self::Delete(args) => args.execute(database).await,
            Self::Version => Cli::print_version(),
        }
    }
}

impl Default for RootSubcommand {
    fn default() -> Self {
        Self::Chat(ChatArgs::default())
    }
}

impl Display for RootSubcommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Chat(_) => "chat",
            Self::Settings(_) => "settings",
            Self::History(_) => "history",
            Self::Delete(_) => "delete",
            Self::Version => "version",
        };

        write!(f, "{name}")
    }
}

#[derive(Debug, Parser, PartialEq, Default)]
#[command(version, about, name = crate::util::CHAT_BINARY_NAME)]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Option<RootSubcommand>,
    /// Increase logging verbosity
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        let subcommand = self.subcommand.unwrap_or_default();

        let mut database = Database::new().await?;

        // Initialize our logger and keep around the guard so logging can perform as expected.
        let _log_guard = initialize_logging(LogArgs {
            levels: LogLevelSources {
                verbosity: self.verbose,
                env: std::env::var(GRACII_LOG_LEVEL).ok(),
                setting: database.settings.get_string(Setting::LogLevel),
            },
            log_to_stdout: std::env::var_os(GRACII_LOG_STDOUT).is_some() || self.verbose > 0,
            log_file_path: match subcommand {
                RootSubcommand::Chat { .. } => logs_dir().ok().map(|dir| dir.join("gracii.log")),
                _ => None,
            },
        });

        debug!(command =? std::env::args().collect::<Vec<_>>(), %subcommand, "Command being ran");

        subcommand.execute(&mut database).await
    }

    fn print_version() -> Result<ExitCode> {
        let _ = writeln!(stdout(), "{}", Self::command().render_version());
        Ok(ExitCode::SUCCESS)
    }
}
