use std::process::ExitCode;

use anstream::println;
use clap::{
    ArgGroup,
    Args,
    Subcommand,
};
use eyre::{
    Result,
    WrapErr,
    bail,
};
use serde_json::json;

use super::OutputFormat;
use crate::database::Database;
use crate::database::settings::Setting;
use crate::util::directories;

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum SettingsSubcommands {
    /// Open the settings file
    Open,
    /// List all the settings
    All {
        /// Format of the output
        #[arg(long, short, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// List the keys that can be set
    Keys,
}

#[derive(Debug, Args, PartialEq, Eq)]
#[command(subcommand_negates_reqs = true)]
#[command(args_conflicts_with_subcommands = true)]
#[command(group(ArgGroup::new("vals").requires("key").args(&["value", "delete", "format"])))]
pub struct SettingsArgs {
    #[command(subcommand)]
    cmd: Option<SettingsSubcommands>,
    /// key
    key: Option<String>,
    /// value
    value: Option<String>,
    /// Delete a value
    #[arg(long, short)]
    delete: bool,
    /// Format of the output
    #[arg(long, short, value_enum, default_value_t)]
    format: OutputFormat,
}

impl SettingsArgs {
    pub async fn execute(&self, database: &mut Database) -> Result<ExitCode> {
        match self.cmd {
            Some(SettingsSubcommands::Open) => {
                let file = directories::settings_path().context("Could not get settings path")?;
                match std::env::var("EDITOR") {
                    Ok(editor) => {
                        tokio::process::Command::new(editor).arg(file).spawn()?.wait().await?;
                        Ok(ExitCode::SUCCESS)
                    },
                    Err(_) => bail!("The EDITOR environment variable is not set"),
                }
            },
            Some(SettingsSubcommands::All { format }) => {
                let settings = database.settings.map();
                match format {
                    OutputFormat::Plain => {
                        for (key, value) in settings {
                            println!("{key} = {value}");
                        }
                    },
                    OutputFormat::Json => println!("{}", serde_json::to_string(settings)?),
                    OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(settings)?),
                }
                Ok(ExitCode::SUCCESS)
            },
            Some(SettingsSubcommands::Keys) => {
                for key in Setting::ALL {
                    println!("{key}");
                }
                Ok(ExitCode::SUCCESS)
            },
            None => {
                let Some(key) = &self.key else {
                    return Ok(ExitCode::SUCCESS);
                };

                let key = Setting::try_from(key.as_str())?;
                match (&self.value, self.delete) {
                    (None, false) => match database.settings.get(key) {
                        Some(value) => {
                            match self.format {
                                OutputFormat::Plain => match value.as_str() {
                                    Some(value) => println!("{value}"),
                                    None => println!("{value:#}"),
                                },
                                OutputFormat::Json => println!("{value}"),
                                OutputFormat::JsonPretty => println!("{value:#}"),
                            }
                            Ok(ExitCode::SUCCESS)
                        },
                        None => match self.format {
                            OutputFormat::Plain => Err(eyre::eyre!("No value associated with {key}")),
                            OutputFormat::Json | OutputFormat::JsonPretty => {
                                println!("null");
                                Ok(ExitCode::SUCCESS)
                            },
                        },
                    },
                    (Some(value_str), false) => {
                        let value = serde_json::from_str(value_str).unwrap_or_else(|_| json!(value_str));
                        database.settings.set(key, value).await?;
                        Ok(ExitCode::SUCCESS)
                    },
                    (None, true) => match database.settings.remove(key).await? {
                        Some(_) => {
                            println!("Removing {key}");
                            Ok(ExitCode::SUCCESS)
                        },
                        None => Err(eyre::eyre!("No value associated with {key}")),
                    },
                    (Some(_), true) => bail!("Cannot set and delete a value at the same time"),
                }
            },
        }
    }
}
