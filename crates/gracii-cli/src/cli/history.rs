use std::process::ExitCode;

use anstream::println;
use clap::Args;
use crossterm::style::Stylize;
use eyre::Result;

use super::OutputFormat;
use crate::api_client::ApiClient;
use crate::api_client::model::HistoryEntry;
use crate::database::Database;

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct HistoryArgs {
    /// Id of the conversation, as logged when a chat starts
    conversation_id: String,
    /// Address of the chat backend
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Format of the output
    #[arg(long, short, value_enum, default_value_t)]
    format: OutputFormat,
}

impl HistoryArgs {
    pub async fn execute(self, database: &Database) -> Result<ExitCode> {
        let client = ApiClient::from_settings(self.endpoint.as_deref(), &database.settings)?;
        let history = client.get_history(&self.conversation_id).await?;
        self.format.print(|| render_history(&history), || &history)?;
        Ok(ExitCode::SUCCESS)
    }
}

fn render_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "No messages in this conversation.".dark_grey().to_string();
    }

    history
        .iter()
        .map(|entry| {
            let role = match entry.role.as_str() {
                "user" => "user".magenta().bold(),
                role => role.green().bold(),
            };
            format!("{role}: {}", entry.text())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DeleteArgs {
    /// Id of the conversation to delete on the backend
    conversation_id: String,
    /// Address of the chat backend
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Format of the output
    #[arg(long, short, value_enum, default_value_t)]
    format: OutputFormat,
}

impl DeleteArgs {
    pub async fn execute(self, database: &Database) -> Result<ExitCode> {
        let client = ApiClient::from_settings(self.endpoint.as_deref(), &database.settings)?;
        let response = client.delete_conversation(&self.conversation_id).await?;
        self.format.print(
            || format!("Deleted conversation {}", response.conversation_id.as_str().cyan()),
            || &response,
        )?;
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_history() {
        let history: Vec<HistoryEntry> = serde_json::from_value(serde_json::json!([
            { "role": "user", "content": "hi" },
            { "role": "assistant", "content": [{ "type": "text", "text": "hello" }] },
        ]))
        .unwrap();

        let rendered = render_history(&history);
        assert!(rendered.contains("hi"));
        assert!(rendered.contains("hello"));
        assert_eq!(rendered.lines().count(), 2);
    }

    #[test]
    fn test_render_empty_history() {
        assert!(render_history(&[]).contains("No messages"));
    }

    #[tokio::test]
    async fn test_delete_unknown_conversation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/chat/missing")
            .with_status(404)
            .create_async()
            .await;

        let database = Database::new().await.unwrap();
        let args = DeleteArgs {
            conversation_id: "missing".to_string(),
            endpoint: Some(server.url()),
            format: OutputFormat::Plain,
        };
        let err = args.execute(&database).await.unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");
    }
}
