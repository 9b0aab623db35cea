use async_openai::{
    config::OpenAIConfig,
    types::{
        CreateMessageRequestArgs, CreateRunRequestArgs, CreateThreadRequest, MessageContent,
        MessageRole, RunStatus as OpenAiRunStatus,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

/// Lifecycle of one assistant run, as far as the runner cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Any other terminal or error status (failed, cancelled, expired, ...).
    Other(String),
}

impl RunStatus {
    /// Still waiting on the upstream job.
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A thread message reduced to its role and text parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub role: Role,
    pub texts: Vec<String>,
}

/// The thread/message/run primitives of the assistant API.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Open an empty conversation thread and return its id.
    async fn create_thread(&self) -> Result<String>;

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Start a run of `assistant_id` against the thread.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Messages in the order the API returns them (newest first).
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;
}

/// OpenAI Assistants v2 client. The `OpenAI-Beta: assistants=v2` header and
/// bearer auth come from `OpenAIConfig`.
pub struct OpenAiAssistant {
    client: Client<OpenAIConfig>,
}

impl OpenAiAssistant {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| Error::Configuration("OPENAI_API_KEY is not set".to_string()))?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &config.openai_api_base {
            openai_config = openai_config.with_api_base(base);
        }

        info!("Assistant client ready. Assistant: {}", config.assistant_id);
        Ok(Self {
            client: Client::with_config(openai_config),
        })
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistant {
    async fn create_thread(&self) -> Result<String> {
        let thread = self
            .client
            .threads()
            .create(CreateThreadRequest::default())
            .await?;
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let message = CreateMessageRequestArgs::default()
            .role(MessageRole::User)
            .content(content.to_string())
            .build()?;

        self.client
            .threads()
            .messages(thread_id)
            .create(message)
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let request = CreateRunRequestArgs::default()
            .assistant_id(assistant_id)
            .build()?;

        let run = self.client.threads().runs(thread_id).create(request).await?;
        Ok(Run {
            id: run.id,
            status: map_status(run.status),
        })
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run = self.client.threads().runs(thread_id).retrieve(run_id).await?;
        Ok(Run {
            id: run.id,
            status: map_status(run.status),
        })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let response = self
            .client
            .threads()
            .messages(thread_id)
            .list(&[("limit", "20")])
            .await?;

        let messages = response
            .data
            .into_iter()
            .map(|msg| ThreadMessage {
                role: match msg.role {
                    MessageRole::Assistant => Role::Assistant,
                    _ => Role::User,
                },
                // Only text parts carry a reply; images and refusals are dropped.
                texts: msg
                    .content
                    .into_iter()
                    .filter_map(|content| match content {
                        MessageContent::Text(text) => Some(text.text.value),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();

        Ok(messages)
    }
}

fn map_status(status: OpenAiRunStatus) -> RunStatus {
    match status {
        OpenAiRunStatus::Queued => RunStatus::Queued,
        OpenAiRunStatus::InProgress => RunStatus::InProgress,
        OpenAiRunStatus::Completed => RunStatus::Completed,
        other => RunStatus::Other(format!("{other:?}").to_lowercase()),
    }
}
