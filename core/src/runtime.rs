use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{Error, Result};
use crate::llm::{AssistantApi, Role, RunStatus};

/// Returned when a run finishes without a usable assistant reply.
pub const FALLBACK_REPLY: &str = "The assistant did not generate a response.";

/// One assistant invocation. Lives for a single request and is never reused.
#[derive(Debug, Clone)]
pub struct Job {
    pub thread_id: String,
    pub run_id: String,
    pub status: RunStatus,
}

/// Drives the thread -> message -> run -> poll -> read sequence.
#[derive(Clone)]
pub struct JobRunner {
    api: Arc<dyn AssistantApi>,
    assistant_id: String,
    policy: PollPolicy,
}

impl JobRunner {
    pub fn new(api: Arc<dyn AssistantApi>, assistant_id: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            api,
            assistant_id: assistant_id.into(),
            policy,
        }
    }

    /// Ask the assistant and return its first text reply, or [`FALLBACK_REPLY`].
    pub async fn run(&self, prompt: &str) -> Result<String> {
        // 1. Open a fresh thread
        let thread_id = self.api.create_thread().await?;

        // 2. Post the prompt
        self.api.add_user_message(&thread_id, prompt).await?;

        // 3. Start the run
        let run = self.api.create_run(&thread_id, &self.assistant_id).await?;
        let mut job = Job {
            thread_id,
            run_id: run.id,
            status: run.status,
        };
        info!("Started run {} on thread {}", job.run_id, job.thread_id);

        // 4. Wait for it to leave queued/in_progress
        self.wait(&mut job).await?;

        // 5. Read the reply
        if job.status != RunStatus::Completed {
            warn!("Run {} ended with status {:?}", job.run_id, job.status);
            return Ok(FALLBACK_REPLY.to_string());
        }

        let messages = self.api.list_messages(&job.thread_id).await?;
        let reply = messages
            .into_iter()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.texts.into_iter().next());

        Ok(reply.unwrap_or_else(|| FALLBACK_REPLY.to_string()))
    }

    async fn wait(&self, job: &mut Job) -> Result<()> {
        let mut attempts = 0;
        while job.status.is_pending() {
            if attempts >= self.policy.max_attempts {
                warn!("Run {} still {:?} after {} polls", job.run_id, job.status, attempts);
                return Err(Error::Timeout { attempts });
            }
            tokio::time::sleep(self.policy.interval).await;
            attempts += 1;

            job.status = self.api.retrieve_run(&job.thread_id, &job.run_id).await?.status;
            debug!("Run {} poll #{}: {:?}", job.run_id, attempts, job.status);
        }
        Ok(())
    }
}
