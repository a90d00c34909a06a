//! Per-user conversation state machine.
//!
//! A user's first message opens a session holding the page URL and asks
//! whether the PDF should be renamed. Replies walk the session through its
//! phases; 60 seconds of silence abandon it. Every phase change and timer
//! check happens under one lock, and each armed timer captures the session
//! generation current at arm time, so a timer that lost the race to a user
//! reply can never fire against a newer state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::channels::Channel;

pub const PROMPT_RENAME: &str = "Do you want to rename the PDF file? (yes/no)";
pub const PROMPT_NEW_NAME: &str =
    "Please enter the new name for the PDF file (without extension):";
pub const NOTICE_TIMEOUT: &str =
    "You did not respond in time. The renaming process has been aborted.";

/// Work order handed to the document pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub url: String,
    /// Base filename without extension.
    pub output_name: String,
    pub chat_id: String,
}

/// Seam between the dialog layer and the document pipeline.
///
/// Implementations must not fail past this boundary; any error is reported
/// to the user inside the run.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(&self, request: GenerateRequest);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingRenameChoice,
    AwaitingNewName,
}

#[derive(Debug)]
struct SessionEntry {
    phase: Phase,
    pending_url: String,
    chat_id: String,
    /// Generation the currently armed timer was issued for. Bumped on every
    /// transition, which logically cancels that timer.
    generation: u64,
}

/// Dialog state for all users, keyed by user id.
pub struct Conversations {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    /// Monotonic source of timer generations. Never reused across sessions,
    /// so a timer armed for a destroyed session cannot match a new one.
    clock: AtomicU64,
    timeout: Duration,
    default_output_name: String,
    channel: Arc<dyn Channel>,
    generator: Arc<dyn DocumentGenerator>,
}

impl Conversations {
    pub fn new(
        channel: Arc<dyn Channel>,
        generator: Arc<dyn DocumentGenerator>,
        timeout: Duration,
        default_output_name: String,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            clock: AtomicU64::new(0),
            timeout,
            default_output_name,
            channel,
            generator,
        }
    }

    /// Feed one inbound text message into the user's dialog.
    ///
    /// When the dialog completes, the pipeline run is awaited in full before
    /// this returns, so a later message from the same user always starts a
    /// fresh session.
    pub async fn on_message(&self, user_id: &str, chat_id: &str, text: &str) {
        enum Action {
            Prompt(&'static str, u64),
            Generate(GenerateRequest),
        }

        let action = {
            let mut sessions = self.sessions.lock().await;
            // Taking the entry out bumps nothing yet; re-inserting below is
            // what re-arms, and both happen under this lock.
            match sessions.remove(user_id) {
                None => {
                    let generation = self.clock.fetch_add(1, Ordering::Relaxed);
                    sessions.insert(
                        user_id.to_string(),
                        SessionEntry {
                            phase: Phase::AwaitingRenameChoice,
                            pending_url: text.to_string(),
                            chat_id: chat_id.to_string(),
                            generation,
                        },
                    );
                    Action::Prompt(PROMPT_RENAME, generation)
                }
                Some(mut entry) => match entry.phase {
                    Phase::AwaitingRenameChoice if text.eq_ignore_ascii_case("yes") => {
                        let generation = self.clock.fetch_add(1, Ordering::Relaxed);
                        entry.phase = Phase::AwaitingNewName;
                        entry.generation = generation;
                        sessions.insert(user_id.to_string(), entry);
                        Action::Prompt(PROMPT_NEW_NAME, generation)
                    }
                    // Anything but "yes" means "no"
                    Phase::AwaitingRenameChoice => Action::Generate(GenerateRequest {
                        url: entry.pending_url,
                        output_name: self.default_output_name.clone(),
                        chat_id: entry.chat_id,
                    }),
                    Phase::AwaitingNewName => Action::Generate(GenerateRequest {
                        url: entry.pending_url,
                        output_name: text.to_string(),
                        chat_id: entry.chat_id,
                    }),
                },
            }
        };

        match action {
            Action::Prompt(prompt, generation) => {
                if let Err(error) = self.channel.send(prompt, chat_id).await {
                    tracing::warn!(user_id, %error, "failed to send dialog prompt");
                }
                self.arm_timer(user_id.to_string(), generation);
            }
            Action::Generate(request) => {
                tracing::info!(user_id, url = %request.url, output = %request.output_name,
                    "dialog complete, generating document");
                self.generator.generate(request).await;
            }
        }
    }

    /// Arm the abandonment timer for `generation`.
    ///
    /// The timer only acts if the session still exists with that exact
    /// generation when it fires; otherwise a user reply won the race and the
    /// timer is a no-op.
    fn arm_timer(&self, user_id: String, generation: u64) {
        let sessions = Arc::clone(&self.sessions);
        let channel = Arc::clone(&self.channel);
        let timeout = self.timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let expired = {
                let mut sessions = sessions.lock().await;
                match sessions.get(&user_id) {
                    Some(entry) if entry.generation == generation => sessions.remove(&user_id),
                    _ => None,
                }
            };

            if let Some(entry) = expired {
                tracing::info!(%user_id, "dialog abandoned after timeout");
                if let Err(error) = channel.send(NOTICE_TIMEOUT, &entry.chat_id).await {
                    tracing::warn!(%user_id, %error, "failed to send timeout notice");
                }
            }
        });
    }
}
