//! Scripted upstreams for tests. Each one counts its calls so tests can
//! assert how much traffic a request generated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::llm::{AssistantApi, Role, Run, RunStatus, ThreadMessage};
use crate::moxfield::{DeckLookup, DeckRecord};
use crate::scryfall::{CardLookup, CardRecord, Prices};

/// Assistant that walks a fixed status script and then serves fixed messages.
///
/// The first status is returned by `create_run`, the rest by successive
/// `retrieve_run` calls. The last status repeats once the script runs out.
pub struct ScriptedAssistant {
    statuses: Vec<RunStatus>,
    messages: Vec<ThreadMessage>,
    fail_create_thread: bool,
    calls: AtomicUsize,
    polls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAssistant {
    pub fn new(statuses: Vec<RunStatus>, messages: Vec<ThreadMessage>) -> Self {
        Self {
            statuses,
            messages,
            fail_create_thread: false,
            calls: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Completes immediately with a single assistant reply.
    pub fn replying(text: &str) -> Self {
        Self::new(
            vec![RunStatus::Completed],
            vec![ThreadMessage {
                role: Role::Assistant,
                texts: vec![text.to_string()],
            }],
        )
    }

    /// Fails on the first call, like an unreachable API.
    pub fn unreachable() -> Self {
        Self {
            fail_create_thread: true,
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    /// Total upstream calls of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `retrieve_run` calls.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn status_at(&self, i: usize) -> RunStatus {
        self.statuses
            .get(i)
            .or_else(|| self.statuses.last())
            .cloned()
            .unwrap_or(RunStatus::Completed)
    }
}

#[async_trait]
impl AssistantApi for ScriptedAssistant {
    async fn create_thread(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_thread {
            return Err(Error::Upstream("connection refused".to_string()));
        }
        Ok("thread_test".to_string())
    }

    async fn add_user_message(&self, _thread_id: &str, content: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(content.to_string());
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<Run> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Run {
            id: "run_test".to_string(),
            status: self.status_at(0),
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Run {
            id: run_id.to_string(),
            status: self.status_at(poll),
        })
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.messages.clone())
    }
}

/// Card database holding a fixed set of cards, matched case-insensitively.
#[derive(Default)]
pub struct StaticCards {
    cards: HashMap<String, CardRecord>,
    calls: AtomicUsize,
}

impl StaticCards {
    pub fn new(cards: Vec<CardRecord>) -> Self {
        Self {
            cards: cards
                .into_iter()
                .map(|c| (c.name.to_lowercase(), c))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Cards with only a name and a USD price.
    pub fn priced(entries: &[(&str, &str)]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|&(name, usd)| card(name, Some(usd)))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Minimal card record for fixtures.
pub fn card(name: &str, usd: Option<&str>) -> CardRecord {
    CardRecord {
        name: name.to_string(),
        mana_cost: None,
        type_line: None,
        oracle_text: None,
        image_url: None,
        prices: Prices {
            usd: usd.map(str::to_string),
            ..Prices::default()
        },
        legalities: Default::default(),
        scryfall_uri: None,
    }
}

#[async_trait]
impl CardLookup for StaticCards {
    async fn card_by_name(&self, name: &str) -> Result<CardRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cards
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("card '{name}'")))
    }
}

#[derive(Default)]
pub struct StaticDecks {
    decks: HashMap<String, DeckRecord>,
    calls: AtomicUsize,
}

impl StaticDecks {
    pub fn new(decks: Vec<(&str, DeckRecord)>) -> Self {
        Self {
            decks: decks
                .into_iter()
                .map(|(id, deck)| (id.to_string(), deck))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeckLookup for StaticDecks {
    async fn deck_by_id(&self, deck_id: &str) -> Result<DeckRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decks
            .get(deck_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("deck '{deck_id}'")))
    }
}
