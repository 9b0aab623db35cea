use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("deckhand/", env!("CARGO_PKG_VERSION"));

static DECK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("invalid deck id regex"));
static DECK_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?moxfield\.com/decks/([A-Za-z0-9_-]+)/?(?:[?#].*)?$")
        .expect("invalid deck url regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckCard {
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckRecord {
    pub name: String,
    pub commanders: Vec<DeckCard>,
    pub mainboard: Vec<DeckCard>,
}

impl DeckRecord {
    /// Plain-text deck list, one `<qty> <name>` per line, commanders first.
    pub fn to_deck_list(&self) -> String {
        self.commanders
            .iter()
            .chain(&self.mainboard)
            .map(|c| format!("{} {}", c.quantity, c.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Prompt asking the assistant for improvement suggestions.
    pub fn recommendation_prompt(&self) -> String {
        let commanders = if self.commanders.is_empty() {
            "none listed".to_string()
        } else {
            self.commanders
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "Review the Commander deck \"{}\" (commanders: {}). \
             Suggest cards to add and cards to cut, with a short reason for each.\n\nDeck list:\n{}",
            self.name,
            commanders,
            self.to_deck_list()
        )
    }
}

/// Validate a bare deck id.
pub fn parse_deck_id(raw: &str) -> Result<String> {
    let id = raw.trim();
    if DECK_ID_RE.is_match(id) {
        Ok(id.to_string())
    } else {
        Err(Error::Validation(format!("Invalid deck id: '{id}'")))
    }
}

/// Pull the deck id out of a `moxfield.com/decks/<id>` URL.
pub fn deck_id_from_url(url: &str) -> Result<String> {
    DECK_URL_RE
        .captures(url.trim())
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::Validation(format!("Not a Moxfield deck URL: '{}'", url.trim())))
}

#[derive(Debug, Deserialize)]
struct MoxfieldDeck {
    name: String,
    #[serde(default)]
    commanders: HashMap<String, BoardEntry>,
    #[serde(default)]
    mainboard: HashMap<String, BoardEntry>,
}

#[derive(Debug, Deserialize)]
struct BoardEntry {
    quantity: u32,
    card: Option<BoardCard>,
}

#[derive(Debug, Deserialize)]
struct BoardCard {
    name: String,
}

fn board(entries: HashMap<String, BoardEntry>) -> Vec<DeckCard> {
    let mut cards: Vec<DeckCard> = entries
        .into_iter()
        .map(|(key, entry)| DeckCard {
            name: entry.card.map(|c| c.name).unwrap_or(key),
            quantity: entry.quantity,
        })
        .collect();
    cards.sort_by(|a, b| a.name.cmp(&b.name));
    cards
}

impl From<MoxfieldDeck> for DeckRecord {
    fn from(deck: MoxfieldDeck) -> Self {
        DeckRecord {
            name: deck.name,
            commanders: board(deck.commanders),
            mainboard: board(deck.mainboard),
        }
    }
}

#[async_trait]
pub trait DeckLookup: Send + Sync {
    /// Fetch a public deck. Unknown ids are `Error::NotFound`.
    async fn deck_by_id(&self, deck_id: &str) -> Result<DeckRecord>;
}

pub struct MoxfieldClient {
    http: reqwest::Client,
    base_url: String,
}

impl MoxfieldClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DeckLookup for MoxfieldClient {
    async fn deck_by_id(&self, deck_id: &str) -> Result<DeckRecord> {
        debug!("Moxfield deck lookup: {}", deck_id);
        let response = self
            .http
            .get(format!("{}/v2/decks/all/{}", self.base_url, deck_id))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("deck '{deck_id}'")));
        }

        let deck: MoxfieldDeck = response.error_for_status()?.json().await?;
        Ok(deck.into())
    }
}
