use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("deckhand/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub usd: Option<String>,
    pub usd_foil: Option<String>,
    pub eur: Option<String>,
    pub tix: Option<String>,
}

/// Read-only projection of a card from the card database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardRecord {
    pub name: String,
    pub mana_cost: Option<String>,
    pub type_line: Option<String>,
    pub oracle_text: Option<String>,
    pub image_url: Option<String>,
    pub prices: Prices,
    pub legalities: BTreeMap<String, String>,
    pub scryfall_uri: Option<String>,
}

impl CardRecord {
    /// One-line price answer, e.g. `Sol Ring: USD $1.50 | EUR €1.20`.
    pub fn price_summary(&self) -> String {
        let parts: Vec<String> = [
            ("USD", "$", &self.prices.usd),
            ("USD foil", "$", &self.prices.usd_foil),
            ("EUR", "€", &self.prices.eur),
            ("TIX", "", &self.prices.tix),
        ]
        .into_iter()
        .filter_map(|(label, symbol, value)| {
            value.as_ref().map(|v| format!("{label} {symbol}{v}"))
        })
        .collect();

        if parts.is_empty() {
            format!("No price data is available for {}.", self.name)
        } else {
            format!("{}: {}", self.name, parts.join(" | "))
        }
    }
}

/// Raw card payload; only the fields we project.
#[derive(Debug, Deserialize)]
struct ScryfallCard {
    name: String,
    mana_cost: Option<String>,
    type_line: Option<String>,
    oracle_text: Option<String>,
    image_uris: Option<ImageUris>,
    #[serde(default)]
    card_faces: Vec<CardFace>,
    #[serde(default)]
    prices: Prices,
    #[serde(default)]
    legalities: BTreeMap<String, String>,
    scryfall_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageUris {
    normal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardFace {
    mana_cost: Option<String>,
    oracle_text: Option<String>,
    image_uris: Option<ImageUris>,
}

impl From<ScryfallCard> for CardRecord {
    fn from(card: ScryfallCard) -> Self {
        // Double-faced cards keep their text and art on the faces.
        let front = card.card_faces.into_iter().next();
        let (face_cost, face_text, face_image) = match front {
            Some(face) => (
                face.mana_cost,
                face.oracle_text,
                face.image_uris.and_then(|i| i.normal),
            ),
            None => (None, None, None),
        };

        CardRecord {
            name: card.name,
            mana_cost: card.mana_cost.or(face_cost),
            type_line: card.type_line,
            oracle_text: card.oracle_text.or(face_text),
            image_url: card.image_uris.and_then(|i| i.normal).or(face_image),
            prices: card.prices,
            legalities: card.legalities,
            scryfall_uri: card.scryfall_uri,
        }
    }
}

#[async_trait]
pub trait CardLookup: Send + Sync {
    /// Fuzzy name lookup. Misses are `Error::NotFound`.
    async fn card_by_name(&self, name: &str) -> Result<CardRecord>;
}

pub struct ScryfallClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScryfallClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CardLookup for ScryfallClient {
    async fn card_by_name(&self, name: &str) -> Result<CardRecord> {
        debug!("Scryfall fuzzy lookup: {}", name);
        let response = self
            .http
            .get(format!("{}/cards/named", self.base_url))
            .header("Accept", "application/json")
            .query(&[("fuzzy", name)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("card '{name}'")));
        }

        let card: ScryfallCard = response.error_for_status()?.json().await?;
        Ok(card.into())
    }
}
