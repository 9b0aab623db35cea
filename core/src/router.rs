use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::analyzer;
use crate::error::{Error, Result};
use crate::runtime::JobRunner;
use crate::scryfall::CardLookup;

// Each pattern captures the card name; first match wins. Triggers may sit
// anywhere in the question.
static PRICE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // "how much does X cost in euros?" -> X
        r"(?i)\bhow\s+much\s+(?:does|do|is|are|would)\s+(.+?)\s+(?:cost|worth|go\s+for)\b",
        // "... the price of X?" -> X
        r"(?i)\b(?:price|cost)\s+(?:of|for)\s+(.+?)\s*(?:[?!]|\.?\s*$)",
        // "how much is X?" -> X
        r"(?i)\bhow\s+much\s+(?:is|are)\s+(.+?)\s*(?:[?!]|\.?\s*$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid price regex"))
    .collect()
});
static DECK_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s+.+$").expect("invalid deck line regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    PriceQuery { card_name: String },
    DeckList,
    GeneralQuestion,
}

/// Classify a question. Anything unrecognised is a general question.
pub fn classify(question: &str) -> Intent {
    if let Some(card_name) = price_target(question) {
        return Intent::PriceQuery { card_name };
    }

    let mut lines = question.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
    if lines.peek().is_some() && lines.all(|l| DECK_LINE_RE.is_match(l)) {
        return Intent::DeckList;
    }

    Intent::GeneralQuestion
}

fn price_target(question: &str) -> Option<String> {
    PRICE_RES.iter().find_map(|re| {
        let caps = re.captures(question)?;
        let name = caps[1].trim().trim_matches(|c| c == '"' || c == '\'').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Answers free-text questions by intent.
#[derive(Clone)]
pub struct QuestionRouter {
    cards: Arc<dyn CardLookup>,
    runner: JobRunner,
    verify_concurrency: usize,
}

impl QuestionRouter {
    pub fn new(cards: Arc<dyn CardLookup>, runner: JobRunner, verify_concurrency: usize) -> Self {
        Self {
            cards,
            runner,
            verify_concurrency,
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Validation("The question cannot be empty.".to_string()));
        }

        let intent = classify(question);
        info!("Question classified as {:?}", intent);

        match intent {
            Intent::PriceQuery { card_name } => match self.cards.card_by_name(&card_name).await {
                Ok(card) => Ok(card.price_summary()),
                Err(Error::NotFound(_)) => {
                    Ok(format!("I couldn't find a card named \"{card_name}\"."))
                }
                Err(e) => Err(e),
            },
            Intent::DeckList => {
                let mut analysis = analyzer::analyze(question);
                analysis
                    .verify(self.cards.as_ref(), self.verify_concurrency)
                    .await;
                Ok(analysis.summary())
            }
            Intent::GeneralQuestion => self.runner.run(question).await,
        }
    }
}
