//! Plain-text deck list analysis: per-name counts, singleton duplicates and
//! best-effort name verification against the card database.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::error::Error;
use crate::scryfall::CardLookup;

static ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+(.+)$").expect("invalid deck entry regex"));
// Last parenthetical and anything after it, e.g. " (C21) 263".
static ANNOTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^()]*\)[^()]*$").expect("invalid annotation regex"));

const SINGLETON_NOTE: &str =
    "Note: singleton formats such as Commander allow only one copy of each card except basic lands.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckAnalysis {
    /// Total quantity per card name, case-sensitive.
    pub counts: BTreeMap<String, u32>,
    /// Non-empty lines that were not `<qty> <name>` entries.
    pub ignored: Vec<String>,
    /// Names the card database could not resolve.
    pub not_found: Vec<String>,
}

/// Parse a deck list into per-name totals. Never fails.
pub fn analyze(text: &str) -> DeckAnalysis {
    let mut analysis = DeckAnalysis::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_entry(line) {
            Some((name, quantity)) => {
                let total = analysis.counts.entry(name).or_insert(0);
                *total = total.saturating_add(quantity);
            }
            None => analysis.ignored.push(line.to_string()),
        }
    }

    analysis
}

fn parse_entry(line: &str) -> Option<(String, u32)> {
    let caps = ENTRY_RE.captures(line)?;
    // Digits only, so a parse failure means overflow.
    let quantity = caps[1].parse::<u32>().unwrap_or(u32::MAX);
    if quantity == 0 {
        return None;
    }
    let name = ANNOTATION_RE.replace(&caps[2], "").trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some((name, quantity))
}

impl DeckAnalysis {
    pub fn distinct_cards(&self) -> usize {
        self.counts.len()
    }

    /// Names with more than one copy, alphabetical.
    pub fn duplicates(&self) -> Vec<(&str, u32)> {
        self.counts
            .iter()
            .filter(|(_, qty)| **qty > 1)
            .map(|(name, qty)| (name.as_str(), *qty))
            .collect()
    }

    /// Resolve every distinct name through `cards`, at most `concurrency`
    /// lookups in flight. Any failed lookup lands in `not_found`.
    pub async fn verify(&mut self, cards: &dyn CardLookup, concurrency: usize) {
        let names: Vec<String> = self.counts.keys().cloned().collect();

        let results: Vec<(String, bool)> = stream::iter(names)
            .map(|name| async move {
                match cards.card_by_name(&name).await {
                    Ok(_) => (name, true),
                    Err(Error::NotFound(_)) => (name, false),
                    Err(e) => {
                        warn!("Lookup for '{}' failed: {}", name, e);
                        (name, false)
                    }
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        self.not_found = results
            .into_iter()
            .filter(|(_, found)| !found)
            .map(|(name, _)| name)
            .collect();
    }

    /// Chat-ready report of the analysis.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let distinct = self.distinct_cards();
        let noun = if distinct == 1 { "card" } else { "cards" };
        let _ = writeln!(out, "Your deck contains {distinct} distinct {noun}.");

        let duplicates = self.duplicates();
        if duplicates.is_empty() {
            let _ = writeln!(out, "No card appears more than once.");
        } else {
            let _ = writeln!(out, "Cards with more than one copy:");
            for (name, qty) in &duplicates {
                let _ = writeln!(out, "- {name} ({qty} copies)");
            }
            let _ = writeln!(out, "{SINGLETON_NOTE}");
        }

        if !self.not_found.is_empty() {
            let _ = writeln!(out, "Cards that could not be found:");
            for name in &self.not_found {
                let _ = writeln!(out, "- {name}");
            }
        }

        if !self.ignored.is_empty() {
            let _ = writeln!(out, "{} line(s) were not recognised and were skipped.", self.ignored.len());
        }

        out.trim_end().to_string()
    }
}
