//! Question routing, deck analysis and assistant orchestration behind the
//! deckhand gateway.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod llm;
pub mod mock;
pub mod moxfield;
pub mod router;
pub mod runtime;
pub mod scryfall;

pub use config::{Config, PollPolicy};
pub use error::{Error, Result};
