//! Code-repair oracle: tiers, prices, the HTTP client, prompts, reply parsing.

pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;

pub use client::OpenRouterOracle;
pub use models::{ModelCatalog, ModelPrice, ModelTier, PriceTable};
pub use parse::{apply_edits, interpret_reply, EditOp, ReplyVerdict, NEEDS_HUMAN_REVIEW};
