//! The Mender agent: scanning, oracle-backed fixers, validation, and the run orchestrator.

pub mod context;
pub mod cost;
pub mod fixers;
pub mod learning;
pub mod oracle;
pub mod orchestrator;
pub mod report;
pub mod scan;
pub mod validate;

pub use context::AgentContext;
pub use cost::CostGovernor;
pub use fixers::{FixResult, Fixer};
pub use learning::{LearningPolicy, LearningStore, FIXER_REVISION};
pub use oracle::{ModelCatalog, ModelPrice, ModelTier, OpenRouterOracle, PriceTable};
pub use orchestrator::{Agent, RunReport};
pub use scan::{ScanReport, Scanner};
pub use validate::Validator;
