//! Runtime adapters for Mender (git, config, tools, persistence).

pub mod config;
pub mod git_ops;
pub mod store;
pub mod tools;
pub mod util;

pub use config::{AgentConfig, ToolCommands, UserConfig};
pub use git_ops::GitRepo;
pub use store::Store;
pub use tools::CommandToolchain;
