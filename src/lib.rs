pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod fetch;
pub mod filter;
pub mod gate;
pub mod logging;
pub mod models;
pub mod output;
pub mod query;
pub mod sort;
pub mod things;
pub mod undo;
pub mod utils;
pub mod verify;

pub use action_log::ActionLog;
pub use config::Config;
pub use database::Store;
pub use models::{Area, Project, Status, Tag, Task};
pub use utils::Profile;
