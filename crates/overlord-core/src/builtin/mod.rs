//! Extensions shipped with the engine.

mod config;
mod utility;

pub use config::{ConfigExtension, CONFIG_EXTENSION};
pub use utility::{UtilityExtension, USER_SYNC_TASK, UTILITY_EXTENSION};

/// Replies of the built-in commands.
pub mod replies {
    pub const BUSY: &str = "Busy";
    pub const PONG: &str = "Pong";
    pub const SYNC_BEGIN: &str = "Syncing users and roles...";
    pub const DONE: &str = "Done";
    pub const NOT_FOUND: &str = "No such extension";
    pub const CANNOT_STOP_SELF: &str = "Utility extension cannot stop itself";
    pub const UNCHANGED: &str = "Nothing to do";
    pub const CONFIG_VALUE_HEADER: &str = "Config value:";
    pub const INVALID_CONFIG_PATH: &str = "Invalid config path";
    pub const INVALID_JSON_VALUE: &str = "Invalid JSON value";
    pub const CONFIG_REVERTED: &str = "Config reverted";
}
