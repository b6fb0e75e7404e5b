//! Unified error handling for the orchestration engine.
//!
//! Three kinds of failure leave this crate:
//! - configuration errors, raised while registering extensions or building
//!   the command table; the engine must not start serving events;
//! - core errors, raised by the dispatcher's own persistence step; the
//!   engine reports them and shuts down;
//! - collaborator errors from the platform client or the store, wrapped so
//!   callers can tell them apart.
//!
//! Handler failures never surface here: they are [`ExtensionError`]s and are
//! contained by the isolation boundary.
//!
//! [`ExtensionError`]: crate::extension::ExtensionError

use crate::platform::PlatformError;
use crate::storage::StorageError;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fatal misconfiguration detected at registration or build time.
    #[error("Configuration error: {message}, check `{path}`")]
    Configuration { message: String, path: String },

    /// Failure inside the dispatcher's own persistence step.
    #[error("Core error while handling {event}: {source}")]
    Core {
        event: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The engine was shut down and refuses further work.
    #[error("Engine is shut down")]
    ShutDown,

    /// Platform client failure outside of the persistence step.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Store failure outside of the persistence step.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config could not be written back as TOML.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Build a configuration error pointing at a config path.
    pub fn config(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Wrap a collaborator failure raised while persisting `event`.
    pub fn core(
        event: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Core {
            event: event.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error must stop the engine.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Core { .. } | Self::ShutDown
        )
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience macro for creating configuration errors.
#[macro_export]
macro_rules! config_err {
    ($path:expr, $msg:expr) => {
        $crate::error::Error::config($msg, $path)
    };
    ($path:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::config(format!($fmt, $($arg)*), $path)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = config_err!("commands.stats", "Command handler not found for {}", "stats");
        assert_eq!(
            err.to_string(),
            "Configuration error: Command handler not found for stats, check `commands.stats`"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_core_error_keeps_source() {
        let err = Error::core("message-created", StorageError::Backend("disk full".into()));
        assert!(err.is_fatal());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Backend error: disk full"));
    }

    #[test]
    fn test_collaborator_errors_are_not_fatal() {
        let err: Error = PlatformError::NotFound("member 1".into()).into();
        assert!(!err.is_fatal());
    }
}
