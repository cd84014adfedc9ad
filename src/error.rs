//! Error types for configuration resolution and schema inference.
//!
//! Each concern gets its own enum; `ConfigError` is the umbrella type the
//! entry points return. The only recoverable class is a missing environment
//! variable, and only through the fallback policy attached to the resolver
//! that asked for it. Everything else propagates with enough context
//! (locator, key, direction) to diagnose without re-running.

use crate::source::Locator;
use thiserror::Error;

/// Environment lookup and resolution errors.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The variable is absent from the process environment and the `.env`
    /// fallback. Recoverable per the resolver's fallback policy.
    #[error("missing {0} env variable")]
    Missing(String),

    /// Any other lookup or parse failure. Never policy-overridden.
    #[error("critical env failure for {name}: {reason}")]
    Critical { name: String, reason: String },

    /// An `or_exit` resolver fired. The library never exits the process
    /// itself; the top-level caller is responsible for turning this into
    /// an actual exit.
    #[error("mandatory env variable {name} is missing")]
    Exit {
        name: String,
        message: Option<String>,
    },

    /// An `or_throw` resolver fired with its caller-supplied message.
    #[error("{message}")]
    Fallback { name: String, message: String },
}

impl EnvError {
    pub fn critical(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Critical {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the configured fallback policy should engage.
    pub fn is_missing(&self) -> bool {
        matches!(self, EnvError::Missing(_))
    }
}

/// Failures fetching or decoding a configuration node from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The locator points at nothing (file absent, HTTP 404).
    #[error("configuration not found at {0}")]
    NotFound(String),

    /// The locator resolved to content that does not decode into a node.
    #[error("malformed configuration at {location}: {reason}")]
    Malformed { location: String, reason: String },

    /// IO or transport failure (unreadable file, unreachable remote).
    #[error("failed to fetch configuration from {location}: {reason}")]
    Transport { location: String, reason: String },
}

impl SourceError {
    pub fn malformed(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

/// Direction of a chain walk, for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDirection {
    Child,
    Parent,
}

impl std::fmt::Display for WalkDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkDirection::Child => write!(f, "child"),
            WalkDirection::Parent => write!(f, "parent"),
        }
    }
}

/// Failures while walking `parent`/`child` links into a chain.
///
/// Any of these aborts the whole resolution; there is no partial merge of a
/// truncated chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{direction} fetch failed at rank {rank} ({locator}): {source}")]
    Fetch {
        direction: WalkDirection,
        rank: i32,
        locator: Locator,
        source: SourceError,
    },

    #[error("{direction} chain revisits {locator}")]
    Cycle {
        direction: WalkDirection,
        locator: Locator,
    },

    #[error("{direction} chain exceeds {max} nodes")]
    DepthExceeded { direction: WalkDirection, max: usize },
}

/// A sample contained a value the inference engine cannot describe.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema root must be an object, got {0}")]
    NonObjectRoot(&'static str),

    #[error("sample is not plain data: {0}")]
    NotPlainData(String),

    #[error("failed to write schema artifact {path}: {reason}")]
    Artifact { path: String, reason: String },
}

/// Umbrella error for the `load_config` / manager entry points.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No candidate satisfied the matcher.
    #[error("no matching configuration among {searched} candidates")]
    NotFound { searched: usize },
}
