//! Top-level resolution pipeline.
//!
//! `load_config` wires the stages together: fetch the root node, walk its
//! inheritance chain, reduce the chain in precedence order, then materialize
//! the env map. Each call builds and discards its own chain; overlapping
//! calls share nothing.

use crate::chain::resolve_chain;
use crate::env::{EnvironmentSource, ProcessEnv, fill};
use crate::error::ConfigError;
use crate::merge::reduce;
use crate::node::FilledConfig;
use crate::source::{ConfigSource, Loader, Locator};
use std::path::PathBuf;
use tracing::{debug, info};

/// Env variable consulted for the configuration name when
/// [`LoadOptions::name`] is not set.
pub const CONFIG_NAME_VAR: &str = "config";

/// Options for [`load_config`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Directory holding the configuration documents.
    pub config_dir: PathBuf,
    /// Configuration name; `<name>.yaml` is the root document. Falls back to
    /// the `config` env variable.
    pub name: Option<String>,
    /// Optional absolute prefix for `config_dir`.
    pub base_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            name: None,
            base_dir: None,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// The directory the loader resolves relative locators against.
    pub fn effective_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(&self.config_dir),
            None => self.config_dir.clone(),
        }
    }
}

/// Load, resolve, merge, and fill the named configuration.
pub async fn load_config(options: LoadOptions) -> Result<FilledConfig, ConfigError> {
    let env = ProcessEnv::new();
    let name = match &options.name {
        Some(name) => name.clone(),
        None => env.get(CONFIG_NAME_VAR)?,
    };
    let dir = options.effective_dir();
    info!("loading configuration {} from {}", name, dir.display());

    let loader = Loader::new(dir);
    let root = Locator::config_dir(format!("{}.yaml", name));
    load_config_with(&loader, &env, root).await
}

/// The same pipeline over caller-supplied source and environment seams.
pub async fn load_config_with(
    source: &dyn ConfigSource,
    env: &dyn EnvironmentSource,
    root: Locator,
) -> Result<FilledConfig, ConfigError> {
    let root_node = source.fetch(&root).await?;
    let chain = resolve_chain(source, root_node).await?;
    debug!("merging {} chain nodes", chain.len());
    let merged = reduce(chain);
    let filled = fill(merged, env).await?;
    Ok(filled)
}

/// Ordered-candidate lookup: resolve candidates in turn and return the first
/// filled configuration the matcher accepts.
///
/// The current match is cached; a later call whose matcher still accepts it
/// returns the cached value without fetching. Fetch failures propagate; a
/// broken candidate is an error, not a skip.
#[derive(Default)]
pub struct ConfigManager {
    candidates: Vec<Locator>,
    current: Option<FilledConfig>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_candidate(&mut self, locator: Locator) {
        self.candidates.push(locator);
    }

    pub fn add_candidates(&mut self, locators: impl IntoIterator<Item = Locator>) {
        self.candidates.extend(locators);
    }

    /// The most recent match, if any.
    pub fn current(&self) -> Option<&FilledConfig> {
        self.current.as_ref()
    }

    pub async fn load_matching(
        &mut self,
        source: &dyn ConfigSource,
        env: &dyn EnvironmentSource,
        matcher: impl Fn(&FilledConfig) -> bool,
    ) -> Result<FilledConfig, ConfigError> {
        if let Some(current) = &self.current
            && matcher(current)
        {
            debug!("current configuration still matches, skipping lookup");
            return Ok(current.clone());
        }

        for locator in &self.candidates {
            let filled = load_config_with(source, env, locator.clone()).await?;
            if matcher(&filled) {
                info!("configuration candidate {} matched", locator);
                self.current = Some(filled.clone());
                return Ok(filled);
            }
        }
        Err(ConfigError::NotFound {
            searched: self.candidates.len(),
        })
    }
}
