//! Configuration sources.
//!
//! A [`Locator`] names where a node lives; a [`ConfigSource`] turns a locator
//! into a [`ConfigNode`]. The engine never looks inside a locator beyond
//! handing it to `fetch`, so new origins slot in behind the trait.
//!
//! Documents are YAML by default; a `.json` extension switches to JSON.

use crate::error::SourceError;
use crate::node::ConfigNode;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NOTION_VERSION: &str = "2022-06-28";

/// Where a configuration node lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Path relative to the loader's configuration directory.
    ConfigDir { path: String },
    /// Absolute local path.
    AbsolutePath { path: String },
    /// Plain HTTP(S) document.
    Url { url: String },
    /// File in a GitHub repository, fetched through the contents API.
    Github {
        owner: String,
        repo: String,
        path: String,
        /// Name of the env variable holding the API token, if auth is needed.
        #[serde(default)]
        token_env: Option<String>,
    },
    /// Code block in a Notion page; the block id is the URL fragment.
    Notion {
        block_url: String,
        /// Name of the env variable holding the integration token.
        token_env: Option<String>,
    },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::ConfigDir { path } => write!(f, "config-dir:{}", path),
            Locator::AbsolutePath { path } => write!(f, "{}", path),
            Locator::Url { url } => write!(f, "{}", url),
            Locator::Github {
                owner, repo, path, ..
            } => write!(f, "github:{}/{}/{}", owner, repo, path),
            Locator::Notion { block_url, .. } => write!(f, "notion:{}", block_url),
        }
    }
}

impl Locator {
    pub fn config_dir(path: impl Into<String>) -> Self {
        Locator::ConfigDir { path: path.into() }
    }

    pub fn absolute(path: impl Into<String>) -> Self {
        Locator::AbsolutePath { path: path.into() }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Locator::Url { url: url.into() }
    }
}

/// Asynchronous node fetch. Implementations must fail distinguishably
/// between "not found" and "found but malformed".
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self, locator: &Locator) -> Result<ConfigNode, SourceError>;
}

/// Decode a fetched document into a node. JSON when the location ends in
/// `.json`, YAML otherwise.
fn decode_document(location: &str, text: &str) -> Result<ConfigNode, SourceError> {
    if location.ends_with(".json") {
        serde_json::from_str(text).map_err(|e| SourceError::malformed(location, e))
    } else {
        serde_yaml::from_str(text).map_err(|e| SourceError::malformed(location, e))
    }
}

/// Production source: local files plus remote HTTP origins.
#[derive(Debug, Clone)]
pub struct Loader {
    config_dir: PathBuf,
    http: reqwest::Client,
}

impl Loader {
    /// A loader resolving `ConfigDir` locators against `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("config-loom/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config_dir: config_dir.into(),
            http,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn read_file(&self, path: &Path) -> Result<ConfigNode, SourceError> {
        let location = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(location.clone())
            } else {
                SourceError::transport(location.clone(), e)
            }
        })?;
        let node = decode_document(&location, &text)?;
        debug!("loaded config from {}", location);
        Ok(node)
    }

    async fn fetch_url(&self, url: &str) -> Result<ConfigNode, SourceError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::transport(url, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(SourceError::transport(
                url,
                format!("HTTP {}", response.status()),
            ));
        }
        let text = response
            .text()
            .await
            .map_err(|e| SourceError::transport(url, e))?;
        decode_document(url, &text)
    }

    fn bearer_token(location: &str, token_env: &Option<String>) -> Result<Option<String>, SourceError> {
        match token_env {
            None => Ok(None),
            Some(name) => std::env::var(name).map(Some).map_err(|_| {
                SourceError::transport(location, format!("token env variable {} is not set", name))
            }),
        }
    }

    async fn fetch_github(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        token_env: &Option<String>,
    ) -> Result<ConfigNode, SourceError> {
        #[derive(Deserialize)]
        struct Content {
            content: String,
        }

        let location = format!("github:{}/{}/{}", owner, repo, path);
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}",
            owner, repo, path
        );

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = Self::bearer_token(&location, token_env)? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::transport(&location, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(location));
        }
        if !response.status().is_success() {
            return Err(SourceError::transport(
                &location,
                format!("HTTP {}", response.status()),
            ));
        }

        let body: Content = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(&location, e))?;
        // The contents API wraps base64 at 60 columns.
        let packed: String = body.content.split_whitespace().collect();
        let bytes = BASE64
            .decode(packed)
            .map_err(|e| SourceError::malformed(&location, e))?;
        let text =
            String::from_utf8(bytes).map_err(|e| SourceError::malformed(&location, e))?;
        let node = decode_document(&location, &text)?;
        info!("loaded config from {}", location);
        Ok(node)
    }

    async fn fetch_notion(
        &self,
        block_url: &str,
        token_env: &Option<String>,
    ) -> Result<ConfigNode, SourceError> {
        #[derive(Deserialize)]
        struct Block {
            code: Code,
        }
        #[derive(Deserialize)]
        struct Code {
            rich_text: Vec<RichText>,
        }
        #[derive(Deserialize)]
        struct RichText {
            plain_text: String,
        }

        let location = format!("notion:{}", block_url);
        let block_id = block_id_from_url(block_url)
            .ok_or_else(|| SourceError::malformed(&location, "no block id in URL fragment"))?;

        let url = format!("https://api.notion.com/v1/blocks/{}", block_id);
        let mut request = self.http.get(&url).header("Notion-Version", NOTION_VERSION);
        if let Some(token) = Self::bearer_token(&location, token_env)? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::transport(&location, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(location));
        }
        if !response.status().is_success() {
            return Err(SourceError::transport(
                &location,
                format!("HTTP {}", response.status()),
            ));
        }

        let block: Block = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(&location, e))?;
        let text = block
            .code
            .rich_text
            .first()
            .map(|t| t.plain_text.as_str())
            .ok_or_else(|| SourceError::malformed(&location, "code block has no text"))?;
        let node = decode_document(&location, text)?;
        info!("loaded config from {}", location);
        Ok(node)
    }
}

#[async_trait]
impl ConfigSource for Loader {
    async fn fetch(&self, locator: &Locator) -> Result<ConfigNode, SourceError> {
        match locator {
            Locator::ConfigDir { path } => self.read_file(&self.config_dir.join(path)),
            Locator::AbsolutePath { path } => self.read_file(Path::new(path)),
            Locator::Url { url } => self.fetch_url(url).await,
            Locator::Github {
                owner,
                repo,
                path,
                token_env,
            } => self.fetch_github(owner, repo, path, token_env).await,
            Locator::Notion {
                block_url,
                token_env,
            } => self.fetch_notion(block_url, token_env).await,
        }
    }
}

/// Extract the block id from a Notion URL fragment (`...#<id>`).
fn block_id_from_url(url: &str) -> Option<&str> {
    let re = Regex::new(r"#([\w-]+)$").expect("block id pattern is valid");
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// In-memory source for programmatic chains and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    nodes: HashMap<Locator, ConfigNode>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, locator: Locator, node: ConfigNode) -> Self {
        self.nodes.insert(locator, node);
        self
    }

    pub fn insert(&mut self, locator: Locator, node: ConfigNode) {
        self.nodes.insert(locator, node);
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    async fn fetch(&self, locator: &Locator) -> Result<ConfigNode, SourceError> {
        self.nodes
            .get(locator)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(locator.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_deserializes_tagged_yaml() {
        let yaml = "kind: config_dir\npath: base.yaml\n";
        let locator: Locator = serde_yaml::from_str(yaml).expect("locator should parse");
        assert_eq!(locator, Locator::config_dir("base.yaml"));

        let yaml = r#"
kind: github
owner: example
repo: configs
path: prod.yaml
token_env: GITHUB_TOKEN
"#;
        let locator: Locator = serde_yaml::from_str(yaml).expect("locator should parse");
        assert!(matches!(locator, Locator::Github { .. }));
    }

    #[test]
    fn block_id_comes_from_the_fragment() {
        assert_eq!(
            block_id_from_url("https://notion.so/page#abc-123_def"),
            Some("abc-123_def")
        );
        assert_eq!(block_id_from_url("https://notion.so/page"), None);
    }

    #[test]
    fn json_extension_switches_decoder() {
        let node = decode_document("cfg.json", r#"{"data": {"a": 1}}"#).expect("json decodes");
        assert_eq!(node.data["a"], serde_json::json!(1));

        let node = decode_document("cfg.yaml", "data:\n  a: 1\n").expect("yaml decodes");
        assert_eq!(node.data["a"], serde_json::json!(1));

        let err = decode_document("cfg.yaml", ": not yaml :").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[tokio::test]
    async fn memory_source_distinguishes_not_found() {
        let source = MemorySource::new().with_node(
            Locator::config_dir("a.yaml"),
            ConfigNode::new().with_data(serde_json::json!({"x": 1})),
        );

        let node = source.fetch(&Locator::config_dir("a.yaml")).await.unwrap();
        assert_eq!(node.data["x"], serde_json::json!(1));

        let err = source
            .fetch(&Locator::config_dir("missing.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
