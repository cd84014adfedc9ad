//! Environment variable resolution.
//!
//! An env entry in a [`ConfigNode`](crate::node::ConfigNode) is either a
//! literal or an [`EnvResolver`]: a typed lookup with a fallback policy that
//! engages only when the variable is genuinely absent. Any other lookup
//! failure (non-unicode value, unparseable number) is critical and never
//! policy-overridden.
//!
//! Resolvers are built with the [`EnvVar`] constructors:
//!
//! ```no_run
//! use config_loom::env::EnvVar;
//!
//! let host = EnvVar::string().or_default("localhost");
//! let port = EnvVar::number().or_default(8080);
//! let token = EnvVar::string().or_exit(Some("API_TOKEN must be set"));
//! let flag = EnvVar::boolean().or_nothing();
//! ```
//!
//! `or_exit` does not terminate the process from inside the library: it
//! resolves to [`EnvError::Exit`], and the top-level caller decides what to
//! do with it.

use crate::error::EnvError;
use crate::node::{ConfigNode, FilledConfig};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Once};
use tracing::{debug, warn};

/// A resolved environment value: string, number, or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvLiteral {
    Boolean(bool),
    Number(Number),
    String(String),
}

impl EnvLiteral {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EnvLiteral::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EnvLiteral::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EnvLiteral::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for EnvLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvLiteral::Boolean(b) => write!(f, "{}", b),
            EnvLiteral::Number(n) => write!(f, "{}", n),
            EnvLiteral::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for EnvLiteral {
    fn from(value: &str) -> Self {
        EnvLiteral::String(value.to_string())
    }
}

impl From<String> for EnvLiteral {
    fn from(value: String) -> Self {
        EnvLiteral::String(value)
    }
}

impl From<bool> for EnvLiteral {
    fn from(value: bool) -> Self {
        EnvLiteral::Boolean(value)
    }
}

impl From<i64> for EnvLiteral {
    fn from(value: i64) -> Self {
        EnvLiteral::Number(Number::from(value))
    }
}

/// Single-operation lookup contract: process environment first, `.env` file
/// as a secondary source. Absence (including an empty value) is
/// [`EnvError::Missing`]; anything else is critical.
pub trait EnvironmentSource: Send + Sync {
    fn get(&self, name: &str) -> Result<String, EnvError>;
}

/// Production source: the process environment, with `.env` loaded into it
/// once per process.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv;

static LOAD_DOTENV: Once = Once::new();

impl ProcessEnv {
    pub fn new() -> Self {
        LOAD_DOTENV.call_once(|| {
            // Missing .env is fine; the process environment stands alone.
            if dotenv::dotenv().is_ok() {
                debug!("loaded .env into process environment");
            }
        });
        Self
    }
}

impl EnvironmentSource for ProcessEnv {
    fn get(&self, name: &str) -> Result<String, EnvError> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(EnvError::Missing(name.to_string())),
            Err(std::env::VarError::NotUnicode(_)) => {
                Err(EnvError::critical(name, "value is not valid unicode"))
            }
        }
    }
}

/// Map-backed source for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnv {
    vars: BTreeMap<String, String>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvironmentSource for MemoryEnv {
    fn get(&self, name: &str) -> Result<String, EnvError> {
        match self.vars.get(name) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(EnvError::Missing(name.to_string())),
        }
    }
}

/// Target type of a resolver; controls how the raw string parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    String,
    Number,
    Boolean,
}

impl EnvKind {
    fn parse(&self, name: &str, raw: &str) -> Result<EnvLiteral, EnvError> {
        match self {
            EnvKind::String => Ok(EnvLiteral::String(raw.to_string())),
            EnvKind::Number => {
                if let Ok(int) = raw.parse::<i64>() {
                    return Ok(EnvLiteral::Number(Number::from(int)));
                }
                raw.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(EnvLiteral::Number)
                    .ok_or_else(|| EnvError::critical(name, format!("{:?} is not a number", raw)))
            }
            EnvKind::Boolean => {
                let value = raw.eq_ignore_ascii_case("true") || raw == "1";
                Ok(EnvLiteral::Boolean(value))
            }
        }
    }
}

type ComputeFn = Arc<dyn Fn() -> EnvLiteral + Send + Sync>;
type AsyncComputeFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = EnvLiteral> + Send>> + Send + Sync>;

/// What to do when the variable is missing. Only a missing variable engages
/// the fallback; critical failures bypass it.
#[derive(Clone)]
pub enum Fallback {
    /// Use this value.
    Default(EnvLiteral),
    /// Resolve to [`EnvError::Exit`] for the top-level caller.
    Exit(Option<String>),
    /// Raise the caller-supplied message as an error.
    Throw(String),
    /// Call a sync function for the value.
    Compute(ComputeFn),
    /// Call an async function for the value.
    AsyncCompute(AsyncComputeFn),
    /// Resolve to no value at all.
    Nothing,
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Default(v) => f.debug_tuple("Default").field(v).finish(),
            Fallback::Exit(msg) => f.debug_tuple("Exit").field(msg).finish(),
            Fallback::Throw(msg) => f.debug_tuple("Throw").field(msg).finish(),
            Fallback::Compute(_) => f.write_str("Compute(..)"),
            Fallback::AsyncCompute(_) => f.write_str("AsyncCompute(..)"),
            Fallback::Nothing => f.write_str("Nothing"),
        }
    }
}

/// Declarative resolver form used in config documents.
///
/// ```yaml
/// env:
///   HOST: { string: { or_default: localhost } }
///   PORT: { number: { or_default: 8080 } }
///   TOKEN: { string: { or_exit: "TOKEN must be set" } }
///   STRICT: { boolean: { or_throw: "STRICT is required" } }
///   EXTRA: { string: or_nothing }
/// ```
///
/// Compute policies are only constructible in code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ResolverSpec {
    String(PolicySpec),
    Number(PolicySpec),
    Boolean(PolicySpec),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PolicySpec {
    OrDefault(EnvLiteral),
    OrExit(Option<String>),
    OrThrow(String),
    OrNothing,
}

impl PolicySpec {
    fn into_fallback(self) -> Fallback {
        match self {
            PolicySpec::OrDefault(value) => Fallback::Default(value),
            PolicySpec::OrExit(message) => Fallback::Exit(message),
            PolicySpec::OrThrow(message) => Fallback::Throw(message),
            PolicySpec::OrNothing => Fallback::Nothing,
        }
    }
}

/// A typed environment lookup with a fallback policy.
///
/// The resolver receives the entry's own key as the variable name at fill
/// time, so one resolver value can be reused under different names.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "ResolverSpec")]
pub struct EnvResolver {
    kind: EnvKind,
    fallback: Fallback,
}

impl From<ResolverSpec> for EnvResolver {
    fn from(spec: ResolverSpec) -> Self {
        let (kind, policy) = match spec {
            ResolverSpec::String(p) => (EnvKind::String, p),
            ResolverSpec::Number(p) => (EnvKind::Number, p),
            ResolverSpec::Boolean(p) => (EnvKind::Boolean, p),
        };
        Self {
            kind,
            fallback: policy.into_fallback(),
        }
    }
}

impl EnvResolver {
    /// Resolve the variable `name` against `source`.
    ///
    /// Returns `Ok(None)` only for `or_nothing` on a missing variable.
    pub async fn resolve(
        &self,
        name: &str,
        source: &dyn EnvironmentSource,
    ) -> Result<Option<EnvLiteral>, EnvError> {
        match source.get(name) {
            Ok(raw) => self.kind.parse(name, &raw).map(Some),
            Err(err) if err.is_missing() => match &self.fallback {
                Fallback::Default(value) => {
                    warn!("env variable {} is missing, using default {}", name, value);
                    Ok(Some(value.clone()))
                }
                Fallback::Exit(message) => Err(EnvError::Exit {
                    name: name.to_string(),
                    message: message.clone(),
                }),
                Fallback::Throw(message) => Err(EnvError::Fallback {
                    name: name.to_string(),
                    message: message.clone(),
                }),
                Fallback::Compute(compute) => {
                    debug!("env variable {} is missing, computing value", name);
                    Ok(Some(compute()))
                }
                Fallback::AsyncCompute(compute) => {
                    debug!("env variable {} is missing, computing value", name);
                    Ok(Some(compute().await))
                }
                Fallback::Nothing => Ok(None),
            },
            Err(critical) => Err(critical),
        }
    }
}

/// Constructor for typed resolvers: pick the type, then the policy.
#[derive(Debug, Clone, Copy)]
pub struct EnvVar {
    kind: EnvKind,
}

impl EnvVar {
    pub fn string() -> Self {
        Self {
            kind: EnvKind::String,
        }
    }

    pub fn number() -> Self {
        Self {
            kind: EnvKind::Number,
        }
    }

    pub fn boolean() -> Self {
        Self {
            kind: EnvKind::Boolean,
        }
    }

    fn resolver(self, fallback: Fallback) -> EnvValue {
        EnvValue::Resolver(EnvResolver {
            kind: self.kind,
            fallback,
        })
    }

    /// On missing variable, use `value`.
    pub fn or_default(self, value: impl Into<EnvLiteral>) -> EnvValue {
        self.resolver(Fallback::Default(value.into()))
    }

    /// On missing variable, resolve to a fatal [`EnvError::Exit`].
    pub fn or_exit(self, message: Option<&str>) -> EnvValue {
        self.resolver(Fallback::Exit(message.map(str::to_string)))
    }

    /// On missing variable, raise `message` as an error.
    pub fn or_throw(self, message: impl Into<String>) -> EnvValue {
        self.resolver(Fallback::Throw(message.into()))
    }

    /// On missing variable, call `compute` for the value.
    pub fn or_compute(self, compute: impl Fn() -> EnvLiteral + Send + Sync + 'static) -> EnvValue {
        self.resolver(Fallback::Compute(Arc::new(compute)))
    }

    /// On missing variable, await `compute` for the value.
    pub fn or_async_compute(
        self,
        compute: impl Fn() -> Pin<Box<dyn Future<Output = EnvLiteral> + Send>> + Send + Sync + 'static,
    ) -> EnvValue {
        self.resolver(Fallback::AsyncCompute(Arc::new(compute)))
    }

    /// On missing variable, resolve to no value.
    pub fn or_nothing(self) -> EnvValue {
        self.resolver(Fallback::Nothing)
    }
}

/// One env entry in a node: a literal passed through as-is, or a resolver
/// evaluated at fill time.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(EnvLiteral),
    Resolver(EnvResolver),
}

impl From<EnvLiteral> for EnvValue {
    fn from(value: EnvLiteral) -> Self {
        EnvValue::Literal(value)
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        EnvValue::Literal(value.into())
    }
}

impl From<bool> for EnvValue {
    fn from(value: bool) -> Self {
        EnvValue::Literal(value.into())
    }
}

impl From<i64> for EnvValue {
    fn from(value: i64) -> Self {
        EnvValue::Literal(value.into())
    }
}

/// Replace every resolver in the merged node's env map with its resolved
/// literal, awaiting async computes. Each resolver is invoked with its own
/// key as the variable name. Results are not memoized across separate
/// resolution passes.
pub async fn fill(
    node: ConfigNode,
    source: &dyn EnvironmentSource,
) -> Result<FilledConfig, EnvError> {
    let mut env = BTreeMap::new();
    for (key, value) in node.env {
        let resolved = match value {
            EnvValue::Literal(literal) => Some(literal),
            EnvValue::Resolver(resolver) => resolver.resolve(&key, source).await?,
        };
        env.insert(key, resolved);
    }
    Ok(FilledConfig {
        data: node.data,
        env,
        watch: node.watch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(name: &str, value: &str) -> MemoryEnv {
        MemoryEnv::new().with_var(name, value)
    }

    #[tokio::test]
    async fn present_variable_wins_over_default() {
        let source = env_with("PORT", "9000");
        let EnvValue::Resolver(resolver) = EnvVar::number().or_default(8080) else {
            panic!("expected resolver");
        };
        let value = resolver.resolve("PORT", &source).await.unwrap();
        assert_eq!(value, Some(EnvLiteral::from(9000)));
    }

    #[tokio::test]
    async fn missing_variable_uses_default() {
        let source = MemoryEnv::new();
        let EnvValue::Resolver(resolver) = EnvVar::number().or_default(10) else {
            panic!("expected resolver");
        };
        let value = resolver.resolve("PORT", &source).await.unwrap();
        assert_eq!(value, Some(EnvLiteral::from(10)));
    }

    #[tokio::test]
    async fn empty_value_counts_as_missing() {
        let source = env_with("HOST", "");
        let EnvValue::Resolver(resolver) = EnvVar::string().or_default("fallback") else {
            panic!("expected resolver");
        };
        let value = resolver.resolve("HOST", &source).await.unwrap();
        assert_eq!(value, Some(EnvLiteral::from("fallback")));
    }

    #[tokio::test]
    async fn non_numeric_value_is_critical_despite_default() {
        let source = env_with("PORT", "not-a-number");
        let EnvValue::Resolver(resolver) = EnvVar::number().or_default(8080) else {
            panic!("expected resolver");
        };
        let err = resolver.resolve("PORT", &source).await.unwrap_err();
        assert!(matches!(err, EnvError::Critical { .. }));
    }

    #[tokio::test]
    async fn boolean_accepts_true_and_one() {
        for raw in ["true", "TRUE", "1"] {
            let source = env_with("FLAG", raw);
            let EnvValue::Resolver(resolver) = EnvVar::boolean().or_default(false) else {
                panic!("expected resolver");
            };
            let value = resolver.resolve("FLAG", &source).await.unwrap();
            assert_eq!(value, Some(EnvLiteral::Boolean(true)), "raw {:?}", raw);
        }

        let source = env_with("FLAG", "yes");
        let EnvValue::Resolver(resolver) = EnvVar::boolean().or_default(true) else {
            panic!("expected resolver");
        };
        let value = resolver.resolve("FLAG", &source).await.unwrap();
        assert_eq!(value, Some(EnvLiteral::Boolean(false)));
    }

    #[tokio::test]
    async fn or_exit_resolves_to_exit_error() {
        let source = MemoryEnv::new();
        let EnvValue::Resolver(resolver) = EnvVar::string().or_exit(Some("set API_TOKEN")) else {
            panic!("expected resolver");
        };
        let err = resolver.resolve("API_TOKEN", &source).await.unwrap_err();
        match err {
            EnvError::Exit { name, message } => {
                assert_eq!(name, "API_TOKEN");
                assert_eq!(message.as_deref(), Some("set API_TOKEN"));
            }
            other => panic!("expected Exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn or_throw_raises_the_caller_message() {
        let source = MemoryEnv::new();
        let EnvValue::Resolver(resolver) = EnvVar::string().or_throw("DB_URL is required") else {
            panic!("expected resolver");
        };
        let err = resolver.resolve("DB_URL", &source).await.unwrap_err();
        assert_eq!(err.to_string(), "DB_URL is required");
    }

    #[tokio::test]
    async fn compute_policies_run_only_when_missing() {
        let source = MemoryEnv::new();
        let EnvValue::Resolver(resolver) =
            EnvVar::string().or_compute(|| EnvLiteral::from("computed"))
        else {
            panic!("expected resolver");
        };
        let value = resolver.resolve("NAME", &source).await.unwrap();
        assert_eq!(value, Some(EnvLiteral::from("computed")));

        let EnvValue::Resolver(resolver) =
            EnvVar::string().or_async_compute(|| Box::pin(async { EnvLiteral::from("later") }))
        else {
            panic!("expected resolver");
        };
        let value = resolver.resolve("NAME", &source).await.unwrap();
        assert_eq!(value, Some(EnvLiteral::from("later")));
    }

    #[tokio::test]
    async fn fill_materializes_literals_resolvers_and_nothing() {
        let source = env_with("HOST", "db.internal");
        let node = ConfigNode::new()
            .with_data(serde_json::json!({"name": "demo"}))
            .with_env("HOST", EnvVar::string().or_exit(None))
            .with_env("PORT", 5432)
            .with_env("OPTIONAL", EnvVar::string().or_nothing());

        let filled = fill(node, &source).await.expect("fill should succeed");
        assert_eq!(filled.env_value("HOST"), Some(&EnvLiteral::from("db.internal")));
        assert_eq!(filled.env_value("PORT"), Some(&EnvLiteral::from(5432)));
        assert_eq!(filled.env["OPTIONAL"], None);
        assert_eq!(filled.data["name"], serde_json::json!("demo"));
    }

    #[test]
    fn resolver_specs_deserialize_from_yaml() {
        let yaml = r#"
HOST: { string: { or_default: localhost } }
PORT: { number: { or_default: 8080 } }
TOKEN: { string: { or_exit: "TOKEN must be set" } }
STRICT: { boolean: { or_throw: "STRICT is required" } }
EXTRA: { string: or_nothing }
LITERAL: 42
"#;
        let env: BTreeMap<String, EnvValue> =
            serde_yaml::from_str(yaml).expect("env map should parse");
        assert!(matches!(env["HOST"], EnvValue::Resolver(_)));
        assert!(matches!(env["EXTRA"], EnvValue::Resolver(_)));
        assert!(matches!(
            env["LITERAL"],
            EnvValue::Literal(EnvLiteral::Number(_))
        ));
    }
}
