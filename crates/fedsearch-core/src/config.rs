use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("FEDSEARCH_").split("__"));

        let config = Self { figment };
        config.federation()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[federation]` section, or defaults when it is absent.
    pub fn federation(&self) -> anyhow::Result<FederationConfig> {
        if !self.figment.contains("federation") {
            return Ok(FederationConfig::default());
        }
        let federation: FederationConfig = self.get("federation")?;
        federation.validate()?;
        Ok(federation)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FullMerge,
    FilterBoth,
    #[default]
    Incremental,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::FullMerge => "full_merge",
            Strategy::FilterBoth => "filter_both",
            Strategy::Incremental => "incremental",
        };
        f.write_str(name)
    }
}

/// Tuning knobs for federated search.
///
/// Every field has a default, so a config file only names what it changes.
/// Unknown keys are rejected rather than ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FederationConfig {
    pub strategy: Strategy,
    /// Most IDs either index accepts in one restricted call.
    pub max_restrict_ids: usize,
    pub max_page_size: usize,
    /// Width of the worker pool for independent probe calls.
    pub probe_concurrency: usize,
    pub full_merge: FullMergeConfig,
    pub filter_both: FilterBothConfig,
    pub incremental: IncrementalConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_restrict_ids: 350,
            max_page_size: 150,
            probe_concurrency: 4,
            full_merge: FullMergeConfig::default(),
            filter_both: FilterBothConfig::default(),
            incremental: IncrementalConfig::default(),
        }
    }
}

/// `similarity_page_size = None` means "all matches in one call".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FullMergeConfig {
    pub keyword_page_size: usize,
    pub max_keyword_pages: usize,
    pub similarity_page_size: Option<usize>,
    pub max_similarity_pages: usize,
}

impl Default for FullMergeConfig {
    fn default() -> Self {
        Self { keyword_page_size: 500, max_keyword_pages: 10, similarity_page_size: None, max_similarity_pages: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterBothConfig {
    pub keyword_page_size: usize,
    pub max_keyword_pages: usize,
    pub keyword_block_size: usize,
    pub max_keyword_blocks: usize,
    pub similarity_block_size: usize,
    pub max_similarity_blocks: usize,
    pub similarity_page_size: Option<usize>,
    pub max_similarity_pages: usize,
    /// Fetch the similarity side once, unrestricted, instead of probing it in blocks.
    pub similarity_enumerable: bool,
}

impl Default for FilterBothConfig {
    fn default() -> Self {
        Self {
            keyword_page_size: 1000,
            max_keyword_pages: 7,
            keyword_block_size: 350,
            max_keyword_blocks: 7,
            similarity_block_size: 350,
            max_similarity_blocks: 7,
            similarity_page_size: None,
            max_similarity_pages: 1,
            similarity_enumerable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IncrementalConfig {
    pub keyword_page_size: usize,
    pub max_keyword_requests: usize,
    pub probe_block_size: usize,
    pub max_probe_blocks: usize,
    pub similarity_page_size: Option<usize>,
    pub max_similarity_pages: usize,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            keyword_page_size: 200,
            max_keyword_requests: 20,
            probe_block_size: 350,
            max_probe_blocks: 7,
            similarity_page_size: None,
            max_similarity_pages: 1,
        }
    }
}

impl FederationConfig {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("max_restrict_ids", self.max_restrict_ids),
            ("max_page_size", self.max_page_size),
            ("probe_concurrency", self.probe_concurrency),
            ("full_merge.keyword_page_size", self.full_merge.keyword_page_size),
            ("full_merge.max_keyword_pages", self.full_merge.max_keyword_pages),
            ("full_merge.similarity_page_size", self.full_merge.similarity_page_size.unwrap_or(1)),
            ("full_merge.max_similarity_pages", self.full_merge.max_similarity_pages),
            ("filter_both.keyword_page_size", self.filter_both.keyword_page_size),
            ("filter_both.max_keyword_pages", self.filter_both.max_keyword_pages),
            ("filter_both.keyword_block_size", self.filter_both.keyword_block_size),
            ("filter_both.max_keyword_blocks", self.filter_both.max_keyword_blocks),
            ("filter_both.similarity_block_size", self.filter_both.similarity_block_size),
            ("filter_both.max_similarity_blocks", self.filter_both.max_similarity_blocks),
            ("filter_both.similarity_page_size", self.filter_both.similarity_page_size.unwrap_or(1)),
            ("filter_both.max_similarity_pages", self.filter_both.max_similarity_pages),
            ("incremental.keyword_page_size", self.incremental.keyword_page_size),
            ("incremental.max_keyword_requests", self.incremental.max_keyword_requests),
            ("incremental.probe_block_size", self.incremental.probe_block_size),
            ("incremental.max_probe_blocks", self.incremental.max_probe_blocks),
            ("incremental.similarity_page_size", self.incremental.similarity_page_size.unwrap_or(1)),
            ("incremental.max_similarity_pages", self.incremental.max_similarity_pages),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(Error::bad_input(format!("{name} must be greater than zero")));
        }
        let blocks = [
            ("filter_both.keyword_block_size", self.filter_both.keyword_block_size),
            ("filter_both.similarity_block_size", self.filter_both.similarity_block_size),
            ("incremental.probe_block_size", self.incremental.probe_block_size),
        ];
        if let Some((name, v)) = blocks.iter().find(|(_, v)| *v > self.max_restrict_ids) {
            return Err(Error::bad_input(format!(
                "{name} ({v}) exceeds max_restrict_ids ({})",
                self.max_restrict_ids
            )));
        }
        Ok(())
    }

    /// Apply per-request overrides given as dotted keys, e.g.
    /// `("incremental.probe_block_size", "50")` or `("strategy", "filter_both")`.
    pub fn with_overrides<'a, I>(&self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut root = serde_json::Map::new();
        for (key, raw) in pairs {
            insert_dotted(&mut root, key, override_value(raw))?;
        }
        let tuned: FederationConfig = Figment::from(Serialized::defaults(self))
            .merge(Serialized::defaults(serde_json::Value::Object(root)))
            .extract()
            .map_err(|e| Error::bad_input(format!("invalid tuning override: {e}")))?;
        tuned.validate()?;
        Ok(tuned)
    }
}

fn override_value(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return serde_json::Value::from(n);
    }
    match raw {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ => serde_json::Value::String(raw.to_string()),
    }
}

fn insert_dotted(
    root: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    value: serde_json::Value,
) -> Result<()> {
    let mut parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::bad_input(format!("malformed tuning key '{key}'")));
    }
    let leaf = parts.pop().unwrap_or_default();
    let mut node = root;
    for part in parts {
        let child = node
            .entry(part.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        node = match child {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::bad_input(format!("malformed tuning key '{key}'"))),
        };
    }
    if node.insert(leaf.to_string(), value).is_some() {
        return Err(Error::bad_input(format!("duplicate tuning key '{key}'")));
    }
    Ok(())
}
