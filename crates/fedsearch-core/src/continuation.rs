//! Client-held cursor state for resumable federated search.
//!
//! A `Continuation` is produced by one page request and echoed back verbatim by
//! the caller on the next one. Its transport form is a string of `key=value`
//! pairs joined by `&`, built only from lowercase ASCII letters, digits, `=` and
//! `&`, so it can be embedded in a URL query string without escaping.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{SearchQuery, SimilarityTarget};

/// Position in the driving index's result order. Exactly one kind per cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
    /// Similarity-order positions already checked against the keyword index.
    SimilarityChecked(usize),
    /// Keyword-order positions already retrieved and intersected.
    KeywordRetrieved(usize),
}

impl Cursor {
    pub fn position(&self) -> usize {
        match *self {
            Cursor::SimilarityChecked(p) | Cursor::KeywordRetrieved(p) => p,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub cursor: Option<Cursor>,
    pub no_more_results: bool,
    /// IDs returned across all pages so far.
    pub emitted: usize,
    /// Digest of the query this continuation belongs to.
    pub query_fingerprint: Option<u64>,
    /// Similarity index version observed when the cursor was produced.
    pub snapshot: Option<u64>,
}

const KEY_CHECKED: &str = "checked";
const KEY_RETRIEVED: &str = "retrieved";
const KEY_DONE: &str = "done";
const KEY_EMITTED: &str = "emitted";
const KEY_QUERY: &str = "query";
const KEY_SNAPSHOT: &str = "snapshot";

impl Continuation {
    pub fn for_query(query: &SearchQuery) -> Self {
        Self { query_fingerprint: Some(fingerprint(query)), ..Self::default() }
    }

    pub fn position(&self) -> usize { self.cursor.map_or(0, |c| c.position()) }

    pub fn encode(&self) -> String {
        let mut parts = Vec::new();
        match self.cursor {
            Some(Cursor::SimilarityChecked(p)) => parts.push(format!("{KEY_CHECKED}={p}")),
            Some(Cursor::KeywordRetrieved(p)) => parts.push(format!("{KEY_RETRIEVED}={p}")),
            None => {}
        }
        if self.no_more_results {
            parts.push(format!("{KEY_DONE}=1"));
        }
        parts.push(format!("{KEY_EMITTED}={}", self.emitted));
        if let Some(fp) = self.query_fingerprint {
            parts.push(format!("{KEY_QUERY}={fp:016x}"));
        }
        if let Some(snapshot) = self.snapshot {
            parts.push(format!("{KEY_SNAPSHOT}={snapshot}"));
        }
        parts.join("&")
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let mut out = Continuation::default();
        let mut seen: Vec<&str> = Vec::new();
        for pair in encoded.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::bad_input(format!("malformed continuation entry '{pair}'")))?;
            if seen.contains(&key) {
                return Err(Error::bad_input(format!("duplicate continuation key '{key}'")));
            }
            seen.push(key);
            match key {
                KEY_CHECKED | KEY_RETRIEVED => {
                    if out.cursor.is_some() {
                        return Err(Error::bad_input("continuation carries two cursors"));
                    }
                    let position = parse_decimal(key, value)?;
                    out.cursor = Some(if key == KEY_CHECKED {
                        Cursor::SimilarityChecked(position)
                    } else {
                        Cursor::KeywordRetrieved(position)
                    });
                }
                KEY_DONE => match value {
                    "1" => out.no_more_results = true,
                    "0" => out.no_more_results = false,
                    _ => return Err(Error::bad_input(format!("invalid continuation flag '{value}'"))),
                },
                KEY_EMITTED => out.emitted = parse_decimal(key, value)?,
                KEY_QUERY => {
                    if value.len() != 16 {
                        return Err(Error::bad_input("invalid continuation query digest"));
                    }
                    let fp = u64::from_str_radix(value, 16)
                        .map_err(|_| Error::bad_input("invalid continuation query digest"))?;
                    out.query_fingerprint = Some(fp);
                }
                KEY_SNAPSHOT => out.snapshot = Some(parse_decimal(key, value)?),
                _ => return Err(Error::bad_input(format!("unknown continuation key '{key}'"))),
            }
        }
        Ok(out)
    }

    /// Rejects a continuation produced for a different query, or one carrying
    /// no query digest at all.
    pub fn check_query(&self, query: &SearchQuery) -> Result<()> {
        match self.query_fingerprint {
            Some(fp) if fp == fingerprint(query) => Ok(()),
            Some(_) => Err(Error::bad_input("continuation does not match the query")),
            None => Err(Error::bad_input("continuation carries no query digest")),
        }
    }
}

fn parse_decimal<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::bad_input(format!("continuation '{key}' must be a decimal integer")));
    }
    value
        .parse()
        .map_err(|_| Error::bad_input(format!("continuation '{key}' out of range")))
}

/// Digest of the parts of a query that decide which IDs match and in what order.
///
/// Paging and tuning are left out: they change how a result list is walked,
/// not the list itself.
pub fn fingerprint(query: &SearchQuery) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hash_opt_str(&mut hasher, query.keyword.text.as_deref());
    hash_opt_str(&mut hasher, query.keyword.filter.as_deref());
    match &query.similarity.target {
        None => {
            hasher.update(&[0]);
        }
        Some(SimilarityTarget::Vector(v)) => {
            hasher.update(&[1]);
            hasher.update(&(v.len() as u64).to_le_bytes());
            for x in v {
                hasher.update(&x.to_le_bytes());
            }
        }
        Some(SimilarityTarget::Document(id)) => {
            hasher.update(&[2]);
            hasher.update(&id.to_le_bytes());
        }
    }
    hash_opt_str(&mut hasher, query.similarity.filter.as_deref());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

fn hash_opt_str(hasher: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        None => {
            hasher.update(&[0]);
        }
        Some(s) => {
            hasher.update(&[1]);
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
    }
}
