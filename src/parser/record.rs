use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Hard cap on records returned by one extraction call.
pub const MAX_RECORDS: usize = 10;
pub const SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Changelog,
    News,
    Advisory,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Changelog => "changelog",
            RecordKind::News => "news",
            RecordKind::Advisory => "advisory",
        }
    }
}

/// One structured record pulled out of a changelog page or generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub kind: RecordKind,
    pub title: String,
    pub body: String,
    pub summary: String,
    pub identifier: Option<String>,
    pub published_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub metadata: Map<String, Value>,
    pub source: String,
    pub url: Option<String>,
}

impl ExtractedRecord {
    pub fn new(
        kind: RecordKind,
        title: impl Into<String>,
        body: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let body = body.into();
        ExtractedRecord {
            kind,
            title: title.into().trim().to_string(),
            summary: summarize(&body),
            body,
            identifier: None,
            published_at,
            tags: BTreeSet::new(),
            metadata: Map::new(),
            source: String::new(),
            url: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }
}

/// Inputs that would otherwise be ambient: the clock and the collector label.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub now: DateTime<Utc>,
    pub source: String,
    pub page_url: Option<String>,
}

impl ExtractContext {
    pub fn new(now: DateTime<Utc>, source: &str) -> Self {
        ExtractContext {
            now,
            source: source.to_string(),
            page_url: None,
        }
    }

    pub fn now_utc(source: &str) -> Self {
        Self::new(Utc::now(), source)
    }

    pub fn with_page_url(mut self, url: &str) -> Self {
        self.page_url = Some(url.to_string());
        self
    }

    /// Calendar date of `now`, used in synthesized titles.
    pub fn today(&self) -> String {
        self.now.format("%Y-%m-%d").to_string()
    }
}

/// Body cut to 200 characters, with `...` appended when anything was cut.
pub fn summarize(body: &str) -> String {
    truncate(body, SUMMARY_CHARS)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

/// Drop malformed records, keep the first record per identifier, cap the list.
pub fn finalize(records: Vec<ExtractedRecord>) -> Vec<ExtractedRecord> {
    let total = records.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(total.min(MAX_RECORDS));

    for record in records {
        if !record.is_well_formed() {
            warn!(title = %record.title, "dropping record with empty title or body");
            continue;
        }
        if let Some(id) = &record.identifier {
            if !seen.insert(id.clone()) {
                debug!(identifier = %id, "dropping duplicate identifier");
                continue;
            }
        }
        if out.len() == MAX_RECORDS {
            debug!(total, cap = MAX_RECORDS, "record cap reached");
            break;
        }
        out.push(record);
    }

    out
}
