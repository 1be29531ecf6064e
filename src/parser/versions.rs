use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::document::{Document, NodeId};

static VERSION_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)$").unwrap());
static VERSION_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\.\d+\b").unwrap());

static NEGATIVE_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:prices?|costs?|dollars?|usd|payments?|billing|width|height|size|pixels?|",
        r"ratings?|stars?|scores?|percentage|px|rem|em)\b",
        r"|\d(?:px|rem|em)\b",
        r"|%",
    ))
    .unwrap()
});

static POSITIVE_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:version|release[sd]?|updates?|changelog|agent|planning|features?|improvements?|",
        r"january|february|march|april|may|june|july|august|september|october|november|december|",
        r"2024|2025)\b",
        r"|\bv\d",
    ))
    .unwrap()
});

/// Parent class fragments that usually wrap a version label.
const CONTAINER_HINTS: &[&str] = &[
    "version", "tag", "badge", "label", "release", "update", "flex", "items-center", "card",
    "container",
];

const STRUCTURAL_TAGS: &[&str] = &["p", "span", "div", "h1", "h2", "h3", "strong"];

/// Parents whose text spans whole releases; they say nothing about one label.
const PAGE_CONTAINERS: &[&str] = &["html", "body", "main", "article", "section"];

/// Below this many DOM-anchored candidates the free-text sweep runs.
const SWEEP_THRESHOLD: usize = 3;

/// A release in the built-in snapshot used when the page yields nothing.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRelease {
    pub version: &'static str,
    pub release_date: &'static str,
    pub title: &'static str,
    pub highlights: &'static [&'static str],
}

/// Per-product knowledge: naming, curated versions, tags, snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ProductPolicy {
    pub name: &'static str,
    pub known_versions: &'static [&'static str],
    pub max_versions: usize,
    pub tags: &'static [&'static str],
    pub snapshot: &'static [SnapshotRelease],
}

impl ProductPolicy {
    fn priority(&self, version: &VersionId) -> usize {
        self.known_versions
            .iter()
            .position(|k| *k == version.as_str())
            .unwrap_or(usize::MAX)
    }
}

pub const CURSOR: ProductPolicy = ProductPolicy {
    name: "Cursor",
    known_versions: &["1.2", "1.1", "1.0", "0.50", "0.49", "0.48", "0.47", "0.46", "0.45"],
    max_versions: 6,
    tags: &["cursor", "ide", "update"],
    snapshot: &[
        SnapshotRelease {
            version: "1.2",
            release_date: "2025-07-03",
            title: "Agent Planning, Better Context & Faster Tab",
            highlights: &[
                "Agent To-dos",
                "Queued messages",
                "Memories",
                "PR indexing & search",
                "Better embeddings",
                "Faster Tab",
                "Let Agent resolve merge conflicts",
                "Background Agent improvements",
            ],
        },
        SnapshotRelease {
            version: "1.1",
            release_date: "2025-06-12",
            title: "Background Agents in Slack",
            highlights: &[
                "Launch Background Agents from Slack",
                "Use Cursor where your team works",
                "Get notified when agents finish",
            ],
        },
        SnapshotRelease {
            version: "1.0",
            release_date: "2025-06-04",
            title: "BugBot, Background Agent access to everyone, and one-click MCP install",
            highlights: &[
                "Automatic code review with BugBot",
                "Background Agent for everyone",
                "Memories (beta)",
                "One-click MCP install and OAuth support",
                "Jupyter support in Agent",
                "Richer chat responses",
                "New settings and dashboard",
            ],
        },
    ],
};

/// A `major.minor` token, kept with its exact spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    pub major: u32,
    pub minor: u32,
    raw: String,
}

impl VersionId {
    /// Shape check only; see [`VersionId::in_band`] for the validity band.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = VERSION_SHAPE_RE.captures(raw)?;
        Some(VersionId {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 1.x, or the 0.40 through 0.99 line that preceded it.
    pub fn in_band(&self) -> bool {
        match self.major {
            1 => true,
            0 => (40..=99).contains(&self.minor),
            _ => false,
        }
    }

    pub fn is_major(&self) -> bool {
        self.raw.split('.').count() == 2
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn is_valid(raw: &str) -> bool {
    VersionId::parse(raw).is_some_and(|v| v.in_band())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextVerdict {
    Rejected,
    Confirmed,
    ContainerHint,
    NoSignal,
}

impl ContextVerdict {
    pub fn accepts(self) -> bool {
        self != ContextVerdict::Rejected
    }
}

/// Sibling and parent text around `anchor` decides whether a version-shaped
/// token is a version or a price, size or score.
pub fn validate_context(doc: &Document, anchor: NodeId, policy: &ProductPolicy) -> ContextVerdict {
    let parent = doc.parent_element(anchor);
    let local_parent = parent.filter(|&p| !doc.tag(p).is_some_and(|t| PAGE_CONTAINERS.contains(&t)));
    let mut context = String::new();
    for part in [
        doc.prev_sibling_text(anchor),
        doc.next_sibling_text(anchor),
        local_parent.map(|p| doc.text(p)),
    ]
    .into_iter()
    .flatten()
    {
        context.push_str(&part);
        context.push(' ');
    }
    let context = context.to_lowercase();

    if NEGATIVE_CONTEXT_RE.is_match(&context) {
        return ContextVerdict::Rejected;
    }
    if POSITIVE_CONTEXT_RE.is_match(&context) || context.contains(&policy.name.to_lowercase()) {
        return ContextVerdict::Confirmed;
    }
    if parent.is_some_and(|p| CONTAINER_HINTS.iter().any(|h| doc.class_contains(p, h))) {
        return ContextVerdict::ContainerHint;
    }
    ContextVerdict::NoSignal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    TextNode,
    Structural,
    Selector,
    FreeText,
}

impl DiscoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStrategy::TextNode => "text_node",
            DiscoveryStrategy::Structural => "structural",
            DiscoveryStrategy::Selector => "selector",
            DiscoveryStrategy::FreeText => "free_text",
        }
    }
}

/// Version-shaped token tied to the element it was read from.
#[derive(Debug, Clone)]
struct Anchored {
    version: VersionId,
    anchor: NodeId,
}

/// Declarative form of the class-convention selectors.
struct SelectorRule {
    tag: Option<&'static str>,
    class_contains: Option<&'static str>,
    within_div_class: Option<&'static str>,
    excluded_classes: &'static [&'static str],
}

impl SelectorRule {
    const fn class(fragment: &'static str) -> Self {
        SelectorRule { tag: None, class_contains: Some(fragment), within_div_class: None, excluded_classes: &[] }
    }

    const fn p_within(fragment: &'static str) -> Self {
        SelectorRule { tag: Some("p"), class_contains: None, within_div_class: Some(fragment), excluded_classes: &[] }
    }

    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        if let Some(tag) = self.tag {
            if doc.tag(id) != Some(tag) {
                return false;
            }
        }
        if let Some(fragment) = self.class_contains {
            if !doc.class_contains(id, fragment) {
                return false;
            }
        }
        if let Some(fragment) = self.within_div_class {
            let inside = doc.has_ancestor(id, |p| doc.tag(p) == Some("div") && doc.class_contains(p, fragment));
            if !inside {
                return false;
            }
        }
        !self.excluded_classes.iter().any(|c| doc.class_contains(id, c))
    }
}

const SELECTOR_RULES: &[SelectorRule] = &[
    SelectorRule::class("version"),
    SelectorRule::class("tag"),
    SelectorRule::class("badge"),
    SelectorRule::class("label"),
    SelectorRule::p_within("flex"),
    SelectorRule::p_within("items-center"),
    SelectorRule { tag: Some("p"), class_contains: None, within_div_class: None, excluded_classes: &["text-", "description"] },
];

fn text_node_candidates(doc: &Document) -> Vec<Anchored> {
    doc.text_nodes()
        .filter_map(|(id, text)| {
            let version = VersionId::parse(text.trim())?;
            let anchor = doc.parent_element(id).unwrap_or(id);
            Some(Anchored { version, anchor })
        })
        .collect()
}

fn structural_candidates(doc: &Document) -> Vec<Anchored> {
    doc.elements_by_tag(STRUCTURAL_TAGS)
        .filter_map(|id| {
            let version = VersionId::parse(doc.text(id).trim())?;
            Some(Anchored { version, anchor: id })
        })
        .collect()
}

fn selector_candidates(doc: &Document) -> Vec<Anchored> {
    let mut out = Vec::new();
    for rule in SELECTOR_RULES {
        for id in doc.elements().filter(|&id| rule.matches(doc, id)) {
            if let Some(version) = VersionId::parse(doc.text(id).trim()) {
                out.push(Anchored { version, anchor: id });
            }
        }
    }
    out
}

type DomStrategy = fn(&Document) -> Vec<Anchored>;

/// Structural runs first: its rejected elements also veto the other two.
const DOM_STRATEGIES: &[(DiscoveryStrategy, DomStrategy)] = &[
    (DiscoveryStrategy::Structural, structural_candidates),
    (DiscoveryStrategy::TextNode, text_node_candidates),
    (DiscoveryStrategy::Selector, selector_candidates),
];

/// Pool candidates from every strategy, validate, rank.
pub fn discover_versions(doc: &Document, policy: &ProductPolicy) -> Vec<VersionId> {
    let mut pool: Vec<VersionId> = Vec::new();
    let mut accepted: HashSet<String> = HashSet::new();
    let mut rejected: HashSet<String> = HashSet::new();
    let mut rejected_anchors: HashSet<NodeId> = HashSet::new();

    for (strategy, run) in DOM_STRATEGIES {
        let mut kept = 0;
        for candidate in run(doc) {
            if !candidate.version.in_band() {
                continue;
            }
            let verdict = match strategy {
                DiscoveryStrategy::Structural => validate_context(doc, candidate.anchor, policy),
                _ if rejected_anchors.contains(&candidate.anchor) => ContextVerdict::Rejected,
                _ => ContextVerdict::NoSignal,
            };
            if !verdict.accepts() {
                debug!(version = %candidate.version, strategy = strategy.as_str(), "rejected by context");
                if *strategy == DiscoveryStrategy::Structural {
                    rejected_anchors.insert(candidate.anchor);
                }
                rejected.insert(candidate.version.to_string());
                continue;
            }
            accepted.insert(candidate.version.to_string());
            pool.push(candidate.version);
            kept += 1;
        }
        debug!(strategy = strategy.as_str(), kept, "discovery strategy finished");
    }

    if pool.len() < SWEEP_THRESHOLD {
        let text = doc.flattened_text();
        let mut kept = 0;
        for m in VERSION_TOKEN_RE.find_iter(&text) {
            let Some(version) = VersionId::parse(m.as_str()) else { continue };
            if !version.in_band() {
                continue;
            }
            if rejected.contains(version.as_str()) && !accepted.contains(version.as_str()) {
                continue;
            }
            pool.push(version);
            kept += 1;
        }
        debug!(strategy = DiscoveryStrategy::FreeText.as_str(), kept, "discovery strategy finished");
    }

    let ranked = rank_versions(pool, policy);
    info!(
        count = ranked.len(),
        versions = ?ranked.iter().map(VersionId::as_str).collect::<Vec<_>>(),
        "versions discovered"
    );
    ranked
}

/// Dedupe by spelling, drop out-of-band ids, newest first, cap.
pub fn rank_versions(candidates: impl IntoIterator<Item = VersionId>, policy: &ProductPolicy) -> Vec<VersionId> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut versions: Vec<VersionId> = candidates
        .into_iter()
        .filter(|v| v.in_band() && seen.insert(v.as_str().to_string()))
        .collect();

    versions.sort_by(|a, b| {
        (b.major, b.minor)
            .cmp(&(a.major, a.minor))
            .then_with(|| policy.priority(a).cmp(&policy.priority(b)))
    });
    versions.truncate(policy.max_versions);
    versions
}
