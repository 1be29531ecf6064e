//! Records of last resort, used only when the substantive strategies found
//! nothing. Tiers run in order and the first one that produces records wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use super::assemble::{midnight_utc, parse_release_date};
use super::record::{ExtractContext, ExtractedRecord, RecordKind};
use super::title::extract_title;
use super::versions::ProductPolicy;

static DATED_PREAMBLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}年\d{1,2}月\d{1,2}日|\d{4}-\d{2}-\d{2}").unwrap());
static PARAGRAPH_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

const DOMAIN_KEYWORDS: &[&str] = &["AI", "人工智能", "OpenAI", "Claude", "Google", "Grok", "机器学习", "深度学习"];
const MIN_PARAGRAPH_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTier {
    Paragraphs,
    WholeText,
    Advisory,
    Snapshot,
}

impl FallbackTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackTier::Paragraphs => "paragraphs",
            FallbackTier::WholeText => "whole_text",
            FallbackTier::Advisory => "advisory",
            FallbackTier::Snapshot => "snapshot",
        }
    }
}

/// Drop any chatter before the first date marker.
fn trim_dated_preamble(text: &str) -> &str {
    match DATED_PREAMBLE_RE.find(text) {
        Some(m) => &text[m.start()..],
        None => text,
    }
}

pub fn paragraph_records(text: &str, ctx: &ExtractContext) -> Vec<ExtractedRecord> {
    let text = trim_dated_preamble(text);
    PARAGRAPH_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .filter(|p| DOMAIN_KEYWORDS.iter().any(|k| p.contains(k)))
        .enumerate()
        .map(|(i, paragraph)| {
            let (title, title_strategy) = match extract_title(paragraph) {
                Some(m) => (m.title, m.strategy.as_str()),
                None => (format!("AI News - {} #{}", ctx.today(), i + 1), "synthesized"),
            };
            ExtractedRecord::new(RecordKind::News, title, paragraph, ctx.now)
                .with_tags(&["AI News", "Tech"])
                .with_source(&ctx.source)
                .with_meta("fallback_tier", FallbackTier::Paragraphs.as_str())
                .with_meta("title_strategy", title_strategy)
                .with_meta("segment_index", i)
        })
        .collect()
}

pub fn whole_text_record(text: &str, ctx: &ExtractContext) -> Option<ExtractedRecord> {
    let body = trim_dated_preamble(text).trim();
    if body.is_empty() {
        return None;
    }
    Some(
        ExtractedRecord::new(RecordKind::News, format!("AI News Digest - {}", ctx.today()), body, ctx.now)
            .with_tags(&["AI News", "Tech", "digest"])
            .with_source(&ctx.source)
            .with_meta("fallback_tier", FallbackTier::WholeText.as_str()),
    )
}

/// The two static notices emitted when there is no text at all.
pub fn advisory_records(ctx: &ExtractContext) -> Vec<ExtractedRecord> {
    let today = ctx.today();
    vec![
        ExtractedRecord::new(
            RecordKind::Advisory,
            format!("AI news service temporarily unavailable - {}", today),
            format!(
                "The AI news source could not be reached on {} (network error, TLS \
                 verification failure or timeout). Collection resumes on the next scheduled run.",
                today
            ),
            ctx.now,
        )
        .with_tags(&["system", "service-status"])
        .with_source(&ctx.source)
        .with_meta("fallback_tier", FallbackTier::Advisory.as_str())
        .with_meta("system_generated", true),
        ExtractedRecord::new(
            RecordKind::Advisory,
            "Following AI industry updates",
            "While automatic collection is down, these channels carry the news directly:\n\
             1. OpenAI announcements and blog\n\
             2. Anthropic Claude release notes\n\
             3. Google AI research updates\n\
             4. xAI Grok announcements\n\
             5. The AI sections of major technology outlets",
            ctx.now,
        )
        .with_tags(&["system", "follow-up"])
        .with_source(&ctx.source)
        .with_meta("fallback_tier", FallbackTier::Advisory.as_str())
        .with_meta("system_generated", true),
    ]
}

/// Paragraphs, then the whole text, then the static advisories.
pub fn fallback_records(text: &str, ctx: &ExtractContext) -> Vec<ExtractedRecord> {
    let paragraphs = paragraph_records(text, ctx);
    if !paragraphs.is_empty() {
        info!(tier = FallbackTier::Paragraphs.as_str(), count = paragraphs.len(), "fallback produced records");
        return paragraphs;
    }
    if let Some(record) = whole_text_record(text, ctx) {
        info!(tier = FallbackTier::WholeText.as_str(), "fallback produced records");
        return vec![record];
    }
    warn!(tier = FallbackTier::Advisory.as_str(), "no text to extract from, emitting advisories");
    advisory_records(ctx)
}

/// Last known releases, served when the page yields no identifiers.
pub fn release_snapshot(policy: &ProductPolicy, ctx: &ExtractContext) -> Vec<ExtractedRecord> {
    warn!(product = policy.name, releases = policy.snapshot.len(), "serving release snapshot");
    policy
        .snapshot
        .iter()
        .map(|release| {
            let published_at = midnight_utc(parse_release_date(release.release_date));
            ExtractedRecord::new(RecordKind::Changelog, release.title, release.highlights.join("\n"), published_at)
                .with_identifier(release.version)
                .with_tags(policy.tags)
                .with_tags(&["snapshot"])
                .with_source(&ctx.source)
                .with_url(ctx.page_url.as_ref().map(|u| format!("{}#{}", u, release.version)))
                .with_meta("release_date", release.release_date)
                .with_meta("is_major", release.version.split('.').count() == 2)
                .with_meta("title_source", "snapshot")
                .with_meta("fallback_tier", FallbackTier::Snapshot.as_str())
        })
        .collect()
}
