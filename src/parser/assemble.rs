use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use tracing::{debug, info};

use super::document::{heading_level, Document, NodeId};
use super::record::{ExtractContext, ExtractedRecord, RecordKind};
use super::versions::{ProductPolicy, VersionId};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December",
        r"|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)\.? \d{1,2}, \d{4}\b",
    ))
    .unwrap()
});

const PAGE_HEADING: &str = "changelog";
const FALLBACK_DATE_TEXT: &str = "January 1, 2025";
const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"];

const MAX_SECTION_FRAGMENTS: usize = 10;
const MIN_SECTION_FRAGMENTS: usize = 3;
const MAX_BODY_FRAGMENTS: usize = 8;

/// Vocabulary that marks a plain `div` as release content rather than chrome.
const FEATURE_KEYWORDS: &[&str] = &[
    "agent", "planning", "context", "tab", "memory", "search", "improvement", "feature",
    "better", "faster", "new", "background", "slack", "to-do", "todo", "queued", "messages",
    "pr", "indexing", "embeddings", "semantic", "merge", "conflicts", "bugbot", "mcp",
    "pricing", "rules", "terminal", "images",
];

/// Title words too common to tie a paragraph to a release.
const TITLE_STOPWORDS: &[&str] = &["and", "the", "for", "with", "from", "into", "now", "your"];

pub fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

/// Parse a page date, falling back to the epoch date.
pub fn parse_release_date(text: &str) -> NaiveDate {
    let cleaned = text.trim().replace('.', "");
    // chrono's `%b` only knows three-letter abbreviations.
    let cleaned = match cleaned.strip_prefix("Sept ") {
        Some(rest) => format!("Sep {rest}"),
        None => cleaned,
    };
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
        .unwrap_or_else(epoch_date)
}

pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

pub fn collect_dates(doc: &Document) -> Vec<String> {
    let text = doc.flattened_text();
    DATE_RE.find_iter(&text).map(|m| m.as_str().to_string()).collect()
}

/// `h2` headers in document order, minus the page heading.
pub fn collect_titles(doc: &Document) -> Vec<(NodeId, String)> {
    doc.elements_by_tag(&["h2"])
        .filter_map(|id| {
            let title = doc.text(id).trim().to_string();
            if title.is_empty() || title.to_lowercase() == PAGE_HEADING {
                None
            } else {
                Some((id, title))
            }
        })
        .collect()
}

fn is_header(doc: &Document, id: NodeId, level: u8) -> bool {
    doc.tag(id)
        .and_then(heading_level)
        .is_some_and(|l| l <= level)
}

fn section_fragments(doc: &Document, header: NodeId) -> Vec<String> {
    let level = doc.tag(header).and_then(heading_level).unwrap_or(2);
    let mut fragments = Vec::new();

    for sibling in doc.following_element_siblings(header) {
        if is_header(doc, sibling, level) {
            break;
        }
        let text = doc.text(sibling).trim().to_string();
        let keep = match doc.tag(sibling) {
            Some("h3") => text.chars().count() > 3,
            Some("p") => text.chars().count() > 10,
            Some("div") => {
                let lower = text.to_lowercase();
                text.chars().count() > 10 && FEATURE_KEYWORDS.iter().any(|k| lower.contains(k))
            }
            _ => false,
        };
        if keep {
            fragments.push(text);
            if fragments.len() >= MAX_SECTION_FRAGMENTS {
                break;
            }
        }
    }

    fragments
}

fn title_words(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-').to_string())
        .filter(|w| w.chars().count() >= 3 && !TITLE_STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Whole-document scan for blocks that share a word with the title.
fn broaden_fragments(doc: &Document, title: &str, fragments: &mut Vec<String>) {
    let words = title_words(title);
    if words.is_empty() {
        return;
    }
    for id in doc.elements_by_tag(&["h3", "p", "div"]) {
        if fragments.len() >= MAX_BODY_FRAGMENTS {
            break;
        }
        let text = doc.text(id).trim().to_string();
        if text.chars().count() <= 10 || fragments.contains(&text) {
            continue;
        }
        let lower = text.to_lowercase();
        if words.iter().any(|w| lower.contains(w.as_str())) {
            fragments.push(text);
        }
    }
}

/// Body text for the section under `title`.
pub fn lookup_content(doc: &Document, headers: &[(NodeId, String)], title: &str) -> String {
    let header = headers
        .iter()
        .find(|(_, text)| text == title)
        .or_else(|| headers.iter().find(|(_, text)| text.contains(title)))
        .map(|(id, _)| *id);

    let mut fragments = header.map(|h| section_fragments(doc, h)).unwrap_or_default();
    if fragments.len() < MIN_SECTION_FRAGMENTS {
        debug!(title, found = fragments.len(), "thin section, broadening");
        broaden_fragments(doc, title, &mut fragments);
    }

    if fragments.is_empty() {
        format!("New features and improvements: {}", title)
    } else {
        fragments.truncate(MAX_BODY_FRAGMENTS);
        fragments.join("\n")
    }
}

/// One record per identifier: positional pairing, then best-effort degrade.
pub fn assemble_records(
    doc: &Document,
    versions: &[VersionId],
    policy: &ProductPolicy,
    ctx: &ExtractContext,
) -> Vec<ExtractedRecord> {
    let dates = collect_dates(doc);
    let headers = collect_titles(doc);
    let paired = versions.len().min(dates.len()).min(headers.len());
    info!(
        versions = versions.len(),
        dates = dates.len(),
        titles = headers.len(),
        paired,
        "assembling changelog records"
    );

    let default_date = dates.first().map(String::as_str).unwrap_or(FALLBACK_DATE_TEXT);

    versions
        .iter()
        .enumerate()
        .map(|(i, version)| {
            let (title, title_source, date_text) = if i < paired {
                (headers[i].1.clone(), "header", dates[i].as_str())
            } else {
                (format!("{} {} Update", policy.name, version), "synthesized", default_date)
            };
            let date = parse_release_date(date_text);
            let body = lookup_content(doc, &headers, &title);

            ExtractedRecord::new(RecordKind::Changelog, title, body, midnight_utc(date))
                .with_identifier(version.as_str())
                .with_tags(policy.tags)
                .with_source(&ctx.source)
                .with_url(ctx.page_url.as_ref().map(|u| format!("{}#{}", u, version)))
                .with_meta("release_date", date.format("%Y-%m-%d").to_string())
                .with_meta("is_major", version.is_major())
                .with_meta("title_source", title_source)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::versions::{discover_versions, CURSOR};

    fn fixture() -> Document {
        let html = std::fs::read_to_string("tests/fixtures/changelog.html").unwrap();
        Document::parse(&html)
    }

    fn ctx() -> ExtractContext {
        ExtractContext::new(Utc.with_ymd_and_hms(2025, 7, 15, 9, 0, 0).unwrap(), "cursor_changelog")
            .with_page_url("https://cursor.com/changelog")
    }

    #[test]
    fn dates_parse_full_and_abbreviated() {
        assert_eq!(parse_release_date("July 3, 2025"), NaiveDate::from_ymd_opt(2025, 7, 3).unwrap());
        assert_eq!(parse_release_date("Jun 12, 2025"), NaiveDate::from_ymd_opt(2025, 6, 12).unwrap());
        assert_eq!(parse_release_date("2025-06-04"), NaiveDate::from_ymd_opt(2025, 6, 4).unwrap());
        assert_eq!(parse_release_date("soon"), epoch_date());
    }

    #[test]
    fn four_letter_september_abbreviation() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 3).unwrap();
        assert_eq!(parse_release_date("Sept 3, 2025"), expected);
        assert_eq!(parse_release_date("Sept. 3, 2025"), expected);
        assert_eq!(parse_release_date("September 3, 2025"), expected);
    }

    #[test]
    fn dates_and_titles_in_document_order() {
        let doc = fixture();
        assert_eq!(collect_dates(&doc), ["July 3, 2025", "June 12, 2025", "June 4, 2025"]);
        let titles: Vec<_> = collect_titles(&doc).into_iter().map(|(_, t)| t).collect();
        assert_eq!(
            titles,
            [
                "Agent Planning, Better Context & Faster Tab",
                "Background Agents in Slack",
                "BugBot and one-click MCP install",
            ]
        );
    }

    #[test]
    fn section_walk_stops_at_next_header() {
        let doc = fixture();
        let headers = collect_titles(&doc);
        let body = lookup_content(&doc, &headers, "Agent Planning, Better Context & Faster Tab");
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Agent To-dos");
        assert!(lines[4].starts_with("Faster Tab completions"));
        assert!(!body.contains("Thanks to everyone"));
    }

    #[test]
    fn thin_section_broadens_on_title_words() {
        let doc = fixture();
        let headers = collect_titles(&doc);
        let body = lookup_content(&doc, &headers, "BugBot and one-click MCP install");
        assert_eq!(body, "BugBot reviews pull requests automatically and leaves comments.");

        let slack = lookup_content(&doc, &headers, "Background Agents in Slack");
        assert!(slack.starts_with("Use Cursor where your team works\nMention @Cursor"));
    }

    #[test]
    fn unknown_title_gets_placeholder() {
        let doc = Document::parse("<h2>Zzz</h2><p>nothing relevant</p>");
        let headers = collect_titles(&doc);
        assert_eq!(lookup_content(&doc, &headers, "Zzz"), "New features and improvements: Zzz");
    }

    #[test]
    fn fixture_records() {
        let doc = fixture();
        let versions = discover_versions(&doc, &CURSOR);
        let records = assemble_records(&doc, &versions, &CURSOR, &ctx());
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.identifier.as_deref(), Some("1.2"));
        assert_eq!(first.title, "Agent Planning, Better Context & Faster Tab");
        assert_eq!(first.published_at, Utc.with_ymd_and_hms(2025, 7, 3, 0, 0, 0).unwrap());
        assert_eq!(first.url.as_deref(), Some("https://cursor.com/changelog#1.2"));
        assert_eq!(first.metadata["release_date"], "2025-07-03");
        assert_eq!(first.metadata["title_source"], "header");
        assert!(first.tags.contains("cursor"));

        assert_eq!(records[2].identifier.as_deref(), Some("1.0"));
        assert_eq!(records[2].metadata["release_date"], "2025-06-04");
    }

    #[test]
    fn extra_versions_are_synthesized() {
        let doc = Document::parse(
            "<div><p>1.1</p><p>May 20, 2025</p></div><h2>Only title</h2><p>Better search across the workspace.</p>",
        );
        let versions: Vec<_> = ["1.1", "1.0"].iter().filter_map(|v| VersionId::parse(v)).collect();
        let records = assemble_records(&doc, &versions, &CURSOR, &ctx());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Only title");
        assert_eq!(records[1].title, "Cursor 1.0 Update");
        assert_eq!(records[1].metadata["title_source"], "synthesized");
        assert_eq!(records[1].metadata["release_date"], "2025-05-20");
        assert_eq!(records[1].body, "New features and improvements: Cursor 1.0 Update");
    }

    #[test]
    fn no_dates_uses_epoch() {
        let doc = Document::parse("<p>nothing dated here</p>");
        let versions: Vec<_> = VersionId::parse("0.50").into_iter().collect();
        let records = assemble_records(&doc, &versions, &CURSOR, &ctx());
        assert_eq!(records[0].metadata["release_date"], "2025-01-01");
    }
}
