pub mod assemble;
pub mod decode;
pub mod document;
pub mod fallback;
pub mod record;
pub mod repair;
pub mod segments;
pub mod title;
pub mod versions;

use tracing::{debug, info, warn};

pub use decode::DecodeError;
pub use document::Document;
pub use record::{ExtractContext, ExtractedRecord, RecordKind};
pub use repair::RepairError;
pub use versions::{ProductPolicy, VersionId};

/// Changelog page: HTML → document → versions → records.
pub fn extract_changelog(html: &str, policy: &ProductPolicy, ctx: &ExtractContext) -> Vec<ExtractedRecord> {
    info!(bytes = html.len(), source = %ctx.source, "changelog page received");
    let doc = Document::parse(html);
    let versions = versions::discover_versions(&doc, policy);

    let records = if versions.is_empty() {
        warn!(product = policy.name, "no versions discovered on page");
        fallback::release_snapshot(policy, ctx)
    } else {
        assemble::assemble_records(&doc, &versions, policy, ctx)
    };

    record::finalize(records)
}

/// Generated text: strip reasoning → segment → title per segment → fallback.
pub fn extract_news(text: &str, ctx: &ExtractContext) -> Vec<ExtractedRecord> {
    info!(chars = text.chars().count(), source = %ctx.source, "news text received");
    let cleaned = segments::strip_reasoning(text);
    let mut records = Vec::new();

    match segments::segment(&cleaned) {
        Some(segmentation) => {
            for (index, raw) in segmentation.segments.iter().enumerate() {
                let segment = raw.trim();
                if !segments::is_usable(segment) {
                    debug!(index, "segment too short, skipped");
                    continue;
                }
                match title::extract_title(segment) {
                    Some(found) => records.push(title::news_record(
                        segment,
                        found,
                        segmentation.strategy,
                        index,
                        ctx,
                    )),
                    None => debug!(index, "segment has no usable title, skipped"),
                }
            }
        }
        None => debug!("no segmentation strategy split the text"),
    }

    if records.is_empty() {
        warn!("no records from segmentation, falling back");
        records = fallback::fallback_records(&cleaned, ctx);
    }

    record::finalize(records)
}

/// Raw chat-completion payload → news records.
///
/// Only a payload that can be neither parsed nor repaired is an error.
pub fn extract_news_response(raw: &str, ctx: &ExtractContext) -> Result<Vec<ExtractedRecord>, DecodeError> {
    let text = decode::decode_completion(raw)?;
    Ok(extract_news(&text, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::versions::CURSOR;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn ctx(source: &str) -> ExtractContext {
        ExtractContext::new(Utc.with_ymd_and_hms(2025, 7, 15, 9, 0, 0).unwrap(), source)
    }

    #[test]
    fn changelog_fixture_end_to_end() {
        let html = std::fs::read_to_string("tests/fixtures/changelog.html").unwrap();
        let records = extract_changelog(&html, &CURSOR, &ctx("cursor_changelog"));
        let ids: Vec<_> = records.iter().filter_map(|r| r.identifier.as_deref()).collect();
        assert_eq!(ids, ["1.2", "1.1", "1.0"]);
        assert!(records.iter().all(|r| r.kind == RecordKind::Changelog));
        assert!(records[0].body.contains("Queued messages"));
    }

    #[test]
    fn changelog_without_versions_serves_snapshot() {
        let records = extract_changelog("<html><body><p>Maintenance</p></body></html>", &CURSOR, &ctx("cursor"));
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.tags.contains("snapshot")));
    }

    #[test]
    fn deeply_nested_page_does_not_overflow() {
        let depth = 20_000;
        let html = format!("{}<p>Maintenance</p>{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let records = extract_changelog(&html, &CURSOR, &ctx("cursor"));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn news_fixture_end_to_end() {
        let text = std::fs::read_to_string("tests/fixtures/news.md").unwrap();
        let records = extract_news(&text, &ctx("ai_news"));
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "OpenAI releases GPT-5 preview to developers",
                "Anthropic ships Claude memory for teams",
                "Google DeepMind unveils Gemini robotics model",
                "xAI: Grok 4 tops reasoning leaderboards after launch",
            ]
        );
        assert!(records.iter().all(|r| r.identifier.is_none()));
        assert_eq!(records[0].metadata["segment_strategy"], "numbered");
        assert_eq!(records[0].metadata["title_strategy"], "bold");
        assert!(records[0].body.starts_with("OpenAI opened a limited preview"));
        assert_eq!(records[0].published_at, Utc.with_ymd_and_hms(2025, 7, 15, 9, 0, 0).unwrap());
        assert!(!records.iter().any(|r| r.body.contains("Draft item")));
    }

    #[test]
    fn empty_news_gives_advisories() {
        let records = extract_news("", &ctx("ai_news"));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind == RecordKind::Advisory));
    }

    #[test]
    fn reasoning_only_gives_advisories() {
        let records = extract_news("<think>\nLet me look this up.\n</think>", &ctx("ai_news"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn unsplittable_text_goes_to_fallback() {
        let records = extract_news("OpenAI announced a new agent platform for enterprise customers today.", &ctx("ai_news"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata["fallback_tier"], "paragraphs");
    }

    #[test]
    fn broken_response_end_to_end() {
        let raw = std::fs::read_to_string("tests/fixtures/completion_broken.json").unwrap();
        let records = extract_news_response(&raw, &ctx("ai_news")).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].title, "Anthropic ships Claude memory for teams");
    }

    #[test]
    fn unrepairable_response_is_an_error() {
        let err = extract_news_response("upstream timeout", &ctx("ai_news")).unwrap_err();
        assert_eq!(err, DecodeError::Repair(RepairError::FieldNotFound));
    }

    proptest! {
        #[test]
        fn news_output_is_capped_and_titled(items in prop::collection::vec("[0-9]{1,2}\\. [A-Za-z ]{0,40}", 0..30)) {
            let text = items.join("\n");
            let records = extract_news(&text, &ctx("ai_news"));
            prop_assert!(!records.is_empty());
            prop_assert!(records.len() <= record::MAX_RECORDS);
            prop_assert!(records.iter().all(|r| !r.title.trim().is_empty()));
        }

        #[test]
        fn arbitrary_text_never_panics(text in "\\PC{0,400}") {
            let records = extract_news(&text, &ctx("ai_news"));
            prop_assert!(!records.is_empty() && records.len() <= record::MAX_RECORDS);
        }

        #[test]
        fn arbitrary_html_never_panics(body in "[<>/a-z0-9 .=\"]{0,300}") {
            let html = format!("<html><body>{}</body></html>", body);
            let records = extract_changelog(&html, &CURSOR, &ctx("cursor"));
            prop_assert!(records.len() <= record::MAX_RECORDS);
            prop_assert!(records.iter().all(|r| !r.title.trim().is_empty()));
        }
    }
}
