use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::record::{truncate, ExtractContext, ExtractedRecord, RecordKind};
use super::segments::SegmentStrategy;

static BOLD_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static NUMBERED_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.、)\s]+(.+?)(?:\*\*|：|:|\n|$)").unwrap());
static ORG_CLAUSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:OpenAI|Claude|Google|Grok|Anthropic|xAI)[^。！？]*[。！？]?").unwrap());
static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\d+[.、)]\s*|[-*•]\s+)").unwrap());
static NUMBERED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s*").unwrap());
static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[。！？.]").unwrap());

/// Phrases that give away leaked model reasoning rather than a headline.
const REASONING_PHRASES: &[&str] = &["<think>", "first,", "let me", "i should", "i need"];
const ORGANIZATIONS: &[&str] = &[
    "OpenAI", "Claude", "Google", "Grok", "Anthropic", "xAI", "Microsoft", "Meta",
];

const MAX_TITLE_CHARS: usize = 100;
/// Bodies shorter than this fall back to the whole segment.
const MIN_BODY_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleStrategy {
    Bold,
    Numbered,
    OrgClause,
    CleanedLine,
    FirstSentence,
}

impl TitleStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleStrategy::Bold => "bold",
            TitleStrategy::Numbered => "numbered",
            TitleStrategy::OrgClause => "org_clause",
            TitleStrategy::CleanedLine => "cleaned_line",
            TitleStrategy::FirstSentence => "first_sentence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    pub title: String,
    pub strategy: TitleStrategy,
}

fn chars(s: &str) -> usize {
    s.chars().count()
}

fn bold_title(first_line: &str, _segment: &str) -> Option<String> {
    let caps = BOLD_TITLE_RE.captures(first_line)?;
    let title = caps[1].trim();
    (chars(title) > 5).then(|| title.to_string())
}

fn numbered_title(first_line: &str, _segment: &str) -> Option<String> {
    let caps = NUMBERED_TITLE_RE.captures(first_line)?;
    let title = caps[1].trim();
    (chars(title) > 5).then(|| title.to_string())
}

fn org_clause_title(first_line: &str, _segment: &str) -> Option<String> {
    let m = ORG_CLAUSE_RE.find(first_line)?;
    let title = m.as_str().trim();
    (chars(title) > 10).then(|| title.to_string())
}

fn cleaned_line_title(first_line: &str, _segment: &str) -> Option<String> {
    if !looks_like_headline(first_line) {
        return None;
    }
    let title = clean_title(first_line);
    (chars(&title) > 5).then_some(title)
}

fn first_sentence_title(_first_line: &str, segment: &str) -> Option<String> {
    let sentence = SENTENCE_END_RE.split(segment).next()?.trim();
    (chars(sentence) > 10).then(|| sentence.chars().take(MAX_TITLE_CHARS).collect())
}

type TitleRule = fn(&str, &str) -> Option<String>;

const TITLE_RULES: &[(TitleStrategy, TitleRule)] = &[
    (TitleStrategy::Bold, bold_title),
    (TitleStrategy::Numbered, numbered_title),
    (TitleStrategy::OrgClause, org_clause_title),
    (TitleStrategy::CleanedLine, cleaned_line_title),
    (TitleStrategy::FirstSentence, first_sentence_title),
];

/// Strip list markers and bold markup, cap at 100 chars.
pub fn clean_title(line: &str) -> String {
    let stripped = LIST_MARKER_RE.replace(line.trim(), "");
    let stripped = stripped.replace("**", "");
    truncate(stripped.trim(), MAX_TITLE_CHARS)
}

/// A raw line that reads like a headline, not leaked reasoning.
pub fn looks_like_headline(line: &str) -> bool {
    let line = line.trim();
    let lower = line.to_lowercase();
    if REASONING_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    if NUMBERED_LINE_RE.is_match(line) {
        return true;
    }
    let len = chars(line);
    ORGANIZATIONS.iter().any(|org| line.contains(org)) && len > 20 && len < 150
}

/// Run the title cascade on a trimmed segment.
pub fn extract_title(segment: &str) -> Option<TitleMatch> {
    let first_line = segment.split('\n').next().unwrap_or_default();
    if first_line.trim().is_empty() {
        return None;
    }
    for &(strategy, rule) in TITLE_RULES {
        if let Some(title) = rule(first_line, segment) {
            return Some(TitleMatch { title, strategy });
        }
    }
    debug!(first_line, "no title strategy matched");
    None
}

/// Lines after the first; the whole segment when that is too thin.
pub fn derive_body(segment: &str) -> String {
    let rest: Vec<&str> = segment.split('\n').skip(1).collect();
    if rest.is_empty() {
        return segment.to_string();
    }
    let body = rest.join("\n");
    if chars(body.trim()) < MIN_BODY_CHARS {
        segment.to_string()
    } else {
        body
    }
}

pub fn news_record(
    segment: &str,
    title: TitleMatch,
    strategy: SegmentStrategy,
    index: usize,
    ctx: &ExtractContext,
) -> ExtractedRecord {
    ExtractedRecord::new(RecordKind::News, title.title, derive_body(segment), ctx.now)
        .with_tags(&["AI News", "Tech"])
        .with_source(&ctx.source)
        .with_meta("segment_strategy", strategy.as_str())
        .with_meta("title_strategy", title.strategy.as_str())
        .with_meta("segment_index", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_of(segment: &str) -> Option<(String, TitleStrategy)> {
        extract_title(segment).map(|m| (m.title, m.strategy))
    }

    #[test]
    fn bold_title_first() {
        let t = title_of("1. **OpenAI releases GPT-5 preview**\nbody").unwrap();
        assert_eq!(t, ("OpenAI releases GPT-5 preview".to_string(), TitleStrategy::Bold));
    }

    #[test]
    fn numbered_title_stops_at_colon() {
        let t = title_of("3. Google DeepMind unveils robotics model: runs on-device").unwrap();
        assert_eq!(t.0, "Google DeepMind unveils robotics model");
        assert_eq!(t.1, TitleStrategy::Numbered);

        let t = title_of("2、Anthropic 发布 Claude 新版本：支持更长上下文").unwrap();
        assert_eq!(t.0, "Anthropic 发布 Claude 新版本");
    }

    #[test]
    fn org_clause_takes_first_sentence() {
        let t = title_of("OpenAI 发布了新的推理模型。性能大幅提升").unwrap();
        assert_eq!(t, ("OpenAI 发布了新的推理模型。".to_string(), TitleStrategy::OrgClause));
    }

    #[test]
    fn short_numbered_capture_falls_through_to_cleaned_line() {
        let t = title_of("4. xAI: Grok 4 tops reasoning leaderboards after launch").unwrap();
        assert_eq!(t.0, "xAI: Grok 4 tops reasoning leaderboards after launch");
        assert_eq!(t.1, TitleStrategy::CleanedLine);
    }

    #[test]
    fn reasoning_leak_is_not_a_headline() {
        assert!(!looks_like_headline("Let me check what OpenAI announced today"));
        assert!(!looks_like_headline("First, I need to search for Google news"));
        assert!(looks_like_headline("Microsoft and Meta sign a compute agreement"));
        assert!(!looks_like_headline("Meta"));
    }

    #[test]
    fn first_sentence_last_resort() {
        let t = title_of("A quiet week in research circles. Nothing else.").unwrap();
        assert_eq!(t, ("A quiet week in research circles".to_string(), TitleStrategy::FirstSentence));
    }

    #[test]
    fn nothing_matches() {
        assert_eq!(title_of("short. x"), None);
        assert_eq!(title_of(""), None);
    }

    #[test]
    fn clean_title_truncates() {
        let long = format!("1. {}", "word ".repeat(40));
        let cleaned = clean_title(&long);
        assert!(cleaned.ends_with("..."));
        assert_eq!(cleaned.chars().count(), MAX_TITLE_CHARS + 3);
        assert_eq!(clean_title("- **Bold** headline"), "Bold headline");
    }

    #[test]
    fn body_is_rest_or_whole_segment() {
        let long = "1. **Title here**\nThis body line is comfortably longer than fifty characters in total.";
        assert_eq!(
            derive_body(long),
            "This body line is comfortably longer than fifty characters in total."
        );

        let thin = "1. **Title here**\nToo short.";
        assert_eq!(derive_body(thin), thin);

        let single = "3. Google DeepMind unveils robotics model: runs on-device";
        assert_eq!(derive_body(single), single);
    }
}
