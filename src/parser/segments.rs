use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.").unwrap());
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*\*[^*]+\*\*").unwrap());
static ORG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:OpenAI|Claude|Google|Grok|Anthropic|xAI)").unwrap());

/// Segments shorter than this (trimmed, in chars) are dropped.
pub const MIN_SEGMENT_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStrategy {
    Numbered,
    BoldHeader,
    OrgName,
}

impl SegmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStrategy::Numbered => "numbered",
            SegmentStrategy::BoldHeader => "bold_header",
            SegmentStrategy::OrgName => "org_name",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segmentation {
    pub strategy: SegmentStrategy,
    pub segments: Vec<String>,
}

fn starts_numbered(line: &str) -> bool {
    NUMBERED_RE.is_match(line)
}

fn starts_bold(line: &str) -> bool {
    BOLD_RE.is_match(line)
}

fn starts_org(line: &str) -> bool {
    ORG_RE.is_match(line)
}

const STRATEGIES: &[(SegmentStrategy, fn(&str) -> bool)] = &[
    (SegmentStrategy::Numbered, starts_numbered),
    (SegmentStrategy::BoldHeader, starts_bold),
    (SegmentStrategy::OrgName, starts_org),
];

/// Remove `<think>...</think>` reasoning blocks.
pub fn strip_reasoning(text: &str) -> String {
    let cleaned = REASONING_RE.replace_all(text, "");
    let removed = text.len() - cleaned.len();
    if removed > 0 {
        info!(removed_bytes = removed, "reasoning markup stripped");
    }
    cleaned.into_owned()
}

/// Split into segments before every line that opens a new item.
/// The first line never opens a split.
fn split_before_lines(text: &str, opens_item: fn(&str) -> bool) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 && opens_item(line) {
            segments.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    segments.push(current.join("\n"));

    segments
}

/// First strategy that yields more than one segment wins.
/// `None` means no strategy could split the text.
pub fn segment(text: &str) -> Option<Segmentation> {
    for &(strategy, opens_item) in STRATEGIES {
        let segments = split_before_lines(text, opens_item);
        if segments.len() > 1 {
            info!(strategy = strategy.as_str(), segments = segments.len(), "text segmented");
            return Some(Segmentation { strategy, segments });
        }
        debug!(strategy = strategy.as_str(), "strategy did not split");
    }
    None
}

pub fn is_usable(segment: &str) -> bool {
    segment.trim().chars().count() >= MIN_SEGMENT_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_list_two_segments() {
        let seg = segment("1. Foo\n2. Bar").unwrap();
        assert_eq!(seg.strategy, SegmentStrategy::Numbered);
        assert_eq!(seg.segments, ["1. Foo", "2. Bar"]);
    }

    #[test]
    fn bold_headers_without_numbering() {
        let text = "**OpenAI ships a new model**\nDetails about the model.\n\n**Google updates Gemini**\nDetails about Gemini.";
        let seg = segment(text).unwrap();
        assert_eq!(seg.strategy, SegmentStrategy::BoldHeader);
        assert_eq!(seg.segments.len(), 2);
        assert!(seg.segments[1].starts_with("**Google updates Gemini**"));
    }

    #[test]
    fn org_names_at_line_start() {
        let text = "Roundup for today\nOpenAI did one thing worth noting\nAnthropic did another thing";
        let seg = segment(text).unwrap();
        assert_eq!(seg.strategy, SegmentStrategy::OrgName);
        assert_eq!(seg.segments.len(), 3);
    }

    #[test]
    fn first_line_never_opens_a_split() {
        assert!(segment("1. Only one item with a long description").is_none());
        assert!(segment("").is_none());
    }

    #[test]
    fn numbered_wins_over_bold() {
        let text = "**Header**\n1. **First item**\n2. **Second item**";
        let seg = segment(text).unwrap();
        assert_eq!(seg.strategy, SegmentStrategy::Numbered);
        assert_eq!(seg.segments[0], "**Header**");
    }

    #[test]
    fn reasoning_removed_across_lines() {
        let text = "<think>\n1. draft\n2. draft\n</think>\nKept text <think>x</think>here";
        assert_eq!(strip_reasoning(text), "\nKept text here");
    }

    #[test]
    fn short_segments_unusable() {
        assert!(!is_usable("  5. Short.  "));
        assert!(is_usable("3. Google DeepMind unveils a model"));
    }

    #[test]
    fn fixture_segments() {
        let text = std::fs::read_to_string("tests/fixtures/news.md").unwrap();
        let cleaned = strip_reasoning(&text);
        assert!(!cleaned.contains("Draft item"));
        let seg = segment(&cleaned).unwrap();
        assert_eq!(seg.strategy, SegmentStrategy::Numbered);
        assert_eq!(seg.segments.len(), 6);
        let usable = seg.segments.iter().filter(|s| is_usable(s)).count();
        assert_eq!(usable, 4);
    }
}
