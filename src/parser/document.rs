//! Owned node arena built from an HTML document.
//!
//! `scraper` does the parsing; everything downstream only sees `Document`,
//! so discovery and assembly never touch the parser's tree types.

use scraper::{Html, Node as HtmlNode};

pub type NodeId = usize;

/// Elements dropped together with their subtree while building the arena.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Elements that start a new line in flattened text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element { tag: String, classes: Vec<String> },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Nodes are stored in document (pre-)order, so ids compare like positions.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut doc = Document::default();
        let mut stack = vec![(parsed.tree.root(), None::<NodeId>)];

        while let Some((node_ref, parent)) = stack.pop() {
            let kind = match node_ref.value() {
                HtmlNode::Document | HtmlNode::Fragment => NodeKind::Root,
                HtmlNode::Element(el) => {
                    let tag = el.name().to_ascii_lowercase();
                    if SKIPPED_TAGS.contains(&tag.as_str()) {
                        continue;
                    }
                    let classes = el.classes().map(str::to_string).collect();
                    NodeKind::Element { tag, classes }
                }
                HtmlNode::Text(text) => {
                    let content: &str = text;
                    doc.push(parent, NodeKind::Text(content.to_string()));
                    continue;
                }
                _ => continue,
            };

            let id = doc.push(parent, kind);
            let children: Vec<_> = node_ref.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        doc
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn classes(&self, id: NodeId) -> &[String] {
        match &self.nodes[id].kind {
            NodeKind::Element { classes, .. } => classes,
            _ => &[],
        }
    }

    /// CSS `[class*=needle]`, checked per class token.
    pub fn class_contains(&self, id: NodeId, needle: &str) -> bool {
        self.classes(id).iter().any(|c| c.contains(needle))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Closest enclosing element, skipping the document root.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.tag(p).is_some())
    }

    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&id| self.tag(id).is_some())
    }

    pub fn elements_by_tag<'a>(&'a self, tags: &'a [&str]) -> impl Iterator<Item = NodeId> + 'a {
        self.elements()
            .filter(move |&id| self.tag(id).is_some_and(|t| tags.contains(&t)))
    }

    pub fn text_nodes(&self) -> impl Iterator<Item = (NodeId, &str)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(id, node)| match &node.kind {
            NodeKind::Text(t) => Some((id, t.as_str())),
            _ => None,
        })
    }

    /// Concatenated descendant text, untrimmed.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match &self.nodes[current].kind {
                NodeKind::Text(t) => out.push_str(t),
                _ => stack.extend(self.nodes[current].children.iter().rev()),
            }
        }
        out
    }

    pub fn has_ancestor(&self, id: NodeId, pred: impl Fn(NodeId) -> bool) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if pred(p) {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Element siblings after `id`, in document order.
    pub fn following_element_siblings(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let siblings: &[NodeId] = match self.parent(id) {
            Some(p) => &self.nodes[p].children,
            None => &[],
        };
        let start = siblings.iter().position(|&s| s == id).map_or(siblings.len(), |i| i + 1);
        siblings[start..]
            .iter()
            .copied()
            .filter(|&s| self.tag(s).is_some())
    }

    /// Nearest sibling before `id` whose text is not blank.
    pub fn prev_sibling_text(&self, id: NodeId) -> Option<String> {
        let siblings = &self.nodes[self.parent(id)?].children;
        let pos = siblings.iter().position(|&s| s == id)?;
        siblings[..pos]
            .iter()
            .rev()
            .map(|&s| self.text(s))
            .find(|t| !t.trim().is_empty())
    }

    /// Nearest sibling after `id` whose text is not blank.
    pub fn next_sibling_text(&self, id: NodeId) -> Option<String> {
        let siblings = &self.nodes[self.parent(id)?].children;
        let pos = siblings.iter().position(|&s| s == id)?;
        siblings[pos + 1..]
            .iter()
            .map(|&s| self.text(s))
            .find(|t| !t.trim().is_empty())
    }

    /// Whole-document text with a line break at every block boundary.
    pub fn flattened_text(&self) -> String {
        let mut out = String::new();
        if self.nodes.is_empty() {
            return out;
        }
        let mut stack = vec![Flatten::Enter(0)];
        while let Some(step) = stack.pop() {
            let id = match step {
                Flatten::Enter(id) => id,
                Flatten::CloseBlock => {
                    break_line(&mut out);
                    continue;
                }
            };
            let node = &self.nodes[id];
            match &node.kind {
                NodeKind::Text(t) => {
                    out.push_str(t);
                    continue;
                }
                NodeKind::Element { tag, .. } if BLOCK_TAGS.contains(&tag.as_str()) => {
                    break_line(&mut out);
                    stack.push(Flatten::CloseBlock);
                }
                _ => {}
            }
            stack.extend(node.children.iter().rev().map(|&c| Flatten::Enter(c)));
        }
        out
    }
}

enum Flatten {
    Enter(NodeId),
    CloseBlock,
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// `h1`..`h6` → 1..6.
pub fn heading_level(tag: &str) -> Option<u8> {
    let rest = tag.strip_prefix('h')?;
    match rest.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = r#"<html><body>
        <div class="flex items-center"><span>1.2</span> <span class="muted">July 3, 2025</span></div>
        <h2>Title &amp; more</h2><p>First</p><div>Second</div><h2>Next</h2>
        <script>var x = "1.5";</script>
    </body></html>"#;

    #[test]
    fn builds_elements_in_document_order() {
        let doc = Document::parse(SNIPPET);
        let tags: Vec<_> = doc.elements().filter_map(|id| doc.tag(id)).collect();
        assert_eq!(tags, ["html", "head", "body", "div", "span", "span", "h2", "p", "div", "h2"]);
    }

    #[test]
    fn script_text_never_reaches_the_arena() {
        let doc = Document::parse(SNIPPET);
        assert!(doc.text_nodes().all(|(_, t)| !t.contains("var x")));
        assert!(!doc.flattened_text().contains("1.5"));
    }

    #[test]
    fn class_substring_match() {
        let doc = Document::parse(SNIPPET);
        let div = doc.elements_by_tag(&["div"]).next().unwrap();
        assert!(doc.class_contains(div, "items"));
        assert!(!doc.class_contains(div, "badge"));
    }

    #[test]
    fn sibling_text_skips_whitespace() {
        let doc = Document::parse(SNIPPET);
        let spans: Vec<_> = doc.elements_by_tag(&["span"]).collect();
        assert_eq!(doc.next_sibling_text(spans[0]).as_deref(), Some("July 3, 2025"));
        assert_eq!(doc.prev_sibling_text(spans[1]).as_deref(), Some("1.2"));
        assert_eq!(doc.prev_sibling_text(spans[0]), None);
    }

    #[test]
    fn following_siblings_of_header() {
        let doc = Document::parse(SNIPPET);
        let h2 = doc.elements_by_tag(&["h2"]).next().unwrap();
        assert_eq!(doc.text(h2), "Title & more");
        let after: Vec<_> = doc
            .following_element_siblings(h2)
            .filter_map(|id| doc.tag(id))
            .collect();
        assert_eq!(after, ["p", "div", "h2"]);
    }

    #[test]
    fn flattened_text_breaks_blocks() {
        let doc = Document::parse("<div><p>One</p><p>Two <b>bold</b></p></div>");
        let flat = doc.flattened_text();
        let lines: Vec<_> = flat.lines().map(str::trim).collect();
        assert!(lines.contains(&"One"));
        assert!(lines.contains(&"Two bold"));
    }

    #[test]
    fn deep_nesting_walks_without_recursion() {
        let depth = 20_000;
        let html = format!("{}<p>1.2</p>{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let doc = Document::parse(&html);
        assert!(doc.len() > depth);
        assert_eq!(doc.flattened_text().trim(), "1.2");
        assert_eq!(doc.text(0).trim(), "1.2");
    }

    #[test]
    fn ancestors() {
        let doc = Document::parse(SNIPPET);
        let span = doc.elements_by_tag(&["span"]).next().unwrap();
        assert!(doc.has_ancestor(span, |p| doc.class_contains(p, "flex")));
        assert!(!doc.has_ancestor(span, |p| doc.tag(p) == Some("p")));
    }

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("h2"), Some(2));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("header"), None);
        assert_eq!(heading_level("hr"), None);
    }
}
