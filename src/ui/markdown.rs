//! Markdown flattened to wrapped plain text for the chat bubbles

use super::{visible_width, wrap_text};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const MIN_WRAP_WIDTH: usize = 10;

/// Render `markdown` into lines no wider than `width` columns
pub fn render_markdown_to_text(markdown: &str, width: usize) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut renderer = Renderer::new(width.max(MIN_WRAP_WIDTH));
    for event in Parser::new_ext(markdown, options) {
        renderer.event(event);
    }
    renderer.finish()
}

struct Renderer {
    width: usize,
    lines: Vec<String>,
    buf: String,
    /// Bullet or number for the first line of the current item
    marker: Option<String>,
    indent: usize,
    /// Next number for ordered lists, `None` for bullets
    lists: Vec<Option<u64>>,
    saved_indents: Vec<usize>,
    links: Vec<String>,
    quote: usize,
    in_code: bool,
}

impl Renderer {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            buf: String::new(),
            marker: None,
            indent: 0,
            lists: Vec::new(),
            saved_indents: Vec::new(),
            links: Vec::new(),
            quote: 0,
            in_code: false,
        }
    }

    fn quote_prefix(&self) -> String {
        "│ ".repeat(self.quote)
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn flush(&mut self) {
        let text = self.buf.trim().to_string();
        self.buf.clear();
        if text.is_empty() {
            return;
        }

        let quote = self.quote_prefix();
        let rest = format!("{}{}", quote, " ".repeat(self.indent));
        let first = match self.marker.take() {
            Some(marker) => format!("{}{}", quote, marker),
            None => rest.clone(),
        };
        let available = self.width.saturating_sub(visible_width(&rest)).max(MIN_WRAP_WIDTH);

        for (i, line) in wrap_text(&text, available).into_iter().enumerate() {
            let prefix = if i == 0 { &first } else { &rest };
            self.lines.push(format!("{}{}", prefix, line));
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) if self.in_code => {
                let prefix = format!("{}    ", self.quote_prefix());
                for line in text.lines() {
                    self.lines.push(format!("{}{}", prefix, line));
                }
            }
            Event::Text(text) | Event::Code(text) => self.buf.push_str(&text),
            Event::Html(html) | Event::InlineHtml(html) => self.buf.push_str(&html),
            Event::SoftBreak => self.buf.push(' '),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.lines.push("─".repeat(self.width));
            }
            Event::TaskListMarker(checked) => {
                self.buf.push_str(if checked { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } | Tag::BlockQuote { .. } => {
                self.flush();
                if matches!(tag, Tag::BlockQuote { .. }) {
                    self.quote += 1;
                }
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code = true;
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
                self.saved_indents.push(self.indent);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().max(1);
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}. ", n);
                        *n += 1;
                        bullet
                    }
                    _ => "• ".to_string(),
                };
                let marker = format!("{}{}", "  ".repeat(depth - 1), bullet);
                self.indent = visible_width(&marker);
                self.marker = Some(marker);
            }
            Tag::Link { dest_url, .. } => self.links.push(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(level) => {
                let title = self.buf.trim().to_string();
                self.buf.clear();
                if !title.is_empty() {
                    let underline = match level {
                        HeadingLevel::H1 => Some('═'),
                        HeadingLevel::H2 => Some('─'),
                        _ => None,
                    };
                    let title = if level == HeadingLevel::H1 {
                        title.to_uppercase()
                    } else {
                        title
                    };
                    let rule_width = visible_width(&title).min(self.width);
                    self.lines.push(title);
                    if let Some(ch) = underline {
                        self.lines.push(ch.to_string().repeat(rule_width));
                    }
                }
                self.blank();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush();
                self.quote = self.quote.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                self.in_code = false;
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                self.indent = self.saved_indents.pop().unwrap_or(0);
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Link => {
                if let Some(dest) = self.links.pop() {
                    if !dest.is_empty() && !self.buf.ends_with(dest.as_str()) {
                        self.buf.push_str(&format!(" ({})", dest));
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> String {
        self.flush();
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_wrap_and_separate() {
        let text = render_markdown_to_text("one two three four five\n\nsecond *para*", 12);
        assert_eq!(text, "one two\nthree four\nfive\n\nsecond para");
    }

    #[test]
    fn test_lists() {
        let text = render_markdown_to_text("- apples\n- pears\n\n1. first\n2. second", 40);
        assert_eq!(text, "• apples\n• pears\n\n1. first\n2. second");
    }

    #[test]
    fn test_heading_and_code() {
        let text = render_markdown_to_text("# Notes\n\n```\nlet x = 1;\n```\nuse `cargo`", 40);
        assert_eq!(text, "NOTES\n═════\n\n    let x = 1;\n\nuse cargo");
    }

    #[test]
    fn test_links_keep_destination() {
        let text = render_markdown_to_text("see [docs](https://example.com)", 60);
        assert_eq!(text, "see docs (https://example.com)");
    }

    #[test]
    fn test_lines_fit_width() {
        let long = "word ".repeat(40);
        let text = render_markdown_to_text(&format!("- {}", long), 20);
        assert!(text.lines().all(|l| visible_width(l) <= 20));
        assert!(text.lines().skip(1).all(|l| l.starts_with("  ")));
    }
}
