//! Terminal chat rendering
//!
//! Boxed chat bubbles drawn with box-drawing characters, ANSI colors,
//! markdown and LaTeX flattened to plain text.

pub mod latex;
pub mod markdown;
pub mod typing;

pub use latex::render_latex;
pub use markdown::render_markdown_to_text;
pub use typing::TypingIndicator;

use crate::models::Artifact;
use crossterm::{cursor, execute, terminal};
use regex::Regex;
use serde_json::Value;
use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const MIN_BOX_WIDTH: usize = 20;
const MIN_INNER_WIDTH: usize = 10;
const DEFAULT_TERM_WIDTH: usize = 80;

pub const ACCENT_ASSISTANT: &str = "36";
pub const ACCENT_USER: &str = "35";
pub const ACCENT_SOURCES: &str = "33";
pub const ACCENT_ERROR: &str = "31";
pub const ACCENT_MUTED: &str = "90";
pub const CONTENT_ASSISTANT: &str = "2;36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Right,
}

/// Layout knobs for `format_box_lines`
#[derive(Debug, Clone, Default)]
pub struct BoxOptions {
    pub align: Align,
    pub accent: &'static str,
    pub content_color: Option<&'static str>,
    pub box_width: Option<usize>,
    /// Content is already wrapped to the inner width
    pub pre_wrapped: bool,
}

impl BoxOptions {
    pub fn new(align: Align, accent: &'static str) -> Self {
        Self {
            align,
            accent,
            ..Default::default()
        }
    }
}

/// Rendered box plus the geometry the typing indicator needs
#[derive(Debug, Clone)]
pub struct BoxLayout {
    pub lines: Vec<String>,
    pub pad: String,
    pub inner_width: usize,
    /// Lines from the bottom border up to the first content line
    pub move_up: usize,
}

pub fn term_width() -> usize {
    terminal::size()
        .map(|(cols, _)| cols as usize)
        .ok()
        .filter(|cols| *cols > 0)
        .unwrap_or(DEFAULT_TERM_WIDTH)
}

pub fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal()
}

pub fn colorize(text: &str, code: &str) -> String {
    if !use_color() {
        return text.to_string();
    }
    format!("\x1b[{}m{}\x1b[0m", code, text)
}

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI regex"))
}

pub fn strip_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").into_owned()
}

/// Display width ignoring ANSI escapes
pub fn visible_width(text: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(text).as_str())
}

/// Cut to `width` display columns, keeping escape sequences intact
pub fn truncate_visible(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut visible = 0;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            out.push(ch);
            for next in chars.by_ref() {
                out.push(next);
                if next == 'm' {
                    break;
                }
            }
            continue;
        }
        let w = ch.width().unwrap_or(0);
        if visible + w > width {
            break;
        }
        out.push(ch);
        visible += w;
    }
    out
}

pub fn pad_visible(text: &str, width: usize) -> String {
    let visible = visible_width(text);
    if visible >= width {
        return truncate_visible(text, width);
    }
    format!("{}{}", text, " ".repeat(width - visible))
}

/// Greedy word wrap by display width; overlong words are split
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        let mut word_width = UnicodeWidthStr::width(word.as_str());

        while word_width > width {
            if current_width > 0 {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            let head = truncate_visible(&word, width);
            let head_len = head.len().max(word.chars().next().map_or(1, char::len_utf8));
            lines.push(word[..head_len].to_string());
            word = word[head_len..].to_string();
            word_width = UnicodeWidthStr::width(word.as_str());
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current_width == 0 { word_width } else { current_width + 1 + word_width };
        if needed > width {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        if current_width > 0 {
            current.push(' ');
            current_width += 1;
        }
        current.push_str(&word);
        current_width += word_width;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Bubble width as a share of the terminal, clamped to fit
pub fn bubble_width(ratio: f32, content_len: Option<usize>, term_width: usize) -> usize {
    let safe_width = term_width.saturating_sub(2).max(MIN_BOX_WIDTH);
    let mut base = (term_width as f32 * ratio) as usize;
    if let Some(len) = content_len {
        base = base.max(len + 4);
    }
    base.clamp(MIN_BOX_WIDTH, safe_width)
}

pub fn format_box_lines(
    label: &str,
    content: &str,
    options: &BoxOptions,
    term_width: usize,
) -> BoxLayout {
    let safe_term_width = term_width.saturating_sub(2).max(MIN_BOX_WIDTH);
    let box_width = options
        .box_width
        .unwrap_or_else(|| bubble_width(0.7, None, term_width))
        .min(safe_term_width)
        .max(MIN_BOX_WIDTH);
    let inner_width = box_width.saturating_sub(4).max(MIN_INNER_WIDTH);

    let trimmed = content.trim();
    let content_text = if trimmed.is_empty() { "(empty)" } else { trimmed };

    let wrapped: Vec<String> = if options.pre_wrapped {
        content_text.lines().map(str::to_string).collect()
    } else {
        content_text
            .lines()
            .flat_map(|line| {
                if line.trim().is_empty() {
                    vec![String::new()]
                } else {
                    wrap_text(line, inner_width)
                }
            })
            .collect()
    };

    let pad = match options.align {
        Align::Right => " ".repeat(term_width.saturating_sub(box_width)),
        Align::Left => String::new(),
    };

    let label_line = truncate_visible(label, inner_width);
    let label_block = format!(" {} ", label_line);
    let label_width = UnicodeWidthStr::width(label_block.as_str());
    let top = if label_width <= inner_width {
        let available = inner_width - label_width;
        let left = available / 2;
        let right = available - left;
        format!("{}┌{}|{}|{}┐", pad, "─".repeat(left), label_block, "─".repeat(right))
    } else {
        format!("{}┌{}┐", pad, "─".repeat(box_width - 2))
    };

    let mut lines = Vec::with_capacity(wrapped.len() + 2);
    lines.push(colorize(&top, options.accent));
    for line in &wrapped {
        let mut text = pad_visible(line, inner_width);
        if let Some(code) = options.content_color {
            text = colorize(&text, code);
        }
        lines.push(format!("{}│ {} │", pad, text));
    }
    let bottom = format!("{}└{}┘", pad, "─".repeat(box_width - 2));
    lines.push(colorize(&bottom, options.accent));

    let move_up = lines.len() - 1;
    BoxLayout {
        lines,
        pad,
        inner_width,
        move_up,
    }
}

fn print_lines(lines: &[String]) {
    let mut stdout = io::stdout().lock();
    for line in lines {
        let _ = writeln!(stdout, "{}", line);
    }
    let _ = stdout.flush();
}

pub fn render_box(label: &str, content: &str, align: Align, accent: &'static str) -> usize {
    let layout = format_box_lines(label, content, &BoxOptions::new(align, accent), term_width());
    print_lines(&layout.lines);
    layout.lines.len()
}

/// Markdown + LaTeX reply in the left-hand assistant bubble
pub fn render_assistant(text: &str) {
    let width = term_width();
    let box_width = bubble_width(0.75, None, width);
    let inner_width = box_width.saturating_sub(4).max(MIN_INNER_WIDTH);
    let rendered = render_markdown_to_text(&render_latex(text), inner_width);

    let options = BoxOptions {
        align: Align::Left,
        accent: ACCENT_ASSISTANT,
        content_color: Some(CONTENT_ASSISTANT),
        box_width: Some(box_width),
        pre_wrapped: true,
    };
    print_lines(&format_box_lines("ASSISTANT", &rendered, &options, width).lines);
}

/// User message in the right-hand bubble
pub fn render_user(text: &str) {
    let width = term_width();
    let box_width = bubble_width(0.6, None, width);
    let inner_width = box_width.saturating_sub(4).max(MIN_INNER_WIDTH);
    let rendered = render_markdown_to_text(&render_latex(text), inner_width);

    let options = BoxOptions {
        align: Align::Right,
        accent: ACCENT_USER,
        content_color: None,
        box_width: Some(box_width),
        pre_wrapped: true,
    };
    print_lines(&format_box_lines("YOU", &rendered, &options, width).lines);
}

pub fn render_error(message: &str) {
    render_box("ERROR", message, Align::Left, ACCENT_ERROR);
}

pub fn print_banner() {
    let width = term_width().max(MIN_BOX_WIDTH);
    let inner_width = width - 4;
    let center = |text: &str| {
        let w = UnicodeWidthStr::width(text).min(inner_width);
        let left = (inner_width - w) / 2;
        format!("{}{}{}", " ".repeat(left), text, " ".repeat(inner_width - w - left))
    };

    let top = format!("┌{}┐", "─".repeat(width - 2));
    let title = format!("│ {} │", center("Obsidian Vault Chat"));
    let hint = format!("│ {} │", center("Type 'exit' to quit."));
    let bottom = format!("└{}┘", "─".repeat(width - 2));

    print_lines(&[
        colorize(&top, "34"),
        colorize(&title, "1;34"),
        hint,
        colorize(&bottom, "34"),
    ]);
}

/// Distinct `source` values found in tool output payloads
pub fn collect_sources(artifacts: &[Artifact]) -> Vec<String> {
    fn add(value: &Value, sources: &mut Vec<String>) {
        let source = value
            .get("source")
            .or_else(|| value.get("metadata").and_then(|m| m.get("source")))
            .and_then(Value::as_str);
        if let Some(source) = source.filter(|s| !s.is_empty()) {
            if !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }
    }

    let mut sources = Vec::new();
    for artifact in artifacts {
        let Artifact::ToolOutput { payload, .. } = artifact else {
            continue;
        };
        match payload {
            Value::Array(items) => items.iter().for_each(|item| add(item, &mut sources)),
            other => add(other, &mut sources),
        }
    }
    sources
}

pub fn render_sources(artifacts: &[Artifact]) {
    let sources = collect_sources(artifacts);
    if !sources.is_empty() {
        render_box("SOURCES", &sources.join("\n"), Align::Left, ACCENT_SOURCES);
    }
}

/// Erase the last `count` printed lines
pub fn clear_last_lines(count: usize) {
    if count == 0 || !io::stdout().is_terminal() {
        return;
    }
    let mut stdout = io::stdout();
    for _ in 0..count {
        let _ = execute!(
            stdout,
            terminal::Clear(terminal::ClearType::CurrentLine),
            cursor::MoveUp(1)
        );
    }
    let _ = execute!(
        stdout,
        terminal::Clear(terminal::ClearType::CurrentLine),
        cursor::MoveToColumn(0)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_visible_helpers_ignore_ansi() {
        let colored = "\x1b[36mhello\x1b[0m";
        assert_eq!(visible_width(colored), 5);
        assert_eq!(strip_ansi(&truncate_visible(colored, 3)), "hel");
        assert_eq!(visible_width(&pad_visible("ab", 6)), 6);
        assert_eq!(pad_visible("abcdef", 3), "abc");
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("one two three four", 9), vec!["one two", "three", "four"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn test_bubble_width_clamps() {
        assert_eq!(bubble_width(0.5, None, 100), 50);
        assert_eq!(bubble_width(0.1, None, 100), 20);
        assert_eq!(bubble_width(0.9, Some(200), 100), 98);
        assert_eq!(bubble_width(0.2, Some(30), 100), 34);
    }

    #[test]
    fn test_box_geometry() {
        let options = BoxOptions {
            box_width: Some(24),
            ..BoxOptions::new(Align::Left, ACCENT_ASSISTANT)
        };
        let layout = format_box_lines("ASSISTANT", "hello world", &options, 80);
        let lines: Vec<String> = layout.lines.iter().map(|l| strip_ansi(l)).collect();

        assert_eq!(layout.inner_width, 20);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('┌') && lines[0].ends_with('┐'));
        assert!(lines[0].contains("| ASSISTANT |"));
        assert_eq!(lines[1], format!("│ {} │", pad_visible("hello world", 20)));
        assert!(lines[2].starts_with('└'));
        assert!(lines.iter().all(|l| visible_width(l) == 24));
        assert_eq!(layout.move_up, 2);
    }

    #[test]
    fn test_box_right_aligned_and_empty() {
        let options = BoxOptions {
            box_width: Some(30),
            ..BoxOptions::new(Align::Right, ACCENT_USER)
        };
        let layout = format_box_lines("YOU", "   ", &options, 50);
        assert_eq!(layout.pad.len(), 20);
        assert!(strip_ansi(&layout.lines[1]).contains("(empty)"));
    }

    #[test]
    fn test_collect_sources_dedupes() {
        let artifacts = vec![
            Artifact::ToolOutput {
                tool: "retrieve_context".to_string(),
                payload: json!([{"source": "a.md"}, {"source": "b.md"}, {"source": "a.md"}]),
            },
            Artifact::ToolOutput {
                tool: "write_to_vault".to_string(),
                payload: json!("Tags: ..."),
            },
            Artifact::ToolOutput {
                tool: "other".to_string(),
                payload: json!({"metadata": {"source": "c.md"}}),
            },
        ];
        assert_eq!(collect_sources(&artifacts), vec!["a.md", "b.md", "c.md"]);
    }
}
