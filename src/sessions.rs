//! Session picker and transcript replay

use crate::memory::HistoryStore;
use crate::models::{Role, SessionSummary};
use crate::session::RagSession;
use crate::ui::{self, Align};
use crate::Result;

const LABEL_MAX_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChoice {
    New,
    Existing(String),
}

impl SessionChoice {
    pub fn into_session_id(self) -> Option<String> {
        match self {
            SessionChoice::New => None,
            SessionChoice::Existing(id) => Some(id),
        }
    }
}

/// Session title with whitespace collapsed, or the id when blank
pub fn format_session_label(title: Option<&str>, session_id: &str, max_len: usize) -> String {
    let text = title.unwrap_or_default().split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return session_id.to_string();
    }
    if text.chars().count() > max_len {
        let head: String = text.chars().take(max_len.saturating_sub(3)).collect();
        return format!("{}...", head);
    }
    text
}

pub fn session_menu_lines(sessions: &[SessionSummary]) -> Vec<String> {
    let mut lines = vec!["0) New chat".to_string()];
    for (idx, session) in sessions.iter().enumerate() {
        let label = format_session_label(session.title.as_deref(), &session.session_id, LABEL_MAX_LEN);
        lines.push(format!(
            "{}) {} (last: {})",
            idx + 1,
            label,
            session.last_at.format("%Y-%m-%d %H:%M")
        ));
    }
    lines
}

pub fn render_session_menu(sessions: &[SessionSummary]) {
    ui::render_box("SESSIONS", &session_menu_lines(sessions).join("\n"), Align::Left, ui::ACCENT_USER);
}

pub fn parse_session_choice(input: &str, sessions: &[SessionSummary]) -> SessionChoice {
    let choice = input.trim();
    if choice.is_empty() || matches!(choice.to_lowercase().as_str(), "0" | "n" | "new") {
        return SessionChoice::New;
    }

    if choice.chars().all(|c| c.is_ascii_digit()) {
        return choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| sessions.get(index))
            .map(|session| SessionChoice::Existing(session.session_id.clone()))
            .unwrap_or(SessionChoice::New);
    }

    SessionChoice::Existing(choice.to_string())
}

/// Show recent sessions and ask which one to resume
///
/// `prompt` reads one line of input; `None` means the user gave up.
pub async fn choose_session<F>(
    history_store: Option<&dyn HistoryStore>,
    limit: i64,
    prompt: F,
) -> Result<SessionChoice>
where
    F: FnOnce(&str) -> Option<String>,
{
    let Some(history_store) = history_store else {
        return Ok(SessionChoice::New);
    };

    let sessions = history_store.list_sessions(limit, 0).await?;
    if sessions.is_empty() {
        return Ok(SessionChoice::New);
    }

    render_session_menu(&sessions);
    let choice = prompt("Select session number (or Enter for new): ");
    Ok(choice
        .map(|input| parse_session_choice(&input, &sessions))
        .unwrap_or(SessionChoice::New))
}

/// Replay the cached window as chat bubbles
pub async fn render_history(session: &RagSession) {
    let history = session.state().await.history;
    if history.is_empty() {
        return;
    }

    ui::render_box(
        "HISTORY",
        &format!("{} messages", history.len()),
        Align::Left,
        ui::ACCENT_MUTED,
    );
    for message in &history {
        match message.role {
            Role::Assistant => ui::render_assistant(&message.content),
            Role::User => ui::render_user(&message.content),
            Role::System => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn summary(id: &str, title: Option<&str>) -> SessionSummary {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        SessionSummary {
            session_id: id.to_string(),
            started_at: at,
            last_at: at,
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_format_session_label() {
        assert_eq!(format_session_label(Some("  plan   the\ngarden "), "id", 48), "plan the garden");
        assert_eq!(format_session_label(Some("   "), "abc-123", 48), "abc-123");
        assert_eq!(format_session_label(None, "abc-123", 48), "abc-123");

        let long = "x".repeat(60);
        let label = format_session_label(Some(&long), "id", 48);
        assert_eq!(label.chars().count(), 48);
        assert!(label.ends_with("..."));
    }

    #[test]
    fn test_menu_lines() {
        let lines = session_menu_lines(&[summary("s1", Some("Tomatoes")), summary("s2", None)]);
        assert_eq!(
            lines,
            vec![
                "0) New chat",
                "1) Tomatoes (last: 2024-05-01 09:30)",
                "2) s2 (last: 2024-05-01 09:30)",
            ]
        );
    }

    #[test]
    fn test_parse_session_choice() {
        let sessions = vec![summary("s1", None), summary("s2", None)];

        for input in ["", "0", "n", "NEW", "  "] {
            assert_eq!(parse_session_choice(input, &sessions), SessionChoice::New, "{:?}", input);
        }
        assert_eq!(parse_session_choice("2", &sessions), SessionChoice::Existing("s2".to_string()));
        assert_eq!(parse_session_choice("3", &sessions), SessionChoice::New);
        assert_eq!(
            parse_session_choice(" raw-id ", &sessions),
            SessionChoice::Existing("raw-id".to_string())
        );
    }

    #[test]
    fn test_choose_session_without_store() {
        let choice = tokio_test::block_on(choose_session(None, 10, |_| panic!("no prompt expected")));
        assert_eq!(tokio_test::assert_ok!(choice), SessionChoice::New);
    }
}
