//! Application state for the Parlor TUI.

use crate::ui::{BADGE_FG, BORDER, PRIMARY, SECONDARY, TEXT, TEXT_MUTED, USER_BADGE};
use chrono::{DateTime, Local, NaiveDateTime};
use log::debug;
use parlor_config::PersonaConfig;
use parlor_core::{ClientContext, ScrollDecision, ScrollMetrics, ScrollTracker};
use parlor_protocol::{ConnectivityStatus, Message, MessageKind, Role};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use std::cmp::min;
use std::sync::Arc;

/// Alert shown when the microphone cannot be opened.
pub const MICROPHONE_ALERT: &str = "Could not access the microphone. Check the permissions.";
/// Number of session id characters shown in the header.
pub const SESSION_PREFIX_LEN: usize = 12;
/// Input rows shown before the box stops growing.
pub const MAX_INPUT_ROWS: u16 = 5;

/// Top-level application state for the TUI.
pub struct App {
    /// Persona texts shown in the header, badges and welcome panel.
    pub persona: PersonaConfig,
    /// Truncated session id for the header.
    pub session_label: String,
    /// Whether a capture device was detected at startup.
    pub audio_supported: bool,
    /// Latest message snapshot.
    pub messages: Arc<[Message]>,
    /// Store revision of `messages`.
    pub revision: u64,
    /// Current input buffer.
    pub input: String,
    /// Whether a send is in flight.
    pub pending: bool,
    /// Backend connectivity.
    pub status: ConnectivityStatus,
    /// Elapsed seconds while recording.
    pub recording: Option<u64>,
    /// Blocking alert, dismissed with Esc.
    pub alert: Option<String>,
    /// Current scroll offset.
    pub scroll: u16,
    /// Maximum scroll offset for the chat view.
    pub chat_max_scroll: u16,
    /// Near-bottom and jump-button state.
    pub tracker: ScrollTracker,
    /// Tick counter driving the typing animation.
    pub ticks: u64,
    total_lines: u16,
    viewport_height: u16,
    follow_bottom: bool,
    laid_out_revision: u64,
}

impl App {
    /// Create a new application state for one client session.
    pub fn new(persona: PersonaConfig, context: &ClientContext, tracker: ScrollTracker) -> Self {
        Self {
            persona,
            session_label: context.short_session_id(SESSION_PREFIX_LEN).to_string(),
            audio_supported: context.audio_supported,
            messages: Arc::from(Vec::new()),
            revision: 0,
            input: String::new(),
            pending: false,
            status: ConnectivityStatus::Checking,
            recording: None,
            alert: None,
            scroll: 0,
            chat_max_scroll: 0,
            tracker,
            ticks: 0,
            total_lines: 0,
            viewport_height: 0,
            follow_bottom: false,
            laid_out_revision: 0,
        }
    }

    /// Adopt a new store snapshot and decide how the view should follow it.
    pub fn sync_messages(&mut self, messages: Arc<[Message]>, revision: u64) -> ScrollDecision {
        if revision == self.revision {
            return ScrollDecision::Stay;
        }
        debug!(
            "messages synced (revision={}, count={})",
            revision,
            messages.len()
        );
        self.messages = messages;
        self.revision = revision;
        let last_role = self.messages.last().map(|message| message.role);
        let decision = self
            .tracker
            .on_messages_changed(self.messages.len(), last_role);
        if decision == ScrollDecision::Force {
            self.jump_to_bottom();
        }
        decision
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub fn set_status(&mut self, status: ConnectivityStatus) {
        self.status = status;
    }

    pub fn recording_started(&mut self) {
        self.recording = Some(0);
    }

    pub fn recording_tick(&mut self, elapsed_secs: u64) {
        if self.recording.is_some() {
            self.recording = Some(elapsed_secs);
        }
    }

    pub fn recording_stopped(&mut self) {
        self.recording = None;
    }

    pub fn show_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    /// Close the alert; returns false when none was open.
    pub fn dismiss_alert(&mut self) -> bool {
        self.alert.take().is_some()
    }

    pub fn on_tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
    }

    /// The input box accepts edits only while no send is in flight.
    pub fn input_enabled(&self) -> bool {
        !self.pending
    }

    pub fn insert_char(&mut self, ch: char) {
        if self.input_enabled() {
            self.input.push(ch);
        }
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn backspace(&mut self) {
        if self.input_enabled() {
            self.input.pop();
        }
    }

    pub fn can_send(&self) -> bool {
        !self.pending && !self.input.trim().is_empty()
    }

    pub fn can_record(&self) -> bool {
        self.audio_supported && !self.pending
    }

    /// Take the input for sending, or `None` when sending is disabled.
    pub fn take_input(&mut self) -> Option<String> {
        if !self.can_send() {
            return None;
        }
        Some(std::mem::take(&mut self.input))
    }

    /// Rows the input box needs, capped at [`MAX_INPUT_ROWS`].
    pub fn input_rows(&self) -> u16 {
        let rows = self.input.split('\n').count().max(1);
        min(rows, MAX_INPUT_ROWS as usize) as u16
    }

    /// Playback URL of the most recent spoken reply.
    pub fn latest_audio_url(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|message| message.role == Role::Assistant)
            .find_map(|message| message.audio_url.as_deref())
    }

    /// Scroll the chat view upward by a number of lines.
    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_bottom = false;
        self.scroll = self.scroll.saturating_sub(lines);
        self.record_scroll();
    }

    /// Scroll the chat view downward by a number of lines.
    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = min(self.scroll.saturating_add(lines), self.chat_max_scroll);
        self.record_scroll();
    }

    /// Scroll to the top of the chat view.
    pub fn scroll_to_top(&mut self) {
        self.follow_bottom = false;
        self.scroll = 0;
        self.record_scroll();
    }

    /// Move to the bottom now and again once the next layout is known.
    pub fn jump_to_bottom(&mut self) {
        self.follow_bottom = true;
        self.scroll = self.chat_max_scroll;
        self.tracker.scrolled_to_bottom();
    }

    pub fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            scroll_height: u32::from(self.total_lines),
            scroll_top: u32::from(self.scroll),
            client_height: u32::from(self.viewport_height),
        }
    }

    /// Update scroll bounds after layout changes.
    ///
    /// New content never moves the view by itself; following the bottom is
    /// driven by [`App::jump_to_bottom`]. Layout-only changes (resize, typing
    /// indicator) keep a view that sat exactly at the bottom pinned there.
    pub fn update_scroll_bounds(&mut self, total_lines: u16, viewport_height: u16) {
        let was_at_bottom = self.scroll >= self.chat_max_scroll;
        let content_changed = self.laid_out_revision != self.revision;
        self.laid_out_revision = self.revision;
        self.total_lines = total_lines;
        self.viewport_height = viewport_height;
        let max_scroll = total_lines.saturating_sub(viewport_height);
        self.chat_max_scroll = max_scroll;

        if self.follow_bottom {
            self.follow_bottom = false;
            self.scroll = max_scroll;
            self.tracker.scrolled_to_bottom();
        } else if was_at_bottom && !content_changed {
            self.scroll = max_scroll;
        } else if self.scroll > max_scroll {
            self.scroll = max_scroll;
            self.record_scroll();
        }
    }

    fn record_scroll(&mut self) {
        self.tracker.on_scroll(self.metrics(), self.messages.len());
    }

    /// Render chat messages into styled lines for the UI.
    pub fn render_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        if self.messages.is_empty() && !self.pending {
            self.render_welcome(&mut lines);
            return lines;
        }

        let latest_audio = self.latest_audio_url();
        for (idx, message) in self.messages.iter().enumerate() {
            lines.push(self.badge_line(message));

            let content_style = Style::default().fg(TEXT);
            let mut content_lines = message.content.lines();
            if let Some(first) = content_lines.next() {
                let first = if message.kind == MessageKind::Audio && message.role == Role::User {
                    format!(" ♪ {first}")
                } else {
                    format!(" {first}")
                };
                lines.push(Line::from(Span::styled(first, content_style)));
                for line in content_lines {
                    lines.push(Line::from(Span::styled(format!(" {line}"), content_style)));
                }
            }

            if let Some(url) = message.audio_url.as_deref() {
                let mut spans = vec![
                    Span::styled(" ♪ ", Style::default().fg(SECONDARY)),
                    Span::styled(url.to_string(), Style::default().fg(TEXT_MUTED)),
                ];
                if latest_audio == Some(url) {
                    spans.push(Span::styled(
                        "  [Ctrl+P] play",
                        Style::default().fg(SECONDARY).add_modifier(Modifier::BOLD),
                    ));
                }
                lines.push(Line::from(spans));
            }

            if idx + 1 < self.messages.len() || self.pending {
                lines.push(Line::from(Span::raw("")));
            }
        }

        if self.pending {
            lines.push(Line::from(Span::styled(
                format!(" {} ", self.persona.name),
                badge_style(SECONDARY),
            )));
            let dots = ".".repeat((self.ticks % 4) as usize);
            lines.push(Line::from(Span::styled(
                format!(" typing{dots}"),
                Style::default()
                    .fg(TEXT_MUTED)
                    .add_modifier(Modifier::ITALIC),
            )));
        }

        // Trailing padding keeps the last line reachable when wrapping is tight.
        lines.push(Line::from(Span::raw("")));

        lines
    }

    fn render_welcome(&self, lines: &mut Vec<Line<'static>>) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", self.persona.welcome_title),
            Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
        for body_line in self.persona.welcome_body.lines() {
            lines.push(Line::from(Span::styled(
                format!("  {body_line}"),
                Style::default().fg(TEXT),
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", self.persona.welcome_hint),
            Style::default()
                .fg(TEXT_MUTED)
                .add_modifier(Modifier::ITALIC),
        )));
        lines.push(Line::from(Span::styled(
            "  ─".to_string() + &"─".repeat(24),
            Style::default().fg(BORDER),
        )));
    }

    fn badge_line(&self, message: &Message) -> Line<'static> {
        let (label, color) = match message.role {
            Role::User => (self.persona.user_label.as_str(), USER_BADGE),
            Role::Assistant => (self.persona.name.as_str(), SECONDARY),
        };
        let mut spans = vec![Span::styled(format!(" {label} "), badge_style(color))];
        if let Some(time) = format_time(&message.timestamp) {
            spans.push(Span::styled(
                format!("  {time}"),
                Style::default().fg(TEXT_MUTED),
            ));
        }
        if message.kind == MessageKind::Audio {
            spans.push(Span::styled("  voice", Style::default().fg(TEXT_MUTED)));
        }
        Line::from(spans)
    }
}

fn badge_style(color: ratatui::style::Color) -> Style {
    Style::default()
        .fg(BADGE_FG)
        .bg(color)
        .add_modifier(Modifier::BOLD)
}

/// Local `HH:MM` for an ISO-8601 timestamp; naive timestamps are taken as local.
pub fn format_time(timestamp: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Local).format("%H:%M").to_string());
    }
    let naive = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(naive.format("%H:%M").to_string())
}

/// Recording timer as `m:ss`.
pub fn format_elapsed(elapsed_secs: u64) -> String {
    format!("{}:{:02}", elapsed_secs / 60, elapsed_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn app() -> App {
        let context = ClientContext::new("session_1714550400000_abc123xyz", "", true);
        App::new(
            PersonaConfig::default(),
            &context,
            ScrollTracker::new(3, Duration::from_millis(100)),
        )
    }

    fn snapshot(messages: Vec<Message>) -> Arc<[Message]> {
        Arc::from(messages)
    }

    fn conversation(len: usize) -> Vec<Message> {
        (0..len)
            .map(|idx| {
                if idx % 2 == 0 {
                    Message::user(format!("question {idx}"))
                } else {
                    Message::assistant(format!("answer {idx}"), "2024-05-01T10:00:00")
                }
            })
            .collect()
    }

    fn line_text(line: &Line<'_>) -> String {
        line.spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect()
    }

    #[test]
    fn header_label_is_truncated_session_id() {
        assert_eq!(app().session_label, "session_1714");
    }

    #[test]
    fn empty_store_renders_welcome_panel() {
        let app = app();
        let text: Vec<String> = app.render_lines().iter().map(line_text).collect();
        assert!(text.iter().any(|line| line.contains("Welcome")));
        assert!(text.iter().any(|line| line.contains("How can I help you today?")));
    }

    #[test]
    fn audio_reply_shows_playback_line() {
        let mut app = app();
        let reply = Message::assistant("hi!", "2024-05-01T10:00:00")
            .with_kind(MessageKind::Audio)
            .with_audio_url("http://localhost:8000/chat/audio/1.mp3");
        app.sync_messages(snapshot(vec![Message::user("hello"), reply]), 1);

        let text: Vec<String> = app.render_lines().iter().map(line_text).collect();
        assert!(text.contains(&" Persona   10:00  voice".to_string()));
        assert!(text.contains(
            &" ♪ http://localhost:8000/chat/audio/1.mp3  [Ctrl+P] play".to_string()
        ));
        assert_eq!(
            app.latest_audio_url(),
            Some("http://localhost:8000/chat/audio/1.mp3")
        );
    }

    #[test]
    fn pending_shows_typing_indicator() {
        let mut app = app();
        app.sync_messages(snapshot(vec![Message::user("hello")]), 1);
        app.set_pending(true);
        app.ticks = 2;

        let text: Vec<String> = app.render_lines().iter().map(line_text).collect();
        assert!(text.contains(&" typing..".to_string()));
    }

    #[test]
    fn input_is_locked_while_pending() {
        let mut app = app();
        app.insert_char('h');
        app.insert_char('i');
        app.set_pending(true);
        app.insert_char('!');
        app.backspace();

        assert_eq!(app.input, "hi");
        assert!(!app.can_send());
        assert_eq!(app.take_input(), None);

        app.set_pending(false);
        assert_eq!(app.take_input().as_deref(), Some("hi"));
        assert!(app.input.is_empty());
    }

    #[test]
    fn blank_input_cannot_be_sent() {
        let mut app = app();
        app.insert_char(' ');
        app.insert_newline();
        assert!(!app.can_send());
        assert_eq!(app.take_input(), None);
        assert_eq!(app.input_rows(), 2);
    }

    #[test]
    fn recording_requires_capability_and_idle_send() {
        let mut app = app();
        assert!(app.can_record());
        app.set_pending(true);
        assert!(!app.can_record());

        let context = ClientContext::new("s", "", false);
        let app = App::new(PersonaConfig::default(), &context, ScrollTracker::default());
        assert!(!app.can_record());
    }

    #[test]
    fn user_message_forces_scroll_to_bottom() {
        let mut app = app();
        app.sync_messages(snapshot(conversation(10)), 1);
        app.update_scroll_bounds(40, 10);
        app.scroll_up(20);
        assert!(!app.tracker.is_near_bottom());

        let mut messages = conversation(10);
        messages.push(Message::user("one more"));
        assert_eq!(
            app.sync_messages(snapshot(messages), 2),
            ScrollDecision::Force
        );
        app.update_scroll_bounds(43, 10);
        assert_eq!(app.scroll, 33);
        assert!(!app.tracker.show_jump_button());
    }

    #[test]
    fn reply_while_scrolled_up_shows_jump_marker() {
        let mut app = app();
        app.sync_messages(snapshot(conversation(10)), 1);
        app.update_scroll_bounds(40, 10);
        app.jump_to_bottom();
        app.update_scroll_bounds(40, 10);
        app.scroll_up(20);
        assert!(!app.tracker.is_near_bottom());

        let mut messages = conversation(10);
        messages.push(Message::assistant("unprompted", "2024-05-01T10:00:00"));
        assert_eq!(app.sync_messages(snapshot(messages), 2), ScrollDecision::Stay);
        app.update_scroll_bounds(43, 10);

        assert_eq!(app.scroll, 10);
        assert!(app.tracker.show_jump_button());
    }

    #[test]
    fn reply_near_bottom_settles_then_follows() {
        let mut app = app();
        app.sync_messages(snapshot(conversation(10)), 1);
        app.update_scroll_bounds(40, 10);
        app.jump_to_bottom();
        app.update_scroll_bounds(40, 10);
        app.scroll_up(2);
        assert!(app.tracker.is_near_bottom());

        let mut messages = conversation(10);
        messages.push(Message::assistant("reply", "2024-05-01T10:00:00"));
        assert_eq!(
            app.sync_messages(snapshot(messages), 2),
            ScrollDecision::Settle(Duration::from_millis(100))
        );
        app.update_scroll_bounds(43, 10);
        assert_eq!(app.scroll, 28);

        app.jump_to_bottom();
        app.update_scroll_bounds(43, 10);
        assert_eq!(app.scroll, 33);
    }

    #[test]
    fn resize_keeps_bottom_pinned() {
        let mut app = app();
        app.sync_messages(snapshot(conversation(10)), 1);
        app.update_scroll_bounds(40, 10);
        app.jump_to_bottom();
        app.update_scroll_bounds(40, 10);
        assert_eq!(app.scroll, 30);

        app.update_scroll_bounds(40, 6);
        assert_eq!(app.scroll, 34);
    }

    #[test]
    fn manual_scroll_to_bottom_hides_jump_marker() {
        let mut app = app();
        app.sync_messages(snapshot(conversation(10)), 1);
        app.update_scroll_bounds(40, 10);
        app.scroll_up(20);
        assert!(app.tracker.show_jump_button());

        app.scroll_down(u16::MAX);
        assert_eq!(app.scroll, 30);
        assert!(!app.tracker.show_jump_button());
    }

    #[test]
    fn stale_revision_is_ignored() {
        let mut app = app();
        app.sync_messages(snapshot(conversation(2)), 3);
        assert_eq!(
            app.sync_messages(snapshot(conversation(2)), 3),
            ScrollDecision::Stay
        );
    }

    #[test]
    fn naive_timestamps_render_as_written() {
        assert_eq!(format_time("2024-05-01T10:07:31.123456").as_deref(), Some("10:07"));
        assert_eq!(format_time("2024-05-01T23:59:00").as_deref(), Some("23:59"));
        assert_eq!(format_time("2024-05-01T10:00:00Z").map(|t| t.len()), Some(5));
        assert_eq!(format_time("yesterday"), None);
    }

    #[test]
    fn elapsed_formats_as_minutes_and_seconds() {
        assert_eq!(format_elapsed(0), "0:00");
        assert_eq!(format_elapsed(7), "0:07");
        assert_eq!(format_elapsed(125), "2:05");
    }
}
