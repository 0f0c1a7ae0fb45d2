//! Rendering routines for the Parlor TUI.

use crate::app::{App, format_elapsed};
use parlor_protocol::ConnectivityStatus;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
    Wrap,
};

// ── Theme colors (dark mode) ──────────────────────────────────────────

pub(crate) const PRIMARY: Color = Color::Rgb(236, 91, 43); // #EC5B2B
pub(crate) const SECONDARY: Color = Color::Rgb(238, 121, 72); // #EE7948
pub(crate) const TEXT: Color = Color::Rgb(238, 238, 238); // #eeeeee
pub(crate) const TEXT_MUTED: Color = Color::Rgb(128, 128, 128); // #808080
pub(crate) const BORDER: Color = Color::Rgb(60, 60, 60); // #3c3c3c
pub(crate) const BORDER_ACTIVE: Color = Color::Rgb(238, 121, 72); // #EE7948
pub(crate) const YELLOW: Color = Color::Rgb(229, 192, 123); // #e5c07b
pub(crate) const GREEN: Color = Color::Rgb(120, 220, 140);
pub(crate) const RED: Color = Color::Rgb(255, 110, 110);
pub(crate) const USER_BADGE: Color = Color::Rgb(107, 161, 230);
pub(crate) const BADGE_FG: Color = Color::Rgb(10, 10, 10);

const HEADER_HEIGHT: u16 = 4; // 2 inner lines + 2 border lines
const ALERT_WIDTH: u16 = 56;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Draw the entire TUI frame.
pub fn draw(frame: &mut Frame<'_>, app: &mut App) {
    let area = frame.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),       // header bar
            Constraint::Min(0),                      // chat
            Constraint::Length(app.input_rows() + 2), // input
            Constraint::Length(1),                   // status bar
        ])
        .split(area);

    draw_header(frame, app, root[0]);
    draw_chat(frame, app, root[1]);
    draw_input(frame, app, root[2]);
    draw_status_bar(frame, app, root[3]);

    if let Some(message) = app.alert.as_deref() {
        draw_alert(frame, message, area);
    }
}

/// Draw the persona header with the session id.
fn draw_header(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let label_style = Style::default().fg(TEXT_MUTED);
    let lines = vec![
        Line::from(vec![
            Span::styled(
                format!(" {}", app.persona.name),
                Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", app.persona.tagline), label_style),
        ]),
        Line::from(vec![
            Span::styled(" session ", label_style),
            Span::styled(app.session_label.as_str(), Style::default().fg(TEXT)),
            Span::styled(format!("  v{VERSION}"), label_style),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Draw the chat transcript with border, scrollbar and jump marker.
fn draw_chat(frame: &mut Frame<'_>, app: &mut App, area: Rect) {
    let lines = app.render_lines();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(" Chat ", Style::default().fg(TEXT_MUTED)));

    let inner = block.inner(area);
    let content_width = inner.width.saturating_sub(1); // -1 for scrollbar
    let content_height = inner.height as usize;

    // ratatui's own line_count gives the exact wrapped total.
    let total_lines = Paragraph::new(lines.clone())
        .wrap(Wrap { trim: false })
        .line_count(content_width)
        .max(1);

    app.update_scroll_bounds(
        u16::try_from(total_lines).unwrap_or(u16::MAX),
        inner.height,
    );
    let scroll = app.scroll;

    let chat_inner = Rect {
        width: inner.width.saturating_sub(1),
        ..inner
    };

    let chat = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));

    frame.render_widget(block, area);
    frame.render_widget(chat, chat_inner);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::default()
            .content_length(total_lines)
            .position(scroll as usize)
            .viewport_content_length(content_height);
        let scrollbar_area = Rect {
            x: inner.x + inner.width.saturating_sub(1),
            y: inner.y,
            width: 1,
            height: inner.height,
        };
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .style(Style::default().fg(BORDER))
                .thumb_style(Style::default().fg(TEXT_MUTED)),
            scrollbar_area,
            &mut scrollbar_state,
        );
    }

    if app.tracker.show_jump_button() {
        draw_jump_marker(frame, area);
    }
}

/// Marker on the chat's bottom border pointing at unseen messages.
fn draw_jump_marker(frame: &mut Frame<'_>, area: Rect) {
    let label = " ↓ new messages  Ctrl+B ";
    let width = (label.chars().count() as u16).min(area.width.saturating_sub(4));
    if width == 0 || area.height == 0 {
        return;
    }
    let marker_area = Rect {
        x: area.x + area.width.saturating_sub(width + 2),
        y: area.y + area.height - 1,
        width,
        height: 1,
    };
    let marker = Paragraph::new(Span::styled(
        label,
        Style::default()
            .fg(BADGE_FG)
            .bg(SECONDARY)
            .add_modifier(Modifier::BOLD),
    ));
    frame.render_widget(marker, marker_area);
}

/// Draw the input box with border and cursor.
fn draw_input(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let is_active = app.input_enabled() && app.alert.is_none();
    let border_color = if is_active { BORDER_ACTIVE } else { BORDER };
    let title = match app.recording {
        Some(elapsed) => format!(" ● {}  Ctrl+R to stop and send ", format_elapsed(elapsed)),
        None if app.pending => " Sending... ".to_string(),
        None => " Message ".to_string(),
    };
    let title_color = if app.recording.is_some() {
        RED
    } else if is_active {
        SECONDARY
    } else {
        TEXT_MUTED
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(title, Style::default().fg(title_color)));

    let inner = block.inner(area);

    let text_style = if is_active {
        Style::default().fg(TEXT)
    } else {
        Style::default().fg(TEXT_MUTED)
    };
    let lines: Vec<Line<'_>> = if app.input.is_empty() {
        vec![Line::from(Span::styled(
            " Type a message...",
            Style::default().fg(TEXT_MUTED),
        ))]
    } else {
        app.input
            .split('\n')
            .map(|line| Line::from(Span::styled(format!(" {line}"), text_style)))
            .collect()
    };

    // Keep the cursor line visible once the box stops growing.
    let line_count = lines.len() as u16;
    let scroll = line_count.saturating_sub(inner.height);
    let paragraph = Paragraph::new(lines).scroll((scroll, 0));
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner);

    if is_active {
        let last_line = app.input.rsplit('\n').next().unwrap_or("");
        let column = last_line.chars().count() as u16 + 1;
        let row = line_count.saturating_sub(1).saturating_sub(scroll);
        frame.set_cursor_position((
            inner.x + column.min(inner.width.saturating_sub(1)),
            inner.y + row,
        ));
    }
}

/// Draw the status bar at the bottom.
fn draw_status_bar(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let status_color = match app.status {
        ConnectivityStatus::Connected => GREEN,
        ConnectivityStatus::Checking => YELLOW,
        ConnectivityStatus::Disconnected => TEXT_MUTED,
        ConnectivityStatus::TimeoutError | ConnectivityStatus::Unavailable => RED,
    };

    let record_hint = if app.can_record() || app.recording.is_some() {
        " record"
    } else {
        " record (off)"
    };
    let shortcuts = vec![
        Span::styled(" Enter", Style::default().fg(TEXT_MUTED)),
        Span::styled(" send", Style::default().fg(BORDER)),
        Span::styled("  Ctrl+R", Style::default().fg(TEXT_MUTED)),
        Span::styled(record_hint, Style::default().fg(BORDER)),
        Span::styled("  Ctrl+P", Style::default().fg(TEXT_MUTED)),
        Span::styled(" play", Style::default().fg(BORDER)),
        Span::styled("  Ctrl+L", Style::default().fg(TEXT_MUTED)),
        Span::styled(" clear", Style::default().fg(BORDER)),
        Span::styled("  PgUp/PgDn", Style::default().fg(TEXT_MUTED)),
        Span::styled(" scroll", Style::default().fg(BORDER)),
        Span::styled("  Ctrl+C", Style::default().fg(TEXT_MUTED)),
        Span::styled(" quit", Style::default().fg(BORDER)),
    ];

    let audio_text = if app.audio_supported {
        " mic ready "
    } else {
        " no mic "
    };
    let dot = if app.status.is_connected() { "●" } else { "○" };
    let status_text = format!(" {dot} {} ", app.status);

    let right = Line::from(vec![
        Span::styled(status_text.clone(), Style::default().fg(status_color)),
        Span::styled("│", Style::default().fg(BORDER)),
        Span::styled(audio_text, Style::default().fg(TEXT_MUTED)),
    ]);

    // Calculate how much space the right side needs
    let right_len = (status_text.chars().count() + 1 + audio_text.len()) as u16;
    let left_area = Rect {
        width: area.width.saturating_sub(right_len),
        ..area
    };
    let right_area = Rect {
        x: area.x + area.width.saturating_sub(right_len),
        width: right_len.min(area.width),
        ..area
    };

    frame.render_widget(Paragraph::new(Line::from(shortcuts)), left_area);
    frame.render_widget(Paragraph::new(right), right_area);
}

/// Draw a centered modal alert.
fn draw_alert(frame: &mut Frame<'_>, message: &str, area: Rect) {
    let width = ALERT_WIDTH.min(area.width.saturating_sub(2));
    let text_width = width.saturating_sub(4).max(1) as usize;
    let body_rows = message.chars().count().div_ceil(text_width).max(1) as u16;
    let height = (body_rows + 4).min(area.height);
    let alert_area = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(PRIMARY))
        .title(Span::styled(
            " Alert ",
            Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD),
        ))
        .style(Style::default().bg(Color::Rgb(20, 20, 20)));

    let lines = vec![
        Line::from(Span::styled(format!(" {message}"), Style::default().fg(TEXT))),
        Line::from(""),
        Line::from(Span::styled(
            " Esc to dismiss",
            Style::default()
                .fg(TEXT_MUTED)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    frame.render_widget(Clear, alert_area);
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(block),
        alert_area,
    );
}
