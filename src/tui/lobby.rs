//! Matchmaking screen, shown while not seated in a match
//!
//! Layout:
//! ┌─────────────────────────────────────────────────┐
//! │  LETTERMATCH                    Ada · 12 online │
//! ├─────────────────────────────────────────────────┤
//! │                Searching (casual)               │
//! │                                                 │
//! │  Last match: Bea won                            │
//! │                                                 │
//! │  [J] casual  [R] ranked  [L] leave  [Q] quit    │
//! └─────────────────────────────────────────────────┘

use crate::app::UiState;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

pub fn render_lobby(frame: &mut Frame, ui: &UiState) {
    let area = frame.area();

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(2), // Footer
        ])
        .split(area);

    render_lobby_header(frame, layout[0], ui);
    render_lobby_content(frame, layout[1], ui);

    let footer = Paragraph::new("[J] Casual  [R] Ranked  [L] Leave queue  [Q] Quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(footer, layout[2]);
}

fn render_lobby_header(frame: &mut Frame, area: Rect, ui: &UiState) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let header_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(14), Constraint::Min(0)])
        .split(inner);

    let logo = Paragraph::new("LETTERMATCH")
        .style(Style::default().fg(Color::Yellow).bold())
        .alignment(Alignment::Left);
    frame.render_widget(logo, header_layout[0]);

    let who = ui.my_display_name.as_deref().unwrap_or("...");
    let presence = Paragraph::new(format!("{who} · {} online", ui.online_count))
        .style(Style::default().fg(Color::Cyan).bold())
        .alignment(Alignment::Right);
    frame.render_widget(presence, header_layout[1]);
}

fn render_lobby_content(frame: &mut Frame, area: Rect, ui: &UiState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // Status
            Constraint::Length(1), // Queue
            Constraint::Length(1), // Spacer
            Constraint::Length(1), // Last match
            Constraint::Length(1), // Error
            Constraint::Min(0),
        ])
        .split(area);

    let status = Paragraph::new(ui.status_message.as_str())
        .style(Style::default().fg(Color::White).bold())
        .alignment(Alignment::Center);
    frame.render_widget(status, layout[0]);

    let queue = Paragraph::new(ui.queue_label.as_str())
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center);
    frame.render_widget(queue, layout[1]);

    if let Some(winner) = &ui.winner_line {
        let last = Paragraph::new(format!("Last match: {winner}"))
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        frame.render_widget(last, layout[3]);
    }

    if let Some(error) = &ui.error_message {
        let error = Paragraph::new(error.as_str())
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center);
        frame.render_widget(error, layout[4]);
    }
}
