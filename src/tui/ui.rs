//! Match screen rendering
//!
//! Everything drawn here comes from `UiState`; the only other input is the
//! text currently being typed.

use super::lobby::render_lobby;
use crate::app::{App, PlayerLine, UiState};
use crate::game::engine::{Phase, RoundDetails, RoundResult};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Render the lobby or the match screen, whichever applies
pub fn render(frame: &mut Frame, app: &App) {
    let ui = app.ui();
    if ui.phase.is_none() {
        render_lobby(frame, ui);
    } else {
        render_match(frame, ui, &app.input);
    }
}

fn render_match(frame: &mut Frame, ui: &UiState, input: &str) {
    let area = frame.area();

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header: round, letters, timer
            Constraint::Min(0),    // Main content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header(frame, layout[0], ui);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(30), Constraint::Length(24)])
        .split(layout[1]);

    render_play_area(frame, columns[0], ui, input);
    render_scoreboard(frame, columns[1], &ui.players);
    render_status_bar(frame, layout[2], ui);
}

fn render_header(frame: &mut Frame, area: Rect, ui: &UiState) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let header_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(12), // Round
            Constraint::Min(20),    // Letters or scramble
            Constraint::Length(8),  // Timer
        ])
        .split(inner);

    let round = Paragraph::new(format!("Round {}/5", ui.round_number))
        .style(Style::default().fg(Color::Yellow).bold())
        .alignment(Alignment::Left);
    frame.render_widget(round, header_layout[0]);

    let rack = match &ui.scrambled {
        Some(scrambled) => format_letter_rack(&scrambled.chars().collect::<Vec<_>>()),
        None => format_letter_rack(&ui.letters),
    };
    let letters = Paragraph::new(rack)
        .style(Style::default().fg(Color::Cyan).bold())
        .alignment(Alignment::Center);
    frame.render_widget(letters, header_layout[1]);

    if let Some(seconds) = ui.remaining_seconds {
        let timer = Paragraph::new(format_timer(seconds))
            .style(Style::default().fg(timer_color(seconds)).bold())
            .alignment(Alignment::Right);
        frame.render_widget(timer, header_layout[2]);
    }
}

fn render_play_area(frame: &mut Frame, area: Rect, ui: &UiState, input: &str) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // Prompt
            Constraint::Length(1), // Input line
            Constraint::Length(1), // Error
            Constraint::Length(1), // Spacer
            Constraint::Min(0),    // Last round / match result
        ])
        .split(area);

    if let Some(prompt) = &ui.prompt {
        let style = if ui.is_my_turn_to_pick {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::White)
        };
        frame.render_widget(Paragraph::new(prompt.as_str()).style(style), layout[0]);
    }

    if ui.accepts_text() {
        let line = Paragraph::new(format!("> {input}_")).style(Style::default().fg(Color::White));
        frame.render_widget(line, layout[1]);
    }

    if let Some(error) = &ui.error_message {
        frame.render_widget(
            Paragraph::new(error.as_str()).style(Style::default().fg(Color::Red)),
            layout[2],
        );
    }

    let mut lines: Vec<Line> = Vec::new();
    if let Some(winner) = &ui.winner_line {
        lines.push(Line::styled(winner.clone(), Style::default().fg(Color::Yellow).bold()));
        lines.push(Line::default());
    }
    if let Some(result) = &ui.last_round {
        let title_style = if ui.last_round_is_new {
            Style::default().fg(Color::Green).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::styled(format!("Round {} result", result.round_number), title_style));
        lines.extend(round_lines(result, &ui.players).into_iter().map(Line::from));
    }
    frame.render_widget(Paragraph::new(lines), layout[4]);
}

fn display_name<'a>(players: &'a [PlayerLine], player_id: &str) -> &'a str {
    players
        .iter()
        .find(|p| p.player_id == player_id)
        .map(|p| p.display_name.as_str())
        .unwrap_or("?")
}

/// One line per player (letters) or the answer and solver (conundrum).
fn round_lines(result: &RoundResult, players: &[PlayerLine]) -> Vec<String> {
    match &result.details {
        RoundDetails::Letters { submissions, .. } => submissions
            .iter()
            .map(|s| {
                let name = display_name(players, &s.player_id);
                let verdict = match s.result.failure_kind {
                    None => format!("+{}", s.result.score),
                    Some(kind) => kind.label().to_string(),
                };
                if s.submitted && !s.result.normalized_word.is_empty() {
                    format!("  {name}: {} ({verdict})", s.result.normalized_word.to_uppercase())
                } else {
                    format!("  {name}: no word")
                }
            })
            .collect(),
        RoundDetails::Conundrum {
            answer, solved_by, ..
        } => {
            let solver = match solved_by {
                Some(id) => format!("  Solved by {}", display_name(players, id)),
                None => "  Nobody solved it".to_string(),
            };
            vec![format!("  Answer: {answer}"), solver]
        }
    }
}

fn render_scoreboard(frame: &mut Frame, area: Rect, players: &[PlayerLine]) {
    let items: Vec<ListItem> = players
        .iter()
        .map(|p| {
            let style = if p.is_me {
                Style::default().fg(Color::Cyan).bold()
            } else {
                Style::default().fg(Color::White)
            };
            let away = if p.connected { "" } else { " (away)" };
            ListItem::new(format!("{} - {}{away}", p.display_name, p.score)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title("Score"),
    );
    frame.render_widget(list, area);
}

fn render_status_bar(frame: &mut Frame, area: Rect, ui: &UiState) {
    let keys = match ui.phase {
        Some(phase) if phase.is_terminal() => "[J] Again  [Q] Quit",
        Some(Phase::LettersSolving) | Some(Phase::ConundrumSolving) => "Enter Submit  F2 Forfeit",
        _ => "F2 Forfeit  Esc Quit",
    };
    let status = Paragraph::new(format!("{}  |  {keys}", ui.status_message))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, area);
}

fn format_letter_rack(letters: &[char]) -> String {
    if letters.is_empty() {
        return String::from("[ ]");
    }
    let letters_str: String = letters
        .iter()
        .map(|c| c.to_ascii_uppercase().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!("[ {letters_str} ]")
}

fn format_timer(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn timer_color(seconds: u64) -> Color {
    if seconds <= 5 {
        Color::Red
    } else if seconds <= 10 {
        Color::Yellow
    } else {
        Color::Green
    }
}
