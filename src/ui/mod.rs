mod dashboard;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::{App, Mode};

const HELP: &str = "r: refresh • a: agent fix • h: hide • H: show hidden • enter: open • m: merge • q: quit";

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    match &app.mode {
        Mode::Error(msg) => render_error(frame, msg, chunks[1]),
        Mode::Loading | Mode::Ready => dashboard::render(frame, app, chunks[1]),
    }

    render_status_bar(frame, app, chunks[2]);
}

/// Key hints for the status bar. Switching lists is only offered when it
/// would do something.
pub fn help_text(app: &App) -> String {
    if app.can_switch_lists() {
        format!("tab: switch • {}", HELP)
    } else {
        HELP.to_string()
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        " PR Watchtower ",
        Style::default()
            .fg(Color::Rgb(0xFA, 0xFA, 0xFA))
            .bg(Color::Rgb(0x7D, 0x56, 0xF4))
            .add_modifier(Modifier::BOLD),
    )];
    if app.show_hidden {
        spans.push(Span::styled(
            "  showing hidden",
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_error(frame: &mut Frame, msg: &str, area: Rect) {
    let body = Paragraph::new(vec![
        Line::from(Span::styled(
            format!("Error: {}", msg),
            Style::default().fg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Press r to retry.",
            Style::default().fg(Color::Gray),
        )),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );
    frame.render_widget(body, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = match app.mode {
        Mode::Loading => Line::from(vec![Span::styled(
            "Loading PRs...",
            Style::default().fg(Color::Yellow),
        )]),
        Mode::Ready | Mode::Error(_) => Line::from(vec![Span::styled(
            help_text(app),
            Style::default().fg(Color::Indexed(241)),
        )]),
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::Black));
    frame.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::*;
    use crate::action::Action;
    use crate::app::SessionSettings;
    use crate::store::StatusStore;
    use crate::types::fixtures::pr;
    use crate::types::ChecksStatus;

    fn app() -> App {
        App::new(
            StatusStore::open_in_memory().unwrap(),
            SessionSettings {
                needs_review_query: "a".into(),
                mine_query: "b".into(),
                refresh_interval: Duration::from_secs(60),
            },
        )
    }

    fn draw(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn help_mentions_tab_only_with_two_lists() {
        let mut app = app();
        app.update(Action::DataLoaded {
            needs_review: vec![pr(1)],
            mine: vec![],
            load_id: 1,
        });
        assert!(!help_text(&app).contains("tab"));

        app.update(Action::DataLoaded {
            needs_review: vec![pr(1)],
            mine: vec![pr(2)],
            load_id: 2,
        });
        assert!(help_text(&app).starts_with("tab: switch"));
    }

    #[test]
    fn renders_badges_and_titles() {
        let mut app = app();
        let mut failing = pr(2);
        failing.checks = ChecksStatus::Failure;
        app.update(Action::DataLoaded {
            needs_review: vec![pr(1)],
            mine: vec![failing],
            load_id: 1,
        });

        let screen = draw(&app);
        assert!(screen.contains("PR Watchtower"));
        assert!(screen.contains("Needs Review"));
        assert!(screen.contains("My PRs"));
        assert!(screen.contains("[NEW]"));
        assert!(screen.contains("#1 PR 1"));
        assert!(screen.contains("✖"));
    }

    #[test]
    fn renders_hidden_badge_when_showing_hidden() {
        let mut app = app();
        app.update(Action::DataLoaded {
            needs_review: vec![pr(1), pr(2)],
            mine: vec![],
            load_id: 1,
        });
        app.update(Action::ToggleHidden);
        assert!(!draw(&app).contains("PR 1"));

        app.update(Action::ToggleShowHidden);
        let screen = draw(&app);
        assert!(screen.contains("[HIDDEN]"));
        assert!(screen.contains("PR 1"));
    }

    #[test]
    fn error_replaces_lists() {
        let mut app = app();
        app.update(Action::DataLoaded {
            needs_review: vec![pr(1)],
            mine: vec![],
            load_id: 1,
        });
        app.update(Action::ActionFailed("Merge failed".into()));

        let screen = draw(&app);
        assert!(screen.contains("Error: Merge failed"));
        assert!(!screen.contains("Needs Review"));
    }

    #[test]
    fn loading_shows_in_status_bar() {
        let app = app();
        assert!(draw(&app).contains("Loading PRs..."));
    }
}
