use chrono::Utc;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::app::{App, ListKind};
use crate::store::PrStatus;
use crate::types::{ChecksStatus, PrState, PullRequestRecord};

const ORANGE: Color = Color::Indexed(208);
const GREY: Color = Color::Indexed(240);
const ACCENT: Color = Color::Rgb(0x7D, 0x56, 0xF4);

/// Below this width the author and age columns are dropped.
const WIDE_LAYOUT: u16 = 100;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    render_list(frame, app, ListKind::NeedsReview, chunks[0]);
    render_list(frame, app, ListKind::Mine, chunks[1]);
}

fn title(kind: ListKind) -> &'static str {
    match kind {
        ListKind::NeedsReview => "Needs Review",
        ListKind::Mine => "My PRs",
    }
}

fn render_list(frame: &mut Frame, app: &App, kind: ListKind, area: Rect) {
    let is_active = app.active == kind;
    let visible = app.visible(kind);
    let total = app.list(kind).len();

    let title_style = if is_active {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };

    let count = if visible.len() == total {
        format!("{}", total)
    } else {
        format!("{}/{}", visible.len(), total)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(format!(" {} ({}) ", title(kind), count), title_style))
        .border_style(if is_active {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(Color::DarkGray)
        });

    if visible.is_empty() {
        let empty = Paragraph::new("(No PRs)")
            .block(block)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, area);
        return;
    }

    let wide = app.viewport.0 >= WIDE_LAYOUT;
    let items: Vec<ListItem> = visible
        .iter()
        .enumerate()
        .map(|(i, pr)| {
            let is_selected = is_active && i == app.cursor;
            ListItem::new(item_line(app, pr, is_selected, wide))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = ListState::default();
    if is_active {
        state.select(Some(app.cursor));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

fn item_line<'a>(app: &App, pr: &'a PullRequestRecord, is_selected: bool, wide: bool) -> Line<'a> {
    let status = app.status(pr.id);
    let status_color = match status {
        PrStatus::New => Color::Green,
        PrStatus::Updated => ORANGE,
        PrStatus::Seen => GREY,
    };

    let mut spans = vec![
        Span::styled(
            if is_selected { "> " } else { "  " },
            Style::default().fg(Color::Indexed(170)),
        ),
        Span::styled(status.badge(), Style::default().fg(status_color)),
        Span::raw(" "),
    ];

    if app.is_hidden(pr.id) {
        spans.push(Span::styled("[HIDDEN] ", Style::default().fg(GREY)));
    }
    if pr.state != PrState::Open {
        spans.push(Span::styled(
            format!("[{}] ", pr.state),
            Style::default().fg(Color::Magenta),
        ));
    }
    if let Some((badge, color)) = build_badge(pr) {
        spans.push(Span::styled(badge, Style::default().fg(color)));
        spans.push(Span::raw(" "));
    }

    let title_style = if is_selected {
        Style::default()
            .fg(Color::Indexed(170))
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    spans.push(Span::styled(
        format!("#{} {}", pr.number, pr.title),
        title_style,
    ));

    if wide {
        spans.push(Span::styled(
            format!("  {}/{}", pr.repo_owner, pr.repo_name),
            Style::default().fg(Color::Cyan),
        ));
        spans.push(Span::styled(
            format!("  @{}", pr.author),
            Style::default().fg(Color::Gray),
        ));
        spans.push(Span::styled(
            format!("  {}", format_age(pr.updated_at)),
            Style::default().fg(Color::DarkGray),
        ));
    }

    Line::from(spans)
}

/// Merge conflicts outrank CI; among CI states failure outranks pending.
fn build_badge(pr: &PullRequestRecord) -> Option<(&'static str, Color)> {
    if pr.has_conflicts() {
        return Some(("!", ORANGE));
    }
    match pr.checks {
        ChecksStatus::Failure => Some(("✖", Color::Indexed(196))),
        ChecksStatus::Pending => Some(("●", Color::Indexed(220))),
        ChecksStatus::Success => Some(("✔", Color::Green)),
        ChecksStatus::None => None,
    }
}

fn format_age(dt: chrono::DateTime<chrono::Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(dt);

    if duration.num_days() > 0 {
        format!("{}d", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m", duration.num_minutes())
    } else {
        "now".to_string()
    }
}
