use chrono::{DateTime, Utc};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap,
};

use kairos_core::app::{AppState, InputMode};
use kairos_core::compact::ContentKind;
use kairos_core::confirm::ConfirmPhase;
use kairos_core::focus::FocusFrame;
use kairos_core::format::{format_count, relative_time};
use kairos_core::model::ExecutionStatus;

use super::styles;

/// Widget state that survives between frames
#[derive(Default)]
pub struct ViewState {
    table: TableState,
    records: ListState,
}

const HELP: &[(&str, &str)] = &[
    ("j/k ↑/↓", "move cursor"),
    ("enter", "open execution / drill into child"),
    ("esc", "back"),
    ("c", "drill into child workflow"),
    ("space", "toggle selection"),
    ("r", "refresh"),
    ("n / p", "next / previous page"),
    ("t", "search by workflow type"),
    ("i", "search by workflow id"),
    ("s", "search by status"),
    ("x", "clear filters"),
    ("P", "toggle parents only"),
    ("o", "open in browser"),
    ("T", "terminate"),
    ("R", "restart (reset to first task)"),
    ("?", "toggle help"),
    ("q", "quit"),
];

fn fit(s: &str, width: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= width {
        return s.to_string();
    }
    if width <= 1 {
        return "…".into();
    }
    let mut out: String = chars.into_iter().take(width - 1).collect();
    out.push('…');
    out
}

fn ago(now: DateTime<Utc>, at: Option<DateTime<Utc>>) -> String {
    at.map(|t| relative_time(now, t)).unwrap_or_else(|| "--".into())
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2)).max(10);
    let height = height.min(area.height.saturating_sub(2)).max(3);
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

pub fn draw(f: &mut Frame, app: &AppState, view: &mut ViewState, backend: &str, now: DateTime<Utc>) {
    let area = f.area();
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Top bar
            Constraint::Length(1), // Filters
            Constraint::Min(1),    // Main area
            Constraint::Length(1), // Footer
        ])
        .split(area);

    draw_top_bar(f, app, backend, outer[0]);
    draw_filter_line(f, app, outer[1]);

    match app.focus.top() {
        Some(frame) => draw_focus(f, app, frame, view, now, outer[2]),
        None => draw_list(f, app, view, now, outer[2]),
    }

    draw_footer(f, app, outer[3]);

    if app.confirm.phase() != ConfirmPhase::Idle {
        draw_confirm(f, app, area);
    }
    if app.show_help {
        draw_help(f, area);
    }
}

fn draw_top_bar(f: &mut Frame, app: &AppState, backend: &str, area: Rect) {
    let mut spans = vec![
        Span::styled(" kairos ", styles::accent_bold()),
        Span::styled(format!("│ {} ", app.links.namespace), styles::text()),
        Span::styled(format!("│ {} ", backend), styles::text_muted()),
        Span::styled("│", styles::text_muted()),
    ];
    for status in ExecutionStatus::HEADLINE {
        let count = app
            .counts
            .get(&status)
            .map(|n| format_count(*n))
            .unwrap_or_else(|| "…".into());
        spans.push(Span::styled(
            format!(" {} {}: {} ", status.icon(), status.label(), count),
            styles::status(status),
        ));
    }
    if app.loading {
        spans.push(Span::styled(" ⟳", styles::text_muted()));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_filter_line(f: &mut Frame, app: &AppState, area: Rect) {
    let summary = if app.filters.is_empty() {
        "no filters".to_string()
    } else {
        app.filters.summary()
    };
    let mut spans = vec![
        Span::styled(" filter: ", styles::text_muted()),
        Span::styled(summary, styles::text_dim()),
    ];
    if app.parents_only {
        spans.push(Span::styled("  [parents only]", styles::warn()));
    }
    if app.focus.is_empty() {
        spans.push(Span::styled(format!("  page {}", app.page + 1), styles::text_muted()));
        if !app.selected.is_empty() {
            spans.push(Span::styled(
                format!("  {} selected", app.selected.len()),
                styles::marked(),
            ));
        }
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_list(f: &mut Frame, app: &AppState, view: &mut ViewState, now: DateTime<Utc>, area: Rect) {
    let id_width = (area.width as usize).saturating_sub(70).max(16);
    let rows: Vec<Row> = app
        .rows
        .rows()
        .iter()
        .map(|row| {
            let info = &row.info;
            let marked = app.selected.contains(row.id());
            let mark = if marked { "●" } else { " " };
            let id = if info.is_child() {
                format!("↳ {}", info.execution.workflow_id)
            } else {
                info.execution.workflow_id.clone()
            };
            let id_style = if marked { styles::marked() } else { styles::text() };
            Row::new(vec![
                Cell::from(Span::styled(mark, styles::marked())),
                Cell::from(Span::styled(
                    format!("{} {}", info.status.icon(), info.status.label()),
                    styles::status(info.status),
                )),
                Cell::from(Span::styled(fit(&id, id_width), id_style)),
                Cell::from(Span::styled(fit(&info.workflow_type, 24), styles::text_dim())),
                Cell::from(Span::styled(
                    row.attempts_label(),
                    styles::attempts(row.over_threshold()),
                )),
                Cell::from(Span::styled(ago(now, info.start_time), styles::text_muted())),
                Cell::from(Span::styled(ago(now, info.close_time), styles::text_muted())),
            ])
        })
        .collect();

    let header = Row::new(vec![
        "", "Status", "Workflow ID", "Type", "Tries", "Started", "Closed",
    ])
    .style(styles::section_header());

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Length(14),
            Constraint::Min(16),
            Constraint::Length(24),
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .row_highlight_style(styles::selection())
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(styles::border_subtle())
            .title(" Executions "),
    );

    if app.rows.is_empty() {
        view.table.select(None);
    } else {
        view.table.select(Some(app.cursor));
    }
    f.render_stateful_widget(table, area, &mut view.table);
}

fn draw_focus(
    f: &mut Frame,
    app: &AppState,
    frame: &FocusFrame,
    view: &mut ViewState,
    now: DateTime<Utc>,
    area: Rect,
) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let trail: Vec<String> = app
        .focus
        .frames()
        .iter()
        .map(|fr| fr.execution.workflow_id.clone())
        .collect();
    let info = &frame.info;
    let summary = Line::from(vec![
        Span::styled(
            format!(" {} {} ", info.status.icon(), info.status.label()),
            styles::status(info.status),
        ),
        Span::styled(format!("{} ", info.workflow_type), styles::title()),
        Span::styled(format!("run {} ", frame.execution.run_id), styles::text_muted()),
        Span::styled(
            format!("started {} ", ago(now, info.start_time)),
            styles::text_dim(),
        ),
    ]);
    f.render_widget(
        Paragraph::new(summary).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border_focused())
                .title(format!(" {} ", trail.join(" › "))),
        ),
        parts[0],
    );

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(parts[1]);

    let ordered = frame.history.ordered();
    let items: Vec<ListItem> = ordered
        .iter()
        .map(|record| {
            let mut spans = vec![
                Span::styled(format!("{:>4} ", record.key), styles::text_muted()),
                Span::raw(format!("{} ", record.icon)),
                Span::styled(record.label.clone(), styles::text()),
            ];
            if record.child_execution().is_some() {
                spans.push(Span::styled("  ⏎", styles::key_hint()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    let list = List::new(items)
        .highlight_style(styles::selection())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border_subtle())
                .title(format!(" History ({}) ", ordered.len())),
        );
    view.records
        .select((!ordered.is_empty()).then_some(frame.cursor));
    f.render_stateful_widget(list, body[0], &mut view.records);

    let mut lines: Vec<Line> = Vec::new();
    if let Some(record) = frame.selected() {
        lines.push(Line::from(vec![
            Span::styled(record.category.label().to_string(), styles::section_header()),
            Span::styled(
                format!("  {} event(s)", record.events.len()),
                styles::text_muted(),
            ),
        ]));
        for event in &record.events {
            lines.push(Line::from(Span::styled(
                format!("  {:>4} {}", event.event_id, event.event_type),
                styles::text_dim(),
            )));
        }
        if let Some(child) = record.child_execution() {
            lines.push(Line::from(Span::styled(
                format!("  child: {}", child),
                styles::key_hint(),
            )));
        }
        for block in &record.content {
            lines.push(Line::raw(""));
            let style = match block.kind {
                ContentKind::LastError | ContentKind::Failure => styles::error(),
                _ => styles::success(),
            };
            lines.push(Line::from(Span::styled(format!("{}:", block.kind.label()), style)));
            for text_line in block.text.lines() {
                lines.push(Line::from(Span::styled(text_line.to_string(), styles::text())));
            }
        }
    }
    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border_subtle())
                .title(" Details "),
        ),
        body[1],
    );
}

fn draw_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let line = match &app.mode {
        InputMode::Search { field, buffer } => {
            let mut spans = vec![
                Span::styled(field.prompt(), styles::accent_bold()),
                Span::styled(buffer.clone(), styles::text()),
                Span::styled("▏", styles::accent_bold()),
            ];
            if !app.suggestions.is_empty() {
                spans.push(Span::styled(
                    format!("   tab: {}", app.suggestions.join(" · ")),
                    styles::text_muted(),
                ));
            }
            Line::from(spans)
        }
        InputMode::Normal => match &app.notice {
            Some(notice) => Line::from(Span::styled(format!(" {}", notice), styles::warn())),
            None => {
                let hints: &[(&str, &str)] = if app.focus.is_empty() {
                    &[
                        ("enter", "open"),
                        ("space", "select"),
                        ("t/i/s", "search"),
                        ("n/p", "page"),
                        ("T", "terminate"),
                        ("R", "restart"),
                        ("?", "help"),
                    ]
                } else {
                    &[
                        ("esc", "back"),
                        ("c", "child"),
                        ("o", "browser"),
                        ("T", "terminate"),
                        ("R", "restart"),
                        ("?", "help"),
                    ]
                };
                let mut spans = Vec::new();
                for (key, what) in hints {
                    spans.push(Span::styled(format!(" {}", key), styles::key_hint()));
                    spans.push(Span::styled(format!(" {} ", what), styles::text_muted()));
                }
                Line::from(spans)
            }
        },
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_confirm(f: &mut Frame, app: &AppState, area: Rect) {
    let (title, body, border) = match (app.confirm.phase(), app.confirm.outcome()) {
        (ConfirmPhase::Completed, Some(Ok(text))) => (" Done ", text.clone(), styles::success()),
        (ConfirmPhase::Completed, Some(Err(text))) => (" Failed ", text.clone(), styles::error()),
        (ConfirmPhase::Executing, _) => (" Working ", "…".to_string(), styles::border_focused()),
        _ => (" Confirm ", app.confirm.prompt().to_string(), styles::warn()),
    };
    let width = (body.chars().count() as u16 + 6).max(30);
    let rect = centered(area, width, 5);
    f.render_widget(Clear, rect);
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(body, styles::title())))
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border)
                    .title(title),
            ),
        rect,
    );
}

fn draw_help(f: &mut Frame, area: Rect) {
    let rect = centered(area, 52, HELP.len() as u16 + 2);
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!(" {:<10}", key), styles::key_hint()),
                Span::styled(*what, styles::text()),
            ])
        })
        .collect();
    f.render_widget(Clear, rect);
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border_focused())
                .title(" Keys "),
        ),
        rect,
    );
}
