mod help;
mod state;

use crate::cli::{build_form, Cli, Session};
use crate::form::FormState;
use crate::model::{ControlState, HistoryRow, StatusBucket, UiEvent};
use crate::orchestrator::{self, Controllers, UiCommand};
use crate::view::{Alert, PreviewPanel};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{KeyOutcome, UiState, TAB_HELP, TAB_HISTORY, TAB_RENDER, TAB_TITLES};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub(crate) async fn run(args: Cli, session: Session) -> Result<()> {
    // Unbounded channels avoid backpressure between the UI thread and the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let form = build_form(&args, &session.prefs);
    let controllers = Controllers::new(session.service, session.prefs, event_tx, session.settings);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let base_url = args.base_url.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(form, base_url, event_rx, cmd_tx));

    let res = orchestrator::run_controller(controllers, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    form: FormState,
    base_url: String,
    mut event_rx: UnboundedReceiver<UiEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(form);
    state.view.info = Some(format!("Connected to {base_url}"));

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match state.handle_key(k) {
                    KeyOutcome::Nothing => {}
                    KeyOutcome::Command(cmd) => {
                        let _ = cmd_tx.send(cmd);
                    }
                    KeyOutcome::Quit => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let tabs = Tabs::new(TAB_TITLES.iter().map(|t| Line::from(*t)).collect::<Vec<_>>())
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("git-chronoscope"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_RENDER => draw_render(chunks[1], f, state),
        TAB_HISTORY => draw_history(chunks[1], f, state),
        TAB_HELP => help::draw_help(chunks[1], f),
        _ => {}
    }

    let info = state.view.info.as_deref().unwrap_or("");
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            info.to_string(),
            Style::default().fg(Color::Gray),
        ))),
        chunks[2],
    );

    if let Some(alert) = state.view.current_alert() {
        draw_alert(area, f, alert);
    }
}

fn control_span(state: &ControlState, ready_label: &str) -> Span<'static> {
    match state {
        ControlState::Ready => Span::styled(
            format!("[ {ready_label} ]"),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        ControlState::Busy(label) => {
            Span::styled(format!("[ {label} ]"), Style::default().fg(Color::DarkGray))
        }
    }
}

fn draw_render(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let focused = state.focused();
    let mut lines: Vec<Line> = state
        .visible_fields()
        .into_iter()
        .map(|field| {
            let is_focused = field == focused;
            let mut value = state.field_value(field);
            if is_focused && !field.is_choice() {
                value.push('_');
            } else if is_focused {
                value = format!("< {value} >");
            }
            let label_style = if is_focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            Line::from(vec![
                Span::styled(format!("{:<12}", field.label()), label_style),
                Span::raw(value),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        control_span(&state.view.submit, "Generate (Enter)"),
        Span::raw("  "),
        control_span(&state.view.branch_control, "Load branches (Ctrl-B)"),
    ]));
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Configuration")),
        cols[0],
    );

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(cols[1]);
    draw_status(right[0], f, state);
    draw_preview(right[1], f, state);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Status");
    let view = &state.view;
    if !view.status_visible {
        f.render_widget(
            Paragraph::new("Press Enter to generate a time-lapse.").block(block),
            area,
        );
        return;
    }

    let inner = block.inner(area);
    f.render_widget(block, area);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(view.progress_ratio())
        .label(format!("{}%", view.progress));
    f.render_widget(gauge, rows[0]);
    f.render_widget(Paragraph::new(view.message.clone()), rows[1]);

    if let Some(detail) = &view.detail {
        let color = if detail.is_error() {
            Color::Red
        } else if view.download_visible {
            Color::Green
        } else {
            Color::Gray
        };
        f.render_widget(
            Paragraph::new(Span::styled(detail.to_message(), Style::default().fg(color))),
            rows[2],
        );
    }

    if view.download_visible {
        let hint = match &view.last_download {
            Some(path) => format!("Saved to {}", path.display()),
            None => "Ctrl-D: download the output".to_string(),
        };
        f.render_widget(
            Paragraph::new(Span::styled(hint, Style::default().fg(Color::Magenta))),
            rows[3],
        );
    }
}

fn draw_preview(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Preview");
    let lines = match &state.view.preview {
        PreviewPanel::Hidden => vec![Line::from(Span::styled(
            "Ctrl-P renders a single frame with the current settings.",
            Style::default().fg(Color::DarkGray),
        ))],
        PreviewPanel::Loading => vec![Line::from("Generating preview...")],
        PreviewPanel::Shown {
            path,
            format,
            width,
            height,
            bytes,
        } => vec![
            Line::from(format!("{format:?} {width}x{height} ({bytes} bytes)")),
            Line::from(Span::styled(
                path.display().to_string(),
                Style::default().fg(Color::Cyan),
            )),
        ],
    };
    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title(Line::from(vec![
        Span::raw("History - "),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": navigate, "),
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(": refresh, "),
        Span::styled("d", Style::default().fg(Color::Magenta)),
        Span::raw(": download"),
    ]));

    let rows = match &state.view.history {
        None => {
            f.render_widget(Paragraph::new("Loading history...").block(block), area);
            return;
        }
        Some(rows) => rows,
    };

    let max_items = (area.height as usize).saturating_sub(2).max(1);
    let offset = state
        .history_selected
        .saturating_sub(max_items.saturating_sub(1));

    let mut index = 0usize;
    let mut lines: Vec<Line> = Vec::new();
    for row in rows {
        match row {
            HistoryRow::Placeholder => lines.push(Line::from(Span::styled(
                crate::text_summary::NO_JOBS,
                Style::default().fg(Color::DarkGray),
            ))),
            HistoryRow::Entry(e) => {
                let i = index;
                index += 1;
                if i < offset || i >= offset + max_items {
                    continue;
                }
                let color = match e.bucket {
                    StatusBucket::Success => Color::Green,
                    StatusBucket::Failure => Color::Red,
                    StatusBucket::Running => Color::Yellow,
                };
                let mut spans = vec![
                    Span::raw(if i == state.history_selected { "> " } else { "  " }),
                    Span::raw(format!("{}  ", e.created)),
                    Span::styled(format!("{:<10}", e.status), Style::default().fg(color)),
                    Span::raw(format!("{:>3}%  {:<4} {}  ", e.progress, e.format, e.repo_path)),
                    Span::styled(e.job_id.to_string(), Style::default().fg(Color::DarkGray)),
                ];
                if e.downloadable {
                    spans.push(Span::styled("  [d]", Style::default().fg(Color::Magenta)));
                }
                if let Some(err) = e.error.as_deref().filter(|s| !s.is_empty()) {
                    spans.push(Span::styled(
                        format!("  {err}"),
                        Style::default().fg(Color::Red),
                    ));
                }
                let mut line = Line::from(spans);
                if i == state.history_selected {
                    line = line.style(Style::default().add_modifier(Modifier::REVERSED));
                }
                lines.push(line);
            }
        }
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(
        area.x + (area.width - w) / 2,
        area.y + (area.height - h) / 2,
        w,
        h,
    )
}

fn draw_alert(area: Rect, f: &mut ratatui::Frame, alert: &Alert) {
    let popup = centered(area, area.width.saturating_mul(3) / 5, 7);
    f.render_widget(Clear, popup);
    let p = Paragraph::new(vec![
        Line::from(alert.message.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "Enter / Esc to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(alert.title.clone()),
    );
    f.render_widget(p, popup);
}
