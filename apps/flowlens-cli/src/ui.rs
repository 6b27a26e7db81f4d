use std::{
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use flowlens_diagram::{DiagramBuilder, TextRenderer};
use flowlens_ops::{ArchitectureState, DashboardState};
use flowlens_types::{
    activity::{LogEntry, LogLevel},
    timing::MutationTiming,
    Architecture,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tokio::sync::mpsc::UnboundedSender;

pub enum UiMessage {
    State(Box<DashboardState>),
    Shutdown,
}

/// Key presses forwarded to the async side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    QueryBoth,
    CreateDemo,
    Health,
    SelectNext,
    Quit,
}

pub fn run(
    receiver: Receiver<UiMessage>,
    commands: UnboundedSender<UiCommand>,
    builder: DiagramBuilder,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &commands, &builder);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    let _ = commands.send(UiCommand::Quit);
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    commands: &UnboundedSender<UiCommand>,
    builder: &DiagramBuilder,
) -> Result<()> {
    let mut state: Option<DashboardState> = None;

    loop {
        let mut should_close = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::State(next)) => state = Some(*next),
                Ok(UiMessage::Shutdown) | Err(TryRecvError::Disconnected) => {
                    should_close = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        if should_close {
            break;
        }

        terminal.draw(|f| draw(f, state.as_ref(), builder))?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                let command = match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('r') => UiCommand::QueryBoth,
                    KeyCode::Char('c') => UiCommand::CreateDemo,
                    KeyCode::Char('h') => UiCommand::Health,
                    KeyCode::Char('n') | KeyCode::Tab => UiCommand::SelectNext,
                    _ => continue,
                };
                if commands.send(command).is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn draw(f: &mut Frame, state: Option<&DashboardState>, builder: &DiagramBuilder) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(f.size());

    let selected = state.map(|s| s.selected_person.as_str()).unwrap_or("-");
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "flowlens",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  person: "),
        Span::styled(selected.to_string(), Style::default().fg(Color::Magenta)),
        Span::raw("  "),
        key_hint("r", "query both"),
        key_hint("c", "create demo"),
        key_hint("h", "health"),
        key_hint("n", "next person"),
        key_hint("q", "quit"),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Architecture Comparison"));
    f.render_widget(header, chunks[0]);

    let Some(state) = state else {
        f.render_widget(
            Paragraph::new("waiting for state...").block(Block::default().borders(Borders::ALL)),
            chunks[1],
        );
        return;
    };

    f.render_widget(
        Paragraph::new(comparison_line(state))
            .block(Block::default().borders(Borders::ALL).title("Summary")),
        chunks[1],
    );

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);
    for (architecture, area) in Architecture::ALL.into_iter().zip(columns.iter()) {
        draw_panel(f, *area, architecture, state.architecture(architecture), builder);
    }
}

fn key_hint(key: &'static str, label: &'static str) -> Span<'static> {
    Span::styled(
        format!("[{key}] {label}  "),
        Style::default().fg(Color::Yellow),
    )
}

fn comparison_line(state: &DashboardState) -> String {
    let reads = state.comparison();
    let mut line = match (reads.federated_ms, reads.projected_ms, reads.latency_diff_percent) {
        (Some(fed), Some(proj), Some(diff)) => {
            format!("read: federation {fed}ms vs projection {proj}ms ({diff:+}%)")
        }
        _ => "read: query both architectures to compare".to_string(),
    };
    if let Some(writes) = state.write_comparison() {
        line.push_str(&format!("  |  federation write: {}", writes.describe()));
    }
    line
}

fn draw_panel(
    f: &mut Frame,
    area: Rect,
    architecture: Architecture,
    side: &ArchitectureState,
    builder: &DiagramBuilder,
) {
    let mut spec = builder.build(
        architecture,
        &side.metrics.stage_timing,
        side.mutation.as_ref(),
    );
    if spec.subject.is_none() {
        spec.subject = side.metrics.last_entity.clone();
    }
    let diagram: Vec<Line> = TextRenderer
        .lines(&spec)
        .into_iter()
        .map(Line::from)
        .collect();
    let metrics = metrics_lines(side);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(diagram.len() as u16 + 2),
            Constraint::Length(metrics.len() as u16 + 2),
            Constraint::Min(0),
        ])
        .split(area);

    f.render_widget(
        Paragraph::new(diagram).block(
            Block::default()
                .borders(Borders::ALL)
                .title(architecture.title()),
        ),
        rows[0],
    );
    f.render_widget(
        Paragraph::new(metrics).block(Block::default().borders(Borders::ALL).title("Metrics")),
        rows[1],
    );

    let items: Vec<ListItem> = side.log.entries().rev().map(log_item).collect();
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Activity")),
        rows[2],
    );
}

fn ms(value: Option<u64>) -> String {
    value.map(|v| format!("{v}ms")).unwrap_or_else(|| "-".into())
}

fn metrics_lines(side: &ArchitectureState) -> Vec<Line<'static>> {
    let metrics = &side.metrics;
    let services: Vec<Span> = metrics
        .services_up
        .iter()
        .map(|(name, up)| {
            let color = if *up { Color::Green } else { Color::Red };
            Span::styled(format!("{name} "), Style::default().fg(color))
        })
        .collect();

    let mut lines = vec![
        Line::from(format!(
            "latency {}  queries {}  errors {}",
            ms(metrics.latency_ms),
            metrics.query_count,
            metrics.error_count
        )),
        Line::from(services),
    ];
    if metrics.architecture.propagates_asynchronously() {
        lines.push(Line::from(format!("freshness {}", metrics.freshness_label())));
    }
    if let Some(mutation) = side.mutation.as_ref().filter(|m| m.is_present()) {
        lines.push(mutation_line(mutation));
    }
    lines
}

fn mutation_line(mutation: &MutationTiming) -> Line<'static> {
    let mut text = format!("write {}", ms(mutation.mutation_ms));
    if mutation.propagation_ms.is_some() {
        text.push_str(&format!(" + propagation {}", ms(mutation.propagation_ms)));
    }
    text.push_str(&format!(
        " = {} ({})",
        ms(mutation.total_ms),
        mutation.propagation.describe()
    ));
    Line::from(text)
}

fn log_item(entry: &LogEntry) -> ListItem<'static> {
    let style = match entry.level {
        LogLevel::Info => Style::default(),
        LogLevel::Warning => Style::default().fg(Color::Yellow),
        LogLevel::Error => Style::default().fg(Color::Red),
    };
    ListItem::new(Span::styled(entry.render(), style))
}
