use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(action),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("Esc / Ctrl-C", "Quit"),
        key_line("tab", "Switch tabs"),
        Line::from(""),
        Line::from("Render tab:"),
        key_line("↑/↓", "Move between fields"),
        key_line("←/→ space", "Change a choice field"),
        key_line("Enter", "Generate time-lapse"),
        key_line("Ctrl-B", "Load branches for the repository"),
        key_line("Ctrl-P", "Render a preview frame"),
        key_line("Ctrl-D", "Download the finished output"),
        key_line("Ctrl-R", "Refresh job history"),
        Line::from(""),
        Line::from("History tab:"),
        key_line("↑/↓ j/k", "Navigate"),
        key_line("d", "Download selected"),
        key_line("r", "Refresh history"),
        key_line("q", "Quit"),
        Line::from(""),
        Line::from("Alerts:"),
        key_line("Enter / Esc", "Dismiss"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
