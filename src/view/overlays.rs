//! Overlay rendering (alert, help popup)

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::model::{AlertLevel, UiState};

const KEYBINDINGS: &[(&str, &str)] = &[
    ("", "── Navigation ──"),
    ("Tab / Shift+Tab", "Cycle sections"),
    ("↑ / ↓", "Move selection"),
    ("Enter", "Open / Play"),
    ("/", "Focus search"),
    ("Esc", "Dismiss alert / clear search"),
    ("", ""),
    ("", "── Playback ──"),
    ("Space", "Play / Pause"),
    ("N", "Next track"),
    ("B", "Previous track"),
    ("L", "Like / Unlike track"),
    ("", ""),
    ("", "── Queue ──"),
    ("A", "Add selected track"),
    ("R / Delete", "Remove from queue"),
    ("", ""),
    ("", "── General ──"),
    ("H / ?", "Toggle this help"),
    ("Q", "Quit"),
];

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

pub fn render_alert(frame: &mut Frame, ui_state: &UiState) {
    let Some(alert) = &ui_state.alert else {
        return;
    };
    let area = frame.area();

    let popup_width = 52.min(area.width.saturating_sub(4));
    let inner_width = popup_width.saturating_sub(4).max(1) as usize;
    let line_count = alert.message.chars().count().div_ceil(inner_width).max(1) as u16;
    let popup_area = centered(area, popup_width, (2 + line_count).min(area.height.saturating_sub(4)));

    let (color, title) = match alert.level {
        AlertLevel::Error => (Color::Red, " Error (Esc to dismiss) "),
        AlertLevel::Info => (Color::Cyan, " Info "),
    };

    frame.render_widget(Clear, popup_area);
    let widget = Paragraph::new(alert.message.clone())
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(title)
                .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
                .style(Style::default().bg(Color::Black)),
        );
    frame.render_widget(widget, popup_area);
}

pub fn render_help_popup(frame: &mut Frame) {
    let area = frame.area();
    let popup_area = centered(
        area,
        56,
        (KEYBINDINGS.len() as u16 + 2).min(area.height.saturating_sub(4)),
    );

    frame.render_widget(Clear, popup_area);

    let lines: Vec<Line> = KEYBINDINGS
        .iter()
        .map(|(key, desc)| {
            if key.is_empty() {
                Line::from(Span::styled(
                    format!("{:^38}", desc),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(vec![
                    Span::styled(
                        format!("{:>16}", key),
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(desc.to_string(), Style::default().fg(Color::White)),
                ])
            }
        })
        .collect();

    let help_text = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Help (H or Esc to close) ")
            .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .style(Style::default().bg(Color::Black)),
    );

    frame.render_widget(help_text, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popups_fit_small_terminals() {
        let area = Rect::new(0, 0, 30, 10);
        let popup = centered(area, 56, 24);
        assert_eq!(popup, Rect::new(0, 0, 30, 10));
        let popup = centered(Rect::new(0, 0, 100, 40), 56, 20);
        assert_eq!((popup.x, popup.y), (22, 10));
    }
}
