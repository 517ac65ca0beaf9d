//! Now-playing progress bar

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Gauge},
    Frame,
};

use crate::model::PlaybackView;
use crate::player::PlaybackStatus;
use super::utils::format_duration;

fn status_icon(status: PlaybackStatus) -> &'static str {
    match status {
        PlaybackStatus::Playing => "▶",
        PlaybackStatus::Paused => "⏸",
        PlaybackStatus::Transitioning => "…",
        PlaybackStatus::Idle => "■",
    }
}

fn ratio(elapsed: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        (elapsed / duration).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn render_progress_bar(frame: &mut Frame, area: Rect, playback: &PlaybackView) {
    let title = match &playback.selected {
        Some(selected) => {
            let track = &selected.entry.track;
            let liked = if selected.liked { " 💚" } else { "" };
            format!(
                " {} {} | {} ({}){} ",
                status_icon(playback.status),
                track.name,
                track.artist_line(),
                track.album,
                liked
            )
        }
        None => " No track playing ".to_string(),
    };

    let footer = playback
        .tool_line
        .as_ref()
        .map(|line| format!(" {} ", line.text))
        .unwrap_or_default();

    let time_str = format!(
        "{} / {}",
        format_duration(playback.elapsed_secs),
        format_duration(playback.duration_secs)
    );

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_bottom(Line::from(footer).right_aligned()),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio(playback.elapsed_secs, playback.duration_secs))
        .label(time_str);

    frame.render_widget(gauge, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_clamped() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(50.0, 100.0), 0.5);
        assert_eq!(ratio(130.0, 100.0), 1.0);
    }
}
