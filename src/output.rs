use serde::Serialize;

use crate::{config::OutputConfig, controller::DisplaySnapshot, session::PlaybackStatus};

/// `m:ss`, minutes unpadded and unbounded.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    let minutes = total_seconds / 60;
    let secs = total_seconds % 60;
    format!("{minutes}:{secs:02}")
}

/// Shortens `text` to at most `max_chars` characters, ending in an ellipsis.
pub fn elide(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// One line of the waybar custom-module JSON protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusLine {
    pub text: String,
    pub tooltip: String,
    pub class: &'static str,
    pub alt: String,
    pub percentage: u8,
}

impl StatusLine {
    pub fn from_display(display: &DisplaySnapshot, config: &OutputConfig) -> Self {
        let Some(player) = display.player.clone() else {
            return Self {
                text: config.idle_text.clone(),
                tooltip: config.idle_text.clone(),
                class: "disconnected",
                alt: "disconnected".to_owned(),
                percentage: 0,
            };
        };

        let text = match (display.title.is_empty(), display.artist.is_empty()) {
            (false, false) => format!("{} - {}", display.title, display.artist),
            (false, true) => display.title.clone(),
            (true, false) => display.artist.clone(),
            (true, true) => player.clone(),
        };

        let mut tooltip = format!("{player}\n{}", display.title);
        if !display.artist.is_empty() {
            tooltip.push('\n');
            tooltip.push_str(&display.artist);
        }
        if display.duration_seconds > 0.0 {
            tooltip.push_str(&format!(
                "\n{} / {}",
                format_timestamp(display.position_seconds),
                format_timestamp(display.duration_seconds)
            ));
        }

        let class = match display.status {
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
        };

        Self {
            text: elide(&text, config.max_chars()),
            tooltip,
            class,
            alt: player,
            percentage: progress_percent(display.position_seconds, display.duration_seconds),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn progress_percent(position: f64, duration: f64) -> u8 {
    if duration <= 0.0 || !duration.is_finite() || !position.is_finite() {
        return 0;
    }
    ((position / duration) * 100.0).clamp(0.0, 100.0).round() as u8
}
