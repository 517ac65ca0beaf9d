//! The catalog operations the player depends on

use anyhow::Result;
use async_trait::async_trait;

use super::track::{PaginationCursor, TrackPage};

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Load the page `cursor` points at
    async fn fetch_page(&self, cursor: &PaginationCursor) -> Result<TrackPage>;

    async fn is_track_saved(&self, track_id: &str) -> Result<bool>;

    async fn set_track_saved(&self, track_id: &str, saved: bool) -> Result<()>;
}

/// Turn a catalog failure into a line for the alert bar
pub fn describe_error(error: &anyhow::Error) -> String {
    let text = error.to_string();
    if text.contains("404") {
        "Not found on Spotify.".to_string()
    } else if text.contains("403") {
        "Action forbidden by Spotify.".to_string()
    } else if text.contains("401") {
        "Authentication expired. Please restart the app.".to_string()
    } else if text.contains("429") {
        "Rate limited. Please wait a moment.".to_string()
    } else {
        format!("Error: {}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_become_friendly_text() {
        let rate = anyhow::anyhow!("http status: 429 Too Many Requests");
        assert_eq!(describe_error(&rate), "Rate limited. Please wait a moment.");
        let other = anyhow::anyhow!("connection reset");
        assert_eq!(describe_error(&other), "Error: connection reset");
    }
}
