//! Turns a catalog track into fetch tool arguments

use crate::config::FetchAuth;
use crate::model::Track;

const SEARCH_PREFIX: &str = "ytsearch5:";
const DURATION_TOLERANCE_SECS: i64 = 60;

/// Words that usually mark a compilation, loop or edit rather than the track.
/// Only rejected when the wanted title does not contain them itself.
pub const JUNK_WORDS: [&str; 7] = ["hour", "loop", "slowed", "reverb", "mix", "playlist", "album"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub match_filter: String,
    pub reject_titles: Vec<String>,
}

impl SearchRequest {
    pub fn for_track(track: &Track) -> Self {
        let mut query = format!("{}{}", SEARCH_PREFIX, track.name);
        if let Some(artist) = track.primary_artist() {
            query.push(' ');
            query.push_str(artist);
        }

        let lowered = track.name.to_lowercase();
        let reject_titles = JUNK_WORDS
            .iter()
            .filter(|word| !lowered.contains(*word))
            .map(|word| format!("(?i){}", word))
            .collect();

        let duration = track.duration_secs() as i64;
        let match_filter = [
            "!is_live".to_string(),
            format!("duration >= {}", duration - DURATION_TOLERANCE_SECS),
            format!("duration <= {}", duration + DURATION_TOLERANCE_SECS),
            format!("title ~= \"(?i){}\"", title_pattern(&track.name)),
        ]
        .join(" & ");

        Self {
            query,
            match_filter,
            reject_titles,
        }
    }

    /// Full argument list for the fetch tool, streaming the best audio to stdout
    pub fn args(&self, auth: &FetchAuth) -> Vec<String> {
        let mut args = vec![
            self.query.clone(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            "bestaudio".to_string(),
            "--match-filter".to_string(),
            self.match_filter.clone(),
        ];
        for reject in &self.reject_titles {
            args.push("--reject-title".to_string());
            args.push(reject.clone());
        }
        args.extend(["--max-downloads", "1", "-o", "-"].map(String::from));

        if let Some(browser) = &auth.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }
        if let Some(file) = &auth.cookies {
            args.push("--cookies".to_string());
            args.push(file.display().to_string());
        }
        args
    }
}

/// Literal title with any run of words allowed between its words. Double
/// quotes are escaped since the pattern sits inside a quoted filter value.
fn title_pattern(name: &str) -> String {
    regex::escape(name).replace(' ', ".*").replace('"', "\\\"")
}
