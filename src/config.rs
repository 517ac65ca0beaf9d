//! User configuration: JSON file in the platform config dir, overridden by CLI flags

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const APP_NAME: &str = "ytspot";
const CONFIG_FILE: &str = "config.json";

/// Cookie options forwarded to the fetch tool for age-gated or throttled videos
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchAuth {
    pub cookies_from_browser: Option<String>,
    pub cookies: Option<PathBuf>,
}

/// Executables for the external tools. Bare names are looked up on PATH.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ToolPaths {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct AppConfig {
    /// Log files and tool stderr captures
    pub debug_dir: PathBuf,
    pub disable_cache: bool,
    pub cache_dir: PathBuf,
    pub yt_dlp_args: FetchAuth,
    pub tools: ToolPaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug_dir: state_dir().join("logs"),
            disable_cache: true,
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join(APP_NAME),
            yt_dlp_args: FetchAuth::default(),
            tools: ToolPaths::default(),
        }
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// A terminal music client that plays catalog tracks through yt-dlp and ffmpeg
#[derive(Parser, Debug, Default)]
#[command(name = "ytspot")]
#[command(version)]
pub struct Cli {
    /// Directory for log files and tool stderr captures
    #[arg(short = 'd', long, env = "YTSPOT_DEBUG_DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Directory for cached audio
    #[arg(short = 'c', long, env = "YTSPOT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Never write downloaded audio to the cache
    #[arg(long, conflicts_with = "enable_cache")]
    pub disable_cache: bool,

    /// Keep downloaded audio for replay
    #[arg(long)]
    pub enable_cache: bool,

    /// Browser to read cookies from, passed through to yt-dlp
    #[arg(long)]
    pub cookies_from_browser: Option<String>,

    /// Netscape cookie file, passed through to yt-dlp
    #[arg(long)]
    pub cookies: Option<PathBuf>,

    /// Alternate config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Parse a config file. Keys missing from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load from `path` or the default location. A missing or broken file
    /// yields the defaults plus the error so the caller can log it once
    /// logging is up.
    pub fn load(path: Option<&Path>) -> (Self, Option<anyhow::Error>) {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return (Self::default(), None);
        };
        if path.is_dir() {
            return (
                Self::default(),
                Some(anyhow::anyhow!("Config path {} is a directory", path.display())),
            );
        }
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::from_file(&path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.debug_dir {
            self.debug_dir = dir.clone();
        }
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = dir.clone();
        }
        if cli.disable_cache {
            self.disable_cache = true;
        } else if cli.enable_cache {
            self.disable_cache = false;
        }
        if let Some(browser) = &cli.cookies_from_browser {
            self.yt_dlp_args.cookies_from_browser = Some(browser.clone());
        }
        if let Some(file) = &cli.cookies {
            self.yt_dlp_args.cookies = Some(file.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_cache() {
        let config = AppConfig::default();
        assert!(config.disable_cache);
        assert!(config.debug_dir.ends_with("logs"));
        assert!(config.cache_dir.ends_with(APP_NAME));
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "disable-cache": false,
                "cache-dir": "/srv/music",
                "yt-dlp-args": { "cookies-from-browser": "chrome" },
                "tools": { "yt-dlp": "/opt/yt-dlp" }
            }"#,
        )
        .unwrap();

        assert!(!config.disable_cache);
        assert_eq!(config.cache_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.yt_dlp_args.cookies_from_browser.as_deref(), Some("chrome"));
        assert!(config.yt_dlp_args.cookies.is_none());
        assert_eq!(config.tools.yt_dlp, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(config.debug_dir, AppConfig::default().debug_dir);
    }

    #[test]
    fn malformed_file_falls_back_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let (config, err) = AppConfig::load(Some(&path));
        assert_eq!(config, AppConfig::default());
        assert!(err.is_some());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config, err) = AppConfig::load(Some(&dir.path().join("absent.json")));
        assert_eq!(config, AppConfig::default());
        assert!(err.is_none());
    }

    #[test]
    fn directory_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, err) = AppConfig::load(Some(dir.path()));
        assert!(err.is_some());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let cli = Cli::try_parse_from([
            "ytspot",
            "-c",
            "/tmp/cache",
            "--enable-cache",
            "--cookies",
            "/tmp/c.txt",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        config.apply_cli(&cli);
        assert!(!config.disable_cache);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.yt_dlp_args.cookies, Some(PathBuf::from("/tmp/c.txt")));
    }

    #[test]
    fn cache_flags_conflict() {
        assert!(Cli::try_parse_from(["ytspot", "--disable-cache", "--enable-cache"]).is_err());
    }
}
