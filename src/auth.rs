//! Spotify login through the browser OAuth flow, with the refresh token kept
//! on disk so later starts skip the browser

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use librespot_oauth::{OAuthClient, OAuthClientBuilder, OAuthToken};
use rspotify::Token;

use crate::config::APP_NAME;
use crate::model::spotify_client::scope_set;

const SPOTIFY_CLIENT_ID: &str = "492e1e45ea814fa3ac555fe1576aaf5b";
const SPOTIFY_REDIRECT_URI: &str = "http://127.0.0.1:8898/login";
pub const SCOPES: &str = "user-library-read user-library-modify playlist-read-private playlist-read-collaborative user-follow-read";
const REFRESH_TOKEN_FILE: &str = "refresh_token";
/// Used when the token carries no usable expiry
const DEFAULT_LIFETIME_SECS: i64 = 3600;

const RESPONSE: &str = r#"
<!doctype html>
<html>
<head><title>Success</title></head>
<body><h1>Authentication Successful!</h1><script>window.close();</script></body>
</html>
"#;

pub struct AuthResult {
    pub token: Token,
    pub refresh_token: String,
}

fn token_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_NAME).join(REFRESH_TOKEN_FILE))
}

fn store_refresh_token(refresh_token: &str) {
    let Some(path) = token_path() else {
        return;
    };
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(&path, refresh_token));
    match written {
        Ok(()) => tracing::debug!(path = %path.display(), "Saved refresh token"),
        Err(e) => tracing::warn!(error = %e, "Could not save refresh token"),
    }
}

fn oauth_client(interactive: bool) -> Result<OAuthClient> {
    let builder = OAuthClientBuilder::new(
        SPOTIFY_CLIENT_ID,
        SPOTIFY_REDIRECT_URI,
        SCOPES.split_whitespace().collect(),
    );
    let builder = if interactive {
        builder.open_in_browser().with_custom_message(RESPONSE)
    } else {
        builder
    };
    builder.build().context("Failed to build OAuth client")
}

fn expiry_of(token: &OAuthToken) -> DateTime<Utc> {
    let remaining = token.expires_at.saturating_duration_since(Instant::now());
    match chrono::Duration::from_std(remaining) {
        Ok(d) if d.num_seconds() > 0 => Utc::now() + d,
        _ => Utc::now() + chrono::Duration::seconds(DEFAULT_LIFETIME_SECS),
    }
}

pub fn build_token(access_token: String, expires_at: DateTime<Utc>) -> Token {
    Token {
        access_token,
        expires_in: expires_at - Utc::now(),
        expires_at: Some(expires_at),
        scopes: scope_set(SCOPES),
        refresh_token: None,
    }
}

async fn perform_browser_auth() -> Result<OAuthToken> {
    tracing::info!("Starting browser-based OAuth flow");
    let token = oauth_client(true)?
        .get_access_token_async()
        .await
        .context("Browser authentication failed")?;
    tracing::info!("Browser authentication completed");
    Ok(token)
}

/// Log in, reusing the stored refresh token when it still works
pub async fn perform_oauth_flow() -> Result<AuthResult> {
    let stored = token_path().and_then(|p| fs::read_to_string(p).ok());

    let token = match stored {
        Some(refresh_token) => {
            tracing::info!("Found stored refresh token");
            match oauth_client(false)?
                .refresh_token_async(refresh_token.trim())
                .await
            {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(error = %e, "Stored refresh token failed, re-authenticating");
                    perform_browser_auth().await?
                }
            }
        }
        None => perform_browser_auth().await?,
    };

    store_refresh_token(&token.refresh_token);
    let expires_at = expiry_of(&token);
    Ok(AuthResult {
        token: build_token(token.access_token, expires_at),
        refresh_token: token.refresh_token,
    })
}

/// New access token, new refresh token, and when the access token expires
pub async fn refresh_access_token(refresh_token: &str) -> Result<(String, String, DateTime<Utc>)> {
    let token = oauth_client(false)?
        .refresh_token_async(refresh_token)
        .await
        .context("Token refresh failed")?;
    store_refresh_token(&token.refresh_token);
    let expires_at = expiry_of(&token);
    Ok((token.access_token, token.refresh_token, expires_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_carries_requested_scopes() {
        let expires_at = Utc::now() + chrono::Duration::seconds(600);
        let token = build_token("abc".into(), expires_at);
        assert_eq!(token.expires_at, Some(expires_at));
        assert!(token.scopes.contains("user-library-modify"));
        assert!(token.refresh_token.is_none());
    }
}
