//! API token storage and cookie helpers
//!
//! The token lives in `<config dir>/zima/token` (or `$ZIMA_CONFIG_DIR/token`)
//! and is generated on first start. Browsers present it in the `api_token`
//! cookie after logging in through `/login`.

use std::path::{Path, PathBuf};

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use rand::RngCore;

use crate::error::{ServerError, ServerResult};

pub const TOKEN_COOKIE: &str = "api_token";
pub const CONFIG_DIR_ENV: &str = "ZIMA_CONFIG_DIR";

const TOKEN_FILE: &str = "token";
const TOKEN_BYTES: usize = 16;

/// Directory holding the token and `config.toml`
pub fn config_dir() -> ServerResult<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("zima"))
        .ok_or_else(|| ServerError::Config("could not determine config directory".to_string()))
}

/// 16 random bytes, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn token_path(dir: &Path) -> PathBuf {
    dir.join(TOKEN_FILE)
}

pub fn load_token(dir: &Path) -> ServerResult<Option<String>> {
    let path = token_path(dir);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let token = text.trim().to_string();
            Ok((!token.is_empty()).then_some(token))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ServerError::io(path, e)),
    }
}

pub fn save_token(dir: &Path, token: &str) -> ServerResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| ServerError::io(dir, e))?;
    let path = token_path(dir);
    crate::notebook::write_atomic(&path, token)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| ServerError::io(&path, e))?;
    }
    Ok(())
}

/// Existing token, or a freshly generated and saved one
pub fn load_or_create_token(dir: &Path) -> ServerResult<String> {
    if let Some(token) = load_token(dir)? {
        return Ok(token);
    }
    let token = generate_token();
    save_token(dir, &token)?;
    tracing::info!(path = %token_path(dir).display(), "generated new API token");
    Ok(token)
}

pub fn regenerate_token(dir: &Path) -> ServerResult<String> {
    let token = generate_token();
    save_token(dir, &token)?;
    Ok(token)
}

/// Value of a cookie from the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// `Set-Cookie` value for a logged-in browser
pub fn token_cookie(token: &str) -> String {
    // Effectively never expires
    format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age=2147483647")
}

/// Compare without short-circuiting on the first differing byte
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    #[test]
    fn generated_tokens_are_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn token_is_created_once() {
        let dir = TempDir::new().unwrap();
        let first = load_or_create_token(dir.path()).unwrap();
        let second = load_or_create_token(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(load_token(dir.path()).unwrap(), Some(first));
    }

    #[test]
    fn regenerate_replaces_token() {
        let dir = TempDir::new().unwrap();
        let first = load_or_create_token(dir.path()).unwrap();
        let second = regenerate_token(dir.path()).unwrap();
        assert_ne!(first, second);
        assert_eq!(load_or_create_token(dir.path()).unwrap(), second);
    }

    #[test]
    fn blank_token_file_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(token_path(dir.path()), "  \n").unwrap();
        assert_eq!(load_token(dir.path()).unwrap(), None);
    }

    #[test]
    fn reads_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; api_token=abc123 ; x=y"));
        assert_eq!(cookie_value(&headers, TOKEN_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn cookie_is_http_only() {
        let cookie = token_cookie("abc");
        assert!(cookie.starts_with("api_token=abc;"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abd", "abc"));
        assert!(!tokens_match("ab", "abc"));
    }
}
