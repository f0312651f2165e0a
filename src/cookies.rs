//! Cookie file parsing.
//!
//! One cookie per line in `Set-Cookie` header syntax:
//!
//! ```text
//! # session for the staging login
//! sid=abc123; Domain=example.com; Path=/; Expires=Wed, 21 Oct 2026 07:28:00 GMT; Secure; HttpOnly
//! theme=dark
//! ```
//!
//! Attribute names are case-insensitive and unknown attributes are ignored.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, ConfigResult};

/// A cookie to install in both browsers before the first target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieSpec {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    /// Parse one `name=value; Attr=...` line
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split(';').map(str::trim);
        let pair = parts.next().unwrap_or_default();
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected 'name=value', got '{}'", pair))?;
        let name = name.trim();
        if name.is_empty() {
            return Err("cookie name is empty".to_string());
        }

        let mut cookie = CookieSpec::new(name, value.trim().trim_matches('"'));
        for attribute in parts.filter(|p| !p.is_empty()) {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim(), Some(val.trim())),
                None => (attribute, None),
            };
            match (key.to_ascii_lowercase().as_str(), val) {
                ("domain", Some(domain)) => {
                    cookie.domain = Some(domain.to_string());
                }
                ("path", Some(path)) => cookie.path = Some(path.to_string()),
                ("expires", Some(date)) => cookie.expires = Some(parse_expires(date)?),
                ("max-age", Some(secs)) => {
                    cookie.max_age = Some(
                        secs.parse()
                            .map_err(|_| format!("invalid Max-Age '{}'", secs))?,
                    );
                }
                ("secure", _) => cookie.secure = true,
                ("httponly", _) => cookie.http_only = true,
                _ => {}
            }
        }
        Ok(cookie)
    }
}

fn parse_expires(date: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc2822(date)
        .or_else(|_| DateTime::parse_from_rfc3339(date))
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| format!("invalid Expires date '{}'", date))
}

impl fmt::Display for CookieSpec {
    /// Formats as a `Set-Cookie` header value
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        Ok(())
    }
}

/// Parse a whole cookie file; errors carry the 1-based line number
pub fn parse_cookies(text: &str) -> Result<Vec<CookieSpec>, (usize, String)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| CookieSpec::parse(line).map_err(|msg| (line_no, msg)))
        .collect()
}

/// Read and parse a cookie file
pub fn load_cookies(path: &Path) -> ConfigResult<Vec<CookieSpec>> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            what: "cookie file",
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        what: "cookie file",
        path: path.to_path_buf(),
        source,
    })?;
    parse_cookies(&text).map_err(|(line, message)| ConfigError::Cookie {
        path: path.to_path_buf(),
        line,
        message,
    })
}
