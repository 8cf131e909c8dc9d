//! Small platform helpers: form and URL parsing, socket reachability
//! and executable lookup.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for socket reachability checks.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(500);

/// Escape text for inclusion in HTML element content or attribute values.
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decode an `application/x-www-form-urlencoded` body into ordered pairs.
///
/// Empty segments are skipped; a key without `=` gets an empty value.
pub fn decode_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => (decode_form_component(key), decode_form_component(value)),
            None => (decode_form_component(segment), String::new()),
        })
        .collect()
}

/// Decode one form component, treating `+` as a space.
fn decode_form_component(component: &str) -> String {
    let component = component.replace('+', " ");
    match urlencoding::decode(&component) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(component.as_bytes()))
            .into_owned(),
    }
}

/// Why a URL could not be split.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("missing scheme")]
    MissingScheme,

    #[error("invalid port '{port}'")]
    InvalidPort { scheme: String, port: String },
}

/// The pieces of a URL the requirement checks care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
}

/// Split a URL into scheme, host, port and path.
///
/// An empty port counts as no port; any other port text must be a number
/// in range.
pub fn split_url(url: &str) -> Result<UrlParts, UrlError> {
    let (scheme, rest) = url.split_once(':').ok_or(UrlError::MissingScheme)?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(UrlError::MissingScheme);
    }
    let scheme = scheme.to_ascii_lowercase();

    let Some(after_slashes) = rest.strip_prefix("//") else {
        return Ok(UrlParts {
            scheme,
            host: None,
            port: None,
            path: rest.to_string(),
        });
    };

    let authority_end = after_slashes
        .find(['/', '?', '#'])
        .unwrap_or(after_slashes.len());
    let authority = &after_slashes[..authority_end];
    let path = after_slashes[authority_end..].to_string();

    // Drop userinfo (redis://:password@host:port/)
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

    let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
        // IPv6 literal
        match bracketed.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (bracketed, None),
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    let port = match port.filter(|p| !p.is_empty()) {
        Some(text) => Some(text.parse::<u16>().map_err(|_| UrlError::InvalidPort {
            scheme: scheme.clone(),
            port: text.to_string(),
        })?),
        None => None,
    };

    Ok(UrlParts {
        scheme,
        host: if host.is_empty() {
            None
        } else {
            Some(host.to_ascii_lowercase())
        },
        port,
        path,
    })
}

/// Check whether a TCP connection to `host:port` can be established.
pub fn can_connect_to_socket(host: &str, port: u16, timeout: Duration) -> bool {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}

/// Whether a file has an executable bit set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// On Windows, executability is determined by file extension, not permission bits.
#[cfg(not(unix))]
pub fn is_executable(_path: &Path) -> bool {
    true
}

/// Find an executable by name in a list of directories.
///
/// Names containing a path separator are returned as-is when they exist.
pub fn find_executable(name: &str, path_entries: &[PathBuf]) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    let extensions: &[&str] = if cfg!(windows) {
        &["", ".exe", ".bat", ".cmd"]
    } else {
        &[""]
    };

    for dir in path_entries {
        for ext in extensions {
            let candidate = dir.join(format!("{}{}", name, ext));
            if candidate.is_file() && is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn html_escape_escapes_markup() {
        assert_eq!(
            html_escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn decode_form_handles_plus_and_escapes() {
        let pairs = decode_form("a.source=project&a.value=hello+world%21&empty");
        assert_eq!(
            pairs,
            vec![
                ("a.source".to_string(), "project".to_string()),
                ("a.value".to_string(), "hello world!".to_string()),
                ("empty".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn decode_form_empty_body_is_empty() {
        assert!(decode_form("").is_empty());
    }

    #[test]
    fn decode_form_keeps_malformed_escapes() {
        let pairs = decode_form("a=100%25&b=%zz&c=%2Fpath");
        assert_eq!(pairs[0].1, "100%");
        assert_eq!(pairs[1].1, "%zz");
        assert_eq!(pairs[2].1, "/path");
    }

    #[test]
    fn decode_form_reverses_urlencoding() {
        let text = "redis://host:1234/ and more";
        let body = format!("url={}", urlencoding::encode(text));
        assert_eq!(decode_form(&body), vec![("url".to_string(), text.to_string())]);
    }

    #[test]
    fn split_url_with_port() {
        let parts = split_url("redis://example.com:1234/").unwrap();
        assert_eq!(parts.scheme, "redis");
        assert_eq!(parts.host.as_deref(), Some("example.com"));
        assert_eq!(parts.port, Some(1234));
        assert_eq!(parts.path, "/");
    }

    #[test]
    fn split_url_without_port_or_path() {
        let parts = split_url("redis://localhost").unwrap();
        assert_eq!(parts.host.as_deref(), Some("localhost"));
        assert_eq!(parts.port, None);
        assert_eq!(parts.path, "");
    }

    #[test]
    fn split_url_strips_userinfo() {
        let parts = split_url("redis://:secret@cache.internal:6390/0").unwrap();
        assert_eq!(parts.host.as_deref(), Some("cache.internal"));
        assert_eq!(parts.port, Some(6390));
        assert_eq!(parts.path, "/0");
    }

    #[test]
    fn split_url_ipv6() {
        let parts = split_url("redis://[::1]:7000/").unwrap();
        assert_eq!(parts.host.as_deref(), Some("::1"));
        assert_eq!(parts.port, Some(7000));
    }

    #[test]
    fn split_url_rejects_text_without_scheme() {
        assert_eq!(split_url("not a url"), Err(UrlError::MissingScheme));
        assert_eq!(split_url(":nothing"), Err(UrlError::MissingScheme));
    }

    #[test]
    fn split_url_rejects_bad_port() {
        assert_eq!(
            split_url("redis://h:abc/"),
            Err(UrlError::InvalidPort {
                scheme: "redis".to_string(),
                port: "abc".to_string()
            })
        );
        assert!(matches!(
            split_url("redis://h:70000/"),
            Err(UrlError::InvalidPort { .. })
        ));
    }

    #[test]
    fn split_url_empty_port_is_no_port() {
        let parts = split_url("redis://h:/").unwrap();
        assert_eq!(parts.host.as_deref(), Some("h"));
        assert_eq!(parts.port, None);
    }

    #[test]
    fn can_connect_to_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(can_connect_to_socket("127.0.0.1", port, DEFAULT_SOCKET_TIMEOUT));
    }

    #[test]
    fn cannot_connect_to_closed_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!can_connect_to_socket("127.0.0.1", port, DEFAULT_SOCKET_TIMEOUT));
    }

    #[cfg(unix)]
    #[test]
    fn find_executable_requires_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(find_executable("tool", &[temp.path().to_path_buf()]).is_none());

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(
            find_executable("tool", &[temp.path().to_path_buf()]),
            Some(tool)
        );
    }

    #[test]
    fn find_executable_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        assert!(find_executable("does-not-exist", &[temp.path().to_path_buf()]).is_none());
    }
}
