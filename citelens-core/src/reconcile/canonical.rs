//! URL canonicalisation for citation matching and domain extraction.
//!
//! Two URLs that differ only in scheme (`http` vs `https`), host case,
//! an explicit default port, or a trailing slash canonicalise to the same
//! string. Path case, query and fragment are preserved.

use url::Url;

/// Canonicalise a URL for equality comparison.
///
/// Applies the following transformations:
///
/// 1. Drop the scheme (`http` and `https` compare equal).
/// 2. Lowercase the host.
/// 3. Remove default ports (`:80`, `:443`).
/// 4. Remove trailing slashes from the path, including a bare `/`.
///
/// Input that cannot be parsed as an absolute URL with a host falls back to
/// a textual version of the same rules.
///
/// # Examples
///
/// ```
/// use citelens_core::reconcile::canonical::canonical_url;
///
/// assert_eq!(
///     canonical_url("HTTP://Example.COM:80/docs/"),
///     canonical_url("https://example.com/docs"),
/// );
/// ```
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        return textual_canonical(trimmed);
    };
    let Some(host) = parsed.host_str() else {
        return textual_canonical(trimmed);
    };

    let mut out = host.to_ascii_lowercase();
    if let Some(port) = parsed.port() {
        if !is_default_port(port) {
            out.push(':');
            out.push_str(&port.to_string());
        }
    }

    out.push_str(parsed.path().trim_end_matches('/'));

    if let Some(query) = parsed.query() {
        if !query.is_empty() {
            out.push('?');
            out.push_str(query);
        }
    }
    if let Some(fragment) = parsed.fragment() {
        if !fragment.is_empty() {
            out.push('#');
            out.push_str(fragment);
        }
    }
    out
}

/// Extract the canonical domain of a URL: host only, lower-cased, without
/// scheme, `www.` prefix, port, or path.
///
/// Returns an empty string when no host can be found.
pub fn canonical_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let host = match Url::parse(trimmed) {
        Ok(parsed) => parsed.host_str().map(str::to_ascii_lowercase),
        Err(_) => None,
    };
    let host = host.unwrap_or_else(|| {
        let rest = strip_scheme(trimmed);
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let authority = &rest[..end];
        let authority = authority.rsplit('@').next().unwrap_or(authority);
        let host = match authority.rfind(':') {
            Some(idx) if authority[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
                &authority[..idx]
            }
            _ => authority,
        };
        host.to_ascii_lowercase()
    });
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn is_default_port(port: u16) -> bool {
    matches!(port, 80 | 443)
}

fn strip_scheme(s: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if s.len() >= scheme.len() && s[..scheme.len()].eq_ignore_ascii_case(scheme) {
            return &s[scheme.len()..];
        }
    }
    s
}

/// Best-effort canonical form for strings the URL parser rejects.
fn textual_canonical(s: &str) -> String {
    let rest = strip_scheme(s);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    let mut authority = authority.to_ascii_lowercase();
    for suffix in [":80", ":443"] {
        if let Some(stripped) = authority.strip_suffix(suffix) {
            authority = stripped.to_string();
            break;
        }
    }
    let tail = match tail.find(['?', '#']) {
        Some(idx) => format!("{}{}", tail[..idx].trim_end_matches('/'), &tail[idx..]),
        None => tail.trim_end_matches('/').to_string(),
    };
    format!("{authority}{tail}")
}
