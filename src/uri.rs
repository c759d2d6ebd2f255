//! Request-target parsing (RFC 9112 §3.2), generalizing the teacher's
//! `RequestTarget` enum (`spec.rs`) but delegating URL construction to the
//! `url` crate rather than the teacher's own hand-rolled `Uri`/`uri_parser`
//! module, per the core spec's explicit "URL parsing: delegated to an
//! external URL library" (§6) -- matching how `simonwuelker-Stormlicht`'s
//! `http` crate leans on its own `url` crate dependency for the same job.

use bytes::Bytes;

use crate::error::Error;

/// `request-target = origin-form / absolute-form / authority-form /
/// asterisk-form`
#[derive(Debug, Clone)]
pub enum RequestTarget {
    OriginForm { path: Bytes, url: url::Url },
    AbsoluteForm(url::Url),
    AuthorityForm { authority: String },
    AsteriskForm,
}

impl RequestTarget {
    pub fn url(&self) -> Option<&url::Url> {
        match self {
            RequestTarget::OriginForm { url, .. } => Some(url),
            RequestTarget::AbsoluteForm(url) => Some(url),
            RequestTarget::AuthorityForm { .. } | RequestTarget::AsteriskForm => None,
        }
    }

    /// Raw path bytes exactly as received (percent-encoding preserved,
    /// unlike `url::Url::path()` which normalizes).
    pub fn raw_path(&self) -> Option<&[u8]> {
        match self {
            RequestTarget::OriginForm { path, .. } => Some(path.as_ref()),
            _ => None,
        }
    }
}

/// This is strict-mode request-target validation: no control bytes, no
/// whitespace. High-bit bytes are rejected here (the strict policy from the
/// two §9 "Open question" points this crate picks -- see DESIGN.md); a
/// lenient caller wanting surrogate-escape behavior for non-ASCII targets
/// would need a separate code path, which this crate does not implement.
fn validate_target_bytes(bytes: &[u8]) -> Result<(), Error> {
    for &b in bytes {
        if b < 0x21 || b == 0x7f {
            return Err(Error::InvalidUrl {
                message: format!("control or whitespace byte in request-target: {:?}", b),
            });
        }
        if b >= 0x80 {
            return Err(Error::InvalidUrl {
                message: "non-ASCII byte in request-target (strict mode rejects this)".into(),
            });
        }
    }
    Ok(())
}

pub fn parse_request_target(bytes: &[u8]) -> Result<RequestTarget, Error> {
    if bytes == b"*" {
        return Ok(RequestTarget::AsteriskForm);
    }

    validate_target_bytes(bytes)?;

    if bytes.starts_with(b"/") {
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidUrl { message: "request-target is not valid UTF-8".into() })?;
        // origin-form has no authority; anchor it against a placeholder
        // base so `url::Url` can still parse path + query for us.
        let url = url::Url::options()
            .base_url(Some(placeholder_base()))
            .parse(s)
            .map_err(|e| Error::InvalidUrl { message: e.to_string() })?;
        return Ok(RequestTarget::OriginForm {
            path: Bytes::copy_from_slice(bytes),
            url,
        });
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        if let Ok(url) = url::Url::parse(s) {
            return Ok(RequestTarget::AbsoluteForm(url));
        }

        // authority-form: "host:port", only meaningful for CONNECT.
        if is_authority_form(s) {
            return Ok(RequestTarget::AuthorityForm {
                authority: s.to_string(),
            });
        }
    }

    Err(Error::InvalidUrl {
        message: format!("unrecognized request-target: {:?}", String::from_utf8_lossy(bytes)),
    })
}

fn is_authority_form(s: &str) -> bool {
    // host:port with no scheme, no path, no '/'.
    match s.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) && !host.contains('/')
        }
        None => false,
    }
}

/// Origin-form targets have no authority of their own; `url::Url` needs
/// *some* base to resolve a bare path + query against, so this stands in
/// for one and is discarded by callers (who read `.raw_path()` instead).
fn placeholder_base() -> &'static url::Url {
    static CELL: std::sync::OnceLock<url::Url> = std::sync::OnceLock::new();
    CELL.get_or_init(|| url::Url::parse("http://localhost").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_preserves_percent_encoding() {
        let t = parse_request_target(b"/a%2Fb?x=1").unwrap();
        assert_eq!(t.raw_path().unwrap(), b"/a%2Fb?x=1");
    }

    #[test]
    fn asterisk_form() {
        assert!(matches!(parse_request_target(b"*").unwrap(), RequestTarget::AsteriskForm));
    }

    #[test]
    fn rejects_control_bytes() {
        assert!(parse_request_target(b"/a\rb").is_err());
    }

    #[test]
    fn authority_form_for_connect() {
        let t = parse_request_target(b"example.com:443").unwrap();
        assert!(matches!(t, RequestTarget::AuthorityForm { .. }));
    }
}
