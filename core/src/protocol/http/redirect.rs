/*
 * redirect.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of zhttp, a multi-protocol HTTP client library.
 *
 * zhttp is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * zhttp is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with zhttp.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Redirect evaluation: which 3xx responses are followed, with what method,
//! and whether the body survives. Sensitive headers are stripped by the
//! engine on every hop.

use tracing::warn;

use crate::config::RedirectPolicy;
use crate::error::HttpError;
use crate::headers::HeaderMap;
use crate::protocol::http::request::Method;
use crate::url::Url;

/// Headers never forwarded to a redirect target. Cookie is included because
/// a hop may cross origins and there is no jar to scope it.
const SENSITIVE_HEADERS: &[&str] = &["host", "authorization", "cookie"];

/// Decision for one 3xx response.
#[derive(Debug)]
pub enum RedirectAction {
    /// Follow to `url` using `method`; `keep_body` is false when the hop
    /// downgrades to GET.
    Follow {
        url: Url,
        method: Method,
        keep_body: bool,
    },
    /// Hand the 3xx response to the caller unchanged.
    Return,
}

/// Evaluate one response against the policy. `TooManyRedirects` and the
/// hop counter live in the engine; this only decides a single hop.
pub fn evaluate(
    policy: RedirectPolicy,
    allow_insecure: bool,
    status: u16,
    method: Method,
    current_url: &Url,
    location: Option<&str>,
) -> Result<RedirectAction, HttpError> {
    if !matches!(status, 301 | 302 | 303 | 307 | 308) {
        return Ok(RedirectAction::Return);
    }
    if policy == RedirectPolicy::None {
        return Ok(RedirectAction::Return);
    }
    if policy == RedirectPolicy::Safe && !matches!(method, Method::Get | Method::Head) {
        return Ok(RedirectAction::Return);
    }
    let location = match location {
        Some(l) => l,
        None => return Ok(RedirectAction::Return),
    };
    let target = current_url.resolve(location)?;
    if current_url.is_secure() && !target.is_secure() && !allow_insecure {
        warn!(from = %current_url, to = %target, "refusing https to http redirect");
        return Ok(RedirectAction::Return);
    }
    if target == *current_url {
        return Err(HttpError::RedirectLoopDetected);
    }

    let downgrade = matches!(status, 301 | 302 | 303)
        && policy != RedirectPolicy::Strict
        && matches!(method, Method::Post | Method::Put | Method::Patch);
    let (next_method, keep_body) = if downgrade {
        (Method::Get, false)
    } else {
        (method, true)
    };
    Ok(RedirectAction::Follow {
        url: target,
        method: next_method,
        keep_body,
    })
}

/// Strip headers that must not cross a redirect hop; body-describing
/// headers go too when the body is dropped.
pub fn strip_headers(headers: &mut HeaderMap, keep_body: bool) {
    for name in SENSITIVE_HEADERS {
        headers.remove(name);
    }
    if !keep_body {
        headers.remove("content-length");
        headers.remove("content-type");
        headers.remove("transfer-encoding");
        headers.remove("content-encoding");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn follow(action: RedirectAction) -> (Url, Method, bool) {
        match action {
            RedirectAction::Follow {
                url,
                method,
                keep_body,
            } => (url, method, keep_body),
            RedirectAction::Return => panic!("expected follow"),
        }
    }

    #[test]
    fn non_redirect_status_returned() {
        let action = evaluate(
            RedirectPolicy::Normal,
            false,
            200,
            Method::Get,
            &url("http://a.example/"),
            None,
        )
        .unwrap();
        assert!(matches!(action, RedirectAction::Return));
    }

    #[test]
    fn policy_none_never_follows() {
        let action = evaluate(
            RedirectPolicy::None,
            false,
            301,
            Method::Get,
            &url("http://a.example/"),
            Some("/next"),
        )
        .unwrap();
        assert!(matches!(action, RedirectAction::Return));
    }

    #[test]
    fn policy_safe_refuses_post() {
        let action = evaluate(
            RedirectPolicy::Safe,
            false,
            302,
            Method::Post,
            &url("http://a.example/"),
            Some("/next"),
        )
        .unwrap();
        assert!(matches!(action, RedirectAction::Return));
        // GET is followed.
        let action = evaluate(
            RedirectPolicy::Safe,
            false,
            302,
            Method::Get,
            &url("http://a.example/"),
            Some("/next"),
        )
        .unwrap();
        let (_, method, _) = follow(action);
        assert_eq!(method, Method::Get);
    }

    #[test]
    fn normal_downgrades_post_on_302() {
        let action = evaluate(
            RedirectPolicy::Normal,
            false,
            302,
            Method::Post,
            &url("http://a.example/form"),
            Some("/done"),
        )
        .unwrap();
        let (target, method, keep_body) = follow(action);
        assert_eq!(target.path, "/done");
        assert_eq!(method, Method::Get);
        assert!(!keep_body);
    }

    #[test]
    fn preserved_on_307_and_308() {
        for status in [307u16, 308] {
            for policy in [RedirectPolicy::Normal, RedirectPolicy::Strict] {
                let action = evaluate(
                    policy,
                    false,
                    status,
                    Method::Post,
                    &url("http://a.example/form"),
                    Some("/again"),
                )
                .unwrap();
                let (_, method, keep_body) = follow(action);
                assert_eq!(method, Method::Post);
                assert!(keep_body);
            }
        }
    }

    #[test]
    fn strict_preserves_on_301() {
        let action = evaluate(
            RedirectPolicy::Strict,
            false,
            301,
            Method::Post,
            &url("http://a.example/form"),
            Some("/moved"),
        )
        .unwrap();
        let (_, method, keep_body) = follow(action);
        assert_eq!(method, Method::Post);
        assert!(keep_body);
    }

    #[test]
    fn loop_detected_on_self_redirect() {
        let err = evaluate(
            RedirectPolicy::Normal,
            false,
            302,
            Method::Get,
            &url("http://a.example/here"),
            Some("http://a.example/here"),
        )
        .unwrap_err();
        assert!(matches!(err, HttpError::RedirectLoopDetected));
    }

    #[test]
    fn insecure_redirect_refused_unless_allowed() {
        let action = evaluate(
            RedirectPolicy::Normal,
            false,
            302,
            Method::Get,
            &url("https://a.example/"),
            Some("http://a.example/plain"),
        )
        .unwrap();
        assert!(matches!(action, RedirectAction::Return));

        let action = evaluate(
            RedirectPolicy::Normal,
            true,
            302,
            Method::Get,
            &url("https://a.example/"),
            Some("http://a.example/plain"),
        )
        .unwrap();
        let (target, _, _) = follow(action);
        assert!(!target.is_secure());
    }

    #[test]
    fn sensitive_headers_stripped() {
        let mut headers = HeaderMap::new();
        headers.set("Host", "a.example");
        headers.set("Authorization", "Bearer secret");
        headers.set("Cookie", "session=1");
        headers.set("Accept", "*/*");
        headers.set("Content-Type", "application/json");
        strip_headers(&mut headers, false);
        assert!(!headers.contains("host"));
        assert!(!headers.contains("authorization"));
        assert!(!headers.contains("cookie"));
        assert!(!headers.contains("content-type"));
        assert!(headers.contains("accept"));

        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "application/json");
        strip_headers(&mut headers, true);
        assert!(headers.contains("content-type"));
    }
}
