//! Request matching logic.
//!
//! Scores the mock calls registered under one route key against an
//! incoming request and selects the winner.

use crate::model::{IncomingRequest, MatchParam, MockApiCall};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one matching criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Criterion {
    eligible: bool,
    score: u32,
}

impl Criterion {
    fn passed(score: u32) -> Self {
        Self {
            eligible: true,
            score,
        }
    }

    fn failed() -> Self {
        Self {
            eligible: false,
            score: 0,
        }
    }
}

/// Select the winning mock call for a request.
///
/// `calls` must be in registration order; ordering is part of the
/// contract. A call constrained more precisely scores higher and beats
/// earlier-registered, lower-scoring calls. Equal scores are kept
/// together and decided by nth-match state, then registration order.
pub fn find_match(
    calls: &[Arc<MockApiCall>],
    request: &IncomingRequest,
    now: DateTime<Utc>,
) -> Option<Arc<MockApiCall>> {
    let mut candidates: Vec<(&Arc<MockApiCall>, u32)> = Vec::new();

    for call in calls {
        if call.is_expired(now) {
            continue;
        }

        let query = match_group_list(
            call.query_params_to_match.as_deref(),
            &request.query_params,
            false,
        );
        let headers = match_group_list(call.headers_to_match.as_deref(), &request.headers, true);
        let body = match_body_paths(call.body_paths_to_match.as_deref(), &request.body);

        if !(query.eligible && headers.eligible && body.eligible) {
            continue;
        }

        let total = query.score + headers.score + body.score;
        if total == 0 {
            continue;
        }

        debug!(call_id = %call.call_id, score = total, "Call is a candidate");
        candidates.push((call, total));
    }

    let top = candidates.iter().map(|(_, score)| *score).max()?;

    // The nth-match counter advances for every top-scoring call on every
    // evaluation, including calls after the winner, so no early break.
    let mut winner: Option<Arc<MockApiCall>> = None;
    for (call, score) in &candidates {
        if *score != top {
            continue;
        }
        match call.nth_match {
            None => {
                if winner.is_none() {
                    winner = Some(Arc::clone(call));
                }
            }
            Some(n) => {
                let count = call.match_count.fetch_add(1, Ordering::SeqCst) + 1;
                if winner.is_none() && count == n {
                    winner = Some(Arc::clone(call));
                }
            }
        }
    }

    winner
}

/// Evaluate one group-list criterion (query parameters or headers).
///
/// No matchers: passes with the baseline score of 1 so unconstrained
/// calls stay selectable. Matchers but an empty request side: fails.
/// Otherwise every name group must find a request value in its allowed
/// set, scoring 10 per group.
fn match_group_list(
    matchers: Option<&[MatchParam]>,
    request_values: &HashMap<String, Vec<String>>,
    lowercase_names: bool,
) -> Criterion {
    let matchers = match matchers {
        Some(list) if !list.is_empty() => list,
        _ => return Criterion::passed(1),
    };

    if request_values.is_empty() {
        return Criterion::failed();
    }

    let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
    for matcher in matchers {
        let name = if lowercase_names {
            matcher.name.to_lowercase()
        } else {
            matcher.name.clone()
        };
        groups.entry(name).or_default().push(matcher.value.as_str());
    }

    for (name, allowed) in &groups {
        let present = request_values
            .get(name)
            .map(|values| values.iter().any(|v| allowed.iter().any(|a| a == v)))
            .unwrap_or(false);
        if !present {
            return Criterion::failed();
        }
    }

    Criterion::passed(10 * groups.len() as u32)
}

/// Evaluate the body-path criterion.
///
/// No matchers: baseline 1. Empty, non-UTF-8, or non-JSON bodies fail
/// the call rather than erroring. Every configured dotted path must
/// resolve to a value whose string form equals the expected string,
/// scoring 10 per path.
fn match_body_paths(matchers: Option<&[MatchParam]>, body: &[u8]) -> Criterion {
    let matchers = match matchers {
        Some(list) if !list.is_empty() => list,
        _ => return Criterion::passed(1),
    };

    let body_str = match std::str::from_utf8(body) {
        Ok(s) if !s.trim().is_empty() => s,
        _ => return Criterion::failed(),
    };

    let json: serde_json::Value = match serde_json::from_str(body_str) {
        Ok(value) => value,
        Err(_) => return Criterion::failed(),
    };

    for matcher in matchers {
        let matched = resolve_body_path(&json, &matcher.name)
            .and_then(|value| value_as_string(&value))
            .map(|s| s == matcher.value)
            .unwrap_or(false);
        if !matched {
            return Criterion::failed();
        }
    }

    Criterion::passed(10 * matchers.len() as u32)
}

/// Resolve a dotted path (`category.id`) inside a JSON body.
fn resolve_body_path(json: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    use jsonpath_rust::JsonPath;

    let expr = if path.starts_with('$') {
        path.to_string()
    } else {
        format!("$.{}", path)
    };

    let compiled = JsonPath::try_from(expr.as_str()).ok()?;
    match compiled.find(json) {
        serde_json::Value::Array(items) => items.into_iter().next(),
        serde_json::Value::Null => None,
        other => Some(other),
    }
}

/// String form used for body-path equality. Objects, arrays, and nulls
/// have none and never match.
fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a raw query string into a name -> values multimap.
pub fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params
                .entry(urlencoding_decode(key))
                .or_default()
                .push(urlencoding_decode(value));
        } else {
            params
                .entry(urlencoding_decode(part))
                .or_default()
                .push(String::new());
        }
    }

    params
}

/// Simple URL decoding.
fn urlencoding_decode(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if ch == '+' {
            result.push(' ');
        } else {
            result.push(ch);
        }
    }

    result
}
