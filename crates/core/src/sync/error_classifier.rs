//! Classification of upstream failures.
//!
//! Classification is an ordered list of `(predicate, class)` rules; the first
//! matching rule wins. New upstream error signatures are added as rules
//! without touching the negotiator.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::upstream::UpstreamFailure;
use crate::errors::UpstreamErrorKind;
use crate::health::DatasetKey;

/// Longest body summary surfaced to logs and callers.
pub const MAX_SUMMARY_CHARS: usize = 500;

const HTML_ERROR_PAGE_SUMMARY: &str = "Upstream service returned an HTML error page";
const EMPTY_BODY_SUMMARY: &str = "Upstream returned an empty response body";

/// JSON fields checked, in order, for a human-readable message.
const MESSAGE_FIELDS: &[&str] = &[
    "message",
    "errorMessage",
    "error_description",
    "detail",
    "error",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureClass {
    InvalidPullToken,
    MissingTimeRange,
    /// 400 or 404 without a more specific signature.
    FallbackStatus,
    AuthError,
    NotProvisioned,
    Unclassified,
}

impl FailureClass {
    /// Whether a primary-mode failure of this class is retried in fallback mode.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPullToken | Self::MissingTimeRange | Self::FallbackStatus
        )
    }

    pub fn error_kind(&self) -> UpstreamErrorKind {
        match self {
            Self::InvalidPullToken => UpstreamErrorKind::InvalidToken,
            Self::MissingTimeRange => UpstreamErrorKind::MissingTimeRange,
            Self::AuthError => UpstreamErrorKind::AuthExpired,
            Self::NotProvisioned => UpstreamErrorKind::NotProvisioned,
            Self::FallbackStatus | Self::Unclassified => UpstreamErrorKind::Unclassified,
        }
    }
}

fn invalid_pull_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)invalid\s*pull\s*token").expect("invalid pull token pattern")
    })
}

fn missing_time_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)missing\b.{0,40}\btime\s*range").expect("missing time range pattern")
    })
}

fn auth_body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)oauth|expired|unauthori[sz]ed").expect("auth signature pattern")
    })
}

fn not_provisioned_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)endpoint\s+not\s+enabled\s+for\s+summary\s+type")
            .expect("not provisioned pattern")
    })
}

pub fn is_invalid_pull_token(_status: u16, body: &str) -> bool {
    invalid_pull_token_re().is_match(body)
}

pub fn is_missing_time_range(_status: u16, body: &str) -> bool {
    missing_time_range_re().is_match(body)
}

pub fn is_fallback_status(status: u16) -> bool {
    matches!(status, 400 | 404)
}

pub fn is_auth_error(status: u16, body: &str) -> bool {
    status == 401 || (status == 403 && auth_body_re().is_match(body))
}

/// Endpoint-not-enabled signature, or a 404 on the dataset's own path.
pub fn is_not_provisioned(failure: &UpstreamFailure) -> bool {
    if not_provisioned_re().is_match(&failure.raw_body) {
        return true;
    }
    failure.http_status == 404
        && failure
            .dataset_source
            .parse::<DatasetKey>()
            .map(|dataset| failure.request_path.ends_with(&dataset.path()))
            .unwrap_or(false)
}

fn matches_invalid_pull_token(f: &UpstreamFailure) -> bool {
    is_invalid_pull_token(f.http_status, &f.raw_body)
}

fn matches_missing_time_range(f: &UpstreamFailure) -> bool {
    is_missing_time_range(f.http_status, &f.raw_body)
}

fn matches_fallback_status(f: &UpstreamFailure) -> bool {
    is_fallback_status(f.http_status)
}

fn matches_auth_error(f: &UpstreamFailure) -> bool {
    is_auth_error(f.http_status, &f.raw_body)
}

type ClassificationRule = (fn(&UpstreamFailure) -> bool, FailureClass);

const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    (matches_invalid_pull_token, FailureClass::InvalidPullToken),
    (matches_missing_time_range, FailureClass::MissingTimeRange),
    (matches_fallback_status, FailureClass::FallbackStatus),
    (matches_auth_error, FailureClass::AuthError),
    (is_not_provisioned, FailureClass::NotProvisioned),
];

/// First matching rule's class, else `Unclassified`.
pub fn classify_failure(failure: &UpstreamFailure) -> FailureClass {
    CLASSIFICATION_RULES
        .iter()
        .find(|(predicate, _)| predicate(failure))
        .map(|(_, class)| *class)
        .unwrap_or(FailureClass::Unclassified)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

fn json_message(value: &serde_json::Value) -> Option<String> {
    let object = value.as_object()?;
    MESSAGE_FIELDS.iter().find_map(|field| match object.get(*field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        nested @ serde_json::Value::Object(_) => json_message(nested),
        _ => None,
    })
}

fn looks_like_html(body: &str) -> bool {
    let head = body
        .trim_start()
        .chars()
        .take(256)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.contains("<html")
}

/// Human-readable summary of an upstream error body.
///
/// JSON bodies contribute their message field, HTML error pages a fixed
/// phrase, anything else the raw text. Never longer than
/// [`MAX_SUMMARY_CHARS`] characters.
pub fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return EMPTY_BODY_SUMMARY.to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = json_message(&value) {
            return truncate_chars(&message, MAX_SUMMARY_CHARS);
        }
    }

    if looks_like_html(trimmed) {
        return HTML_ERROR_PAGE_SUMMARY.to_string();
    }

    truncate_chars(trimmed, MAX_SUMMARY_CHARS)
}
