//! Failure classification and the substitute segments for recoverable kinds.

use crate::provider::CompletionError;
use crate::segment::{StorySegment, RESTART_CHOICE};

/// Every generation failure falls into exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MalformedOutput,
    RateLimited,
    NetworkUnreachable,
    CredentialInvalid,
    Unknown,
}

impl FailureKind {
    /// Recoverable failures are absorbed into a substitute segment;
    /// the rest stop the session.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            FailureKind::MalformedOutput | FailureKind::RateLimited | FailureKind::NetworkUnreachable
        )
    }
}

/// Classify a backend failure.
pub fn classify(error: &CompletionError) -> FailureKind {
    match error {
        CompletionError::Credential(_) => FailureKind::CredentialInvalid,
        CompletionError::Transport(_) | CompletionError::Timeout(_) => {
            FailureKind::NetworkUnreachable
        }
        CompletionError::Malformed(_) => FailureKind::MalformedOutput,
        CompletionError::Status { status, message } => classify_status(*status, message),
        CompletionError::Other(message) => classify_message(message),
    }
}

fn classify_status(status: u16, message: &str) -> FailureKind {
    match status {
        401 | 403 => FailureKind::CredentialInvalid,
        429 | 529 => FailureKind::RateLimited,
        502..=504 => FailureKind::NetworkUnreachable,
        400 if mentions_api_key(&message.to_lowercase()) => FailureKind::CredentialInvalid,
        _ => {
            let lower = message.to_lowercase();
            if mentions_rate_limit(&lower) {
                FailureKind::RateLimited
            } else {
                FailureKind::Unknown
            }
        }
    }
}

/// Heuristics for errors that carry nothing but a message.
fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if lower.contains("json") {
        FailureKind::MalformedOutput
    } else if mentions_api_key(&lower) || lower.contains("401") {
        FailureKind::CredentialInvalid
    } else if mentions_rate_limit(&lower) || lower.contains("429") {
        FailureKind::RateLimited
    } else if lower.contains("network") || lower.contains("enotfound") {
        FailureKind::NetworkUnreachable
    } else {
        FailureKind::Unknown
    }
}

fn mentions_api_key(lower: &str) -> bool {
    lower.contains("api key") || lower.contains("api_key") || lower.contains("x-api-key")
}

fn mentions_rate_limit(lower: &str) -> bool {
    lower.contains("quota") || lower.contains("rate limit") || lower.contains("rate_limit")
}

const MALFORMED_NARRATION: &str =
    "The narrator mumbled something that made no sense at all. Try again, or start the whole mess over.";

const RATE_LIMITED_NARRATION: &str =
    "The narrator is out of breath: too many requests in too short a time. Give it a moment before you press on.";

const OFFLINE_PREFACE: &str =
    "The line to the narrator has gone dead, so a drunk stand-in picks up the tale.";

/// Substitute for a provider answer that could not be parsed.
pub fn malformed_segment() -> StorySegment {
    StorySegment::restart_only(MALFORMED_NARRATION)
}

/// Substitute for a rate-limited request.
pub fn rate_limited_segment() -> StorySegment {
    StorySegment::new(
        RATE_LIMITED_NARRATION,
        vec!["Wait".to_string(), "Retry".to_string(), RESTART_CHOICE.to_string()],
    )
}

/// Substitute for an unreachable provider, wrapping offline narration.
pub fn offline_segment(fallback_narration: &str) -> StorySegment {
    StorySegment::new(
        format!("{OFFLINE_PREFACE} {fallback_narration}"),
        vec![
            "Refresh".to_string(),
            "Download log".to_string(),
            RESTART_CHOICE.to_string(),
        ],
    )
}

/// User-facing message for a fatal failure.
pub fn fatal_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::CredentialInvalid => {
            "The API key was rejected. Check ANTHROPIC_API_KEY in your environment or .env file."
        }
        _ => "The next part of the story could not be generated. The provider may be down or misconfigured.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(code: u16, message: &str) -> CompletionError {
        CompletionError::Status {
            status: code,
            message: message.to_string(),
        }
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(&status(401, "bad key")), FailureKind::CredentialInvalid);
        assert_eq!(classify(&status(403, "forbidden")), FailureKind::CredentialInvalid);
        assert_eq!(classify(&status(429, "slow down")), FailureKind::RateLimited);
        assert_eq!(classify(&status(529, "overloaded")), FailureKind::RateLimited);
        assert_eq!(classify(&status(503, "unavailable")), FailureKind::NetworkUnreachable);
        assert_eq!(classify(&status(500, "boom")), FailureKind::Unknown);
        assert_eq!(classify(&status(404, "no such model")), FailureKind::Unknown);
    }

    #[test]
    fn classifies_status_bodies() {
        assert_eq!(
            classify(&status(400, "API key not valid. Please pass a valid API key.")),
            FailureKind::CredentialInvalid
        );
        assert_eq!(
            classify(&status(400, "You exceeded your current quota")),
            FailureKind::RateLimited
        );
        assert_eq!(classify(&status(400, "max_tokens too large")), FailureKind::Unknown);
    }

    #[test]
    fn classifies_transport_and_parse() {
        assert_eq!(
            classify(&CompletionError::Transport("connection refused".into())),
            FailureKind::NetworkUnreachable
        );
        assert_eq!(
            classify(&CompletionError::Timeout(Duration::from_secs(60))),
            FailureKind::NetworkUnreachable
        );
        assert_eq!(
            classify(&CompletionError::Malformed("eof".into())),
            FailureKind::MalformedOutput
        );
        assert_eq!(
            classify(&CompletionError::Credential("missing".into())),
            FailureKind::CredentialInvalid
        );
    }

    #[test]
    fn classifies_opaque_messages() {
        let other = |m: &str| classify(&CompletionError::Other(m.to_string()));
        assert_eq!(other("Unexpected token in JSON"), FailureKind::MalformedOutput);
        assert_eq!(other("Invalid API key"), FailureKind::CredentialInvalid);
        assert_eq!(other("HTTP 401"), FailureKind::CredentialInvalid);
        assert_eq!(other("Quota exceeded"), FailureKind::RateLimited);
        assert_eq!(other("got 429"), FailureKind::RateLimited);
        assert_eq!(other("getaddrinfo ENOTFOUND"), FailureKind::NetworkUnreachable);
        assert_eq!(other("Network request failed"), FailureKind::NetworkUnreachable);
        assert_eq!(other("something odd"), FailureKind::Unknown);
    }

    #[test]
    fn recoverability() {
        assert!(FailureKind::MalformedOutput.is_recoverable());
        assert!(FailureKind::RateLimited.is_recoverable());
        assert!(FailureKind::NetworkUnreachable.is_recoverable());
        assert!(!FailureKind::CredentialInvalid.is_recoverable());
        assert!(!FailureKind::Unknown.is_recoverable());
    }

    #[test]
    fn substitutes_offer_choices() {
        assert_eq!(malformed_segment().choices, vec![RESTART_CHOICE.to_string()]);

        let limited = rate_limited_segment();
        assert!(limited.choices.iter().any(|c| c == "Wait"));
        assert!(limited.choices.iter().any(|c| c == "Retry"));

        let offline = offline_segment("A goat stares.");
        assert!(offline.narration.ends_with("A goat stares."));
        assert!(offline.choices.iter().any(|c| c == "Refresh"));
        assert!(offline.choices.iter().any(|c| c == "Download log"));
    }
}
