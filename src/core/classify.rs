//! Heuristic classification of failed executions
//!
//! The wrapped binary reports errors as human-readable text, so the
//! classifier scans stderr for known substrings. This is best effort: new
//! binary versions or locales can produce messages that slip through and end
//! up as [`ErrorKind::Unknown`]. Matchers are data, so callers can extend or
//! replace the list without touching the executor.

use crate::core::types::{CancelReason, Execution};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    AuthenticationRequired,
    AuthorizationDenied,
    NotFound,
    MalformedInput,
    RateLimited,
    TransientInfrastructure,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Whether running the same command again has a reasonable chance to
    /// succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::TransientInfrastructure | Self::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthenticationRequired => "authentication-required",
            Self::AuthorizationDenied => "authorization-denied",
            Self::NotFound => "not-found",
            Self::MalformedInput => "malformed-input",
            Self::RateLimited => "rate-limited",
            Self::TransientInfrastructure => "transient-infrastructure",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Typed, user-actionable description of a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub exit_code: Option<i32>,
    /// Stderr lines that triggered the classification; all of stderr for
    /// unknown failures
    pub lines: Vec<String>,
    pub retryable: bool,
    pub suggestions: Vec<String>,
}

/// Set of lower-case substrings that map stderr text to an [`ErrorKind`]
///
/// HTTP status codes are kept apart from the plain markers: a code only
/// counts when it follows a status word such as `HTTPError` or `code=`, so
/// resource names like `web-5003` never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub kind: ErrorKind,
    pub markers: Vec<String>,
    pub status_codes: Vec<u16>,
}

impl Matcher {
    pub fn new<I, S>(kind: ErrorKind, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            markers: markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .collect(),
            status_codes: Vec::new(),
        }
    }

    /// Also match lines reporting one of `codes` as an HTTP status
    pub fn with_status_codes(mut self, codes: &[u16]) -> Self {
        self.status_codes.extend_from_slice(codes);
        self
    }

    fn matches(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.markers.iter().any(|marker| line.contains(marker))
            || self
                .status_codes
                .iter()
                .any(|code| reports_status(&line, &code.to_string()))
    }
}

/// Words that introduce a status code in gcloud and API error output
const STATUS_PREFIXES: &[&str] = &[
    "httperror",
    "http",
    "http/1.1",
    "http/2",
    "code",
    "status",
    "error",
];

/// Whether lower-cased `line` reports `code` right after a status word
///
/// `HTTPError 503:`, `code=403`, `status: 429` and `ERROR: 500` count;
/// digits embedded in identifiers do not.
fn reports_status(line: &str, code: &str) -> bool {
    line.match_indices(code).any(|(at, _)| {
        let rest = &line[at + code.len()..];
        if rest.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return false;
        }
        let head = &line[..at];
        let trimmed = head.trim_end_matches(|c: char| matches!(c, ' ' | '=' | ':' | '(' | '['));
        if trimmed.len() == head.len() {
            return false;
        }
        STATUS_PREFIXES.iter().any(|prefix| {
            trimmed.strip_suffix(prefix).is_some_and(|before| {
                !before.ends_with(|c: char| c.is_ascii_alphanumeric())
            })
        })
    })
}

const AUTH_MARKERS: &[&str] = &[
    "not authorized",
    "not authenticated",
    "please run",
    "auth login",
    "no credentialed accounts",
    "you do not currently have an active account",
    "could not load the default credentials",
    "reauthentication",
    "invalid_grant",
];

const AUTHZ_MARKERS: &[&str] = &[
    "permission denied",
    "permission_denied",
    "does not have permission",
];

const NOT_FOUND_MARKERS: &[&str] = &["not found", "not_found"];

const MALFORMED_MARKERS: &[&str] = &[
    "invalid argument",
    "invalid_argument",
    "invalid choice",
    "invalid value",
    "unrecognized arguments",
    "is required",
];

const RATE_LIMIT_MARKERS: &[&str] = &[
    "quota exceeded",
    "rate limit",
    "ratelimitexceeded",
    "resource_exhausted",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "unavailable",
    "deadline exceeded",
    "deadline_exceeded",
    "connection reset",
    "internal error",
];

/// Maps failed executions onto [`ClassifiedError`]s
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    binary: String,
    matchers: Vec<Matcher>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::for_binary(crate::core::config::DEFAULT_BINARY)
    }
}

impl ErrorClassifier {
    /// Classifier with the default matcher list, ordered so authentication
    /// failures win over everything else
    pub fn for_binary(binary: impl Into<String>) -> Self {
        Self::new(binary, default_matchers())
    }

    /// Classifier with a custom matcher list; earlier matchers take priority
    pub fn new(binary: impl Into<String>, matchers: Vec<Matcher>) -> Self {
        Self {
            binary: binary.into(),
            matchers,
        }
    }

    /// Append a matcher after the existing ones
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Classify a failed execution
    ///
    /// Always yields exactly one classification; anything the matchers do
    /// not recognise is [`ErrorKind::Unknown`] with stderr attached verbatim.
    pub fn classify(&self, execution: &Execution) -> ClassifiedError {
        let exit_code = execution.exit_code();

        if execution.cancel_reason() == Some(CancelReason::Timeout) {
            return ClassifiedError {
                kind: ErrorKind::Timeout,
                exit_code,
                lines: Vec::new(),
                retryable: true,
                suggestions: self.timeout_suggestions(execution),
            };
        }

        let stderr: Vec<&str> = execution
            .stderr()
            .iter()
            .map(|line| line.text.as_str())
            .collect();

        for matcher in &self.matchers {
            let hits: Vec<String> = stderr
                .iter()
                .filter(|line| matcher.matches(line))
                .map(|line| line.to_string())
                .collect();
            if !hits.is_empty() {
                tracing::debug!(
                    execution_id = %execution.id(),
                    kind = %matcher.kind,
                    "Classified failed execution"
                );
                return ClassifiedError {
                    kind: matcher.kind,
                    exit_code,
                    lines: hits,
                    retryable: matcher.kind.is_retryable(),
                    suggestions: self.suggestions_for(matcher.kind, execution),
                };
            }
        }

        let mut suggestions = vec!["Inspect stderr for details".to_string()];
        if let Some(failure) = execution.failure() {
            suggestions.push(format!("The process could not be run: {failure}"));
        }
        ClassifiedError {
            kind: ErrorKind::Unknown,
            exit_code,
            lines: stderr.iter().map(|line| line.to_string()).collect(),
            retryable: false,
            suggestions,
        }
    }

    /// Advice for an execution stopped by its deadline
    pub fn timeout_suggestions(&self, execution: &Execution) -> Vec<String> {
        vec![format!(
            "The command ran for {} ms and hit its {} ms limit; \
             raise the timeout (--timeout) if it needs longer",
            execution.elapsed().as_millis(),
            execution.timeout().as_millis()
        )]
    }

    /// Standard login commands for the wrapped binary
    pub fn login_suggestions(&self) -> Vec<String> {
        vec![
            format!("Run `{} auth login` to authenticate", self.binary),
            format!(
                "Run `{} auth application-default login` to set up application default credentials",
                self.binary
            ),
        ]
    }

    fn suggestions_for(&self, kind: ErrorKind, execution: &Execution) -> Vec<String> {
        let binary = &self.binary;
        match kind {
            ErrorKind::AuthenticationRequired => self.login_suggestions(),
            ErrorKind::AuthorizationDenied => vec![
                format!("Check the active account with `{binary} auth list`"),
                "Make sure the account has the required IAM role on the project".to_string(),
            ],
            ErrorKind::NotFound => vec![
                "Verify the resource name".to_string(),
                format!("Check the active project with `{binary} config get-value project`"),
            ],
            ErrorKind::MalformedInput => {
                let mut command: Vec<&str> = execution
                    .spec()
                    .args()
                    .iter()
                    .take_while(|arg| !arg.starts_with('-'))
                    .map(String::as_str)
                    .collect();
                command.truncate(3);
                vec![format!(
                    "See `{binary} {} --help` for valid arguments",
                    command.join(" ")
                )]
            }
            ErrorKind::RateLimited => vec![
                "Wait before retrying".to_string(),
                "Check the project's quota usage".to_string(),
            ],
            ErrorKind::TransientInfrastructure => {
                vec!["The service reported a temporary problem; retry the command".to_string()]
            }
            ErrorKind::Timeout | ErrorKind::Unknown => {
                vec!["Inspect stderr for details".to_string()]
            }
        }
    }
}

fn default_matchers() -> Vec<Matcher> {
    vec![
        Matcher::new(ErrorKind::AuthenticationRequired, AUTH_MARKERS.iter().copied()),
        Matcher::new(ErrorKind::AuthorizationDenied, AUTHZ_MARKERS.iter().copied())
            .with_status_codes(&[403]),
        Matcher::new(ErrorKind::RateLimited, RATE_LIMIT_MARKERS.iter().copied())
            .with_status_codes(&[429]),
        Matcher::new(ErrorKind::NotFound, NOT_FOUND_MARKERS.iter().copied())
            .with_status_codes(&[404]),
        Matcher::new(ErrorKind::MalformedInput, MALFORMED_MARKERS.iter().copied()),
        Matcher::new(
            ErrorKind::TransientInfrastructure,
            TRANSIENT_MARKERS.iter().copied(),
        )
        .with_status_codes(&[500, 502, 503, 504]),
    ]
}
