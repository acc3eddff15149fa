// Error-view navigation
// Page-level escape hatch for unrecoverable backend failures

use std::fmt;
use std::sync::Mutex;

/// Route of the error view
pub const ERROR_ROUTE: &str = "/error";

/// Status used when a failure carries none
pub const DEFAULT_ERROR_STATUS: u16 = 503;

/// Where the client currently is, and how to leave it
pub trait Navigator: Send + Sync {
    /// Current location, path plus optional query
    fn current_path(&self) -> String;

    /// Full navigation to `location`
    fn navigate(&self, location: &str);
}

/// Error-view location for a failure status
pub fn error_route(status: Option<u16>) -> String {
    format!(
        "{}?status={}",
        ERROR_ROUTE,
        status.unwrap_or(DEFAULT_ERROR_STATUS)
    )
}

/// True when `location` already points at the error view
pub fn is_error_route(location: &str) -> bool {
    let path = location
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    path.trim_end_matches('/') == ERROR_ROUTE
}

/// Navigator that remembers every navigation
#[derive(Default)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(start: &str) -> Self {
        Self {
            current: Mutex::new(start.to_string()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every location navigated to, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn navigate(&self, location: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = location.to_string();
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(location.to_string());
        }
    }
}

/// Navigator for headless use: renders the error view into the log and
/// stays put
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn current_path(&self) -> String {
        "/".to_string()
    }

    fn navigate(&self, location: &str) {
        let view = ErrorView::from_location(location, None);
        tracing::error!(
            location = %location,
            status = view.status,
            title = view.title(),
            "Unrecoverable API failure: {}",
            view
        );
    }
}

/// Status and title rendered by the error view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorView {
    pub status: u16,
}

impl ErrorView {
    /// Pick the status to show: the `status` query parameter if it is a
    /// valid HTTP status, else `fallback` if valid, else 500
    pub fn resolve(query_status: Option<&str>, fallback: Option<u16>) -> Self {
        let valid = |s: u16| (100..=599).contains(&s);

        let status = query_status
            .and_then(|s| s.trim().parse::<u16>().ok())
            .filter(|s| valid(*s))
            .or_else(|| fallback.filter(|s| valid(*s)))
            .unwrap_or(500);

        Self { status }
    }

    /// Resolve from a full location such as `/error?status=502`
    pub fn from_location(location: &str, fallback: Option<u16>) -> Self {
        let query_status = location
            .split_once('?')
            .map(|(_, query)| query)
            .and_then(|query| {
                query
                    .split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .find(|(key, _)| *key == "status")
                    .map(|(_, value)| value)
            });
        Self::resolve(query_status, fallback)
    }

    pub fn title(&self) -> &'static str {
        match self.status {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            408 => "Request Timeout",
            409 => "Conflict",
            429 => "Too Many Requests",
            500 => "Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "Unexpected Error",
        }
    }
}

impl fmt::Display for ErrorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.title())
    }
}
