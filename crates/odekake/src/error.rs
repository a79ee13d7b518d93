use std::error::Error as _;
use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;

/// Coarse classification of a failure, used by an outside orchestrator to
/// decide whether a venue run is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Parse,
    EmptyResult,
    Validation,
    Io,
    Config,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::Network => 2,
            ErrorKind::Parse => 3,
            ErrorKind::EmptyResult => 4,
            ErrorKind::Validation => 5,
            ErrorKind::Config => 64,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Parse => "PARSE",
            ErrorKind::EmptyResult => "EMPTY_RESULT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Io => "IO",
            ErrorKind::Config => "CONFIG",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("HTTP request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("Error page detected at {url} ('{indicator}')")]
    SoftBlock { url: String, indicator: &'static str },
    #[error("Failed to decompress {encoding} body from {url}")]
    Decompress {
        url: String,
        encoding: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode body from {url} as {encoding}")]
    Decode { url: String, encoding: &'static str },
    #[error("Empty response body from {url}")]
    EmptyBody { url: String },
    #[error("No events produced for venue {venue_id}")]
    NoEvents { venue_id: String },
    #[error("Event batch has {count} event(s), expected at least {min}")]
    TooFewEvents { count: usize, min: usize },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::HttpStatus { .. }
            | ScrapeError::Request { .. }
            | ScrapeError::Timeout { .. }
            | ScrapeError::SoftBlock { .. } => ErrorKind::Network,
            ScrapeError::Decompress { .. } | ScrapeError::Decode { .. } | ScrapeError::Json(_) => {
                ErrorKind::Parse
            }
            ScrapeError::EmptyBody { .. }
            | ScrapeError::NoEvents { .. }
            | ScrapeError::TooFewEvents { .. } => ErrorKind::EmptyResult,
            ScrapeError::Validation(_) => ErrorKind::Validation,
            ScrapeError::Io { .. } => ErrorKind::Io,
            ScrapeError::Config(_) => ErrorKind::Config,
        }
    }

    /// Status code carried by a non-200 response, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ScrapeError::HttpStatus { status, .. } => Some(*status),
            ScrapeError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrapeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

/// Renders a fatal error to stderr and returns the exit code mapped from its kind.
pub fn report_fatal(prefix: &str, err: &ScrapeError) -> ExitCode {
    eprintln!("{}", format_fatal(prefix, err));
    ExitCode::from(err.kind().exit_code())
}

pub fn format_fatal(prefix: &str, err: &ScrapeError) -> String {
    let mut line = format!("{prefix}: [{}] {err}", err.kind());
    let mut source = err.source();
    while let Some(cause) = source {
        line.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    line
}
