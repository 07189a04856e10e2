//! Error types for the a2b library
//!
//! Geocoding and routing failures carry the description or endpoints that
//! failed, plus a typed reason. Transport failures stay attached as the cause.

use std::fmt;

use strsim::{jaro_winkler, normalized_levenshtein};

/// Failure talking to an external service, classified for the retry policy
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connectivity problem or timeout; retried with backoff
    Network(String),

    /// Any other HTTP-level failure; not retried
    Http(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network error: {msg}"),
            TransportError::Http(msg) => write!(f, "HTTP error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

/// Why a description could not be turned into coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodingFailure {
    /// The service answered with an empty candidate list
    NoCandidate,

    /// The first candidate's `lon`/`lat` could not be parsed
    MalformedCoordinates(String),

    /// The request itself failed
    Transport(TransportError),
}

impl fmt::Display for GeocodingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodingFailure::NoCandidate => write!(f, "no candidate returned"),
            GeocodingFailure::MalformedCoordinates(msg) => {
                write!(f, "unparsable coordinates ({msg})")
            }
            GeocodingFailure::Transport(err) => write!(f, "{err}"),
        }
    }
}

/// Why a route between two locations could not be obtained
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingFailure {
    /// Coordinates rejected, either locally or by the service
    InvalidCoordinates,

    /// The service answered without any route
    NoRoute,

    /// The payload did not have the expected shape
    MalformedResponse(String),

    /// The request itself failed
    Transport(TransportError),
}

impl fmt::Display for RoutingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingFailure::InvalidCoordinates => write!(f, "invalid coordinates"),
            RoutingFailure::NoRoute => write!(f, "no route found"),
            RoutingFailure::MalformedResponse(msg) => write!(f, "malformed response ({msg})"),
            RoutingFailure::Transport(err) => write!(f, "{err}"),
        }
    }
}

/// Main error type for a2b operations
#[derive(Debug)]
pub enum Error {
    /// No usable coordinates for a description
    Geocoding {
        description: String,
        reason: GeocodingFailure,
    },

    /// No usable route between two locations
    Routing {
        origin: String,
        destination: String,
        reason: RoutingFailure,
    },

    /// The route matrix does not cover the locations being sequenced
    InternalConsistency(String),

    /// Invalid parameters passed to the engine
    InvalidInput(String),

    /// Workbook could not be read, validated or written
    Spreadsheet(String),

    /// File I/O error
    IoError(std::io::Error),
}

impl Error {
    /// Geocoding error for `description`
    pub fn geocoding(description: &str, reason: GeocodingFailure) -> Self {
        Error::Geocoding {
            description: description.to_string(),
            reason,
        }
    }

    /// Routing error between two described endpoints
    pub fn routing(origin: &str, destination: &str, reason: RoutingFailure) -> Self {
        Error::Routing {
            origin: origin.to_string(),
            destination: destination.to_string(),
            reason,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Geocoding { description, reason } => {
                write!(f, "Unable to geocode '{description}': {reason}")
            }
            Error::Routing {
                origin,
                destination,
                reason,
            } => {
                write!(f, "Unable to route '{origin}' -> '{destination}': {reason}")
            }
            Error::InternalConsistency(msg) => {
                write!(f, "Inconsistent route matrix: {msg}")
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {msg}")
            }
            Error::Spreadsheet(msg) => {
                write!(f, "Spreadsheet error: {msg}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Geocoding {
                reason: GeocodingFailure::Transport(err),
                ..
            } => Some(err),
            Error::Routing {
                reason: RoutingFailure::Transport(err),
                ..
            } => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<calamine::Error> for Error {
    fn from(err: calamine::Error) -> Self {
        Error::Spreadsheet(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Error::Spreadsheet(err.to_string())
    }
}

/// Convenience result type for a2b operations
pub type Result<T> = std::result::Result<T, Error>;

/// Suggest the closest known name for a misspelled sheet or column name
///
/// Scores each candidate with 70% Jaro-Winkler + 30% normalized Levenshtein,
/// case-insensitively. Returns `None` for an exact (case-insensitive) match or
/// when nothing reaches the 0.65 threshold.
pub fn suggest_correction(input: &str, candidates: &[String]) -> Option<String> {
    let input_lower = input.to_lowercase();
    if candidates.iter().any(|c| c.to_lowercase() == input_lower) {
        return None;
    }

    let min_threshold = 0.65;
    let mut best_match = None;
    let mut best_score = 0.0f64;

    for candidate in candidates {
        let candidate_lower = candidate.to_lowercase();
        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let score = (jw_score * 0.7) + (lev_score * 0.3);

        if score >= min_threshold && score > best_score {
            best_score = score;
            best_match = Some(candidate.clone());
        }
    }

    best_match
}
