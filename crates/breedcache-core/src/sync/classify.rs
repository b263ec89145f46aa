//! Error taxonomy for everything the sync layer can fail on.
//!
//! Every failure that crosses the engine or mutator boundary goes through
//! [`classify`] and comes out as an [`ErrorKind`] with fixed user-facing copy.

use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Union of the failures a load or mutation can hit.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] ApiError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("Page {got} completed out of order (expected page {expected})")]
    OutOfOrder { expected: u32, got: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    NoConnectivity,
    ServerError(u16),
    ClientError(u16),
    Unknown(String),
}

impl ErrorKind {
    /// Fixed copy shown to the user for this kind of failure
    pub fn user_message(&self) -> String {
        match self {
            ErrorKind::Timeout => {
                "Connection timed out. Please check your internet connection.".to_string()
            }
            ErrorKind::NoConnectivity => {
                "Network error. Please check your internet connection.".to_string()
            }
            ErrorKind::ServerError(_) => "Server error. Please try again later.".to_string(),
            ErrorKind::ClientError(401) => "Unauthorized. Please check your API key.".to_string(),
            ErrorKind::ClientError(403) => "Access denied.".to_string(),
            ErrorKind::ClientError(404) => "Resource not found.".to_string(),
            ErrorKind::ClientError(429) => "Too many requests. Please try again later.".to_string(),
            ErrorKind::ClientError(code) => format!("Client error: {}", code),
            ErrorKind::Unknown(message) => message.clone(),
        }
    }

    /// Network-layer failures the user can fix by retrying later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::NoConnectivity
                | ErrorKind::ServerError(_)
                | ErrorKind::ClientError(429)
        )
    }
}

/// Map any sync failure onto the taxonomy. Pure; never fails.
pub fn classify(error: &SyncError) -> ErrorKind {
    match error {
        SyncError::Transport(api) => classify_transport(api),
        SyncError::Persistence(e) => ErrorKind::Unknown(e.to_string()),
        SyncError::OutOfOrder { .. } => ErrorKind::Unknown(error.to_string()),
    }
}

fn classify_transport(error: &ApiError) -> ErrorKind {
    match error {
        ApiError::Timeout => ErrorKind::Timeout,
        ApiError::Connection(_) => ErrorKind::NoConnectivity,
        _ => match error.status() {
            Some(code @ 400..=499) => ErrorKind::ClientError(code),
            Some(code @ 500..=599) => ErrorKind::ServerError(code),
            _ => ErrorKind::Unknown(error.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(error: ApiError) -> ErrorKind {
        classify(&SyncError::from(error))
    }

    #[test]
    fn test_status_ranges() {
        assert_eq!(kind(ApiError::from_status(404, "")), ErrorKind::ClientError(404));
        assert_eq!(kind(ApiError::from_status(418, "teapot")), ErrorKind::ClientError(418));
        assert_eq!(kind(ApiError::from_status(503, "")), ErrorKind::ServerError(503));
        assert_eq!(kind(ApiError::RateLimited), ErrorKind::ClientError(429));
    }

    #[test]
    fn test_network_failures() {
        assert_eq!(kind(ApiError::Timeout), ErrorKind::Timeout);
        assert_eq!(
            kind(ApiError::Connection("dns error".into())),
            ErrorKind::NoConnectivity
        );
    }

    #[test]
    fn test_malformed_payload_is_unknown() {
        let kind = kind(ApiError::InvalidResponse("expected value at line 1".into()));
        assert_eq!(
            kind,
            ErrorKind::Unknown("Invalid response: expected value at line 1".into())
        );
        assert_eq!(kind.user_message(), "Invalid response: expected value at line 1");
    }

    #[test]
    fn test_persistence_and_ordering_are_unknown() {
        let kind = classify(&SyncError::from(StoreError::NotFound("abys".into())));
        assert!(matches!(kind, ErrorKind::Unknown(ref m) if m.contains("abys")));

        let kind = classify(&SyncError::OutOfOrder { expected: 1, got: 2 });
        assert!(matches!(kind, ErrorKind::Unknown(ref m) if m.contains("out of order")));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            ErrorKind::Timeout.user_message(),
            "Connection timed out. Please check your internet connection."
        );
        assert_eq!(
            ErrorKind::ClientError(401).user_message(),
            "Unauthorized. Please check your API key."
        );
        assert_eq!(ErrorKind::ClientError(403).user_message(), "Access denied.");
        assert_eq!(ErrorKind::ClientError(404).user_message(), "Resource not found.");
        assert_eq!(
            ErrorKind::ClientError(429).user_message(),
            "Too many requests. Please try again later."
        );
        assert_eq!(ErrorKind::ClientError(400).user_message(), "Client error: 400");
        assert_eq!(
            ErrorKind::ServerError(502).user_message(),
            "Server error. Please try again later."
        );
    }

    #[test]
    fn test_transient() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::ClientError(429).is_transient());
        assert!(!ErrorKind::ClientError(404).is_transient());
        assert!(!ErrorKind::Unknown("x".into()).is_transient());
    }
}
