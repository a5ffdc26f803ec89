use std::time::Duration;

use thiserror::Error;

/// Why a node's fetch cycle failed.
///
/// Every variant is handled the same way by the node: logged, published as a
/// user-visible error, and the previously cached children are kept.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out after {} ms.", .elapsed.as_millis())]
    Timeout { elapsed: Duration },
    #[error(transparent)]
    Remote(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("Fetch task aborted: {0}")]
    Aborted(String),
    #[error("No fetch context available; the tree has not been configured")]
    NotConfigured,
}

impl FetchError {
    pub fn remote<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Remote(Box::new(error))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_reports_milliseconds() {
        let error = FetchError::Timeout {
            elapsed: Duration::from_millis(30_000),
        };
        assert_eq!(error.to_string(), "Request timed out after 30000 ms.");
        assert!(error.is_timeout());
    }

    #[test]
    fn test_remote_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = FetchError::remote(io);
        assert_eq!(error.to_string(), "refused");
        assert!(!error.is_timeout());
    }
}
