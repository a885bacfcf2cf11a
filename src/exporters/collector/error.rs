// SPDX-License-Identifier: Apache-2.0

use http::StatusCode;
use thiserror::Error;
use tower::BoxError;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Collector request failed: {0}")]
    Transport(BoxError),

    #[error("Collector request timed out")]
    Timeout,

    #[error("Collector returned HTTP status {0}")]
    Status(StatusCode),

    #[error("Unable to decode collector response: {0}")]
    Decode(String),

    #[error("Collector rejected payload as invalid data: {0}")]
    InvalidData(String),

    #[error("Collector does not know the application id: {0}")]
    UnknownApp(String),

    #[error("Collector rejected the sending address: {0}")]
    InvalidIp(String),

    #[error("Unexpected collector response code {code}: {msg}")]
    UnexpectedCode { code: i64, msg: String },

    #[error("Unable to build collector payload: {0}")]
    Payload(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ExportError>,
    },
}

impl ExportError {
    /// Classify an error from the transport service
    pub fn from_transport(err: BoxError) -> Self {
        if err.is::<tower::timeout::error::Elapsed>() {
            return ExportError::Timeout;
        }
        ExportError::Transport(err)
    }

    /// Transport faults may clear up on their own. Anything the collector
    /// answered with an application code will fail again unmodified.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::Transport(_)
                | ExportError::Timeout
                | ExportError::Status(_)
                | ExportError::Decode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::collector::client::ConnectError;

    #[test]
    fn test_retryable_classification() {
        assert!(ExportError::Timeout.is_retryable());
        assert!(ExportError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(ExportError::from_transport(Box::new(ConnectError)).is_retryable());
        assert!(!ExportError::UnknownApp("no such app".into()).is_retryable());
        assert!(
            !ExportError::UnexpectedCode {
                code: 7,
                msg: String::new()
            }
            .is_retryable()
        );

        let elapsed: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            ExportError::from_transport(elapsed),
            ExportError::Timeout
        ));
    }
}
