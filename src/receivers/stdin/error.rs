// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use thiserror::Error;
use tower::BoxError;

/// Errors returned synchronously by the receiver lifecycle
#[derive(Debug, Error)]
pub enum StdinReceiverError {
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    #[error("stdin receiver can only be started once")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, StdinReceiverError>;

/// Terminal failures of the line source
#[derive(Debug, Error)]
pub enum LineSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line} exceeds the maximum length of {max_line_bytes} bytes")]
    LineTooLong { line: u64, max_line_bytes: usize },
}

/// A single failure recorded while ingesting
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to deliver line {line}: {source}")]
    Delivery {
        line: u64,
        #[source]
        source: BoxError,
    },

    #[error("failed reading input: {0}")]
    Stream(#[from] LineSourceError),
}

/// Every failure from one receiver run, in the order they happened.
#[derive(Debug, Default)]
pub struct IngestErrors {
    errors: Vec<IngestError>,
}

impl IngestErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: IngestError) {
        self.errors.push(err);
    }

    pub fn errors(&self) -> &[IngestError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_inner(self) -> Vec<IngestError> {
        self.errors
    }
}

impl From<Vec<IngestError>> for IngestErrors {
    fn from(errors: Vec<IngestError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for IngestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "no errors"),
            [single] => write!(f, "{}", single),
            errors => {
                write!(f, "{} errors occurred: ", errors.len())?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for IngestErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn delivery(line: u64) -> IngestError {
        IngestError::Delivery {
            line,
            source: "exporter unavailable".into(),
        }
    }

    #[test]
    fn single_error_displays_as_itself() {
        let errs = IngestErrors::from(vec![delivery(2)]);
        assert_eq!(
            errs.to_string(),
            "failed to deliver line 2: exporter unavailable"
        );
    }

    #[test]
    fn multiple_errors_keep_every_cause_in_order() {
        let mut errs = IngestErrors::new();
        errs.push(delivery(1));
        errs.push(IngestError::Stream(LineSourceError::LineTooLong {
            line: 3,
            max_line_bytes: 8,
        }));

        assert_eq!(errs.len(), 2);
        assert_eq!(
            errs.to_string(),
            "2 errors occurred: failed to deliver line 1: exporter unavailable; \
             failed reading input: line 3 exceeds the maximum length of 8 bytes"
        );
        assert!(errs.source().unwrap().to_string().contains("line 1"));
    }

    #[test]
    fn delivery_error_exposes_sink_error_as_source() {
        let err = delivery(7);
        assert_eq!(err.source().unwrap().to_string(), "exporter unavailable");
    }
}
