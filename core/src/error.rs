use thiserror::Error;

use crate::dialect::DialectKind;

#[derive(Debug, Error)]
pub enum HedgeError {
    /// Opening a connection or talking to the backend failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected the statement
    #[error("Statement error: {0}")]
    Statement(String),

    /// A stream session signal was sent out of order
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A statement or fan-out deadline elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Every replica of a raced query failed
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// No connection config registered under this logical name
    #[error("Database not found: {0}")]
    UnknownDatabase(String),

    /// No driver registered for this kind of database
    #[error("No driver registered for {0}")]
    NoDriver(DialectKind),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The stream session was cancelled
    #[error("Stream cancelled")]
    Cancelled,

    /// Rusqlite specific errors
    #[cfg(feature = "rusqlite")]
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    /// tokio-postgres specific errors
    #[cfg(feature = "tokio-postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

/// Every error reported by a replica set, in the order the replicas failed.
#[derive(Debug, Default)]
pub struct AggregateError {
    pub errors: Vec<HedgeError>,
}

impl AggregateError {
    pub fn new(errors: Vec<HedgeError>) -> Self {
        Self { errors }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HedgeError> {
        self.errors.iter()
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "All {} replicas failed: ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl IntoIterator for AggregateError {
    type Item = HedgeError;
    type IntoIter = std::vec::IntoIter<HedgeError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Result type for hedge operations
pub type Result<T> = std::result::Result<T, HedgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lists_every_error() {
        let err = HedgeError::from(AggregateError::new(vec![
            HedgeError::Connection("refused".into()),
            HedgeError::Timeout("statement exceeded 60s".into()),
        ]));
        assert_eq!(
            err.to_string(),
            "All 2 replicas failed: Connection error: refused, Timeout: statement exceeded 60s"
        );
    }
}
