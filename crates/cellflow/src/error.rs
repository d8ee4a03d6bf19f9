#![forbid(unsafe_code)]

//! Error types shared by task producers.

use thiserror::Error;

/// Reason an asynchronous computation was rejected.
///
/// Usable as the error type of a [`Task`](crate::Task); the unwrapping layer
/// only requires `Clone + PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{reason}")]
pub struct Rejection {
    reason: String,
}

impl Rejection {
    /// A rejection carrying `reason` as its message.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The rejection message.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<&str> for Rejection {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for Rejection {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_reason() {
        let err = Rejection::new("rejected: /api");
        assert_eq!(err.to_string(), "rejected: /api");
        assert_eq!(err.reason(), "rejected: /api");
    }

    #[test]
    fn converts_with_question_mark() {
        fn parse(input: &str) -> Result<u16, Rejection> {
            let port = input.parse::<u16>().map_err(|e| Rejection::new(e.to_string()))?;
            if port == 0 {
                return Err("port 0 is reserved".into());
            }
            Ok(port)
        }

        assert_eq!(parse("8080"), Ok(8080));
        assert_eq!(parse("0"), Err(Rejection::new("port 0 is reserved")));
        assert!(parse("http").is_err());
    }
}
