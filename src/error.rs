use thiserror::Error;

/// Errors surfaced by the lookup client and its collaborators.
///
/// `Clone` so that one remote result can be shared with every coalesced
/// waiter of an in-flight lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Non-success HTTP status (`status` is set) or a transport failure /
    /// unparseable body (`status` is `None`).
    #[error("remote error (status {}): {body}", display_status(.status))]
    Remote { status: Option<u16>, body: String },

    /// A live-feed frame that could not be decoded into a change event.
    #[error("decode error: {0}")]
    Decode(String),

    /// Rejected before any network call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Dial or read failure on the live feed. Never returned to library
    /// callers; the feed reconnects on its own.
    #[error("connection error: {0}")]
    Connection(String),
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl Error {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Error::Remote {
            status: None,
            body: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_status_and_body() {
        let e = Error::Remote {
            status: Some(503),
            body: "maintenance".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("maintenance"));
    }

    #[test]
    fn transport_error_has_no_status() {
        let e = Error::transport("connection reset");
        assert!(matches!(e, Error::Remote { status: None, .. }));
        assert!(e.to_string().contains("status none"));
    }
}
