pub mod http;
pub mod memory;

use std::fmt;

use crate::domain::{Phone, PhoneDraft, PhoneId};

/// The only error the store layer surfaces.
///
/// Non-200 responses, transport failures and undecodable bodies all land
/// here. `status` is set when a response was received; `detail` carries the
/// response body or the transport message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote store error{}: {detail}", status_suffix(.status))]
pub struct RemoteError {
    status: Option<u16>,
    detail: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// A failure with no HTTP response behind it.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(None, detail)
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// The four store calls, for logging and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Add,
    Update,
    List,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::List => write!(f, "list"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Access to the remote phone collection.
///
/// The cache is written against this trait so any backend can be injected:
/// - `HttpStore` — the REST collection
/// - `InMemoryStore` — for tests and offline demos
///
/// Each call is a single round trip. Implementations do not retry.
#[allow(async_fn_in_trait)]
pub trait PhoneStore {
    /// Creates a record and returns it with the store-assigned id.
    async fn add(&self, draft: &PhoneDraft) -> Result<Phone, RemoteError>;

    /// Merges the phone's attributes into the record keyed by its id.
    async fn update(&self, phone: &Phone) -> Result<Phone, RemoteError>;

    /// Returns the whole collection, ordered by id. An empty collection is
    /// an empty list.
    async fn list(&self) -> Result<Vec<Phone>, RemoteError>;

    async fn remove(&self, id: &PhoneId) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_when_present() {
        let err = RemoteError::new(Some(404), "null");
        assert_eq!(err.to_string(), "remote store error (status 404): null");
        let err = RemoteError::transport("connection refused");
        assert_eq!(err.to_string(), "remote store error: connection refused");
    }
}
