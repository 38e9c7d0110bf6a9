//! Trust allow-list.
//!
//! Devices the user has marked as their own are never reported as a risk.

use std::collections::HashSet;

/// Answers whether a device id is on the user's allow-list.
pub trait TrustList: Send + Sync {
    /// Whether `device_id` is trusted.
    fn is_trusted(&self, device_id: &str) -> bool;
}

/// In-memory allow-list, usually built from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    /// An empty list that trusts nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device id.
    pub fn insert(&mut self, device_id: impl Into<String>) -> bool {
        self.ids.insert(device_id.into())
    }

    /// Removes a device id.
    pub fn remove(&mut self, device_id: &str) -> bool {
        self.ids.remove(device_id)
    }

    /// Number of trusted ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl TrustList for AllowList {
    fn is_trusted(&self, device_id: &str) -> bool {
        self.ids.contains(device_id)
    }
}
