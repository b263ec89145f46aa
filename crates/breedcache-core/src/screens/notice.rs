use std::collections::HashSet;

use crate::sync::{ErrorKind, QueryKey};

/// Copy for a failed "load more"
pub const LOAD_MORE_FAILED: &str = "Failed to load more data";

/// Copy for a favorite toggle that could not be saved
pub const FAVORITE_FAILED: &str = "Couldn't update favorite. Please try again.";

/// How a failure should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Nothing to show; the whole screen becomes a retry prompt
    FullScreenRetry,
    /// Existing data stays; an inline error offers retry
    InlineRetry,
    /// Short non-blocking message, no action
    Brief,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    /// Notice for a failed load; `has_data` is whether stale data is still shown
    pub fn load_failed(message: impl Into<String>, has_data: bool) -> Self {
        Self {
            kind: if has_data {
                NoticeKind::InlineRetry
            } else {
                NoticeKind::FullScreenRetry
            },
            message: message.into(),
        }
    }

    pub fn load_more_failed() -> Self {
        Self {
            kind: NoticeKind::InlineRetry,
            message: LOAD_MORE_FAILED.to_string(),
        }
    }

    pub fn favorite_failed(kind: &ErrorKind) -> Self {
        let message = if kind.is_transient() {
            kind.user_message()
        } else {
            FAVORITE_FAILED.to_string()
        };
        Self {
            kind: NoticeKind::Brief,
            message,
        }
    }

    pub fn offers_retry(&self) -> bool {
        self.kind != NoticeKind::Brief
    }
}

/// Suppresses repeats of the same error on the same query key until the
/// next explicit refresh.
#[derive(Debug, Default)]
pub struct NoticeGate {
    shown: HashSet<(QueryKey, String)>,
}

impl NoticeGate {
    /// True the first time this (key, message) pair is seen
    pub fn admit(&mut self, key: &QueryKey, message: &str) -> bool {
        self.shown.insert((key.clone(), message.to_string()))
    }

    pub fn reset(&mut self) {
        self.shown.clear();
    }
}
