//! Tri-state wrapper for anything loaded through the sync engine.
//!
//! A request always produces `Loading` first and then exactly one terminal
//! state (`Success` or `Error`), unless a newer request supersedes it. Data
//! carried by `Loading` or `Error` is stale: fine to display, but not
//! authoritative.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceState<T> {
    Loading(Option<T>),
    Success(T),
    Error { message: String, partial: Option<T> },
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        ResourceState::Loading(None)
    }
}

impl<T> ResourceState<T> {
    pub fn error(message: impl Into<String>, partial: Option<T>) -> Self {
        ResourceState::Error {
            message: message.into(),
            partial,
        }
    }

    /// Best data available regardless of state
    pub fn data(&self) -> Option<&T> {
        match self {
            ResourceState::Loading(partial) => partial.as_ref(),
            ResourceState::Success(data) => Some(data),
            ResourceState::Error { partial, .. } => partial.as_ref(),
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut T> {
        match self {
            ResourceState::Loading(partial) => partial.as_mut(),
            ResourceState::Success(data) => Some(data),
            ResourceState::Error { partial, .. } => partial.as_mut(),
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            ResourceState::Loading(partial) => partial,
            ResourceState::Success(data) => Some(data),
            ResourceState::Error { partial, .. } => partial,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ResourceState::Loading(_))
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_loading()
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResourceState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// True when the data shown is not authoritative
    pub fn is_stale(&self) -> bool {
        !matches!(self, ResourceState::Success(_)) && self.data().is_some()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResourceState<U> {
        match self {
            ResourceState::Loading(partial) => ResourceState::Loading(partial.map(f)),
            ResourceState::Success(data) => ResourceState::Success(f(data)),
            ResourceState::Error { message, partial } => ResourceState::Error {
                message,
                partial: partial.map(f),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_across_states() {
        assert_eq!(ResourceState::<i32>::Loading(None).data(), None);
        assert_eq!(ResourceState::Loading(Some(1)).data(), Some(&1));
        assert_eq!(ResourceState::Success(2).data(), Some(&2));
        assert_eq!(ResourceState::error("boom", Some(3)).data(), Some(&3));
    }

    #[test]
    fn test_staleness() {
        assert!(!ResourceState::Success(1).is_stale());
        assert!(ResourceState::Loading(Some(1)).is_stale());
        assert!(ResourceState::error("x", Some(1)).is_stale());
        assert!(!ResourceState::<i32>::error("x", None).is_stale());
    }

    #[test]
    fn test_map_preserves_variant() {
        let state = ResourceState::error("offline", Some(vec![1, 2]));
        let mapped = state.map(|v| v.len());
        assert_eq!(mapped, ResourceState::error("offline", Some(2)));
        assert_eq!(mapped.error_message(), Some("offline"));
    }

    #[test]
    fn test_data_mut_edits_partial() {
        let mut state = ResourceState::Loading(Some(vec![1]));
        if let Some(data) = state.data_mut() {
            data.push(2);
        }
        assert_eq!(state.into_data(), Some(vec![1, 2]));
    }
}
