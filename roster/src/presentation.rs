//! View state machines
//!
//! Rendering is left to the embedding shell, these types only hold what is shown and react to
//! user actions.

pub mod gate;
pub mod list;
pub mod login;

pub use gate::{RootGate, Route};
pub use list::{ListStatus, RosterView};
pub use login::{LoginMode, LoginView};

/// Blocking acknowledgment prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}
