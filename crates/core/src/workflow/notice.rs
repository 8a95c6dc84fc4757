use serde::{Deserialize, Serialize};

/// Colour cue of a user-facing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Green,
    Orange,
    Red,
}

/// A dismissible message shown to the user who started the workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub indicator: Indicator,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { indicator: Indicator::Green, title: "Success".to_owned(), message: message.into() }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { indicator: Indicator::Orange, title: title.into(), message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { indicator: Indicator::Red, title: "Error".to_owned(), message: message.into() }
    }
}
