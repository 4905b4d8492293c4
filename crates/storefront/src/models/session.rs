//! Types stored in the session.

use serde::{Deserialize, Serialize};

/// Messages shown once, on the next rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Flash {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.notice.is_none() && self.error.is_none()
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            notice: None,
            error: Some(message.into()),
        }
    }

    #[must_use]
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            notice: Some(message.into()),
            error: None,
        }
    }
}

/// Session keys.
pub mod keys {
    /// Guest token tying the session to its orders.
    pub const GUEST_TOKEN: &str = "guest_token";

    /// Pending [`super::Flash`] messages.
    pub const FLASH: &str = "flash";
}
