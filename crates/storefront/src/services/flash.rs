//! One-shot messages carried across a redirect in the session.

use tower_sessions::Session;

use crate::models::{Flash, session_keys};

/// Queue a flash for the next rendered page.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn set(session: &Session, flash: Flash) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::FLASH, flash).await
}

/// Queue an error message.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn error(
    session: &Session,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    set(session, Flash::error(message)).await
}

/// Queue a notice.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn notice(
    session: &Session,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    set(session, Flash::notice(message)).await
}

/// Remove and return the pending flash.
pub async fn take(session: &Session) -> Flash {
    session
        .remove::<Flash>(session_keys::FLASH)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}
