//! The session handler capability set.

use std::time::Duration;

use async_trait::async_trait;

/// Storage contract a web framework drives once per request.
///
/// Mirrors the classic save-handler callbacks: every method reports success
/// as a flag and never fails hard. Implementations log and degrade instead of
/// returning errors.
#[async_trait]
pub trait SessionHandler: Send {
    /// Called when the session starts.
    async fn open(&mut self, save_path: &str, session_name: &str) -> bool;

    /// Called when the request is done with the session.
    async fn close(&mut self) -> bool;

    /// Payload stored for `id`; empty for a new session.
    async fn read(&mut self, id: &str) -> String;

    /// Persist the payload for `id`.
    async fn write(&mut self, id: &str, data: &str) -> bool;

    /// Remove the session.
    async fn destroy(&mut self, id: &str) -> bool;

    /// Expire sessions older than `max_lifetime`.
    async fn gc(&mut self, max_lifetime: Duration) -> bool;
}
