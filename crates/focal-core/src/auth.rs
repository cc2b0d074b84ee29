//! Authentication collaborator seam
//!
//! The credential/token service lives outside the engine; sync only needs
//! these three calls.

use async_trait::async_trait;

use crate::error::Result;

/// Authentication collaborator consumed by the orchestrator
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Whether a user session is currently established
    async fn is_authenticated(&self) -> bool;

    /// Identifier of the signed-in user
    async fn current_user_id(&self) -> Result<String>;

    /// Bearer token for remote requests
    async fn token(&self) -> Result<String>;
}
