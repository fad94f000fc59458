use async_trait::async_trait;
use uuid::Uuid;
use crate::models::{EngineError, Workspace};

/// Lifetime of per-request workspaces, as seen by the orchestrator.
#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    async fn create(&self) -> Result<Workspace, EngineError>;
    async fn touch(&self, workspace_id: Uuid);
    /// Deletes the directory and forgets the workspace. Idempotent.
    async fn cleanup(&self, workspace_id: Uuid) -> Result<(), EngineError>;
    async fn active_count(&self) -> usize;
}
