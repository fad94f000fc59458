use crate::models::{EngineError, Workspace};
use crate::traits::WorkspaceManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Directory name prefix of every workspace under the root.
pub const WORKSPACE_PREFIX: &str = "score_";

/// Process-wide table of live workspaces.
///
/// Constructed once and shared through `Arc` by the request path and the
/// janitor. Every mutation and every snapshot takes the same mutex, so no
/// caller can observe an entry whose directory has not been created yet.
/// The map and the filesystem may still disagree transiently: a directory
/// can vanish underneath a registered entry, and all readers treat that as
/// "already cleaned".
pub struct WorkspaceRegistry {
    root_path: PathBuf,
    workspaces: Mutex<HashMap<Uuid, Workspace>>,
}

impl WorkspaceRegistry {
    pub async fn new(root_path: PathBuf) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(&root_path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to create workspace root: {}", e)))?;

        Ok(Self {
            root_path,
            workspaces: Mutex::new(HashMap::new()),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn workspace_path(&self, id: Uuid) -> PathBuf {
        self.root_path.join(format!("{}{}", WORKSPACE_PREFIX, id))
    }

    /// Creates a fresh empty directory and registers it.
    ///
    /// `create_dir` rather than `create_dir_all`: an already existing
    /// directory is an error, never a shared workspace.
    pub async fn create_workspace(&self) -> Result<Workspace, EngineError> {
        let id = Uuid::new_v4();
        let path = self.workspace_path(id);

        let mut workspaces = self.workspaces.lock().await;
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to create workspace: {}", e)))?;

        let now = Utc::now();
        let workspace = Workspace {
            id,
            path,
            created_at: now,
            last_touched: now,
        };
        workspaces.insert(id, workspace.clone());
        debug!("Created workspace {} at {:?}", id, workspace.path);

        Ok(workspace)
    }

    /// Tracks an existing directory. Returns false, leaving the registry
    /// unchanged, when the id is already known.
    pub async fn register(&self, workspace: Workspace) -> bool {
        let mut workspaces = self.workspaces.lock().await;
        if workspaces.contains_key(&workspace.id) {
            return false;
        }
        workspaces.insert(workspace.id, workspace);
        true
    }

    /// Forgets a workspace without touching the disk. Removing an unknown id
    /// is a no-op.
    pub async fn remove(&self, id: Uuid) -> Option<Workspace> {
        self.workspaces.lock().await.remove(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<Workspace> {
        self.workspaces.lock().await.get(&id).cloned()
    }

    pub async fn touch_workspace(&self, id: Uuid) {
        if let Some(workspace) = self.workspaces.lock().await.get_mut(&id) {
            workspace.last_touched = Utc::now();
        }
    }

    /// Point-in-time copy of all entries. The lock is released before the
    /// caller starts any filesystem work on them.
    pub async fn snapshot(&self) -> Vec<Workspace> {
        self.workspaces.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.workspaces.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workspaces.lock().await.is_empty()
    }

    /// Deletes the directory, then the entry. If the deletion fails the entry
    /// is kept so a later sweep can retry.
    pub async fn destroy(&self, id: Uuid) -> Result<(), EngineError> {
        let path = match self.get(id).await {
            Some(workspace) => workspace.path,
            None => self.workspace_path(id),
        };

        remove_dir_if_present(&path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to delete workspace {}: {}", id, e)))?;
        self.remove(id).await;
        debug!("Destroyed workspace {}", id);
        Ok(())
    }

    /// Registers workspace directories found under the root that this
    /// process does not know about, typically left behind by a previous run.
    /// Their idle time starts from the directory's modification time.
    pub async fn adopt_orphans(&self) -> Result<usize, EngineError> {
        let mut entries = tokio::fs::read_dir(&self.root_path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to read workspace root: {}", e)))?;

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(id) = entry.file_name().to_str().and_then(parse_workspace_dir) else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => metadata,
                _ => continue,
            };
            let modified: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            found.push(Workspace {
                id,
                path: entry.path(),
                created_at: modified,
                last_touched: modified,
            });
        }

        let mut adopted = 0;
        for workspace in found {
            let path = workspace.path.clone();
            if self.register(workspace).await {
                debug!("Adopting orphaned workspace {:?}", path);
                adopted += 1;
            }
        }
        if adopted > 0 {
            info!("Adopted {} orphaned workspace(s) under {:?}", adopted, self.root_path);
        }
        Ok(adopted)
    }
}

/// Parses `score_<uuid>` directory names.
pub fn parse_workspace_dir(name: &str) -> Option<Uuid> {
    name.strip_prefix(WORKSPACE_PREFIX)
        .and_then(|rest| Uuid::parse_str(rest).ok())
}

/// Recursive delete where "already gone" counts as success.
pub(crate) async fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl WorkspaceManager for WorkspaceRegistry {
    async fn create(&self) -> Result<Workspace, EngineError> {
        self.create_workspace().await
    }

    async fn touch(&self, workspace_id: Uuid) {
        self.touch_workspace(workspace_id).await
    }

    async fn cleanup(&self, workspace_id: Uuid) -> Result<(), EngineError> {
        self.destroy(workspace_id).await.map_err(|e| {
            warn!("Cleanup of workspace {} failed: {}", workspace_id, e);
            e
        })
    }

    async fn active_count(&self) -> usize {
        self.len().await
    }
}
