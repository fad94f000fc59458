use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use log::{debug, info, warn};
use crate::artifact::ArtifactHandle;
use crate::config::GatewayConfig;
use crate::executors::Executor;
use crate::models::{EngineError, EngineInvocation, EngineVariant, Workspace};
use crate::traits::WorkspaceManager;

/// Entry point of the gateway: turns an uploaded image into a MusicXML file.
///
/// Each call gets its own workspace. Any failure after the workspace exists
/// deletes it before the error is returned; successful workspaces are left
/// for the janitor unless `cleanup_on_success` is set.
pub struct RecognitionEngine {
    config: Arc<GatewayConfig>,
    workspaces: Arc<dyn WorkspaceManager>,
    executor: Arc<dyn Executor>,
}

impl Clone for RecognitionEngine {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            workspaces: Arc::clone(&self.workspaces),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl RecognitionEngine {
    pub fn new(
        config: Arc<GatewayConfig>,
        workspaces: Arc<dyn WorkspaceManager>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            config,
            workspaces,
            executor,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Same as [`recognize`](Self::recognize) with the variant given as a
    /// selector string. Unknown selectors fail before anything is allocated.
    pub async fn recognize_selector(
        &self,
        image: &[u8],
        filename: &str,
        selector: Option<&str>,
    ) -> Result<ArtifactHandle, EngineError> {
        let variant = match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(selector) => selector.parse()?,
            None => EngineVariant::default(),
        };
        self.recognize(image, filename, variant).await
    }

    pub async fn recognize(
        &self,
        image: &[u8],
        filename: &str,
        variant: EngineVariant,
    ) -> Result<ArtifactHandle, EngineError> {
        let filename = self.validate_filename(filename)?;

        let workspace = self.workspaces.create().await?;
        info!("Recognizing {} with {} engine in workspace {}", filename, variant, workspace.id);

        match self.process(&workspace, image, filename, variant).await {
            Ok(handle) => {
                info!("Workspace {} produced {}", workspace.id, handle.file_name);
                Ok(handle)
            }
            Err(err) => {
                warn!("Recognition in workspace {} failed: {}", workspace.id, err);
                // Cleanup errors are logged by the manager; the original failure wins.
                let _ = self.workspaces.cleanup(workspace.id).await;
                Err(err.into_processing())
            }
        }
    }

    async fn process(
        &self,
        workspace: &Workspace,
        image: &[u8],
        filename: &str,
        variant: EngineVariant,
    ) -> Result<ArtifactHandle, EngineError> {
        let input_path = workspace.path.join(format!("input_{}", filename));
        tokio::fs::write(&input_path, image)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to save upload: {}", e)))?;
        debug!("Saved {} bytes to {:?}", image.len(), input_path);

        let invocation = EngineInvocation {
            input_path,
            workspace: workspace.clone(),
            variant,
            timeout: self.config.engine_timeout(),
        };

        self.workspaces.touch(workspace.id).await;
        let artifacts = self.executor.run(&invocation).await?;
        self.workspaces.touch(workspace.id).await;

        let primary_extension = self
            .config
            .engine(variant)
            .map(|spec| spec.primary_extension.clone())
            .unwrap_or_else(|| "musicxml".to_string());
        let primary = artifacts
            .primary_file()
            .ok_or(EngineError::NoArtifactProduced(primary_extension))?;

        Ok(ArtifactHandle::new(
            workspace.id,
            &workspace.path,
            primary,
            artifacts.auxiliary.clone(),
        ))
    }

    /// Reduces the client filename to its last path component and checks it
    /// against the allowlist.
    fn validate_filename<'a>(&self, filename: &'a str) -> Result<&'a str, EngineError> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| EngineError::UnsupportedFormat(format!("Invalid file name: {:?}", filename)))?;

        if !self.config.is_accepted(name) {
            return Err(EngineError::UnsupportedFormat(format!(
                "{} is not one of: {}",
                name,
                self.config.accepted_extensions.join(", ")
            )));
        }
        Ok(name)
    }

    /// Opens the result for streaming and records the delivery. A result that
    /// cannot be opened releases its workspace before the error is returned.
    pub async fn open_result(&self, handle: &ArtifactHandle) -> Result<tokio::fs::File, EngineError> {
        let file = match handle.open().await {
            Ok(file) => file,
            Err(err) => {
                warn!("Result of workspace {} could not be opened: {}", handle.workspace_id, err);
                let _ = self.release(handle).await;
                return Err(err.into_processing());
            }
        };

        self.mark_delivered(handle).await;
        if self.config.cleanup_on_success {
            // The open descriptor keeps the data readable after the unlink.
            if let Err(e) = self.release(handle).await {
                warn!("Early release of workspace {} failed: {}", handle.workspace_id, e);
            }
        }
        Ok(file)
    }

    /// Marks the result as handed out; it counts as activity for expiry.
    pub async fn mark_delivered(&self, handle: &ArtifactHandle) {
        self.workspaces.touch(handle.workspace_id).await;
    }

    /// Deletes the workspace behind a result right away.
    pub async fn release(&self, handle: &ArtifactHandle) -> Result<(), EngineError> {
        self.workspaces.cleanup(handle.workspace_id).await
    }

    pub async fn active_workspaces(&self) -> usize {
        self.workspaces.active_count().await
    }

    /// Whether each variant's executable can currently be launched.
    pub fn engine_status(&self) -> BTreeMap<String, bool> {
        EngineVariant::ALL
            .iter()
            .map(|variant| (variant.to_string(), self.executor.is_available(*variant)))
            .collect()
    }
}
