use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;
use crate::models::{ArtifactSet, EngineError};

/// Lists the top level of a workspace and sorts engine outputs into primary
/// and auxiliary files, in directory-listing order.
///
/// Extensions are compared case-insensitively. `exclude` names the uploaded
/// input so an input PNG is never reported as a rendered page.
pub async fn collect_artifacts(
    dir: &Path,
    primary_extension: &str,
    auxiliary_extensions: &[String],
    exclude: Option<&str>,
) -> Result<ArtifactSet, EngineError> {
    let mut artifacts = ArtifactSet::default();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| EngineError::Storage(format!("Failed to read workspace directory: {}", e)))?;

    while let Some(entry) = entries.next_entry()
        .await
        .map_err(|e| EngineError::Storage(format!("Failed to read directory entry: {}", e)))? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if exclude == Some(name.as_str()) {
            continue;
        }
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            _ => continue,
        }

        let Some(extension) = extension_of(&name) else {
            continue;
        };
        if extension.eq_ignore_ascii_case(primary_extension) {
            artifacts.primary.push(name);
        } else if auxiliary_extensions.iter().any(|ext| extension.eq_ignore_ascii_case(ext)) {
            artifacts.auxiliary.push(name);
        }
    }

    Ok(artifacts)
}

fn extension_of(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|ext| ext.to_str())
}

pub fn content_type_for(name: &str) -> &'static str {
    match extension_of(name).map(str::to_lowercase).as_deref() {
        Some("musicxml") | Some("xml") => "application/xml",
        Some("mxl") => "application/vnd.recordare.musicxml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// The response file of a successful recognition, still inside its workspace.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    pub workspace_id: Uuid,
    pub path: PathBuf,
    pub file_name: String,
    pub auxiliary: Vec<String>,
}

impl ArtifactHandle {
    pub fn new(workspace_id: Uuid, workspace_path: &Path, file_name: &str, auxiliary: Vec<String>) -> Self {
        Self {
            workspace_id,
            path: workspace_path.join(file_name),
            file_name: file_name.to_string(),
            auxiliary,
        }
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.file_name)
    }

    pub async fn open(&self) -> Result<fs::File, EngineError> {
        fs::File::open(&self.path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to open artifact: {}", e)))
    }

    pub async fn read(&self) -> Result<Vec<u8>, EngineError> {
        fs::read(&self.path)
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to read artifact: {}", e)))
    }

    pub async fn size(&self) -> Result<u64, EngineError> {
        Ok(fs::metadata(&self.path).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_collect_sorts_primary_and_auxiliary() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("input_score.png"), b"image").unwrap();
        std::fs::write(dir.path().join("score.musicxml"), b"<score-partwise/>").unwrap();
        std::fs::write(dir.path().join("score_teaser.PNG"), b"page").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.musicxml")).unwrap();

        let aux = vec!["png".to_string()];
        let artifacts = collect_artifacts(dir.path(), "musicxml", &aux, Some("input_score.png"))
            .await
            .unwrap();

        assert_eq!(artifacts.primary, vec!["score.musicxml".to_string()]);
        assert_eq!(artifacts.auxiliary, vec!["score_teaser.PNG".to_string()]);
        assert_eq!(artifacts.primary_file(), Some("score.musicxml"));
    }

    #[tokio::test]
    async fn test_collect_empty_workspace() {
        let dir = tempdir().unwrap();
        let artifacts = collect_artifacts(dir.path(), "musicxml", &[], None).await.unwrap();
        assert!(artifacts.is_empty());
        assert_eq!(artifacts.primary_file(), None);
    }

    #[tokio::test]
    async fn test_collect_missing_directory_is_storage_error() {
        let dir = tempdir().unwrap();
        let result = collect_artifacts(&dir.path().join("gone"), "musicxml", &[], None).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("out.musicxml"), "application/xml");
        assert_eq!(content_type_for("OUT.XML"), "application/xml");
        assert_eq!(content_type_for("out.mxl"), "application/vnd.recordare.musicxml");
        assert_eq!(content_type_for("page.png"), "image/png");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_handle_reads_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("out.musicxml"), b"<score-partwise/>").unwrap();

        let handle = ArtifactHandle::new(Uuid::new_v4(), dir.path(), "out.musicxml", Vec::new());
        assert_eq!(handle.read().await.unwrap(), b"<score-partwise/>".to_vec());
        assert_eq!(handle.size().await.unwrap(), 17);
        assert_eq!(handle.content_type(), "application/xml");
    }
}
