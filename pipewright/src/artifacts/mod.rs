//! Artifacts: named byte blobs attached to an execution.
//!
//! Uploads are streamed in chunks while a SHA-256 checksum is computed, and
//! downloads write the stored bytes back unchanged. Artifacts belong to one
//! execution but outlive it: deleting an execution leaves its artifacts, and
//! deleting an artifact never touches the execution beyond its artifact list.

use crate::errors::{EngineError, Result};
use crate::events::{names, EventSink};
use crate::execution::Execution;
use crate::store::{Record, RecordStore};
use crate::utils::{generate_id, now};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

const CHUNK_SIZE: usize = 64 * 1024;

/// Caller-supplied description of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Artifact name; required.
    pub name: String,
    /// Kind of content, e.g. `log`, `report`, `binary`. Defaults to `file`.
    #[serde(default)]
    pub artifact_type: Option<String>,
    /// Storage path. Defaults to `executions/{execution_id}/artifacts/{name}`.
    #[serde(default)]
    pub path: Option<String>,
    /// Artifact ID. Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
}

impl ArtifactMeta {
    /// Describes an artifact by name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the artifact type.
    #[must_use]
    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    /// Sets the storage path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A stored artifact's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique ID.
    pub id: String,
    /// The owning execution.
    pub execution_id: String,
    /// Name.
    pub name: String,
    /// Kind of content.
    pub artifact_type: String,
    /// Storage path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the content, lowercase hex.
    pub checksum: String,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredArtifact {
    artifact: Artifact,
    content: Arc<[u8]>,
}

impl Record for StoredArtifact {
    const KIND: &'static str = "artifact";

    fn id(&self) -> &str {
        &self.artifact.id
    }
}

/// Artifact storage bound to the engine's execution store.
pub struct ArtifactStore {
    artifacts: RecordStore<StoredArtifact>,
    executions: Arc<RecordStore<Execution>>,
    max_bytes: u64,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("artifacts", &self.artifacts.len())
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Creates an artifact store.
    #[must_use]
    pub fn new(
        executions: Arc<RecordStore<Execution>>,
        max_bytes: u64,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            artifacts: RecordStore::new(),
            executions,
            max_bytes,
            event_sink,
        }
    }

    /// Streams `reader` into a new artifact attached to `execution_id`.
    pub async fn upload<R>(
        &self,
        execution_id: &str,
        meta: ArtifactMeta,
        mut reader: R,
    ) -> Result<Artifact>
    where
        R: AsyncRead + Unpin + Send,
    {
        if meta.name.trim().is_empty() {
            return Err(crate::errors::ValidationError::new("artifact name is required")
                .at("name")
                .into());
        }
        if !self.executions.contains(execution_id) {
            return Err(EngineError::not_found(Execution::KIND, execution_id));
        }

        let mut hasher = Sha256::new();
        let mut content = Vec::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if (content.len() + n) as u64 > self.max_bytes {
                return Err(EngineError::ArtifactTooLarge {
                    limit: self.max_bytes,
                });
            }
            hasher.update(&buf[..n]);
            content.extend_from_slice(&buf[..n]);
        }

        let id = meta.id.unwrap_or_else(generate_id);
        let artifact = Artifact {
            path: meta
                .path
                .unwrap_or_else(|| format!("executions/{execution_id}/artifacts/{}", meta.name)),
            id: id.clone(),
            execution_id: execution_id.to_string(),
            name: meta.name,
            artifact_type: meta.artifact_type.unwrap_or_else(|| "file".to_string()),
            size: content.len() as u64,
            checksum: hex::encode(hasher.finalize()),
            created_at: now(),
        };

        self.artifacts.insert(StoredArtifact {
            artifact: artifact.clone(),
            content: content.into(),
        })?;

        // The execution may have been deleted while the upload streamed.
        if let Err(e) = self
            .executions
            .update(execution_id, |exec| exec.artifacts.push(id.clone()))
        {
            let _ = self.artifacts.remove(&id);
            return Err(e);
        }

        info!(
            execution_id = %execution_id,
            artifact_id = %artifact.id,
            size = artifact.size,
            "Artifact uploaded"
        );
        self.event_sink
            .emit(
                names::ARTIFACT_UPLOADED,
                Some(serde_json::json!({
                    "execution_id": execution_id,
                    "artifact_id": artifact.id,
                    "name": artifact.name,
                    "size": artifact.size,
                    "checksum": artifact.checksum,
                })),
            )
            .await;

        Ok(artifact)
    }

    /// Writes the artifact's bytes to `writer`, returning the byte count.
    pub async fn download<W>(&self, artifact_id: &str, mut writer: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let stored = self.artifacts.get(artifact_id)?;
        for chunk in stored.content.chunks(CHUNK_SIZE) {
            writer.write_all(chunk).await?;
        }
        writer.flush().await?;
        debug!(artifact_id = %artifact_id, size = stored.artifact.size, "Artifact downloaded");
        Ok(stored.artifact.size)
    }

    /// Returns an artifact's metadata.
    pub fn get(&self, artifact_id: &str) -> Result<Artifact> {
        self.artifacts.get(artifact_id).map(|s| s.artifact)
    }

    /// Lists an execution's artifacts, oldest first.
    #[must_use]
    pub fn list(&self, execution_id: &str) -> Vec<Artifact> {
        let mut artifacts: Vec<Artifact> = self
            .artifacts
            .filter(|s| s.artifact.execution_id == execution_id)
            .into_iter()
            .map(|s| s.artifact)
            .collect();
        artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        artifacts
    }

    /// Deletes an artifact and detaches it from its execution, if that still exists.
    pub fn delete(&self, artifact_id: &str) -> Result<Artifact> {
        let stored = self.artifacts.remove(artifact_id)?;
        let _ = self
            .executions
            .update(&stored.artifact.execution_id, |exec| {
                exec.artifacts.retain(|id| id != artifact_id);
            });
        info!(artifact_id = %artifact_id, "Artifact deleted");
        Ok(stored.artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionKind, DefinitionMeta};
    use crate::events::CollectingEventSink;
    use crate::execution::ExecutionParams;
    use pretty_assertions::assert_eq;

    fn setup(
        max_bytes: u64,
    ) -> (
        ArtifactStore,
        Arc<RecordStore<Execution>>,
        String,
        Arc<CollectingEventSink>,
    ) {
        let executions = Arc::new(RecordStore::new());
        let exec = Execution::new(
            DefinitionKind::Pipeline,
            &DefinitionMeta::new("ci"),
            ExecutionParams::manual(),
        );
        let exec_id = exec.id.clone();
        executions.insert(exec).unwrap();
        let sink = Arc::new(CollectingEventSink::new());
        let store = ArtifactStore::new(executions.clone(), max_bytes, sink.clone());
        (store, executions, exec_id, sink)
    }

    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let (store, executions, exec_id, sink) = setup(1024 * 1024);
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let artifact = store
            .upload(&exec_id, ArtifactMeta::new("report.bin"), content.as_slice())
            .await
            .unwrap();

        assert_eq!(artifact.size, content.len() as u64);
        assert_eq!(artifact.checksum, hex::encode(Sha256::digest(&content)));
        assert_eq!(artifact.path, format!("executions/{exec_id}/artifacts/report.bin"));
        assert_eq!(artifact.artifact_type, "file");
        assert_eq!(executions.get(&exec_id).unwrap().artifacts, vec![artifact.id.clone()]);
        assert_eq!(sink.event_types(), vec![names::ARTIFACT_UPLOADED]);

        let mut out = Vec::new();
        let written = store.download(&artifact.id, &mut out).await.unwrap();
        assert_eq!(written, content.len() as u64);
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn test_known_checksum() {
        let (store, _, exec_id, _) = setup(1024);
        let artifact = store
            .upload(&exec_id, ArtifactMeta::new("a.txt"), &b"abc"[..])
            .await
            .unwrap();
        assert_eq!(
            artifact.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_upload_unknown_execution() {
        let (store, _, _, _) = setup(1024);
        let err = store
            .upload("missing", ArtifactMeta::new("a"), &b"x"[..])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let (store, executions, exec_id, _) = setup(4);
        let err = store
            .upload(&exec_id, ArtifactMeta::new("big"), &b"12345"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ArtifactTooLarge { limit: 4 }));
        assert!(store.list(&exec_id).is_empty());
        assert!(executions.get(&exec_id).unwrap().artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_delete_detaches_but_keeps_execution() {
        let (store, executions, exec_id, _) = setup(1024);
        let a = store
            .upload(&exec_id, ArtifactMeta::new("a").with_type("log"), &b"1"[..])
            .await
            .unwrap();
        let b = store
            .upload(&exec_id, ArtifactMeta::new("b"), &b"2"[..])
            .await
            .unwrap();

        assert_eq!(store.list(&exec_id).len(), 2);
        store.delete(&a.id).unwrap();

        assert!(store.get(&a.id).unwrap_err().is_not_found());
        assert_eq!(executions.get(&exec_id).unwrap().artifacts, vec![b.id.clone()]);
        assert_eq!(store.list(&exec_id), vec![b]);
    }

    #[tokio::test]
    async fn test_artifacts_survive_execution_delete() {
        let (store, executions, exec_id, _) = setup(1024);
        let a = store
            .upload(&exec_id, ArtifactMeta::new("a"), &b"data"[..])
            .await
            .unwrap();

        executions.remove(&exec_id).unwrap();

        assert_eq!(store.get(&a.id).unwrap().size, 4);
        assert!(store.delete(&a.id).is_ok());
    }
}
