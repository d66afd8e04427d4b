use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cuelab_domain::DomainResult;
use cuelab_domain::document::EditDocument;
use cuelab_domain::error::DomainError;
use cuelab_domain::ports::BoxFuture;
use cuelab_domain::ports::store::DocumentRepository;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    store: Arc<RwLock<HashMap<String, EditDocument>>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentRepository for InMemoryDocumentRepository {
    fn save(&self, document: &EditDocument) -> BoxFuture<'_, DomainResult<()>> {
        let document = document.clone();
        let store = self.store.clone();
        Box::pin(async move {
            store.write().await.insert(document.id.clone(), document);
            Ok(())
        })
    }

    fn load(&self, document_id: &str) -> BoxFuture<'_, DomainResult<Option<EditDocument>>> {
        let document_id = document_id.to_string();
        let store = self.store.clone();
        Box::pin(async move { Ok(store.read().await.get(&document_id).cloned()) })
    }

    fn list_ids(&self) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let mut ids: Vec<String> = store.read().await.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        })
    }
}

/// One JSON file per document under `root`. Saves go through a temp file
/// and a rename so a crash mid-write never leaves a truncated document.
pub struct FileDocumentRepository {
    root: PathBuf,
}

impl FileDocumentRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, document_id: &str) -> PathBuf {
        self.root.join(format!("{document_id}.json"))
    }
}

fn storage_error(context: &str, path: &Path, err: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("{context} {}: {err}", path.display()))
}

impl DocumentRepository for FileDocumentRepository {
    fn save(&self, document: &EditDocument) -> BoxFuture<'_, DomainResult<()>> {
        let document = document.clone();
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|err| storage_error("failed to create", &self.root, err))?;
            let payload = serde_json::to_vec_pretty(&document)
                .map_err(|err| DomainError::Storage(format!("failed to encode document: {err}")))?;

            let path = self.document_path(&document.id);
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, payload)
                .await
                .map_err(|err| storage_error("failed to write", &tmp, err))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|err| storage_error("failed to rename", &tmp, err))?;
            debug!(document_id = %document.id, path = %path.display(), "saved document");
            Ok(())
        })
    }

    fn load(&self, document_id: &str) -> BoxFuture<'_, DomainResult<Option<EditDocument>>> {
        let path = self.document_path(document_id);
        Box::pin(async move {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(storage_error("failed to read", &path, err)),
            };
            let document: EditDocument = serde_json::from_slice(&bytes)
                .map_err(|err| storage_error("failed to decode", &path, err))?;
            Ok(Some(document))
        })
    }

    fn list_ids(&self) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        Box::pin(async move {
            let mut dir = match tokio::fs::read_dir(&self.root).await {
                Ok(dir) => dir,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(storage_error("failed to list", &self.root, err)),
            };
            let mut ids = Vec::new();
            while let Some(entry) = dir
                .next_entry()
                .await
                .map_err(|err| storage_error("failed to list", &self.root, err))?
            {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if let Some(id) = name.strip_suffix(".json") {
                    ids.push(id.to_string());
                }
            }
            ids.sort();
            Ok(ids)
        })
    }
}
