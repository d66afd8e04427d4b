use std::sync::Arc;

use cuelab_domain::editor::EditorManager;
use cuelab_domain::ports::store::DocumentRepository;
use cuelab_infra::config::AppConfig;
use cuelab_infra::repositories::{FileDocumentRepository, InMemoryDocumentRepository};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub editor: Arc<EditorManager>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentRepository> = match config.data_backend.as_str() {
            "file" => Arc::new(FileDocumentRepository::new(config.store_path.clone())),
            "memory" => Arc::new(InMemoryDocumentRepository::new()),
            other => anyhow::bail!("unknown data backend: {other}"),
        };
        let editor = Arc::new(EditorManager::new(store, config.editor_config()));
        Ok(Self { config, editor })
    }

    #[allow(dead_code)]
    pub fn with_store(config: AppConfig, store: Arc<dyn DocumentRepository>) -> Self {
        let editor = Arc::new(EditorManager::new(store, config.editor_config()));
        Self { config, editor }
    }
}
