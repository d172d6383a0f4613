//! Shared application state for the HTTP layer.
//!
//! One `CoreState` lives behind an `Arc` for the life of the server. The
//! entity graph sits in a std `RwLock`: handlers take it inside
//! `spawn_blocking` and never hold it across an await.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::AppConfig;
use crate::db::{DurableStore, SqliteStore};
use crate::pipeline::extraction::{AzureDocumentIntelligence, DocumentExtractor, TesseractCli};
use crate::pipeline::llm::{ChatClient, ChatCompletionsClient};
use crate::pipeline::processor::DocumentProcessor;
use crate::store::EntityStore;

pub struct CoreState {
    store: RwLock<EntityStore>,
    processor: DocumentProcessor,
    llm: Option<Arc<dyn ChatClient>>,
    di_configured: bool,
    pub config: AppConfig,
}

impl CoreState {
    pub fn new(
        config: AppConfig,
        store: EntityStore,
        extractor: DocumentExtractor,
        llm: Option<Arc<dyn ChatClient>>,
    ) -> Self {
        let di_configured = extractor.has_intelligence();
        Self {
            store: RwLock::new(store),
            processor: DocumentProcessor::new(Arc::new(extractor)),
            llm,
            di_configured,
            config,
        }
    }

    /// Wire the real collaborators from configuration.
    ///
    /// Builds blocking HTTP clients, so call this outside the async runtime.
    /// A collaborator that fails to initialize is logged and left out.
    pub fn from_config(config: AppConfig) -> Self {
        let durable: Option<Box<dyn DurableStore>> = match &config.db_path {
            Some(path) => match SqliteStore::open(path) {
                Ok(store) => Some(Box::new(store)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Durable store unavailable");
                    None
                }
            },
            None => None,
        };
        let store = EntityStore::open(&config.upload_dir, durable, Some(config.settings_path()));

        let llm: Option<Arc<dyn ChatClient>> = match &config.llm {
            Some(cfg) => match ChatCompletionsClient::new(cfg) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!(error = %e, "LLM client initialization failed");
                    None
                }
            },
            None => None,
        };

        let mut extractor = DocumentExtractor::new()
            .with_ocr(Box::new(TesseractCli::new(&config.ocr.command)))
            .skip_pdf_ocr(config.ocr.skip_pdf);
        if let Some(di) = &config.di {
            match AzureDocumentIntelligence::new(di) {
                Ok(client) => extractor = extractor.with_intelligence(Box::new(client)),
                Err(e) => tracing::warn!(error = %e, "Document intelligence initialization failed"),
            }
        }
        if let Some(client) = &llm {
            extractor = extractor.with_llm(Arc::clone(client));
        }

        tracing::info!(
            llm = llm.is_some(),
            document_intelligence = extractor.has_intelligence(),
            durable = store.has_durable(),
            "Core state ready"
        );
        Self::new(config, store, extractor, llm)
    }

    pub fn read_store(&self) -> Result<RwLockReadGuard<'_, EntityStore>, CoreError> {
        self.store.read().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn write_store(&self) -> Result<RwLockWriteGuard<'_, EntityStore>, CoreError> {
        self.store.write().map_err(|_| CoreError::LockPoisoned)
    }

    /// The lock itself, for pipeline code that scopes its own guards.
    pub fn store_lock(&self) -> &RwLock<EntityStore> {
        &self.store
    }

    pub fn processor(&self) -> &DocumentProcessor {
        &self.processor
    }

    pub fn llm(&self) -> Result<&dyn ChatClient, CoreError> {
        self.llm.as_deref().ok_or(CoreError::LlmUnavailable)
    }

    pub fn llm_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub fn di_configured(&self) -> bool {
        self.di_configured
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("LLM is not configured")]
    LlmUnavailable,
}
