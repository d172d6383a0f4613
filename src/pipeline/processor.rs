//! Document ingest: detect → store → extract → match → attach.
//!
//! The extractor runs without holding the store lock; the store is locked
//! once to register the upload and once to apply the results, so readers
//! never observe a half-applied document.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use uuid::Uuid;

use crate::models::enums::{DocType, ProcessingMethod};
use crate::models::{DocItem, Document, GlDocLink};
use crate::pipeline::extraction::{DocumentExtractor, ExtractionOutput, OcrSummary, StepReport};
use crate::pipeline::import::{detect_format, sanitize_filename, ImportError};
use crate::pipeline::matching::{match_items, MatchConfig};
use crate::store::{DocumentUpdate, DuplicatePolicy, EntityStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Entity store lock poisoned")]
    LockPoisoned,
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Per-file result of an ingest or reprocess.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub success: bool,
    pub document_id: Uuid,
    pub filename: String,
    pub doc_type: DocType,
    pub processing_method: Option<ProcessingMethod>,
    pub items: Vec<DocItem>,
    pub links: Vec<GlDocLink>,
    pub approvals: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_data: Option<OcrSummary>,
    pub steps: Vec<StepReport>,
}

pub struct DocumentProcessor {
    extractor: Arc<DocumentExtractor>,
    match_config: MatchConfig,
}

impl DocumentProcessor {
    pub fn new(extractor: Arc<DocumentExtractor>) -> Self {
        Self {
            extractor,
            match_config: MatchConfig::default(),
        }
    }

    /// Validate, store, extract and link one uploaded document.
    ///
    /// Validation and duplicate errors are returned before any extraction
    /// work. Extraction itself never fails the ingest: a document whose
    /// steps all failed is kept with no items.
    pub fn ingest(
        &self,
        store: &RwLock<EntityStore>,
        upload: Upload,
        policy: DuplicatePolicy,
    ) -> Result<IngestOutcome, ProcessingError> {
        let filename = sanitize_filename(&upload.filename);
        let format = detect_format(&upload.bytes, upload.declared_mime.as_deref(), &filename)?;

        let document = store
            .write()
            .map_err(|_| ProcessingError::LockPoisoned)?
            .add_document(&upload.bytes, &format.mime_type, &filename, policy)?;
        tracing::info!(
            document_id = %document.id,
            filename = %filename,
            mime = %format.mime_type,
            category = format.category.as_str(),
            "Document stored"
        );

        self.extract_and_link(store, &document, &upload.bytes)
    }

    /// Re-run extraction and matching for a stored document, replacing its
    /// previous items and links.
    pub fn reprocess(
        &self,
        store: &RwLock<EntityStore>,
        document_id: &Uuid,
    ) -> Result<IngestOutcome, ProcessingError> {
        let (document, bytes) = {
            let mut guard = store.write().map_err(|_| ProcessingError::LockPoisoned)?;
            let document = guard
                .document(document_id)
                .cloned()
                .ok_or(StoreError::DocumentNotFound(*document_id))?;
            let bytes = guard.document_bytes(document_id)?;
            guard.reset_document_items(document_id)?;
            (document, bytes)
        };
        tracing::info!(document_id = %document_id, "Reprocessing document");

        self.extract_and_link(store, &document, &bytes)
    }

    fn extract_and_link(
        &self,
        store: &RwLock<EntityStore>,
        document: &Document,
        bytes: &[u8],
    ) -> Result<IngestOutcome, ProcessingError> {
        let output = self
            .extractor
            .extract(bytes, &document.mime_type, &document.filename);

        let mut guard = store.write().map_err(|_| ProcessingError::LockPoisoned)?;
        apply_extraction(&mut guard, document, output, &self.match_config)
    }
}

/// Record extraction results, match items against the GL and attach them.
pub fn apply_extraction(
    store: &mut EntityStore,
    document: &Document,
    output: ExtractionOutput,
    match_config: &MatchConfig,
) -> Result<IngestOutcome, ProcessingError> {
    let ExtractionOutput {
        text,
        items,
        approvals,
        doc_type,
        processing_method,
        ocr,
        steps,
    } = output;

    let approvals_count = approvals.len();
    store.record_extraction(
        &document.id,
        DocumentUpdate {
            text_content: text,
            doc_type: Some(doc_type),
            approvals,
            processing_method,
        },
    )?;

    let doc_items: Vec<DocItem> = items
        .into_iter()
        .filter(|i| i.has_fields())
        .map(|i| i.into_doc_item(document.id))
        .collect();
    let candidates = match_items(&doc_items, store.gl_entries(), match_config);
    let links = store.attach(doc_items.clone(), candidates);

    tracing::info!(
        document_id = %document.id,
        doc_type = doc_type.as_str(),
        items = doc_items.len(),
        links = links.len(),
        approvals = approvals_count,
        "Document processed"
    );

    Ok(IngestOutcome {
        success: true,
        document_id: document.id,
        filename: document.filename.clone(),
        doc_type,
        processing_method,
        items: doc_items,
        links,
        approvals: approvals_count,
        ocr_data: ocr,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewGlEntry;
    use crate::pipeline::extraction::{ExtractionStep, MockOcrEngine};
    use chrono::NaiveDate;

    fn setup() -> (tempfile::TempDir, RwLock<EntityStore>) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EntityStore::new(dir.path());
        store.add_gl_entries(vec![
            NewGlEntry {
                vendor: Some("Staples Business".into()),
                date: NaiveDate::from_ymd_opt(2024, 3, 15),
                amount: 1234.56,
                ..Default::default()
            },
            NewGlEntry {
                vendor: Some("Hilton".into()),
                date: NaiveDate::from_ymd_opt(2024, 2, 1),
                amount: 400.0,
                ..Default::default()
            },
        ]);
        (dir, RwLock::new(store))
    }

    fn text_processor() -> DocumentProcessor {
        DocumentProcessor::new(Arc::new(DocumentExtractor::new().with_steps(vec![
            ExtractionStep::PlainText,
            ExtractionStep::TextHeuristics,
        ])))
    }

    fn upload(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: name.into(),
            declared_mime: None,
            bytes: bytes.to_vec(),
        }
    }

    const RECEIPT: &[u8] = b"STAPLES\nStore 1142\n03/15/2024\nPaper 1234.56\nTOTAL $1,234.56\n";

    #[test]
    fn ingest_links_receipt_to_gl() {
        let (_dir, store) = setup();
        let outcome = text_processor()
            .ingest(&store, upload("receipt.txt", RECEIPT), DuplicatePolicy::Reject)
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.links.len(), 1);

        let guard = store.read().unwrap();
        let staples = guard
            .gl_entries()
            .iter()
            .find(|e| e.amount == 1234.56)
            .unwrap();
        assert_eq!(outcome.links[0].gl_entry_id, staples.id);
        assert_eq!(staples.attachments_count, 1);
        assert!(staples.has_receipt);
        assert_eq!(
            guard.document(&outcome.document_id).unwrap().processing_method,
            Some(ProcessingMethod::PlainText)
        );
    }

    #[test]
    fn duplicate_rejected_before_extraction() {
        let (_dir, store) = setup();
        let processor = text_processor();
        processor
            .ingest(&store, upload("receipt.txt", RECEIPT), DuplicatePolicy::Reject)
            .unwrap();

        let err = processor
            .ingest(&store, upload("copy.txt", RECEIPT), DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Store(StoreError::DuplicateExact { .. })));

        let err = processor
            .ingest(&store, upload("receipt.txt", b"TOTAL $5.00\n"), DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Store(StoreError::DuplicateName { .. })));
        assert_eq!(store.read().unwrap().documents().len(), 1);
    }

    #[test]
    fn unsupported_bytes_rejected() {
        let (_dir, store) = setup();
        let err = text_processor()
            .ingest(&store, upload("blob.bin", &[0u8, 159, 146, 150, 0, 1]), DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Import(ImportError::UnsupportedFormat(_))));
        assert!(store.read().unwrap().documents().is_empty());
    }

    #[test]
    fn failed_extraction_keeps_document_without_items() {
        let (_dir, store) = setup();
        let processor = DocumentProcessor::new(Arc::new(
            DocumentExtractor::new()
                .with_ocr(Box::new(MockOcrEngine::failing()))
                .with_steps(vec![ExtractionStep::Ocr]),
        ));
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let outcome = processor
            .ingest(&store, upload("scan.png", &png), DuplicatePolicy::Reject)
            .unwrap();

        assert!(outcome.items.is_empty());
        assert!(outcome.links.is_empty());
        assert_eq!(outcome.doc_type, DocType::Unknown);
        assert_eq!(store.read().unwrap().documents().len(), 1);
    }

    #[test]
    fn reprocess_replaces_items() {
        let (_dir, store) = setup();
        let processor = text_processor();
        let first = processor
            .ingest(&store, upload("receipt.txt", RECEIPT), DuplicatePolicy::Reject)
            .unwrap();

        let again = processor.reprocess(&store, &first.document_id).unwrap();

        assert_eq!(again.items.len(), 1);
        assert_ne!(again.items[0].id, first.items[0].id);
        let guard = store.read().unwrap();
        assert_eq!(guard.doc_items().len(), 1);
        assert_eq!(guard.links().len(), 1);
        assert_eq!(
            guard.gl_entries().iter().map(|e| e.attachments_count).sum::<u32>(),
            1
        );
    }

    #[test]
    fn reprocess_unknown_document() {
        let (_dir, store) = setup();
        let err = text_processor().reprocess(&store, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ProcessingError::Store(StoreError::DocumentNotFound(_))));
    }
}
