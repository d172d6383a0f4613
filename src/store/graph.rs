use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use super::{DuplicatePolicy, StoreError, UploadDir};
use crate::config::AppSettings;
use crate::db::{DatabaseError, DurableStore, Snapshot};
use crate::models::enums::{ClearScope, Decision, DocType, MatchQuality, ProcessingMethod};
use crate::models::*;
use crate::pipeline::import::content_hash;
use crate::pipeline::matching::{doc_summary, flags_unallowable};
use crate::pipeline::review::{AttachmentIndex, AttachmentSummary, OcrFields, RowAttachments};

const POLICY_KEY: &str = "policy";

/// Extraction results applied to an existing document.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub text_content: Option<String>,
    pub doc_type: Option<DocType>,
    pub approvals: Vec<Approval>,
    pub processing_method: Option<ProcessingMethod>,
}

/// The in-process graph: GL entries, documents, items, links, approvals.
///
/// Memory is authoritative. Every mutation is mirrored to the durable
/// collaborator when present; failures there are logged and ignored.
/// Derived GL fields are recomputed at the end of each mutation.
pub struct EntityStore {
    gl_entries: Vec<GlEntry>,
    documents: Vec<Document>,
    doc_items: Vec<DocItem>,
    links: Vec<GlDocLink>,
    uploads: Vec<UploadRecord>,
    policy: Policy,
    durable: Option<Box<dyn DurableStore>>,
    settings_path: Option<PathBuf>,
    docs_dir: UploadDir,
    gl_dir: UploadDir,
}

impl EntityStore {
    /// Empty, memory-only store with uploads under `upload_root/{gl,docs}`.
    pub fn new(upload_root: &Path) -> Self {
        Self {
            gl_entries: Vec::new(),
            documents: Vec::new(),
            doc_items: Vec::new(),
            links: Vec::new(),
            uploads: Vec::new(),
            policy: Policy::default(),
            durable: None,
            settings_path: None,
            docs_dir: UploadDir::new(upload_root.join("docs")),
            gl_dir: UploadDir::new(upload_root.join("gl")),
        }
    }

    /// Rehydrate from the durable store. When it is absent or unreadable the
    /// graph starts empty and configuration comes from the settings file.
    pub fn open(
        upload_root: &Path,
        durable: Option<Box<dyn DurableStore>>,
        settings_path: Option<PathBuf>,
    ) -> Self {
        let mut store = Self::new(upload_root);
        store.settings_path = settings_path;

        if let Some(durable) = durable {
            match durable.load_snapshot() {
                Ok(snapshot) => {
                    match durable.get_config(POLICY_KEY) {
                        Ok(Some(value)) => match serde_json::from_value(value) {
                            Ok(policy) => store.policy = policy,
                            Err(e) => tracing::warn!(error = %e, "Stored policy is invalid, using defaults"),
                        },
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "Could not read stored policy"),
                    }
                    store.rehydrate(snapshot);
                    store.durable = Some(durable);
                    return store;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Durable store unavailable, starting with an empty graph");
                }
            }
        }

        if let Some(path) = &store.settings_path {
            if let Some(policy) = AppSettings::load(path).policy {
                store.policy = policy;
            }
        }
        store
    }

    fn rehydrate(&mut self, snapshot: Snapshot) {
        self.gl_entries = snapshot.gl_entries;
        self.documents = snapshot.documents;
        self.doc_items = snapshot.doc_items;
        self.links = snapshot.links;
        self.uploads = snapshot.uploads;
        self.recompute_derived_flags();
        tracing::info!(
            gl_entries = self.gl_entries.len(),
            documents = self.documents.len(),
            doc_items = self.doc_items.len(),
            links = self.links.len(),
            "Entity graph rehydrated"
        );
    }

    fn persist(
        &self,
        operation: &str,
        write: impl FnOnce(&dyn DurableStore) -> Result<(), DatabaseError>,
    ) {
        if let Some(durable) = self.durable.as_deref() {
            if let Err(e) = write(durable) {
                tracing::warn!(operation, error = %e, "Durable write failed, keeping in-memory state");
            }
        }
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    // ── GL entries ──────────────────────────────────────

    /// Assign ids and append. Returns the new ids in input order.
    pub fn add_gl_entries(&mut self, rows: Vec<NewGlEntry>) -> Vec<Uuid> {
        let now = Utc::now();
        let entries: Vec<GlEntry> = rows
            .into_iter()
            .map(|row| GlEntry::from_new(Uuid::new_v4(), row, now))
            .collect();
        let ids = entries.iter().map(|e| e.id).collect();

        self.persist("insert_gl_entries", |d| d.insert_gl_entries(&entries));
        tracing::info!(inserted = entries.len(), "GL entries added");
        self.gl_entries.extend(entries);
        self.recompute_derived_flags();
        ids
    }

    pub fn gl_entries(&self) -> &[GlEntry] {
        &self.gl_entries
    }

    pub fn gl_entry(&self, id: &Uuid) -> Option<&GlEntry> {
        self.gl_entries.iter().find(|e| e.id == *id)
    }

    /// Date descending (undated last), then id descending.
    pub fn gl_page(&self, limit: usize, offset: usize) -> Vec<GlEntry> {
        let mut sorted: Vec<&GlEntry> = self.gl_entries.iter().collect();
        sorted.sort_by(|a, b| match (a.date, b.date) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| b.id.cmp(&a.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        sorted.into_iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn delete_gl_entry(&mut self, id: &Uuid) -> Result<(), StoreError> {
        let before = self.gl_entries.len();
        self.gl_entries.retain(|e| e.id != *id);
        if self.gl_entries.len() == before {
            return Err(StoreError::GlEntryNotFound(*id));
        }
        self.links.retain(|l| l.gl_entry_id != *id);
        self.persist("delete_gl_entry", |d| d.delete_gl_entry(id));
        self.recompute_derived_flags();
        Ok(())
    }

    /// Record a document directly against a GL entry, without an item.
    pub fn attach_document_to_gl(
        &mut self,
        gl_entry_id: &Uuid,
        document_id: &Uuid,
    ) -> Result<GlEntry, StoreError> {
        let doc = self
            .document(document_id)
            .ok_or(StoreError::DocumentNotFound(*document_id))?;
        let attachment = DocAttachment {
            document_id: doc.id,
            filename: doc.filename.clone(),
            mime_type: doc.mime_type.clone(),
        };

        let entry = self
            .gl_entries
            .iter_mut()
            .find(|e| e.id == *gl_entry_id)
            .ok_or(StoreError::GlEntryNotFound(*gl_entry_id))?;
        if !entry
            .attached_documents
            .iter()
            .any(|a| a.document_id == attachment.document_id)
        {
            entry.attached_documents.push(attachment);
        }
        let attachments = entry.attached_documents.clone();

        self.persist("update_gl_attachments", |d| {
            d.update_gl_attachments(gl_entry_id, &attachments)
        });
        self.recompute_derived_flags();
        self.gl_entry(gl_entry_id)
            .cloned()
            .ok_or(StoreError::GlEntryNotFound(*gl_entry_id))
    }

    // ── GL spreadsheet uploads ──────────────────────────

    /// Reject a GL spreadsheet already seen by content, or by name unless
    /// duplicates are allowed.
    pub fn check_gl_upload(
        &self,
        filename: &str,
        file_hash: &str,
        allow_duplicate: bool,
    ) -> Result<(), StoreError> {
        if allow_duplicate {
            return Ok(());
        }
        if let Some(existing) = self.uploads.iter().find(|u| u.file_hash == file_hash) {
            return Err(StoreError::DuplicateExact {
                existing_id: existing.id,
                filename: existing.filename.clone(),
            });
        }
        if let Some(existing) = self.uploads.iter().find(|u| u.filename == filename) {
            return Err(StoreError::DuplicateName {
                existing_id: existing.id,
                filename: existing.filename.clone(),
            });
        }
        Ok(())
    }

    pub fn record_gl_upload(
        &mut self,
        filename: &str,
        bytes: &[u8],
        row_count: usize,
    ) -> UploadRecord {
        let record = UploadRecord {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            file_hash: content_hash(bytes),
            size_bytes: bytes.len() as u64,
            uploaded_at: Utc::now(),
            row_count,
        };
        if let Err(e) = self.gl_dir.save(&record.id, filename, bytes) {
            tracing::warn!(filename = %filename, error = %e, "Could not store GL upload");
        }
        self.persist("insert_upload", |d| d.insert_upload(&record));
        self.uploads.push(record.clone());
        record
    }

    pub fn uploads(&self) -> &[UploadRecord] {
        &self.uploads
    }

    // ── Documents ───────────────────────────────────────

    /// Store an uploaded document, applying the duplicate policy.
    ///
    /// Identical bytes are always rejected. A filename collision needs
    /// [`DuplicatePolicy::Replace`], which removes the old document and
    /// everything derived from it once the new file is on disk.
    pub fn add_document(
        &mut self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
        policy: DuplicatePolicy,
    ) -> Result<Document, StoreError> {
        let file_hash = content_hash(bytes);
        if let Some(existing) = self.documents.iter().find(|d| d.file_hash == file_hash) {
            return Err(StoreError::DuplicateExact {
                existing_id: existing.id,
                filename: existing.filename.clone(),
            });
        }
        let replaced = self
            .documents
            .iter()
            .find(|d| d.filename == filename)
            .map(|d| d.id);
        if let (Some(existing_id), DuplicatePolicy::Reject) = (replaced, policy) {
            return Err(StoreError::DuplicateName {
                existing_id,
                filename: filename.to_string(),
            });
        }

        let id = Uuid::new_v4();
        let file_url = self.docs_dir.save(&id, filename, bytes)?;
        if let Some(existing_id) = replaced {
            tracing::info!(document_id = %existing_id, filename = %filename, "Replacing document");
            self.remove_document(&existing_id)?;
        }
        let doc = Document {
            id,
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            text_content: None,
            created_at: Utc::now(),
            doc_type: DocType::Unknown,
            approvals: Vec::new(),
            file_hash,
            file_url: Some(file_url),
            size_bytes: bytes.len() as u64,
            processing_method: None,
        };

        self.persist("upsert_document", |d| d.upsert_document(&doc));
        self.documents.push(doc.clone());
        Ok(doc)
    }

    pub fn record_extraction(
        &mut self,
        document_id: &Uuid,
        update: DocumentUpdate,
    ) -> Result<Document, StoreError> {
        let doc = self
            .documents
            .iter_mut()
            .find(|d| d.id == *document_id)
            .ok_or(StoreError::DocumentNotFound(*document_id))?;
        doc.text_content = update.text_content;
        doc.doc_type = update.doc_type.unwrap_or(DocType::Unknown);
        doc.approvals = update.approvals;
        doc.processing_method = update.processing_method;
        let doc = doc.clone();

        self.persist("upsert_document", |d| d.upsert_document(&doc));
        self.recompute_derived_flags();
        Ok(doc)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, id: &Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == *id)
    }

    pub fn document_bytes(&self, id: &Uuid) -> Result<Vec<u8>, StoreError> {
        let doc = self.document(id).ok_or(StoreError::DocumentNotFound(*id))?;
        let relative = doc.file_url.as_deref().ok_or(StoreError::FileMissing(*id))?;
        self.docs_dir.read(relative).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::FileMissing(*id),
            _ => StoreError::Io(e),
        })
    }

    /// Remove a document with its items, links, approvals, GL attachments
    /// and stored file.
    pub fn remove_document(&mut self, id: &Uuid) -> Result<Document, StoreError> {
        let pos = self
            .documents
            .iter()
            .position(|d| d.id == *id)
            .ok_or(StoreError::DocumentNotFound(*id))?;
        let doc = self.documents.remove(pos);

        self.drop_items_of(id);

        let mut touched: Vec<(Uuid, Vec<DocAttachment>)> = Vec::new();
        for entry in &mut self.gl_entries {
            let before = entry.attached_documents.len();
            entry.attached_documents.retain(|a| a.document_id != *id);
            if entry.attached_documents.len() != before {
                touched.push((entry.id, entry.attached_documents.clone()));
            }
        }
        for (gl_id, attachments) in &touched {
            self.persist("update_gl_attachments", |d| {
                d.update_gl_attachments(gl_id, attachments)
            });
        }

        if let Err(e) = self.docs_dir.remove(id) {
            tracing::warn!(document_id = %id, error = %e, "Could not remove stored file");
        }
        self.persist("delete_document", |d| d.delete_document(id));
        self.recompute_derived_flags();
        Ok(doc)
    }

    /// Drop a document's items and their links, keeping the document.
    /// Used before re-extraction.
    pub fn reset_document_items(&mut self, document_id: &Uuid) -> Result<(), StoreError> {
        if self.document(document_id).is_none() {
            return Err(StoreError::DocumentNotFound(*document_id));
        }
        self.drop_items_of(document_id);
        self.persist("delete_doc_items", |d| d.delete_doc_items_for(document_id));
        self.recompute_derived_flags();
        Ok(())
    }

    fn drop_items_of(&mut self, document_id: &Uuid) {
        let item_ids: HashSet<Uuid> = self
            .doc_items
            .iter()
            .filter(|i| i.document_id == *document_id)
            .map(|i| i.id)
            .collect();
        self.doc_items.retain(|i| i.document_id != *document_id);
        self.links.retain(|l| !item_ids.contains(&l.document_item_id));
    }

    // ── Items and links ─────────────────────────────────

    /// Persist new items and links. Links whose item or GL entry does not
    /// exist are dropped; an existing `(item, gl)` pair is replaced.
    /// Returns the links kept.
    pub fn attach(&mut self, items: Vec<DocItem>, links: Vec<GlDocLink>) -> Vec<GlDocLink> {
        let gl_ids: HashSet<Uuid> = self.gl_entries.iter().map(|e| e.id).collect();
        let item_ids: HashSet<Uuid> = self
            .doc_items
            .iter()
            .chain(items.iter())
            .map(|i| i.id)
            .collect();

        let kept: Vec<GlDocLink> = links
            .into_iter()
            .filter(|l| item_ids.contains(&l.document_item_id) && gl_ids.contains(&l.gl_entry_id))
            .collect();

        self.persist("insert_doc_items", |d| d.insert_doc_items(&items));
        self.persist("upsert_links", |d| d.upsert_links(&kept));

        self.doc_items.extend(items);
        for link in &kept {
            self.upsert_link(link.clone());
        }
        self.recompute_derived_flags();
        kept
    }

    fn upsert_link(&mut self, link: GlDocLink) {
        match self.links.iter_mut().find(|l| {
            l.document_item_id == link.document_item_id && l.gl_entry_id == link.gl_entry_id
        }) {
            Some(existing) => *existing = link,
            None => self.links.push(link),
        }
    }

    /// User-asserted link; carries full score.
    pub fn link(
        &mut self,
        document_item_id: &Uuid,
        gl_entry_id: &Uuid,
    ) -> Result<GlDocLink, StoreError> {
        let item = self
            .doc_items
            .iter()
            .find(|i| i.id == *document_item_id)
            .ok_or(StoreError::DocItemNotFound(*document_item_id))?;
        if self.gl_entry(gl_entry_id).is_none() {
            return Err(StoreError::GlEntryNotFound(*gl_entry_id));
        }

        let link = GlDocLink {
            document_item_id: item.id,
            gl_entry_id: *gl_entry_id,
            score: 1.0,
            doc_summary: doc_summary(item),
            doc_flag_unallowable: flags_unallowable(item),
            discrepancies: Vec::new(),
        };
        self.persist("upsert_links", |d| d.upsert_links(std::slice::from_ref(&link)));
        self.upsert_link(link.clone());
        self.recompute_derived_flags();
        Ok(link)
    }

    /// Returns whether a link was removed.
    pub fn unlink(&mut self, document_item_id: &Uuid, gl_entry_id: &Uuid) -> bool {
        let before = self.links.len();
        self.links.retain(|l| {
            !(l.document_item_id == *document_item_id && l.gl_entry_id == *gl_entry_id)
        });
        let removed = self.links.len() != before;
        if removed {
            self.persist("delete_link", |d| d.delete_link(document_item_id, gl_entry_id));
            self.recompute_derived_flags();
        }
        removed
    }

    pub fn doc_items(&self) -> &[DocItem] {
        &self.doc_items
    }

    pub fn items_for_document(&self, document_id: &Uuid) -> Vec<&DocItem> {
        self.doc_items
            .iter()
            .filter(|i| i.document_id == *document_id)
            .collect()
    }

    pub fn links(&self) -> &[GlDocLink] {
        &self.links
    }

    pub fn links_for_document(&self, document_id: &Uuid) -> Vec<&GlDocLink> {
        let item_ids: HashSet<Uuid> = self
            .items_for_document(document_id)
            .into_iter()
            .map(|i| i.id)
            .collect();
        self.links
            .iter()
            .filter(|l| item_ids.contains(&l.document_item_id))
            .collect()
    }

    // ── Partition clears ────────────────────────────────

    pub fn clear(&mut self, scope: ClearScope) {
        let clear_gl = matches!(scope, ClearScope::Gl | ClearScope::All);
        let clear_docs = matches!(scope, ClearScope::Docs | ClearScope::All);

        if clear_gl {
            self.gl_entries.clear();
            self.uploads.clear();
            self.links.clear();
            if let Err(e) = self.gl_dir.clear() {
                tracing::warn!(error = %e, "Could not clear GL upload directory");
            }
        }
        if clear_docs {
            self.documents.clear();
            self.doc_items.clear();
            self.links.clear();
            for entry in &mut self.gl_entries {
                entry.attached_documents.clear();
            }
            if let Err(e) = self.docs_dir.clear() {
                tracing::warn!(error = %e, "Could not clear document upload directory");
            }
        }

        self.persist("clear", |d| d.clear(scope));
        self.recompute_derived_flags();
        tracing::info!(scope = scope.as_str(), "Store partition cleared");
    }

    // ── Derived flags ───────────────────────────────────

    /// Recompute every GL entry's attachment, approval, summary and match
    /// quality fields from the current links and direct attachments.
    pub fn recompute_derived_flags(&mut self) {
        let item_doc: HashMap<Uuid, Uuid> = self
            .doc_items
            .iter()
            .map(|i| (i.id, i.document_id))
            .collect();
        let approvals_by_doc: HashMap<Uuid, u32> = self
            .documents
            .iter()
            .map(|d| {
                let approved = d
                    .approvals
                    .iter()
                    .filter(|a| a.decision == Decision::Approved)
                    .count() as u32;
                (d.id, approved)
            })
            .collect();

        let mut links_by_gl: HashMap<Uuid, Vec<&GlDocLink>> = HashMap::new();
        for link in &self.links {
            links_by_gl.entry(link.gl_entry_id).or_default().push(link);
        }

        for entry in &mut self.gl_entries {
            let links = links_by_gl.get(&entry.id).map(Vec::as_slice).unwrap_or(&[]);

            entry.attachments_count = (links.len() + entry.attached_documents.len()) as u32;
            entry.has_receipt = entry.attachments_count > 0;

            let docs: HashSet<Uuid> = links
                .iter()
                .filter_map(|l| item_doc.get(&l.document_item_id).copied())
                .chain(entry.attached_documents.iter().map(|a| a.document_id))
                .collect();
            entry.approvals_count = docs
                .iter()
                .filter_map(|id| approvals_by_doc.get(id))
                .sum();
            entry.has_approval = entry.approvals_count > 0;

            let summaries: Vec<&str> = links
                .iter()
                .filter_map(|l| l.doc_summary.as_deref())
                .collect();
            entry.doc_summary = (!summaries.is_empty()).then(|| summaries.join(" || "));
            entry.doc_flag_unallowable = links.iter().any(|l| l.doc_flag_unallowable);

            entry.document_match_quality = links
                .iter()
                .map(|l| l.score)
                .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
                .map(|best| MatchQuality::from_score(best * 100.0));
        }
    }

    // ── Review support ──────────────────────────────────

    /// Owned snapshot of linked evidence for the given GL rows, strongest
    /// links first.
    pub fn attachment_index(&self, gl_entry_ids: impl IntoIterator<Item = Uuid>) -> AttachmentIndex {
        let mut index = AttachmentIndex::new();
        for gl_id in gl_entry_ids {
            let Some(entry) = self.gl_entry(&gl_id) else {
                continue;
            };

            let mut links: Vec<&GlDocLink> =
                self.links.iter().filter(|l| l.gl_entry_id == gl_id).collect();
            links.sort_by(|a, b| b.score.total_cmp(&a.score));

            let items: Vec<&DocItem> = links
                .iter()
                .filter_map(|l| self.doc_items.iter().find(|i| i.id == l.document_item_id))
                .collect();

            let has_image_or_pdf = items
                .iter()
                .map(|i| i.document_id)
                .chain(entry.attached_documents.iter().map(|a| a.document_id))
                .filter_map(|id| self.document(&id))
                .any(Document::is_image_or_pdf);

            let summaries = items
                .iter()
                .map(|item| AttachmentSummary {
                    document_item_id: item.id,
                    document_id: item.document_id,
                    processing_method: item
                        .details
                        .processing_method
                        .unwrap_or(ProcessingMethod::None),
                    ocr: OcrFields {
                        amount: item.amount,
                        date: item.date,
                        vendor: item.vendor.clone(),
                        confidence: item.details.confidence,
                    },
                    ocr_full: item.text_excerpt.clone(),
                })
                .collect();

            index.insert(
                gl_id,
                RowAttachments {
                    summaries,
                    has_image_or_pdf,
                },
            );
        }
        index
    }

    // ── Configuration ───────────────────────────────────

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Replace the policy and persist it to the durable store, or to the
    /// settings file when there is none.
    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;

        if self.durable.is_some() {
            match serde_json::to_value(&self.policy) {
                Ok(value) => self.persist("put_config", |d| d.put_config(POLICY_KEY, &value)),
                Err(e) => tracing::warn!(error = %e, "Could not serialize policy"),
            }
        } else if let Some(path) = &self.settings_path {
            let mut settings = AppSettings::load(path);
            settings.policy = Some(self.policy.clone());
            if let Err(e) = settings.save(path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not save settings");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::enums::ItemKind;
    use chrono::NaiveDate;

    fn store() -> (tempfile::TempDir, EntityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::new(dir.path());
        (dir, store)
    }

    fn gl(amount: f64, date: Option<(i32, u32, u32)>) -> NewGlEntry {
        NewGlEntry {
            amount,
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            vendor: Some("Staples".into()),
            ..Default::default()
        }
    }

    fn item(document_id: Uuid, desc: &str) -> DocItem {
        DocItem {
            id: Uuid::new_v4(),
            document_id,
            kind: Some(ItemKind::Receipt),
            vendor: Some("Staples".into()),
            date: NaiveDate::from_ymd_opt(2024, 3, 15),
            amount: Some(50.0),
            currency: None,
            details: ItemDetails {
                lines: vec![LineItem {
                    desc: Some(desc.into()),
                    ..Default::default()
                }],
                confidence: Some(0.9),
                processing_method: Some(ProcessingMethod::Tesseract),
            },
            text_excerpt: Some("STAPLES 50.00".into()),
        }
    }

    fn link(item: &DocItem, gl_id: Uuid, score: f64) -> GlDocLink {
        GlDocLink {
            document_item_id: item.id,
            gl_entry_id: gl_id,
            score,
            doc_summary: doc_summary(item),
            doc_flag_unallowable: flags_unallowable(item),
            discrepancies: Vec::new(),
        }
    }

    fn assert_flags_consistent(store: &EntityStore) {
        for entry in store.gl_entries() {
            let links = store.links().iter().filter(|l| l.gl_entry_id == entry.id).count();
            assert_eq!(
                entry.attachments_count as usize,
                links + entry.attached_documents.len()
            );
            assert_eq!(entry.has_receipt, entry.attachments_count > 0);
        }
    }

    #[test]
    fn duplicate_exact_and_name() {
        let (_dir, mut store) = store();
        let first = store
            .add_document(b"receipt-1", "image/jpeg", "r.jpg", DuplicatePolicy::Reject)
            .unwrap();

        let err = store
            .add_document(b"receipt-1", "image/jpeg", "other.jpg", DuplicatePolicy::Replace)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateExact { existing_id, .. } if existing_id == first.id));

        let err = store
            .add_document(b"receipt-2", "image/jpeg", "r.jpg", DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName { .. }));
        assert_eq!(store.documents().len(), 1);
    }

    #[test]
    fn replace_removes_derived_state() {
        let (_dir, mut store) = store();
        let ids = store.add_gl_entries(vec![gl(50.0, Some((2024, 3, 15)))]);
        let old = store
            .add_document(b"v1", "image/png", "r.png", DuplicatePolicy::Reject)
            .unwrap();
        let old_item = item(old.id, "Paper");
        let old_link = link(&old_item, ids[0], 0.9);
        store.attach(vec![old_item.clone()], vec![old_link]);
        store
            .record_extraction(
                &old.id,
                DocumentUpdate {
                    approvals: vec![Approval {
                        approver: Some("Jane Doe".into()),
                        title: None,
                        date: None,
                        decision: Decision::Approved,
                        comments: None,
                        target_type: None,
                        summary: None,
                        confidence: 0.5,
                    }],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.gl_entry(&ids[0]).unwrap().approvals_count, 1);

        let new = store
            .add_document(b"v2", "image/png", "r.png", DuplicatePolicy::Replace)
            .unwrap();

        assert!(store.document(&old.id).is_none());
        assert!(store.document(&new.id).is_some());
        assert!(store.doc_items().iter().all(|i| i.id != old_item.id));
        assert!(store.links().is_empty());
        let entry = store.gl_entry(&ids[0]).unwrap();
        assert_eq!(entry.attachments_count, 0);
        assert_eq!(entry.approvals_count, 0);
        assert!(!entry.has_receipt);
        assert!(store.document_bytes(&old.id).is_err());
        assert_eq!(store.document_bytes(&new.id).unwrap(), b"v2");
    }

    #[test]
    fn failed_replace_keeps_old_document() {
        let (dir, mut store) = store();
        let old = store
            .add_document(b"v1", "image/png", "r.png", DuplicatePolicy::Reject)
            .unwrap();
        let docs_root = dir.path().join("docs");
        std::fs::remove_dir_all(&docs_root).unwrap();
        std::fs::write(&docs_root, b"not a directory").unwrap();

        let err = store
            .add_document(b"v2", "image/png", "r.png", DuplicatePolicy::Replace)
            .unwrap_err();

        assert!(!matches!(err, StoreError::DuplicateName { .. }));
        assert_eq!(store.documents().len(), 1);
        assert!(store.document(&old.id).is_some());
    }

    #[test]
    fn derived_flags_track_links_and_attachments() {
        let (_dir, mut store) = store();
        let ids = store.add_gl_entries(vec![gl(50.0, None), gl(60.0, None)]);
        let doc = store
            .add_document(b"pdf", "application/pdf", "inv.pdf", DuplicatePolicy::Reject)
            .unwrap();
        let wine = item(doc.id, "Bottle of wine");
        let paper = item(doc.id, "Paper");

        store.attach(
            vec![wine.clone(), paper.clone()],
            vec![link(&wine, ids[0], 0.72), link(&paper, ids[0], 0.9)],
        );
        assert_flags_consistent(&store);
        let entry = store.gl_entry(&ids[0]).unwrap();
        assert_eq!(entry.attachments_count, 2);
        assert!(entry.doc_flag_unallowable);
        assert_eq!(entry.document_match_quality, Some(MatchQuality::High));
        assert!(entry.doc_summary.as_deref().unwrap().contains(" || "));

        assert!(store.unlink(&paper.id, &ids[0]));
        assert!(!store.unlink(&paper.id, &ids[0]));
        assert_eq!(
            store.gl_entry(&ids[0]).unwrap().document_match_quality,
            Some(MatchQuality::Medium)
        );

        store.attach_document_to_gl(&ids[1], &doc.id).unwrap();
        store.attach_document_to_gl(&ids[1], &doc.id).unwrap();
        store.link(&paper.id, &ids[1]).unwrap();
        assert_flags_consistent(&store);
        assert_eq!(store.gl_entry(&ids[1]).unwrap().attachments_count, 2);

        store.remove_document(&doc.id).unwrap();
        assert_flags_consistent(&store);
        assert!(store.gl_entries().iter().all(|e| e.attachments_count == 0));
    }

    #[test]
    fn dangling_links_are_dropped() {
        let (_dir, mut store) = store();
        let ids = store.add_gl_entries(vec![gl(50.0, None)]);
        let doc = store
            .add_document(b"x", "image/png", "x.png", DuplicatePolicy::Reject)
            .unwrap();
        let it = item(doc.id, "Paper");
        let kept = store.attach(
            vec![it.clone()],
            vec![link(&it, ids[0], 0.8), link(&it, Uuid::new_v4(), 0.8)],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(store.links().len(), 1);
    }

    #[test]
    fn gl_page_sorts_by_date_then_id() {
        let (_dir, mut store) = store();
        store.add_gl_entries(vec![
            gl(1.0, Some((2024, 1, 1))),
            gl(2.0, None),
            gl(3.0, Some((2024, 6, 1))),
            gl(4.0, Some((2024, 6, 1))),
        ]);
        let page = store.gl_page(10, 0);
        assert_eq!(page[0].date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert!(page[0].id > page[1].id);
        assert_eq!(page[2].date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(page[3].date, None);
        assert_eq!(store.gl_page(2, 3).len(), 1);
    }

    #[test]
    fn gl_upload_duplicates() {
        let (_dir, mut store) = store();
        store.record_gl_upload("gl.csv", b"a,b", 1);
        let hash = content_hash(b"a,b");
        assert!(matches!(
            store.check_gl_upload("renamed.csv", &hash, false),
            Err(StoreError::DuplicateExact { .. })
        ));
        assert!(matches!(
            store.check_gl_upload("gl.csv", &content_hash(b"c,d"), false),
            Err(StoreError::DuplicateName { .. })
        ));
        assert!(store.check_gl_upload("gl.csv", &hash, true).is_ok());
    }

    #[test]
    fn clear_docs_keeps_gl() {
        let (dir, mut store) = store();
        let ids = store.add_gl_entries(vec![gl(50.0, None)]);
        let doc = store
            .add_document(b"x", "image/png", "x.png", DuplicatePolicy::Reject)
            .unwrap();
        let it = item(doc.id, "Paper");
        store.attach(vec![it.clone()], vec![link(&it, ids[0], 0.8)]);

        store.clear(ClearScope::Docs);

        assert!(store.documents().is_empty());
        assert!(store.links().is_empty());
        assert_eq!(store.gl_entries().len(), 1);
        assert_eq!(store.gl_entry(&ids[0]).unwrap().attachments_count, 0);
        let docs_dir = dir.path().join("docs");
        assert_eq!(std::fs::read_dir(docs_dir).unwrap().count(), 0);

        store.clear(ClearScope::All);
        assert!(store.gl_entries().is_empty());
    }

    #[test]
    fn attachment_index_reports_image_evidence() {
        let (_dir, mut store) = store();
        let ids = store.add_gl_entries(vec![gl(50.0, None), gl(60.0, None)]);
        let doc = store
            .add_document(b"img", "image/jpeg", "r.jpg", DuplicatePolicy::Reject)
            .unwrap();
        let it = item(doc.id, "Paper");
        store.attach(vec![it.clone()], vec![link(&it, ids[0], 0.8)]);

        use crate::pipeline::review::AttachmentSource;
        let index = store.attachment_index(ids.clone());
        assert!(index.has_image_or_pdf(&ids[0]));
        assert!(!index.has_image_or_pdf(&ids[1]));
        let summaries = index.attachments_for(&ids[0]);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].ocr.amount, Some(50.0));
        assert_eq!(summaries[0].processing_method, ProcessingMethod::Tesseract);
    }

    #[test]
    fn rehydrates_from_durable_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("farcheck.db");
        let gl_id;
        {
            let durable = SqliteStore::open(&db).unwrap();
            let mut store = EntityStore::open(dir.path(), Some(Box::new(durable)), None);
            gl_id = store.add_gl_entries(vec![gl(50.0, None)])[0];
            let doc = store
                .add_document(b"img", "image/jpeg", "r.jpg", DuplicatePolicy::Reject)
                .unwrap();
            let it = item(doc.id, "Paper");
            store.attach(vec![it.clone()], vec![link(&it, gl_id, 0.8)]);
            let mut policy = Policy::default();
            policy.low_dollar_waiver.threshold = 10.0;
            store.set_policy(policy);
        }

        let durable = SqliteStore::open(&db).unwrap();
        let store = EntityStore::open(dir.path(), Some(Box::new(durable)), None);
        assert_eq!(store.documents().len(), 1);
        assert_eq!(store.doc_items().len(), 1);
        assert_eq!(store.gl_entry(&gl_id).unwrap().attachments_count, 1);
        assert_eq!(store.policy().low_dollar_waiver.threshold, 10.0);
    }

    #[test]
    fn policy_falls_back_to_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        {
            let mut store = EntityStore::open(dir.path(), None, Some(settings.clone()));
            let mut policy = Policy::default();
            policy.general.receipt_threshold = 5.0;
            store.set_policy(policy);
        }
        let store = EntityStore::open(dir.path(), None, Some(settings));
        assert_eq!(store.policy().general.receipt_threshold, 5.0);
        assert!(!store.has_durable());
    }
}
