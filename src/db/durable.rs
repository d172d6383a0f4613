//! Write-through persistence for the entity store.
//!
//! The in-memory graph is authoritative; every mutation is mirrored here so
//! a restart can rehydrate it. Callers log and swallow failures.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::enums::ClearScope;
use crate::models::*;

/// Everything the durable store holds, as loaded at startup.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub gl_entries: Vec<GlEntry>,
    pub documents: Vec<Document>,
    pub doc_items: Vec<DocItem>,
    pub links: Vec<GlDocLink>,
    pub uploads: Vec<UploadRecord>,
}

/// Durable collaborator of the entity store.
pub trait DurableStore: Send + Sync {
    fn insert_gl_entries(&self, entries: &[GlEntry]) -> Result<(), DatabaseError>;
    fn update_gl_attachments(
        &self,
        id: &Uuid,
        attachments: &[DocAttachment],
    ) -> Result<(), DatabaseError>;
    fn delete_gl_entry(&self, id: &Uuid) -> Result<(), DatabaseError>;
    fn upsert_document(&self, doc: &Document) -> Result<(), DatabaseError>;
    fn delete_document(&self, id: &Uuid) -> Result<(), DatabaseError>;
    fn insert_doc_items(&self, items: &[DocItem]) -> Result<(), DatabaseError>;
    fn delete_doc_items_for(&self, document_id: &Uuid) -> Result<(), DatabaseError>;
    fn upsert_links(&self, links: &[GlDocLink]) -> Result<(), DatabaseError>;
    fn delete_link(&self, document_item_id: &Uuid, gl_entry_id: &Uuid)
        -> Result<(), DatabaseError>;
    fn insert_upload(&self, upload: &UploadRecord) -> Result<(), DatabaseError>;
    fn put_config(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError>;
    fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;
    fn clear(&self, scope: ClearScope) -> Result<(), DatabaseError>;
    fn load_snapshot(&self) -> Result<Snapshot, DatabaseError>;
}

/// SQLite-backed durable store. One connection behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = open_database(path)?;
        tracing::info!(path = %path.display(), "Durable store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_memory_database()?),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

impl DurableStore for SqliteStore {
    fn insert_gl_entries(&self, entries: &[GlEntry]) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::insert_gl_entries(c, entries))
    }

    fn update_gl_attachments(
        &self,
        id: &Uuid,
        attachments: &[DocAttachment],
    ) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::update_gl_attachments(c, id, attachments))
    }

    fn delete_gl_entry(&self, id: &Uuid) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::delete_gl_entry(c, id))
    }

    fn upsert_document(&self, doc: &Document) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::upsert_document(c, doc))
    }

    fn delete_document(&self, id: &Uuid) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::delete_document(c, id))
    }

    fn insert_doc_items(&self, items: &[DocItem]) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::insert_doc_items(c, items))
    }

    fn delete_doc_items_for(&self, document_id: &Uuid) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::delete_doc_items_for(c, document_id).map(|_| ()))
    }

    fn upsert_links(&self, links: &[GlDocLink]) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::upsert_links(c, links))
    }

    fn delete_link(
        &self,
        document_item_id: &Uuid,
        gl_entry_id: &Uuid,
    ) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::delete_link(c, document_item_id, gl_entry_id).map(|_| ()))
    }

    fn insert_upload(&self, upload: &UploadRecord) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::insert_upload(c, upload))
    }

    fn put_config(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::put_config(c, key, value))
    }

    fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        self.with_conn(|c| repository::get_config(c, key))
    }

    fn clear(&self, scope: ClearScope) -> Result<(), DatabaseError> {
        self.with_conn(|c| repository::clear(c, scope))
    }

    fn load_snapshot(&self) -> Result<Snapshot, DatabaseError> {
        self.with_conn(|c| {
            Ok(Snapshot {
                gl_entries: repository::list_gl_entries(c)?,
                documents: repository::list_documents(c)?,
                doc_items: repository::list_doc_items(c)?,
                links: repository::list_links(c)?,
                uploads: repository::list_uploads(c)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn snapshot_reflects_writes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = GlEntry::from_new(
            Uuid::new_v4(),
            NewGlEntry {
                amount: 99.0,
                ..Default::default()
            },
            Utc::now(),
        );
        store.insert_gl_entries(&[entry.clone()]).unwrap();
        store
            .insert_upload(&UploadRecord {
                id: Uuid::new_v4(),
                filename: "gl.csv".into(),
                file_hash: "abc".into(),
                size_bytes: 10,
                uploaded_at: Utc::now(),
                row_count: 1,
            })
            .unwrap();

        let snap = store.load_snapshot().unwrap();
        assert_eq!(snap.gl_entries.len(), 1);
        assert_eq!(snap.gl_entries[0].id, entry.id);
        assert_eq!(snap.uploads.len(), 1);
        assert!(snap.documents.is_empty());
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("farcheck.db");
        let id = Uuid::new_v4();
        {
            let store = SqliteStore::open(&path).unwrap();
            let entry = GlEntry::from_new(id, NewGlEntry::default(), Utc::now());
            store.insert_gl_entries(&[entry]).unwrap();
            store
                .put_config("policy", &serde_json::json!({"x": 1}))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let snap = store.load_snapshot().unwrap();
        assert_eq!(snap.gl_entries[0].id, id);
        assert_eq!(
            store.get_config("policy").unwrap(),
            Some(serde_json::json!({"x": 1}))
        );
    }

    #[test]
    fn clear_all_empties_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = GlEntry::from_new(Uuid::new_v4(), NewGlEntry::default(), Utc::now());
        store.insert_gl_entries(&[entry]).unwrap();
        store.clear(ClearScope::All).unwrap();
        assert!(store.load_snapshot().unwrap().gl_entries.is_empty());
    }
}
