use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

fn parse_id(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// ═══════════════════════════════════════════
// GL entries
// ═══════════════════════════════════════════

/// Insert a batch of GL entries in one transaction.
pub fn insert_gl_entries(conn: &Connection, entries: &[GlEntry]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO gl_entries (id, account_number, description, amount, date, category,
             vendor, contract_number, created_at, attached_documents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for entry in entries {
            stmt.execute(params![
                entry.id.to_string(),
                entry.account_number,
                entry.description,
                entry.amount,
                entry.date,
                entry.category,
                entry.vendor,
                entry.contract_number,
                entry.created_at,
                serde_json::to_string(&entry.attached_documents)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Rewrite the direct-attachment list of one GL entry.
pub fn update_gl_attachments(
    conn: &Connection,
    id: &Uuid,
    attachments: &[DocAttachment],
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE gl_entries SET attached_documents = ?2 WHERE id = ?1",
        params![id.to_string(), serde_json::to_string(attachments)?],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "gl_entry".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_gl_entry(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM gl_entries WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

pub fn list_gl_entries(conn: &Connection) -> Result<Vec<GlEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, account_number, description, amount, date, category, vendor,
         contract_number, created_at, attached_documents
         FROM gl_entries ORDER BY created_at, id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(GlRow {
            id: row.get(0)?,
            account_number: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            date: row.get(4)?,
            category: row.get(5)?,
            vendor: row.get(6)?,
            contract_number: row.get(7)?,
            created_at: row.get(8)?,
            attached_documents: row.get(9)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(gl_from_row(row?)?);
    }
    Ok(entries)
}

struct GlRow {
    id: String,
    account_number: Option<String>,
    description: Option<String>,
    amount: f64,
    date: Option<NaiveDate>,
    category: Option<String>,
    vendor: Option<String>,
    contract_number: Option<String>,
    created_at: DateTime<Utc>,
    attached_documents: String,
}

fn gl_from_row(row: GlRow) -> Result<GlEntry, DatabaseError> {
    let mut entry = GlEntry::from_new(
        parse_id(&row.id)?,
        NewGlEntry {
            account_number: row.account_number,
            description: row.description,
            amount: row.amount,
            date: row.date,
            category: row.category,
            vendor: row.vendor,
            contract_number: row.contract_number,
        },
        row.created_at,
    );
    entry.attached_documents = serde_json::from_str(&row.attached_documents)?;
    Ok(entry)
}

// ═══════════════════════════════════════════
// Documents + approvals
// ═══════════════════════════════════════════

/// Insert or replace a document row together with its approvals.
pub fn upsert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO documents (id, filename, mime_type, text_content, created_at, doc_type,
         file_hash, file_url, size_bytes, processing_method)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            filename = excluded.filename,
            mime_type = excluded.mime_type,
            text_content = excluded.text_content,
            doc_type = excluded.doc_type,
            file_hash = excluded.file_hash,
            file_url = excluded.file_url,
            size_bytes = excluded.size_bytes,
            processing_method = excluded.processing_method",
        params![
            doc.id.to_string(),
            doc.filename,
            doc.mime_type,
            doc.text_content,
            doc.created_at,
            doc.doc_type.as_str(),
            doc.file_hash,
            doc.file_url,
            doc.size_bytes as i64,
            doc.processing_method.map(|m| m.as_str()),
        ],
    )?;
    tx.execute(
        "DELETE FROM document_approvals WHERE document_id = ?1",
        params![doc.id.to_string()],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO document_approvals (document_id, approver, title, date, decision,
             comments, target_type, summary, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for approval in &doc.approvals {
            stmt.execute(params![
                doc.id.to_string(),
                approval.approver,
                approval.title,
                approval.date,
                approval.decision.as_str(),
                approval.comments,
                approval.target_type,
                approval.summary,
                approval.confidence,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Delete a document; items, approvals and links cascade.
pub fn delete_document(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

pub fn list_documents(conn: &Connection) -> Result<Vec<Document>, DatabaseError> {
    let mut approvals = list_approvals_by_document(conn)?;

    let mut stmt = conn.prepare(
        "SELECT id, filename, mime_type, text_content, created_at, doc_type, file_hash,
         file_url, size_bytes, processing_method
         FROM documents ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(DocumentRow {
            id: row.get(0)?,
            filename: row.get(1)?,
            mime_type: row.get(2)?,
            text_content: row.get(3)?,
            created_at: row.get(4)?,
            doc_type: row.get(5)?,
            file_hash: row.get(6)?,
            file_url: row.get(7)?,
            size_bytes: row.get(8)?,
            processing_method: row.get(9)?,
        })
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let row = row?;
        let doc_approvals = approvals.remove(&row.id).unwrap_or_default();
        docs.push(document_from_row(row, doc_approvals)?);
    }
    Ok(docs)
}

struct DocumentRow {
    id: String,
    filename: String,
    mime_type: String,
    text_content: Option<String>,
    created_at: DateTime<Utc>,
    doc_type: String,
    file_hash: String,
    file_url: Option<String>,
    size_bytes: i64,
    processing_method: Option<String>,
}

fn document_from_row(row: DocumentRow, approvals: Vec<Approval>) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_id(&row.id)?,
        filename: row.filename,
        mime_type: row.mime_type,
        text_content: row.text_content,
        created_at: row.created_at,
        doc_type: DocType::from_str(&row.doc_type)?,
        approvals,
        file_hash: row.file_hash,
        file_url: row.file_url,
        size_bytes: row.size_bytes.max(0) as u64,
        processing_method: row
            .processing_method
            .as_deref()
            .map(ProcessingMethod::from_str)
            .transpose()?,
    })
}

fn list_approvals_by_document(
    conn: &Connection,
) -> Result<HashMap<String, Vec<Approval>>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT document_id, approver, title, date, decision, comments, target_type, summary,
         confidence FROM document_approvals ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<NaiveDate>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, f32>(8)?,
        ))
    })?;

    let mut by_doc: HashMap<String, Vec<Approval>> = HashMap::new();
    for row in rows {
        let (doc_id, approver, title, date, decision, comments, target_type, summary, confidence) =
            row?;
        by_doc.entry(doc_id).or_default().push(Approval {
            approver,
            title,
            date,
            decision: Decision::from_str(&decision)?,
            comments,
            target_type,
            summary,
            confidence,
        });
    }
    Ok(by_doc)
}

// ═══════════════════════════════════════════
// Document items
// ═══════════════════════════════════════════

pub fn insert_doc_items(conn: &Connection, items: &[DocItem]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO doc_items (id, document_id, kind, vendor, date, amount,
             currency, details, text_excerpt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for item in items {
            stmt.execute(params![
                item.id.to_string(),
                item.document_id.to_string(),
                item.kind.map(|k| k.as_str()),
                item.vendor,
                item.date,
                item.amount,
                item.currency,
                serde_json::to_string(&item.details)?,
                item.text_excerpt,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Remove every item of a document (links cascade).
pub fn delete_doc_items_for(conn: &Connection, document_id: &Uuid) -> Result<usize, DatabaseError> {
    let n = conn.execute(
        "DELETE FROM doc_items WHERE document_id = ?1",
        params![document_id.to_string()],
    )?;
    Ok(n)
}

pub fn list_doc_items(conn: &Connection) -> Result<Vec<DocItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, kind, vendor, date, amount, currency, details, text_excerpt
         FROM doc_items ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<NaiveDate>>(4)?,
            row.get::<_, Option<f64>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, Option<String>>(8)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (id, document_id, kind, vendor, date, amount, currency, details, text_excerpt) = row?;
        items.push(DocItem {
            id: parse_id(&id)?,
            document_id: parse_id(&document_id)?,
            kind: kind.as_deref().map(ItemKind::from_str).transpose()?,
            vendor,
            date,
            amount,
            currency,
            details: serde_json::from_str(&details)?,
            text_excerpt,
        });
    }
    Ok(items)
}

// ═══════════════════════════════════════════
// Links
// ═══════════════════════════════════════════

pub fn upsert_links(conn: &Connection, links: &[GlDocLink]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO gl_doc_links (document_item_id, gl_entry_id, score, doc_summary,
             doc_flag_unallowable, discrepancies)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(document_item_id, gl_entry_id) DO UPDATE SET
                score = excluded.score,
                doc_summary = excluded.doc_summary,
                doc_flag_unallowable = excluded.doc_flag_unallowable,
                discrepancies = excluded.discrepancies",
        )?;
        for link in links {
            stmt.execute(params![
                link.document_item_id.to_string(),
                link.gl_entry_id.to_string(),
                link.score,
                link.doc_summary,
                link.doc_flag_unallowable as i32,
                serde_json::to_string(&link.discrepancies)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_link(
    conn: &Connection,
    document_item_id: &Uuid,
    gl_entry_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let n = conn.execute(
        "DELETE FROM gl_doc_links WHERE document_item_id = ?1 AND gl_entry_id = ?2",
        params![document_item_id.to_string(), gl_entry_id.to_string()],
    )?;
    Ok(n > 0)
}

pub fn list_links(conn: &Connection) -> Result<Vec<GlDocLink>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT document_item_id, gl_entry_id, score, doc_summary, doc_flag_unallowable,
         discrepancies FROM gl_doc_links ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, i32>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut links = Vec::new();
    for row in rows {
        let (item_id, gl_id, score, doc_summary, flag, discrepancies) = row?;
        links.push(GlDocLink {
            document_item_id: parse_id(&item_id)?,
            gl_entry_id: parse_id(&gl_id)?,
            score,
            doc_summary,
            doc_flag_unallowable: flag != 0,
            discrepancies: serde_json::from_str(&discrepancies)?,
        });
    }
    Ok(links)
}

// ═══════════════════════════════════════════
// Spreadsheet uploads
// ═══════════════════════════════════════════

pub fn insert_upload(conn: &Connection, upload: &UploadRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO uploads (id, filename, file_hash, size_bytes, uploaded_at, row_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            upload.id.to_string(),
            upload.filename,
            upload.file_hash,
            upload.size_bytes as i64,
            upload.uploaded_at,
            upload.row_count as i64,
        ],
    )?;
    Ok(())
}

pub fn delete_upload(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM uploads WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

pub fn list_uploads(conn: &Connection) -> Result<Vec<UploadRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, file_hash, size_bytes, uploaded_at, row_count
         FROM uploads ORDER BY uploaded_at",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, DateTime<Utc>>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    let mut uploads = Vec::new();
    for row in rows {
        let (id, filename, file_hash, size_bytes, uploaded_at, row_count) = row?;
        uploads.push(UploadRecord {
            id: parse_id(&id)?,
            filename,
            file_hash,
            size_bytes: size_bytes.max(0) as u64,
            uploaded_at,
            row_count: row_count.max(0) as usize,
        });
    }
    Ok(uploads)
}

// ═══════════════════════════════════════════
// Configuration blobs
// ═══════════════════════════════════════════

pub fn put_config(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO kv_config (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, serde_json::to_string(value)?, Utc::now()],
    )?;
    Ok(())
}

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

// ═══════════════════════════════════════════
// Partition clears
// ═══════════════════════════════════════════

/// Empty the selected partition in one transaction.
pub fn clear(conn: &Connection, scope: ClearScope) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    match scope {
        ClearScope::Gl => {
            tx.execute("DELETE FROM gl_entries", [])?;
            tx.execute("DELETE FROM uploads", [])?;
        }
        ClearScope::Docs => {
            tx.execute("DELETE FROM documents", [])?;
            tx.execute("UPDATE gl_entries SET attached_documents = '[]'", [])?;
        }
        ClearScope::All => {
            tx.execute("DELETE FROM gl_doc_links", [])?;
            tx.execute("DELETE FROM documents", [])?;
            tx.execute("DELETE FROM gl_entries", [])?;
            tx.execute("DELETE FROM uploads", [])?;
        }
    }
    tx.commit()?;
    Ok(())
}
