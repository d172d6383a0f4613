use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use uuid::Uuid;

use super::parser::{classification_from_value, parse_review_reply, ParseMethod};
use super::prompt::{
    build_continuation_request, build_initial_request, AttachmentSummary, PromptRow, ReviewRow,
};
use super::ReviewError;
use crate::models::Classification;
use crate::pipeline::llm::{ChatClient, LlmError};

/// Rows per LLM call.
pub const REVIEW_BATCH_SIZE: usize = 15;
/// Continuation requests per batch after the initial call.
pub const MAX_CONTINUATIONS: usize = 5;

const CONTINUATION_PARSE_FAILED: &str = "Continuation parse failed";

/// Linked-evidence lookup used to enrich prompt rows.
pub trait AttachmentSource {
    fn attachments_for(&self, gl_entry_id: &Uuid) -> Vec<AttachmentSummary>;
    /// Whether any document linked to the row is an image or PDF.
    fn has_image_or_pdf(&self, gl_entry_id: &Uuid) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct RowAttachments {
    pub summaries: Vec<AttachmentSummary>,
    pub has_image_or_pdf: bool,
}

/// Owned snapshot of attachments per GL row, taken before the LLM calls so
/// no store lock is held while waiting on the collaborator.
#[derive(Debug, Clone, Default)]
pub struct AttachmentIndex {
    rows: HashMap<Uuid, RowAttachments>,
}

impl AttachmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gl_entry_id: Uuid, attachments: RowAttachments) {
        self.rows.insert(gl_entry_id, attachments);
    }
}

impl AttachmentSource for AttachmentIndex {
    fn attachments_for(&self, gl_entry_id: &Uuid) -> Vec<AttachmentSummary> {
        self.rows
            .get(gl_entry_id)
            .map(|r| r.summaries.clone())
            .unwrap_or_default()
    }

    fn has_image_or_pdf(&self, gl_entry_id: &Uuid) -> bool {
        self.rows
            .get(gl_entry_id)
            .is_some_and(|r| r.has_image_or_pdf)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutput {
    pub results: Vec<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub logs: Vec<String>,
}

/// Accumulates accepted classifications and diagnostics across batches.
#[derive(Default)]
struct ReviewRun {
    results: BTreeMap<usize, Classification>,
    warnings: Vec<String>,
    logs: Vec<String>,
}

impl ReviewRun {
    fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Parse a reply and keep results for requested indices; first wins.
    /// Returns `None` when the reply yielded nothing parseable.
    fn accept(
        &mut self,
        reply: &str,
        requested: &BTreeMap<usize, Option<Uuid>>,
        stage: &str,
    ) -> Option<usize> {
        let parsed = parse_review_reply(reply)?;
        let method = match parsed.method {
            ParseMethod::Json => "json",
            ParseMethod::Lenient => "lenient",
        };

        let mut accepted = 0;
        for value in &parsed.objects {
            let Some(c) = classification_from_value(value, requested) else {
                continue;
            };
            if !self.results.contains_key(&c.index) {
                self.results.insert(c.index, c);
                accepted += 1;
            }
        }

        tracing::debug!(stage, method, objects = parsed.objects.len(), accepted, "Review reply parsed");
        self.logs.push(format!(
            "{stage}: parsed {} object(s) via {method}, accepted {accepted}",
            parsed.objects.len()
        ));
        Some(accepted)
    }

    fn missing(&self, batch: &[PromptRow]) -> Vec<PromptRow> {
        batch
            .iter()
            .filter(|r| !self.results.contains_key(&r.index))
            .cloned()
            .collect()
    }
}

/// Classify GL rows with the chat collaborator.
///
/// Rows are sent in batches of [`REVIEW_BATCH_SIZE`], keyed by their input
/// index. Indices missing from a reply are re-requested up to
/// [`MAX_CONTINUATIONS`] times. Results come back ordered by index with each
/// row's id copied through; anything short of full coverage is reported in
/// `warning`.
pub fn review_rows(
    client: &dyn ChatClient,
    rows: &[ReviewRow],
    source: &dyn AttachmentSource,
) -> Result<ReviewOutput, ReviewError> {
    let _span = tracing::info_span!("llm_review", rows = rows.len()).entered();

    let supported = rows
        .iter()
        .filter_map(|r| r.id)
        .any(|id| source.has_image_or_pdf(&id));
    if !supported {
        tracing::warn!(rows = rows.len(), "Review rejected: no image/PDF evidence linked");
        return Err(ReviewError::NoSupportingDocuments);
    }

    let prompt_rows: Vec<PromptRow> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let attachments = row
                .id
                .map(|id| source.attachments_for(&id))
                .unwrap_or_default();
            PromptRow::new(index, row, attachments)
        })
        .collect();

    let batch_count = prompt_rows.len().div_ceil(REVIEW_BATCH_SIZE);
    let mut run = ReviewRun::default();
    let mut succeeded = 0usize;
    let mut last_error: Option<LlmError> = None;

    for (n, batch) in prompt_rows.chunks(REVIEW_BATCH_SIZE).enumerate() {
        let label = format!("Batch {}/{}", n + 1, batch_count);
        run.logs.push(format!("{label}: {} row(s)", batch.len()));

        match review_batch(client, batch, &label, &mut run) {
            Ok(()) => succeeded += 1,
            Err(ReviewError::Llm(e)) => {
                tracing::warn!(batch = n + 1, error = %e, "Review batch failed");
                run.warn(format!("{label} failed: {e}"));
                last_error = Some(e);
            }
            Err(other) => return Err(other),
        }
    }

    if succeeded == 0 {
        if let Some(e) = last_error {
            return Err(ReviewError::Llm(e));
        }
    }

    let expected = rows.len();
    let results: Vec<Classification> = run.results.into_values().collect();
    if results.len() < expected {
        run.warnings
            .push(format!("Partial results: {}/{}", results.len(), expected));
    }

    tracing::info!(
        expected,
        returned = results.len(),
        batches = batch_count,
        "LLM review complete"
    );

    Ok(ReviewOutput {
        results,
        warning: (!run.warnings.is_empty()).then(|| run.warnings.join("; ")),
        logs: run.logs,
    })
}

/// One batch: the initial call, then continuations for missing indices.
/// Only a failed initial call is an error; continuation trouble ends the
/// loop with a warning.
fn review_batch(
    client: &dyn ChatClient,
    batch: &[PromptRow],
    label: &str,
    run: &mut ReviewRun,
) -> Result<(), ReviewError> {
    let requested: BTreeMap<usize, Option<Uuid>> =
        batch.iter().map(|r| (r.index, r.id)).collect();

    let reply = client.complete(&build_initial_request(batch)?)?;
    if run.accept(&reply, &requested, label).is_none() {
        tracing::warn!(batch = label, "Initial review reply unparseable");
        run.logs.push(format!("{label}: initial reply unparseable"));
    }

    for attempt in 1..=MAX_CONTINUATIONS {
        let missing = run.missing(batch);
        if missing.is_empty() {
            break;
        }

        let returned: Vec<usize> = requested
            .keys()
            .filter(|i| run.results.contains_key(i))
            .copied()
            .collect();
        let wanted: BTreeMap<usize, Option<Uuid>> =
            missing.iter().map(|r| (r.index, r.id)).collect();
        run.logs.push(format!(
            "{label}: continuation {attempt} for {} missing row(s)",
            missing.len()
        ));

        let request = build_continuation_request(&missing, &returned)?;
        let stage = format!("{label} continuation {attempt}");
        let accepted = match client.complete(&request) {
            Ok(reply) => run.accept(&reply, &wanted, &stage),
            Err(e) => {
                tracing::warn!(batch = label, attempt, error = %e, "Continuation call failed");
                None
            }
        };

        if accepted.is_none() {
            run.warn(CONTINUATION_PARSE_FAILED);
            break;
        }
    }

    Ok(())
}
