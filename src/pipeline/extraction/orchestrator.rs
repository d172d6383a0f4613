use std::sync::Arc;

use super::approvals::extract_approvals;
use super::classify::classify_document;
use super::intelligence::{analyze_text, items_from_analyze};
use super::llm_items::extract_items_with_llm;
use super::text_fields::{excerpt, item_from_text, ocr_summary};
use super::types::{
    DiModel, DocumentIntelligence, ExtractedItem, ExtractionOutput, OcrEngine, StepReport,
};
use crate::models::enums::ProcessingMethod;
use crate::pipeline::llm::ChatClient;

/// One stage of the extraction fallback list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStep {
    /// Read `text/*` documents directly.
    PlainText,
    /// Local OCR for images (and PDFs unless skipped).
    Ocr,
    /// Remote document-intelligence analysis.
    DocumentIntelligence,
    /// LLM structuring of the aggregated text, only when no items exist yet.
    LlmItems,
    /// Regex reading of the aggregated text, only when no items exist yet.
    TextHeuristics,
}

impl ExtractionStep {
    pub const DEFAULT_ORDER: [ExtractionStep; 5] = [
        ExtractionStep::PlainText,
        ExtractionStep::Ocr,
        ExtractionStep::DocumentIntelligence,
        ExtractionStep::LlmItems,
        ExtractionStep::TextHeuristics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Ocr => "ocr",
            Self::DocumentIntelligence => "document_intelligence",
            Self::LlmItems => "llm_items",
            Self::TextHeuristics => "text_heuristics",
        }
    }
}

/// Runs the ordered extraction steps over one document.
/// Collaborators are injected; absent ones make their step a no-op.
pub struct DocumentExtractor {
    ocr: Option<Box<dyn OcrEngine>>,
    intelligence: Option<Box<dyn DocumentIntelligence>>,
    llm: Option<Arc<dyn ChatClient>>,
    skip_pdf_ocr: bool,
    steps: Vec<ExtractionStep>,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state threaded through the steps.
struct Run {
    texts: Vec<String>,
    items: Vec<ExtractedItem>,
    text_method: Option<ProcessingMethod>,
    item_method: Option<ProcessingMethod>,
    ocr_confidence: Option<f32>,
    steps: Vec<StepReport>,
}

impl Run {
    fn add_text(&mut self, text: &str, method: ProcessingMethod) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() || self.texts.iter().any(|t| t == trimmed) {
            return false;
        }
        self.texts.push(trimmed.to_string());
        self.text_method.get_or_insert(method);
        true
    }

    fn joined_text(&self) -> Option<String> {
        (!self.texts.is_empty()).then(|| self.texts.join("\n\n"))
    }

    fn report(&mut self, step: ExtractionStep, ok: bool, items: usize, message: Option<String>) {
        self.steps.push(StepReport {
            step: step.as_str().to_string(),
            ok,
            items,
            message,
        });
    }
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self {
            ocr: None,
            intelligence: None,
            llm: None,
            skip_pdf_ocr: true,
            steps: ExtractionStep::DEFAULT_ORDER.to_vec(),
        }
    }

    pub fn with_ocr(mut self, engine: Box<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_intelligence(mut self, client: Box<dyn DocumentIntelligence>) -> Self {
        self.intelligence = Some(client);
        self
    }

    pub fn with_llm(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn skip_pdf_ocr(mut self, skip: bool) -> Self {
        self.skip_pdf_ocr = skip;
        self
    }

    pub fn with_steps(mut self, steps: Vec<ExtractionStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn has_intelligence(&self) -> bool {
        self.intelligence.is_some()
    }

    /// Extract text, items, approvals and a document type. Never fails:
    /// when every step fails the output is empty with type `unknown`.
    pub fn extract(&self, bytes: &[u8], mime_type: &str, filename: &str) -> ExtractionOutput {
        let _span = tracing::info_span!("extract_document", filename = %filename, mime = %mime_type)
            .entered();

        let mut run = Run {
            texts: Vec::new(),
            items: Vec::new(),
            text_method: None,
            item_method: None,
            ocr_confidence: None,
            steps: Vec::new(),
        };

        for step in &self.steps {
            match step {
                ExtractionStep::PlainText => self.plain_text_step(&mut run, bytes, mime_type),
                ExtractionStep::Ocr => self.ocr_step(&mut run, bytes, mime_type),
                ExtractionStep::DocumentIntelligence => {
                    self.intelligence_step(&mut run, bytes, mime_type, filename)
                }
                ExtractionStep::LlmItems => self.llm_step(&mut run, filename),
                ExtractionStep::TextHeuristics => self.heuristics_step(&mut run),
            }
        }

        let text = run.joined_text();
        let mut items = run.items;
        if let Some(t) = &text {
            for item in items.iter_mut().filter(|i| i.text_excerpt.is_none()) {
                item.text_excerpt = excerpt(t);
            }
        }

        let approvals = text.as_deref().map(extract_approvals).unwrap_or_default();
        let doc_type = classify_document(&items, filename, text.as_deref());
        let ocr = match (&text, run.ocr_confidence) {
            (Some(t), Some(conf)) => Some(ocr_summary(t, Some(conf))),
            _ => None,
        };

        if text.is_none() && items.is_empty() {
            tracing::warn!(filename = %filename, "All extraction steps produced nothing");
        }
        tracing::info!(
            items = items.len(),
            approvals = approvals.len(),
            doc_type = doc_type.as_str(),
            text_length = text.as_ref().map(|t| t.len()).unwrap_or(0),
            "Extraction complete"
        );

        ExtractionOutput {
            text,
            items,
            approvals,
            doc_type,
            processing_method: run.item_method.or(run.text_method),
            ocr,
            steps: run.steps,
        }
    }

    fn plain_text_step(&self, run: &mut Run, bytes: &[u8], mime_type: &str) {
        if !mime_type.starts_with("text/") {
            return;
        }
        let text = String::from_utf8_lossy(bytes);
        let ok = run.add_text(&text, ProcessingMethod::PlainText);
        run.report(ExtractionStep::PlainText, ok, 0, None);
    }

    fn ocr_step(&self, run: &mut Run, bytes: &[u8], mime_type: &str) {
        let Some(engine) = &self.ocr else { return };
        let is_pdf = mime_type == "application/pdf";
        if !(mime_type.starts_with("image/") || is_pdf) {
            return;
        }
        if is_pdf && self.skip_pdf_ocr {
            run.report(ExtractionStep::Ocr, false, 0, Some("skipped for PDF".into()));
            return;
        }

        match engine.ocr(bytes, mime_type) {
            Ok(page) => {
                let ok = run.add_text(&page.text, ProcessingMethod::Tesseract);
                if ok {
                    run.ocr_confidence = Some(page.confidence);
                }
                tracing::debug!(confidence = page.confidence, words = page.words.len(), "OCR done");
                run.report(ExtractionStep::Ocr, ok, 0, None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "OCR step failed");
                run.report(ExtractionStep::Ocr, false, 0, Some(e.to_string()));
            }
        }
    }

    fn intelligence_step(&self, run: &mut Run, bytes: &[u8], mime_type: &str, filename: &str) {
        let Some(client) = &self.intelligence else { return };
        if mime_type.starts_with("text/") {
            return;
        }

        let model = DiModel::for_document(filename, mime_type);
        match client.analyze(bytes, mime_type, model) {
            Ok(result) => {
                if let Some(text) = analyze_text(&result) {
                    run.add_text(&text, ProcessingMethod::DocumentIntelligence);
                }
                let items = items_from_analyze(&result, model);
                let count = items.len();
                if run.items.is_empty() && !items.is_empty() {
                    run.items = items;
                    run.item_method = Some(ProcessingMethod::DocumentIntelligence);
                }
                run.report(ExtractionStep::DocumentIntelligence, true, count, None);
            }
            Err(e) => {
                tracing::warn!(error = %e, model = model.model_id(), "Document intelligence step failed");
                run.report(
                    ExtractionStep::DocumentIntelligence,
                    false,
                    0,
                    Some(e.to_string()),
                );
            }
        }
    }

    fn llm_step(&self, run: &mut Run, filename: &str) {
        let Some(client) = &self.llm else { return };
        if !run.items.is_empty() {
            return;
        }
        let Some(text) = run.joined_text() else { return };

        match extract_items_with_llm(client.as_ref(), &text, filename) {
            Ok(items) => {
                let count = items.len();
                if !items.is_empty() {
                    run.items = items;
                    run.item_method = Some(ProcessingMethod::Llm);
                }
                run.report(ExtractionStep::LlmItems, true, count, None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM item extraction failed");
                run.report(ExtractionStep::LlmItems, false, 0, Some(e.to_string()));
            }
        }
    }

    fn heuristics_step(&self, run: &mut Run) {
        if !run.items.is_empty() {
            return;
        }
        let Some(text) = run.joined_text() else { return };
        let method = run.text_method.unwrap_or(ProcessingMethod::PlainText);
        match item_from_text(&text, run.ocr_confidence, method) {
            Some(item) => {
                run.items = vec![item];
                run.item_method = Some(method);
                run.report(ExtractionStep::TextHeuristics, true, 1, None);
            }
            None => run.report(ExtractionStep::TextHeuristics, false, 0, None),
        }
    }
}
