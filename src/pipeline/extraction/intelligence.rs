use std::time::Duration;

use serde_json::Value;

use super::types::{DiModel, DocumentIntelligence, ExtractedItem};
use super::ExtractionError;
use crate::config::DiConfig;
use crate::models::enums::{ItemKind, ProcessingMethod};
use crate::models::LineItem;
use crate::pipeline::normalize::{parse_amount_str, parse_date_str};

/// Blocking client for an Azure-style document-intelligence service:
/// POST the bytes, then poll `operation-location` until the analysis settles.
pub struct AzureDocumentIntelligence {
    endpoint: String,
    api_key: String,
    api_version: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
    client: reqwest::blocking::Client,
}

impl AzureDocumentIntelligence {
    pub fn new(config: &DiConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Intelligence(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
            client,
        })
    }

    pub fn analyze_url(&self, model: DiModel) -> String {
        format!(
            "{}/{}/documentModels/{}:analyze?api-version={}",
            self.endpoint,
            service_segment(&self.api_version),
            model.model_id(),
            self.api_version
        )
    }

    fn fetch_operation(&self, url: &str) -> Result<Value, ExtractionError> {
        let response = self
            .client
            .get(url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .map_err(|e| ExtractionError::Intelligence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::IntelligenceStatus {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        response
            .json()
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))
    }
}

/// API versions from 2023-10-31 on live under `documentintelligence`.
fn service_segment(api_version: &str) -> &'static str {
    if api_version < "2023-10-31" {
        "formrecognizer"
    } else {
        "documentintelligence"
    }
}

impl DocumentIntelligence for AzureDocumentIntelligence {
    fn analyze(
        &self,
        bytes: &[u8],
        mime_type: &str,
        model: DiModel,
    ) -> Result<Value, ExtractionError> {
        let _span = tracing::info_span!("di_analyze", model = model.model_id()).entered();

        let response = self
            .client
            .post(self.analyze_url(model))
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| ExtractionError::Intelligence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::IntelligenceStatus {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let operation = response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ExtractionError::MalformedResponse("missing operation-location header".into())
            })?;

        poll_until_done(
            || self.fetch_operation(&operation),
            self.poll_interval,
            self.max_poll_attempts,
            std::thread::sleep,
        )
    }
}

/// Poll an analysis operation at a fixed interval until it succeeds, fails,
/// or `max_attempts` polls elapse. Returns the `analyzeResult` object.
pub fn poll_until_done<F, S>(
    mut fetch: F,
    interval: Duration,
    max_attempts: u32,
    mut sleep: S,
) -> Result<Value, ExtractionError>
where
    F: FnMut() -> Result<Value, ExtractionError>,
    S: FnMut(Duration),
{
    for attempt in 1..=max_attempts {
        sleep(interval);
        let body = fetch()?;
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        match status.as_str() {
            "succeeded" => {
                tracing::debug!(attempt, "Analysis succeeded");
                return Ok(body.get("analyzeResult").cloned().unwrap_or(Value::Null));
            }
            "failed" | "canceled" => {
                let message = body
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("analysis failed")
                    .to_string();
                return Err(ExtractionError::AnalysisFailed(message));
            }
            _ => {}
        }
    }
    tracing::warn!(attempts = max_attempts, "Analysis polling timed out");
    Err(ExtractionError::PollTimeout {
        attempts: max_attempts,
    })
}

/// Full text of an analysis result, if any.
pub fn analyze_text(result: &Value) -> Option<String> {
    result
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Translate analyzed documents into items. Documents without amount,
/// vendor or date are skipped.
pub fn items_from_analyze(result: &Value, model: DiModel) -> Vec<ExtractedItem> {
    let kind = match model {
        DiModel::Invoice => Some(ItemKind::Invoice),
        DiModel::Receipt => Some(ItemKind::Receipt),
        DiModel::Layout => None,
    };

    let Some(documents) = result.get("documents").and_then(Value::as_array) else {
        return Vec::new();
    };

    documents
        .iter()
        .filter_map(|doc| {
            let fields = doc.get("fields")?;
            let vendor = ["VendorName", "MerchantName"]
                .iter()
                .find_map(|k| field_string(fields.get(*k)?));
            let date = ["InvoiceDate", "TransactionDate"]
                .iter()
                .find_map(|k| field_date(fields.get(*k)?));
            let (amount, currency) = ["InvoiceTotal", "Total"]
                .iter()
                .find_map(|k| field_money(fields.get(*k)?))
                .map(|(a, c)| (Some(a), c))
                .unwrap_or((None, None));

            let lines = fields
                .pointer("/Items/valueArray")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(line_from_field).collect())
                .unwrap_or_default();

            let item = ExtractedItem {
                kind,
                vendor,
                date,
                amount,
                currency,
                lines,
                confidence: doc
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .map(|c| c as f32),
                processing_method: Some(ProcessingMethod::DocumentIntelligence),
                text_excerpt: None,
            };
            item.has_fields().then_some(item)
        })
        .collect()
}

fn field_string(field: &Value) -> Option<String> {
    field
        .get("valueString")
        .or_else(|| field.get("content"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn field_date(field: &Value) -> Option<chrono::NaiveDate> {
    field
        .get("valueDate")
        .or_else(|| field.get("content"))
        .and_then(Value::as_str)
        .and_then(parse_date_str)
}

fn field_number(field: &Value) -> Option<f64> {
    field
        .get("valueNumber")
        .and_then(Value::as_f64)
        .or_else(|| field.pointer("/valueCurrency/amount").and_then(Value::as_f64))
        .or_else(|| {
            field
                .get("content")
                .and_then(Value::as_str)
                .and_then(parse_amount_str)
        })
}

fn field_money(field: &Value) -> Option<(f64, Option<String>)> {
    let amount = field_number(field)?.abs();
    let currency = field
        .pointer("/valueCurrency/currencyCode")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some((amount, currency))
}

fn line_from_field(entry: &Value) -> Option<LineItem> {
    let obj = entry.get("valueObject")?;
    let line = LineItem {
        desc: obj.get("Description").and_then(field_string),
        qty: obj.get("Quantity").and_then(field_number),
        unit: obj.get("UnitPrice").and_then(field_number),
        total: obj
            .get("Amount")
            .or_else(|| obj.get("TotalPrice"))
            .and_then(field_number),
    };
    (line.desc.is_some() || line.total.is_some()).then_some(line)
}

/// Test double returning a fixed analysis result.
pub struct MockDocumentIntelligence {
    result: Option<Value>,
}

impl MockDocumentIntelligence {
    pub fn new(result: Value) -> Self {
        Self {
            result: Some(result),
        }
    }

    pub fn failing() -> Self {
        Self { result: None }
    }
}

impl DocumentIntelligence for MockDocumentIntelligence {
    fn analyze(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
        _model: DiModel,
    ) -> Result<Value, ExtractionError> {
        self.result
            .clone()
            .ok_or_else(|| ExtractionError::Intelligence("mock unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn receipt_result() -> Value {
        json!({
            "content": "STAPLES\n03/15/2024\nTOTAL $1,234.56",
            "documents": [{
                "docType": "receipt.retailMeal",
                "confidence": 0.91,
                "fields": {
                    "MerchantName": {"type": "string", "valueString": "Staples", "content": "STAPLES"},
                    "TransactionDate": {"type": "date", "valueDate": "2024-03-15"},
                    "Total": {"type": "number", "valueNumber": 1234.56, "content": "$1,234.56"},
                    "Items": {"type": "array", "valueArray": [
                        {"type": "object", "valueObject": {
                            "Description": {"valueString": "Toner"},
                            "Quantity": {"valueNumber": 2.0},
                            "TotalPrice": {"valueNumber": 80.0}
                        }},
                        {"type": "object", "valueObject": {}}
                    ]}
                }
            }]
        })
    }

    #[test]
    fn translates_receipt_fields() {
        let items = items_from_analyze(&receipt_result(), DiModel::Receipt);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.kind, Some(ItemKind::Receipt));
        assert_eq!(item.vendor.as_deref(), Some("Staples"));
        assert_eq!(item.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(item.amount, Some(1234.56));
        assert_eq!(item.lines.len(), 1);
        assert_eq!(item.lines[0].desc.as_deref(), Some("Toner"));
        assert_eq!(item.lines[0].total, Some(80.0));
        assert_eq!(item.confidence, Some(0.91));
    }

    #[test]
    fn invoice_currency_fields() {
        let result = json!({
            "documents": [{
                "fields": {
                    "VendorName": {"content": "Acme Corp"},
                    "InvoiceDate": {"content": "March 10, 2024"},
                    "InvoiceTotal": {"valueCurrency": {"amount": 50.0, "currencyCode": "USD"}}
                }
            }]
        });
        let items = items_from_analyze(&result, DiModel::Invoice);
        assert_eq!(items[0].kind, Some(ItemKind::Invoice));
        assert_eq!(items[0].currency.as_deref(), Some("USD"));
        assert_eq!(items[0].amount, Some(50.0));
        assert_eq!(items[0].date, NaiveDate::from_ymd_opt(2024, 3, 10));
    }

    #[test]
    fn documents_without_fields_skipped() {
        let result = json!({"documents": [{"fields": {}}], "content": "  "});
        assert!(items_from_analyze(&result, DiModel::Layout).is_empty());
        assert_eq!(analyze_text(&result), None);
        assert!(items_from_analyze(&json!({}), DiModel::Layout).is_empty());
    }

    #[test]
    fn poll_returns_result_on_success() {
        let mut replies = vec![
            json!({"status": "succeeded", "analyzeResult": {"content": "hi"}}),
            json!({"status": "running"}),
            json!({"status": "notStarted"}),
        ];
        let mut sleeps = 0;
        let result = poll_until_done(
            || Ok(replies.pop().unwrap()),
            Duration::from_millis(1000),
            5,
            |_| sleeps += 1,
        )
        .unwrap();
        assert_eq!(analyze_text(&result).as_deref(), Some("hi"));
        assert_eq!(sleeps, 3);
    }

    #[test]
    fn poll_reports_failure() {
        let err = poll_until_done(
            || Ok(json!({"status": "failed", "error": {"message": "bad image"}})),
            Duration::ZERO,
            5,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::AnalysisFailed(m) if m == "bad image"));
    }

    #[test]
    fn poll_times_out_after_bounded_attempts() {
        let mut calls = 0;
        let err = poll_until_done(
            || {
                calls += 1;
                Ok(json!({"status": "running"}))
            },
            Duration::ZERO,
            3,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::PollTimeout { attempts: 3 }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn analyze_url_per_api_version() {
        let mut cfg = DiConfig {
            endpoint: "https://di.example.com/".into(),
            api_key: "k".into(),
            api_version: "2023-07-31".into(),
            poll_interval_ms: 1000,
            max_poll_attempts: 30,
            timeout_secs: 60,
        };
        let client = AzureDocumentIntelligence::new(&cfg).unwrap();
        assert_eq!(
            client.analyze_url(DiModel::Receipt),
            "https://di.example.com/formrecognizer/documentModels/prebuilt-receipt:analyze?api-version=2023-07-31"
        );
        cfg.api_version = "2024-11-30".into();
        let client = AzureDocumentIntelligence::new(&cfg).unwrap();
        assert!(client
            .analyze_url(DiModel::Invoice)
            .starts_with("https://di.example.com/documentintelligence/documentModels/prebuilt-invoice"));
    }

    #[test]
    fn mock_intelligence() {
        let ok = MockDocumentIntelligence::new(json!({"content": "x"}));
        assert!(ok.analyze(b"", "image/png", DiModel::Receipt).is_ok());
        assert!(MockDocumentIntelligence::failing()
            .analyze(b"", "image/png", DiModel::Receipt)
            .is_err());
    }
}
