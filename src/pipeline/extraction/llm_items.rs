use serde_json::Value;

use super::types::ExtractedItem;
use super::ExtractionError;
use crate::models::enums::{ItemKind, ProcessingMethod};
use crate::models::LineItem;
use crate::pipeline::llm::{
    lenient_array_objects, parse_json_object, ChatClient, ChatMessage, ChatRequest,
};
use crate::pipeline::normalize::{parse_amount_str, parse_date_str};

/// Characters of document text sent to the model.
pub const LLM_TEXT_LIMIT: usize = 12_000;

const ITEMS_MAX_TOKENS: u32 = 1_500;

const ITEMS_SYSTEM_PROMPT: &str = r#"You extract expense evidence from the text of a supporting document (receipt, invoice, folio).
Return strict JSON only, no prose, in exactly this shape:
{"items":[{"kind":"receipt"|"invoice"|null,"vendor":string|null,"date":"YYYY-MM-DD"|null,"amount":number|null,"currency":string|null,"lines":[{"desc":string|null,"qty":number|null,"unit":number|null,"total":number|null}]}]}
Emit one item per distinct receipt or invoice. "amount" is the grand total actually charged.
If the text contains no receipt or invoice, return {"items":[]}."#;

/// Ask the chat collaborator to structure document text into items.
pub fn extract_items_with_llm(
    client: &dyn ChatClient,
    text: &str,
    filename: &str,
) -> Result<Vec<ExtractedItem>, ExtractionError> {
    let body: String = text.chars().take(LLM_TEXT_LIMIT).collect();
    let user = format!("Filename: {filename}\n\nDocument text:\n{body}");
    let request = ChatRequest::new(
        vec![
            ChatMessage::system(ITEMS_SYSTEM_PROMPT),
            ChatMessage::user(user),
        ],
        ITEMS_MAX_TOKENS,
    );

    let reply = client.complete(&request)?;
    parse_items_reply(&reply)
}

/// Parse a `{"items":[...]}` reply, recovering complete items from a
/// truncated array when strict parsing fails.
pub fn parse_items_reply(reply: &str) -> Result<Vec<ExtractedItem>, ExtractionError> {
    let raw_items = match parse_json_object(reply) {
        Some(obj) => match obj.get("items").and_then(Value::as_array) {
            Some(items) => items.clone(),
            None => {
                return Err(ExtractionError::MalformedResponse(
                    "reply has no items array".into(),
                ))
            }
        },
        None => {
            if !reply.contains("\"items\"") {
                return Err(ExtractionError::MalformedResponse(
                    "reply is not JSON".into(),
                ));
            }
            lenient_array_objects(reply, "items")
        }
    };

    Ok(raw_items.iter().filter_map(item_from_value).collect())
}

fn item_from_value(value: &Value) -> Option<ExtractedItem> {
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .and_then(|k| k.to_lowercase().parse::<ItemKind>().ok());

    let lines = value
        .get("lines")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .map(|l| LineItem {
                    desc: string_field(l, "desc"),
                    qty: number_field(l, "qty"),
                    unit: number_field(l, "unit"),
                    total: number_field(l, "total"),
                })
                .filter(|l| l.desc.is_some() || l.total.is_some())
                .collect()
        })
        .unwrap_or_default();

    let item = ExtractedItem {
        kind,
        vendor: string_field(value, "vendor"),
        date: string_field(value, "date").and_then(|d| parse_date_str(&d)),
        amount: number_field(value, "amount").map(f64::abs),
        currency: string_field(value, "currency"),
        lines,
        confidence: None,
        processing_method: Some(ProcessingMethod::Llm),
        text_excerpt: None,
    };
    item.has_fields().then_some(item)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// Numbers may come back as JSON numbers or as money strings.
fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}
