use std::io::Write;
use std::process::Command;

use super::types::{OcrEngine, OcrPageResult, OcrWord};
use super::ExtractionError;

/// Tesseract invoked as an external process (`tesseract <file> stdout tsv`).
pub struct TesseractCli {
    command: String,
    lang: String,
}

impl TesseractCli {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            lang: "eng".to_string(),
        }
    }

    /// Set language(s) for OCR (e.g., "eng", "eng+fra")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

fn suffix_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/tiff" => ".tif",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "application/pdf" => ".pdf",
        _ => ".img",
    }
}

impl OcrEngine for TesseractCli {
    fn ocr(&self, bytes: &[u8], mime_type: &str) -> Result<OcrPageResult, ExtractionError> {
        let mut input = tempfile::Builder::new()
            .prefix("farcheck-ocr-")
            .suffix(suffix_for(mime_type))
            .tempfile()?;
        input.write_all(bytes)?;
        input.flush()?;

        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("tsv")
            .output()
            .map_err(|e| ExtractionError::OcrUnavailable(format!("{}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrProcessing(
                stderr.lines().last().unwrap_or("tesseract failed").to_string(),
            ));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(page_from_tsv(&tsv))
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    pub fail: bool,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            fail: true,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr(&self, _bytes: &[u8], _mime_type: &str) -> Result<OcrPageResult, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::OcrUnavailable("mock".into()));
        }
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
            words: self
                .text
                .split_whitespace()
                .map(|w| OcrWord {
                    text: w.to_string(),
                    confidence: self.confidence,
                })
                .collect(),
        })
    }
}

/// Rebuild page text and word confidences from Tesseract TSV.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = word. Confidence is 0-100, scaled to 0.0-1.0; -1 counts as 0.
pub fn page_from_tsv(tsv: &str) -> OcrPageResult {
    let mut words = Vec::new();
    let mut text = String::new();
    let mut current_line: Option<(u32, u32, u32, u32)> = None;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let Ok(level) = fields[0].parse::<i32>() else {
            continue;
        };
        if level != 5 {
            continue;
        }
        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let confidence = if conf < 0.0 { 0.0 } else { conf / 100.0 };

        let key = (
            fields[1].parse().unwrap_or(0),
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        match current_line {
            Some(prev) if prev == key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(key);
        text.push_str(word);

        words.push(OcrWord {
            text: word.to_string(),
            confidence,
        });
    }

    let confidence = if words.is_empty() {
        0.0
    } else {
        words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32
    };

    OcrPageResult {
        text,
        confidence,
        words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn mock_ocr_returns_configured_text() {
        let engine = MockOcrEngine::new("STAPLES TOTAL 12.50", 0.92);
        let result = engine.ocr(b"fake", "image/png").unwrap();
        assert_eq!(result.text, "STAPLES TOTAL 12.50");
        assert_eq!(result.words.len(), 3);
        assert!((result.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn mock_ocr_can_fail() {
        assert!(MockOcrEngine::failing().ocr(b"x", "image/png").is_err());
    }

    #[test]
    fn tsv_rebuilds_lines_and_mean_confidence() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t600\t800\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t90\tSTAPLES\n\
             5\t1\t1\t1\t2\t1\t10\t60\t120\t30\t80\tTOTAL\n\
             5\t1\t1\t1\t2\t2\t140\t60\t80\t30\t70\t$12.50"
        );
        let page = page_from_tsv(&tsv);
        assert_eq!(page.text, "STAPLES\nTOTAL $12.50");
        assert_eq!(page.words.len(), 3);
        assert!((page.confidence - 0.80).abs() < 1e-5);
    }

    #[test]
    fn tsv_negative_confidence_is_zero_and_empty_words_skipped() {
        let tsv = format!(
            "{HEADER}\n\
             5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t-1\tgarbled\n\
             5\t1\t1\t1\t1\t2\t10\t20\t80\t30\t90\t"
        );
        let page = page_from_tsv(&tsv);
        assert_eq!(page.words.len(), 1);
        assert_eq!(page.words[0].confidence, 0.0);
    }

    #[test]
    fn tsv_malformed_and_empty() {
        assert!(page_from_tsv("").text.is_empty());
        let tsv = format!("{HEADER}\ntoo\tfew\nnotanumber\t1\t1\t1\t1\t1\t1\t1\t1\t1\t50\tbad");
        let page = page_from_tsv(&tsv);
        assert!(page.words.is_empty());
        assert_eq!(page.confidence, 0.0);
    }

    #[test]
    fn missing_binary_reports_unavailable() {
        let engine = TesseractCli::new("/nonexistent/tesseract-binary");
        let err = engine.ocr(b"\x89PNG", "image/png").unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable(_)));
    }

    #[test]
    fn suffix_follows_mime() {
        assert_eq!(suffix_for("image/jpeg"), ".jpg");
        assert_eq!(suffix_for("application/x-unknown"), ".img");
    }
}
