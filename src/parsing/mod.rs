//! File classification, decoding, and line-numbered formatting
//!
//! The parser turns raw bytes into a stored document: a binary sniff over a
//! fixed-size prefix, a statistical encoding detection with UTF-8 fallback,
//! a language label, and a header + line-numbered body whose numbering the
//! downstream query engine relies on for `path:line` citations.

pub mod language;

use chardetng::EncodingDetector;
use encoding_rs::UTF_8;
use serde::{Deserialize, Serialize};

use crate::errors::SkipReason;

/// How much of a file the binary and encoding sniffers look at.
const SNIFF_LEN: usize = 8192;
/// Fraction of control bytes in the sample that flags a file as binary.
const BINARY_CONTROL_RATIO: f32 = 0.30;
/// Minimum line-number field width.
const MIN_NUMBER_WIDTH: usize = 4;

/// Output formatting flags. Both default off so non-ingestion callers get
/// the legacy unformatted passthrough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Prefix every line with a right-aligned, zero-padded number.
    pub line_numbers: bool,
    /// Emit the full relative path as the first output line.
    pub path_header: bool,
}

impl ParseOptions {
    /// Both flags on, as the ingestion pipeline stores documents.
    pub fn ingestion() -> Self {
        Self {
            line_numbers: true,
            path_header: true,
        }
    }
}

/// One classified, decoded, and formatted file. Transient; exists only to
/// cross into the project store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub relative_path: String,
    pub language_hint: String,
    pub encoding: String,
    pub line_count: usize,
    pub formatted_content: String,
    pub skipped: Option<SkipReason>,
}

impl ParsedFile {
    fn skipped(relative_path: &str, reason: SkipReason) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            language_hint: "binary".to_string(),
            encoding: String::new(),
            line_count: 0,
            formatted_content: String::new(),
            skipped: Some(reason),
        }
    }
}

/// Classifies, decodes, and formats files for ingestion.
pub struct CodeParser {
    options: ParseOptions,
}

impl CodeParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Classify and format one file. Never fails: unparseable inputs come
    /// back with a `SkipReason` set.
    pub fn parse(&self, bytes: &[u8], relative_path: &str) -> ParsedFile {
        if is_binary(bytes) {
            return ParsedFile::skipped(relative_path, SkipReason::Binary);
        }

        let (text, encoding) = match decode(bytes) {
            Ok(decoded) => decoded,
            Err(reason) => return ParsedFile::skipped(relative_path, reason),
        };

        let language_hint = language::infer(relative_path, &text);
        let (formatted_content, line_count) = self.format(&text, relative_path);

        ParsedFile {
            relative_path: relative_path.to_string(),
            language_hint,
            encoding: encoding.to_string(),
            line_count,
            formatted_content,
            skipped: None,
        }
    }

    fn format(&self, text: &str, relative_path: &str) -> (String, usize) {
        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();

        if !self.options.line_numbers && !self.options.path_header {
            return (text.to_string(), total);
        }

        let width = number_width(total);
        let mut out = String::with_capacity(text.len() + total * (width + 1) + 64);
        if self.options.path_header {
            out.push_str(relative_path);
            out.push('\n');
        }
        for (index, line) in lines.iter().enumerate() {
            if self.options.line_numbers {
                out.push_str(&format!("{:0width$} ", index + 1, width = width));
            }
            out.push_str(line);
            out.push('\n');
        }
        (out, total)
    }
}

/// Field width for line numbers: at least four digits, growing with the file.
fn number_width(total_lines: usize) -> usize {
    let mut digits = 1;
    let mut remaining = total_lines;
    while remaining >= 10 {
        remaining /= 10;
        digits += 1;
    }
    MIN_NUMBER_WIDTH.max(digits)
}

/// Fixed-size prefix heuristic: any NUL byte, or too many control bytes,
/// marks the file binary. Bytes >= 0x80 are legitimate in UTF-8 and legacy
/// encodings and do not count against the ratio.
fn is_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }

    let control = sample
        .iter()
        .filter(|&&b| (b < 0x08) || (0x0e..0x20).contains(&b) || b == 0x7f)
        .count();
    (control as f32) / (sample.len() as f32) > BINARY_CONTROL_RATIO
}

/// Statistical detection over the byte sample, decode with the guess, fall
/// back to strict UTF-8 when the guess mangles the content.
fn decode(bytes: &[u8]) -> Result<(String, &'static str), SkipReason> {
    if bytes.is_empty() {
        return Ok((String::new(), UTF_8.name()));
    }

    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    let mut detector = EncodingDetector::new();
    detector.feed(sample, bytes.len() <= SNIFF_LEN);
    let guessed = detector.guess(None, true);

    let (decoded, actual, had_errors) = guessed.decode(bytes);
    if !had_errors {
        return Ok((decoded.into_owned(), actual.name()));
    }

    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Ok((text, UTF_8.name())),
        Err(_) => Err(SkipReason::EncodingError),
    }
}
