//! Content fingerprinting for solution text.
//!
//! Two texts that differ only in line-ending style, trailing whitespace per
//! line, or prose surrounding identical fenced code blocks must fingerprint
//! to the same id — that's the entire point of canonicalizing before
//! hashing. See `canonicalize` for the exact rule.

use sha2::{Digest, Sha256};

/// Normalizes `text` so that cosmetic differences don't change its
/// fingerprint.
///
/// - Line endings (`\r\n`, `\r`) are normalized to `\n`.
/// - Trailing whitespace is stripped from each line.
/// - If the text contains one or more fenced code blocks (delimited by
///   triple backticks), the canonical form is the concatenation of the
///   code-block *bodies* only, in source order, with the language tag on
///   the opening fence ignored. Everything outside the fences — headings,
///   explanations, a closing remark — is dropped for fingerprinting
///   purposes.
pub fn canonicalize(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').map(|l| l.trim_end()).collect();
    let normalized = lines.join("\n");

    let blocks = extract_code_blocks(&normalized);
    if blocks.is_empty() {
        normalized
    } else {
        blocks.join("\n")
    }
}

/// Returns the body of every ```-fenced code block in `text`, in order,
/// with the fence line's language tag discarded. A closing fence is
/// assumed; an unterminated trailing fence is treated as running to the
/// end of the text.
fn extract_code_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut lines = text.split('\n').peekable();
    let mut current: Option<Vec<&str>> = None;

    while let Some(line) = lines.next() {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(body) => blocks.push(body.join("\n")),
                None => current = Some(Vec::new()),
            }
        } else if let Some(body) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some(body) = current {
        blocks.push(body.join("\n"));
    }
    blocks
}

/// Computes the `AnswerId` for a solution text: a hex-encoded SHA-256
/// digest of its canonical form.
pub fn compute_answer_id(text: &str) -> String {
    let canonical = canonicalize(text);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
