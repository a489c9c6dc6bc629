//! Recursive character splitter with overlap.
//!
//! Splits a file's text into [`Chunk`]s of at most `chunk_size` characters,
//! trying paragraph breaks first, then line breaks, then spaces, and only
//! cutting inside a word as a last resort. Consecutive chunks share up to
//! `chunk_overlap` characters of trailing context.
//!
//! Every chunk receives a fresh UUID plus a SHA-256 hash of its text.
//! A file always yields at least one chunk, so an empty file still has a
//! content-store entry backing its metadata record.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::Chunk;

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Split `text` into chunks attributed to `source_path`.
/// Returns chunks with contiguous indices starting at 0.
pub fn chunk_text(source_path: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let pieces = split_text(text, chunk_size, overlap);

    if pieces.is_empty() {
        return vec![make_chunk(source_path, 0, text.trim())];
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(source_path, i as i64, piece))
        .collect()
}

/// Split `text` into trimmed, non-empty pieces.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size.saturating_sub(1));
    split_recursive(text, SEPARATORS, chunk_size, overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let idx = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len() - 1);
    let sep = separators[idx];
    let rest = &separators[idx + 1..];

    let splits: Vec<&str> = if sep.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(sep).filter(|s| !s.is_empty()).collect()
    };

    let mut out = Vec::new();
    let mut good: Vec<&str> = Vec::new();

    for s in splits {
        if char_len(s) <= size {
            good.push(s);
            continue;
        }
        if !good.is_empty() {
            out.extend(merge_splits(&good, sep, size, overlap));
            good.clear();
        }
        if rest.is_empty() {
            out.push(s.to_string());
        } else {
            out.extend(split_recursive(s, rest, size, overlap));
        }
    }

    if !good.is_empty() {
        out.extend(merge_splits(&good, sep, size, overlap));
    }

    out
}

/// Greedily pack small splits into pieces of at most `size` characters,
/// carrying up to `overlap` characters into the next piece.
fn merge_splits(splits: &[&str], sep: &str, size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(sep);
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &d in splits {
        let len = char_len(d);
        let joiner = if current.is_empty() { 0 } else { sep_len };

        if total + len + joiner > size && !current.is_empty() {
            push_joined(&mut docs, &current, sep);

            while total > overlap
                || (total > 0
                    && total + len + if current.is_empty() { 0 } else { sep_len } > size)
            {
                let Some(front) = current.front() else { break };
                let sep_part = if current.len() > 1 { sep_len } else { 0 };
                total -= char_len(front) + sep_part;
                current.pop_front();
            }
        }

        current.push_back(d);
        total += len + if current.len() > 1 { sep_len } else { 0 };
    }

    push_joined(&mut docs, &current, sep);
    docs
}

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>, sep: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(sep);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn make_chunk(source_path: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source_path: source_path.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        embedding: Vec::new(),
    }
}
