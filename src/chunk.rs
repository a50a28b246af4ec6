//! Paragraph-boundary text chunker.
//!
//! Splits a UTF-8 text blob into ordered chunks of roughly 200 words,
//! never exceeding 250, breaking preferentially at natural structural
//! boundaries (headings, list items, fences, rules, block quotes) so a
//! chunk reads as one coherent unit of a note rather than an arbitrary
//! slice of it.
//!
//! Pure and deterministic: no I/O, no randomness. Frontmatter delimited by
//! `---` lines is stripped before chunking so two notes differing only in
//! frontmatter produce identical chunks for identical bodies.

const TARGET_WORDS: usize = 200;
const MAX_WORDS: usize = 250;
const MIN_WORDS: usize = 10;

/// Split `text` into ordered chunk strings, each 10–250 words (barring an
/// input with fewer than 10 words total, which yields zero chunks).
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with_bounds(text, TARGET_WORDS, MAX_WORDS, MIN_WORDS)
}

/// Like [`chunk_text`], with caller-supplied word bounds instead of the
/// defaults. `target_words` should be between `min_words` and `max_words`.
pub fn chunk_text_with_bounds(
    text: &str,
    target_words: usize,
    max_words: usize,
    min_words: usize,
) -> Vec<String> {
    let body = strip_frontmatter(text);
    let lines: Vec<&str> = body.lines().collect();

    let mut rough_chunks: Vec<String> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_words = 0usize;
    let mut prev_blank = true;

    for i in 0..lines.len() {
        let line = lines[i];
        let line_words = count_words(line);
        let blank = line.trim().is_empty();
        let natural_break = !blank && is_natural_break(&lines, i, prev_blank);

        let would_be = buf_words + line_words;

        if would_be > max_words && !buf.is_empty() {
            rough_chunks.push(buf.join("\n"));
            buf.clear();
            buf_words = 0;
        } else if would_be > target_words && natural_break && !buf.is_empty() {
            rough_chunks.push(buf.join("\n"));
            buf.clear();
            buf_words = 0;
        }

        buf.push(line);
        buf_words += line_words;
        prev_blank = blank;
    }

    if !buf.is_empty() {
        rough_chunks.push(buf.join("\n"));
    }

    let mut final_chunks: Vec<String> = Vec::new();
    for chunk in rough_chunks {
        split_oversized(&chunk, max_words, &mut final_chunks);
    }

    final_chunks
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| count_words(c) >= min_words)
        .collect()
}

/// If `chunk` exceeds `max_words`, split it at sentence boundaries, then
/// force-split any still-oversized sentence into `max_words`-word pieces.
fn split_oversized(chunk: &str, max_words: usize, out: &mut Vec<String>) {
    if count_words(chunk) <= max_words {
        out.push(chunk.to_string());
        return;
    }

    for sentence in split_sentences(chunk) {
        if count_words(&sentence) <= max_words {
            out.push(sentence);
        } else {
            out.extend(force_split_words(&sentence, max_words));
        }
    }
}

/// Split on sentence-ending punctuation (". ", "! ", "? "), keeping the
/// delimiter with the preceding sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let next_is_space = chars.get(i + 1).is_some_and(|c| *c == ' ');
            if next_is_space {
                current.push(' ');
                sentences.push(std::mem::take(&mut current));
                i += 2;
                continue;
            }
        }
        i += 1;
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    if sentences.is_empty() {
        sentences.push(text.to_string());
    }
    sentences
}

/// Hard-split text into `max_words`-word pieces on whitespace.
fn force_split_words(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words)
        .map(|c| c.join(" "))
        .collect()
}

fn count_words(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Strip a leading frontmatter block delimited by lines equal to `---`.
fn strip_frontmatter(text: &str) -> &str {
    let mut lines = text.lines();
    let Some(first) = lines.next() else {
        return text;
    };
    if first.trim() != "---" {
        return text;
    }
    // Find the closing `---` line; if none exists, there is no frontmatter
    // to strip (an opening delimiter alone is not a complete block).
    let mut offset = first.len() + 1;
    for line in lines {
        if line.trim() == "---" {
            offset += line.len() + 1;
            return text.get(offset..).unwrap_or("");
        }
        offset += line.len() + 1;
    }
    text
}

fn is_natural_break(lines: &[&str], i: usize, prev_blank: bool) -> bool {
    let line = lines[i];

    if prev_blank {
        return true;
    }
    if is_heading(line) || is_fence(line) || is_hr(line) || is_blockquote(line) {
        return true;
    }
    if list_kind(line).is_some() {
        return true;
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Ordered,
    Unordered,
}

fn list_kind(line: &str) -> Option<ListKind> {
    let trimmed = line.trim_start();
    if is_unordered_marker(trimmed) {
        return Some(ListKind::Unordered);
    }
    if is_ordered_marker(trimmed) {
        return Some(ListKind::Ordered);
    }
    None
}

fn is_unordered_marker(trimmed: &str) -> bool {
    trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ")
}

fn is_ordered_marker(trimmed: &str) -> bool {
    let digits_end = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(0);
    digits_end > 0 && trimmed[digits_end..].starts_with(". ")
}

fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && trimmed.as_bytes().get(hashes) == Some(&b' ')
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn is_blockquote(line: &str) -> bool {
    line.trim_start().starts_with("> ")
}

/// A run of three or more `-`, `*`, or `_` (optionally space-separated),
/// and nothing else on the line.
fn is_hr(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 3 {
        return false;
    }
    let stripped: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.len() < 3 {
        return false;
    }
    let first = stripped.chars().next().unwrap();
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    stripped.chars().all(|c| c == first)
}
