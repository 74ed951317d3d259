//! Size-bounded text chunking and token estimation.
//!
//! [`chunk_text`] splits prose/Markdown at natural boundaries (code fences,
//! paragraphs, sentences). [`chunk_code`] accumulates source lines for code
//! files. [`estimate_tokens`] is the cheap character heuristic every
//! token-budget check in the pipeline uses.

/// Natural cut points are only taken past this fraction of the target
/// size, which prevents tiny chunks.
const MIN_CUT_FRACTION: f64 = 0.3;

// ---------------------------------------------------------------------------
// Token estimation
// ---------------------------------------------------------------------------

/// Estimate the provider token count of `text`.
///
/// `len / 4` — a documented heuristic (1 token ≈ 4 characters of English),
/// not a real tokenizer. Callers must treat the result as an approximate
/// upper bound, never as exact.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

// ---------------------------------------------------------------------------
// Markdown/prose chunking
// ---------------------------------------------------------------------------

/// Split `text` into chunks of at most `target_size` bytes, cutting at
/// natural boundaries where possible.
///
/// Single forward pass, no backtracking. Within each candidate window the
/// cut point is chosen in priority order:
/// 1. last code-fence delimiter (```` ``` ````) past 30% of `target_size`
/// 2. last paragraph break (`\n\n`) past 30%
/// 3. last sentence terminator (`". "`) past 30% (the period is kept)
/// 4. hard break at `target_size`
///
/// Chunks are trimmed; all-whitespace chunks are skipped. The cursor grows
/// strictly each iteration, so the pass always terminates.
///
/// # Panics
///
/// Panics if `target_size` is zero.
pub fn chunk_text(text: &str, target_size: usize) -> Vec<String> {
    assert!(target_size > 0, "target_size must be positive");

    let min_cut = (target_size as f64 * MIN_CUT_FRACTION) as usize;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = start + target_size;

        // Remainder fits in one chunk.
        if end >= text.len() {
            let rest = text[start..].trim();
            if !rest.is_empty() {
                chunks.push(rest.to_string());
            }
            break;
        }

        // Hard-break candidates may land inside a multi-byte character.
        let mut end = floor_char_boundary(text, end);
        if end <= start {
            // Degenerate target smaller than one character: take the next
            // whole character so the cursor still advances.
            end = start
                + text[start..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
        }
        let window = &text[start..end];

        let cut = find_cut(window, min_cut).unwrap_or(window.len());
        debug_assert!(cut > 0, "cut point must advance the cursor");

        let piece = window[..cut].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        start += cut;
    }

    chunks
}

/// Pick a natural cut offset within `window`, or `None` for a hard break.
fn find_cut(window: &str, min_cut: usize) -> Option<usize> {
    // Code fences first: never split a fenced block unless nothing else
    // qualifies and the block itself exceeds the window.
    if let Some(pos) = window.rfind("```") {
        if pos > min_cut {
            return Some(pos);
        }
    }

    if let Some(pos) = window.rfind("\n\n") {
        if pos > min_cut {
            return Some(pos);
        }
    }

    if let Some(pos) = window.rfind(". ") {
        if pos > min_cut {
            // Keep the period with the preceding sentence.
            return Some(pos + 1);
        }
    }

    None
}

/// Largest index `<= at` that lies on a UTF-8 character boundary.
fn floor_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut i = at;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ---------------------------------------------------------------------------
// Code chunking
// ---------------------------------------------------------------------------

/// Split source code into chunks of roughly `target_size` bytes,
/// accumulating whole lines.
///
/// A single line longer than `target_size` becomes its own chunk rather
/// than being split mid-line.
pub fn chunk_code(content: &str, target_size: usize) -> Vec<String> {
    assert!(target_size > 0, "target_size must be positive");

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;

    for line in content.split('\n') {
        if current_size + line.len() > target_size && !current.is_empty() {
            let chunk = current.join("\n");
            if !chunk.trim().is_empty() {
                chunks.push(chunk);
            }
            current = vec![line];
            current_size = line.len();
        } else {
            current.push(line);
            current_size += line.len();
        }
    }

    if !current.is_empty() {
        let chunk = current.join("\n");
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_is_quarter_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_text("Hello, world.", 5000);
        assert_eq!(chunks, vec!["Hello, world.".to_string()]);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(chunk_text("   \n\n  \t ", 5000).is_empty());
        assert!(chunk_text("", 5000).is_empty());
    }

    #[test]
    fn hard_breaks_without_natural_boundaries() {
        // 12,000 chars with no paragraph/sentence/fence boundaries →
        // three hard-break chunks of ~5000, ~5000, ~2000.
        let text = "a".repeat(12_000);
        let chunks = chunk_text(&text, 5000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 5000);
        assert_eq!(chunks[1].len(), 5000);
        assert_eq!(chunks[2].len(), 2000);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let para = "word ".repeat(100).trim_end().to_string(); // ~499 chars
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunk_text(&text, 600);
        // Every chunk ends cleanly, none mid-word at a hard break.
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.ends_with("word"), "chunk ends mid-paragraph: {chunk:?}");
        }
    }

    #[test]
    fn prefers_sentence_breaks_over_hard_cut() {
        let sentence = "This is a sentence that keeps going for a while. ";
        let text = sentence.repeat(30);
        let chunks = chunk_text(&text, 500);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with('.'),
                "chunk should end at sentence boundary: {chunk:?}"
            );
        }
    }

    #[test]
    fn code_fence_not_split_when_boundary_available() {
        let before = "intro text\n\n".repeat(20); // ~240 chars
        let fence = format!("```rust\n{}\n```", "let x = 1;\n".repeat(30));
        let text = format!("{before}{fence}\n\nafter text");
        let chunks = chunk_text(&text, 400);

        // A fence delimiter count inside each chunk must be even: an odd
        // count means a fenced block was split across chunks.
        for chunk in &chunks {
            let fences = chunk.matches("```").count();
            assert_eq!(fences % 2, 0, "fence split across chunks: {chunk:?}");
        }
    }

    #[test]
    fn oversized_fence_is_hard_broken() {
        // A single fenced block larger than target_size cannot be kept
        // intact; it must still chunk (termination over purity).
        let fence = format!("```\n{}\n```", "data\n".repeat(500));
        let chunks = chunk_text(&fence, 300);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn reconstruction_up_to_boundary_whitespace() {
        let text = "First paragraph here.\n\nSecond paragraph follows. It has two sentences.\n\nThird one.";
        let chunks = chunk_text(text, 40);

        let rejoined: String = chunks.join("");
        let original_no_ws: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let rejoined_no_ws: String = rejoined.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(original_no_ws, rejoined_no_ws);
    }

    #[test]
    fn never_splits_multibyte_characters() {
        let text = "é".repeat(4000); // 2 bytes per char, no natural breaks
        let chunks = chunk_text(&text, 501); // odd target lands mid-char
        assert!(chunks.len() > 1);
        // Would have panicked on a bad boundary; also verify content survives.
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert_eq!(total, 4000);
    }

    #[test]
    fn cursor_always_advances() {
        // Pathological input: a fence delimiter at offset 0 of every window
        // must not produce a zero-length cut.
        let text = "```".repeat(2000);
        let chunks = chunk_text(&text, 100);
        assert!(!chunks.is_empty());
        let total: usize = chunks.iter().map(String::len).sum();
        assert_eq!(total, text.len());
    }

    #[test]
    fn code_chunks_on_line_boundaries() {
        let line = "fn helper() { body(); }";
        let content = vec![line; 50].join("\n");
        let chunks = chunk_code(&content, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            for l in chunk.split('\n') {
                assert_eq!(l, line);
            }
        }
    }

    #[test]
    fn code_single_long_line_kept_whole() {
        let long_line = "x".repeat(500);
        let content = format!("short\n{long_line}\nshort");
        let chunks = chunk_code(&content, 100);
        assert!(chunks.iter().any(|c| c.contains(&long_line)));
    }

    #[test]
    fn code_empty_input() {
        assert!(chunk_code("", 100).is_empty());
        assert!(chunk_code("\n\n\n", 100).is_empty());
    }
}
