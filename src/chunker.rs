//! Token-budgeted markdown chunking with structural awareness.
//!
//! The input is parsed into blocks first (headings, paragraphs, tables,
//! display equations, code fences); chunk boundaries then fall between
//! blocks, or between sentences when a paragraph alone exceeds the budget.
//! Atomic blocks are never split: one that exceeds the budget becomes its own
//! chunk, flagged oversized. Overlap between adjacent chunks is carried as
//! whole parts and whole sentences, so a chunk's trailing text reappears
//! verbatim as the next chunk's prefix.
//!
//! All token accounting comes from the encoder that will embed the chunks;
//! the chunker has no tokenizer of its own.

use std::ops::Range;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::encoder::Encoder;
use crate::error::PipelineError;
use crate::models::{Chunk, ChunkType};

const TOKEN_COUNT_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct ChunkerOptions {
    pub chunk_size: usize,
    pub overlap_fraction: f64,
    pub preserve_tables: bool,
    pub preserve_equations: bool,
}

impl From<&ChunkingConfig> for ChunkerOptions {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap_fraction: config.chunk_overlap,
            preserve_tables: config.preserve_tables,
            preserve_equations: config.preserve_equations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading,
    Paragraph,
    ListItem,
    Table,
    Equation,
    CodeFence,
}

#[derive(Debug, Clone)]
struct Block {
    kind: BlockKind,
    text: String,
    section_path: Vec<String>,
    atomic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    Text,
    Table,
    Equation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    /// Preceded by a blank line in the assembled chunk.
    Block,
    /// Continues the same paragraph; concatenated directly.
    Inline,
}

/// Unit of chunk assembly: a whole block, or one sentence of an oversize
/// paragraph. Carried copies (overlap) have `fresh == false`.
#[derive(Debug, Clone)]
struct Part {
    text: String,
    tokens: i64,
    kind: PartKind,
    joiner: Joiner,
    fresh: bool,
    splittable: bool,
    section_path: Vec<String>,
}

/// Chunk `markdown` for `document_id` under the given budget.
pub async fn chunk_markdown(
    document_id: &str,
    markdown: &str,
    opts: &ChunkerOptions,
    encoder: &dyn Encoder,
) -> Result<Vec<Chunk>, PipelineError> {
    let blocks = parse_blocks(markdown, opts);
    if blocks.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = opts.chunk_size as i64;
    let max_tokens = encoder.max_tokens() as i64;
    let max_overlap = (opts.chunk_size as f64 * opts.overlap_fraction).floor() as i64;

    let block_texts: Vec<String> = blocks.iter().map(|b| b.text.clone()).collect();
    let block_counts = count_batched(encoder, &block_texts).await?;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut parts: Vec<Part> = Vec::new();
    let mut sum: i64 = 0;

    for (block, &count) in blocks.iter().zip(block_counts.iter()) {
        let tokens = count as i64;

        let incoming: Vec<Part> = if !block.atomic && tokens > chunk_size {
            sentence_parts(block, encoder).await?
        } else {
            vec![Part {
                text: block.text.clone(),
                tokens,
                kind: part_kind(block.kind),
                joiner: Joiner::Block,
                fresh: true,
                splittable: matches!(block.kind, BlockKind::Paragraph | BlockKind::ListItem),
                section_path: block.section_path.clone(),
            }]
        };

        for part in incoming {
            if part.tokens > max_tokens {
                return Err(PipelineError::ChunkSizeExceeded {
                    tokens: part.tokens as usize,
                    max_tokens: encoder.max_tokens(),
                });
            }

            // An indivisible part beyond the budget stands alone, with no
            // overlap in either direction.
            if part.tokens > chunk_size {
                if parts.iter().any(|p| p.fresh) {
                    chunks.push(assemble(document_id, &parts, 0, false));
                } else if !parts.is_empty() {
                    if let Some(last) = chunks.last_mut() {
                        last.overlap_end = 0;
                    }
                }
                parts.clear();
                sum = 0;
                chunks.push(assemble(document_id, std::slice::from_ref(&part), 0, true));
                continue;
            }

            if sum + part.tokens > chunk_size && !parts.is_empty() {
                let carry = carried_parts(&parts, max_overlap, encoder).await?;
                let carried: i64 = carry.iter().map(|c| c.tokens).sum();
                chunks.push(assemble(document_id, &parts, carried, false));
                parts = carry;
                sum = carried;
                if sum + part.tokens > chunk_size {
                    // Overlap plus this part would overflow; the new chunk
                    // starts clean instead.
                    if let Some(last) = chunks.last_mut() {
                        last.overlap_end = 0;
                    }
                    parts.clear();
                    sum = 0;
                }
            }

            sum += part.tokens;
            parts.push(part);
        }
    }

    if parts.iter().any(|p| p.fresh) {
        chunks.push(assemble(document_id, &parts, 0, false));
    } else if !parts.is_empty() {
        if let Some(last) = chunks.last_mut() {
            last.overlap_end = 0;
        }
    }

    let total = chunks.len() as i64;
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.position_in_doc = i as i64;
        chunk.total_chunks = total;
    }

    Ok(chunks)
}

fn part_kind(kind: BlockKind) -> PartKind {
    match kind {
        BlockKind::Table => PartKind::Table,
        BlockKind::Equation => PartKind::Equation,
        _ => PartKind::Text,
    }
}

/// Split an oversize non-atomic block into one part per sentence. Sentence
/// pieces are exact substrings, trailing whitespace included, so
/// concatenating them reconstructs the block.
async fn sentence_parts(block: &Block, encoder: &dyn Encoder) -> Result<Vec<Part>, PipelineError> {
    let ranges = split_sentences(&block.text);
    let pieces: Vec<String> = ranges.iter().map(|r| block.text[r.clone()].to_string()).collect();
    let counts = count_batched(encoder, &pieces).await?;

    Ok(pieces
        .into_iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (text, count))| Part {
            text,
            tokens: count as i64,
            kind: part_kind(block.kind),
            joiner: if i == 0 { Joiner::Block } else { Joiner::Inline },
            fresh: true,
            splittable: false,
            section_path: block.section_path.clone(),
        })
        .collect())
}

/// Parts to prepend to the next chunk as overlap: whole trailing parts while
/// they fit the budget, then whole trailing sentences of the first part that
/// does not.
async fn carried_parts(
    parts: &[Part],
    max_overlap: i64,
    encoder: &dyn Encoder,
) -> Result<Vec<Part>, PipelineError> {
    if max_overlap <= 0 {
        return Ok(Vec::new());
    }

    let mut budget = max_overlap;
    let mut carry_rev: Vec<Part> = Vec::new();

    for part in parts.iter().rev() {
        if part.tokens > 0 && part.tokens <= budget {
            let mut copy = part.clone();
            copy.fresh = false;
            budget -= part.tokens;
            carry_rev.push(copy);
            continue;
        }

        if part.splittable && budget > 0 {
            let ranges = split_sentences(&part.text);
            if ranges.len() > 1 {
                let pieces: Vec<String> =
                    ranges.iter().map(|r| part.text[r.clone()].to_string()).collect();
                let counts = count_batched(encoder, &pieces).await?;

                let mut taken: i64 = 0;
                let mut start_idx = ranges.len();
                for k in (0..ranges.len()).rev() {
                    let t = counts[k] as i64;
                    if t > 0 && taken + t <= budget {
                        taken += t;
                        start_idx = k;
                    } else {
                        break;
                    }
                }
                if start_idx < ranges.len() && taken > 0 {
                    carry_rev.push(Part {
                        text: part.text[ranges[start_idx].start..].to_string(),
                        tokens: taken,
                        kind: part.kind,
                        joiner: Joiner::Block,
                        fresh: false,
                        splittable: false,
                        section_path: part.section_path.clone(),
                    });
                }
            }
        }
        break;
    }

    carry_rev.reverse();
    Ok(carry_rev)
}

fn assemble(document_id: &str, parts: &[Part], overlap_end: i64, oversized: bool) -> Chunk {
    let mut text = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && part.joiner == Joiner::Block {
            text.push_str("\n\n");
        }
        text.push_str(&part.text);
    }

    let token_count: i64 = parts.iter().map(|p| p.tokens).sum();
    let overlap_start: i64 = parts.iter().filter(|p| !p.fresh).map(|p| p.tokens).sum();

    let section_path = parts
        .iter()
        .find(|p| p.fresh)
        .or_else(|| parts.first())
        .map(|p| p.section_path.clone())
        .unwrap_or_default();

    let has_text = parts.iter().any(|p| p.kind == PartKind::Text && p.tokens > 0);
    let has_table = parts.iter().any(|p| p.kind == PartKind::Table);
    let has_equation = parts.iter().any(|p| p.kind == PartKind::Equation);
    let chunk_type = match (has_text, has_table, has_equation) {
        (_, false, false) => ChunkType::Text,
        (false, true, false) => ChunkType::Table,
        (false, false, true) => ChunkType::Equation,
        _ => ChunkType::Mixed,
    };

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        position_in_doc: 0,
        total_chunks: 0,
        text,
        token_count,
        section_path,
        overlap_start,
        overlap_end,
        chunk_type,
        oversized,
    }
}

async fn count_batched(
    encoder: &dyn Encoder,
    texts: &[String],
) -> Result<Vec<usize>, PipelineError> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(TOKEN_COUNT_BATCH) {
        out.extend(encoder.token_counts(batch).await?);
    }
    Ok(out)
}

/// Byte ranges of sentences: each runs through its terminator punctuation and
/// any following whitespace. Text without terminators is one sentence.
fn split_sentences(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            while i < bytes.len() && matches!(bytes[i], b'.' | b'!' | b'?') {
                i += 1;
            }
            if i >= bytes.len() || bytes[i].is_ascii_whitespace() {
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                ranges.push(start..i);
                start = i;
            }
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        ranges.push(start..bytes.len());
    }
    ranges
}

fn parse_blocks(markdown: &str, opts: &ChunkerOptions) -> Vec<Block> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut blocks = Vec::new();
    let mut stack: Vec<(u8, String)> = Vec::new();
    let mut i = 0;

    fn path_of(stack: &[(u8, String)]) -> Vec<String> {
        stack.iter().map(|(_, t)| t.clone()).collect()
    }

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if let Some(level) = heading_level(line) {
            let title = line[level as usize..].trim().to_string();
            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            stack.push((level, title));
            blocks.push(Block {
                kind: BlockKind::Heading,
                text: line.trim_end().to_string(),
                section_path: path_of(&stack),
                atomic: false,
            });
            i += 1;
            continue;
        }

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            let fence = &trimmed[..3];
            let mut text = String::from(line);
            i += 1;
            while i < lines.len() {
                text.push('\n');
                text.push_str(lines[i]);
                let closed = lines[i].trim_start().starts_with(fence);
                i += 1;
                if closed {
                    break;
                }
            }
            blocks.push(Block {
                kind: BlockKind::CodeFence,
                text,
                section_path: path_of(&stack),
                atomic: true,
            });
            continue;
        }

        if trimmed.starts_with("$$") {
            let mut text = String::from(line);
            let closed_inline = trimmed.len() > 2 && trimmed.ends_with("$$");
            i += 1;
            if !closed_inline {
                while i < lines.len() {
                    text.push('\n');
                    text.push_str(lines[i]);
                    let closed = lines[i].trim_end().ends_with("$$");
                    i += 1;
                    if closed {
                        break;
                    }
                }
            }
            blocks.push(Block {
                kind: BlockKind::Equation,
                text,
                section_path: path_of(&stack),
                atomic: opts.preserve_equations,
            });
            continue;
        }

        if trimmed.starts_with('|') {
            let mut text = String::from(line);
            i += 1;
            while i < lines.len() && lines[i].trim_start().starts_with('|') {
                text.push('\n');
                text.push_str(lines[i]);
                i += 1;
            }
            blocks.push(Block {
                kind: BlockKind::Table,
                text,
                section_path: path_of(&stack),
                atomic: opts.preserve_tables,
            });
            continue;
        }

        // List items: one block per item, so chunk boundaries can fall
        // between items. Indented lines continue the current item.
        if is_list_item(trimmed) {
            let mut text = String::from(line);
            i += 1;
            while i < lines.len() {
                let next = lines[i];
                if next.trim().is_empty()
                    || !(next.starts_with(' ') || next.starts_with('\t'))
                    || is_list_item(next.trim())
                {
                    break;
                }
                text.push('\n');
                text.push_str(next);
                i += 1;
            }
            blocks.push(Block {
                kind: BlockKind::ListItem,
                text,
                section_path: path_of(&stack),
                atomic: false,
            });
            continue;
        }

        // Paragraph: runs until a blank line or the next structural line.
        let mut text = String::from(line);
        i += 1;
        while i < lines.len() {
            let next = lines[i];
            let t = next.trim();
            if t.is_empty()
                || heading_level(next).is_some()
                || t.starts_with("```")
                || t.starts_with("~~~")
                || t.starts_with("$$")
                || t.starts_with('|')
                || is_list_item(t)
            {
                break;
            }
            text.push('\n');
            text.push_str(next);
            i += 1;
        }
        blocks.push(Block {
            kind: BlockKind::Paragraph,
            text,
            section_path: path_of(&stack),
            atomic: false,
        });
    }

    blocks
}

/// Bullet (`- `, `* `, `+ `) or numbered (`1. `, `1) `) list item marker.
fn is_list_item(trimmed: &str) -> bool {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return !rest.trim().is_empty();
        }
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if (rest.starts_with(". ") || rest.starts_with(") ")) && rest.len() > 2 {
            return true;
        }
    }
    false
}

fn heading_level(line: &str) -> Option<u8> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    if line[hashes..].starts_with(' ') {
        Some(hashes as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::LexicalEncoder;

    fn opts(chunk_size: usize, overlap: f64) -> ChunkerOptions {
        ChunkerOptions {
            chunk_size,
            overlap_fraction: overlap,
            preserve_tables: true,
            preserve_equations: true,
        }
    }

    fn encoder() -> LexicalEncoder {
        LexicalEncoder::new(32, 100_000)
    }

    /// Longest k such that `next` starts with the last k bytes of `prev`.
    fn shared_boundary(prev: &str, next: &str) -> usize {
        let max = prev.len().min(next.len());
        for k in (1..=max).rev() {
            if !prev.is_char_boundary(prev.len() - k) || !next.is_char_boundary(k) {
                continue;
            }
            if prev.ends_with(&next[..k]) {
                return k;
            }
        }
        0
    }

    #[tokio::test]
    async fn empty_markdown_yields_no_chunks() {
        let chunks = chunk_markdown("d1", "", &opts(1024, 0.1), &encoder())
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn small_document_is_one_chunk() {
        let md = "# Intro\n\nShort text here.\n";
        let chunks = chunk_markdown("d1", md, &opts(1024, 0.1), &encoder())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.position_in_doc, 0);
        assert_eq!(c.total_chunks, 1);
        assert_eq!(c.overlap_start, 0);
        assert_eq!(c.overlap_end, 0);
        assert_eq!(c.chunk_type, ChunkType::Text);
        assert!(!c.oversized);
        assert!(c.text.contains("Short text here."));
    }

    #[tokio::test]
    async fn chunks_respect_the_token_budget() {
        let paragraphs: Vec<String> = (0..12)
            .map(|i| format!("Paragraph number {i} carries several words of body text."))
            .collect();
        let md = paragraphs.join("\n\n");
        let chunks = chunk_markdown("d1", &md, &opts(30, 0.0), &encoder())
            .await
            .unwrap();

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 30, "chunk over budget: {}", c.token_count);
            assert!(!c.oversized);
        }
        let positions: Vec<i64> = chunks.iter().map(|c| c.position_in_doc).collect();
        let expected: Vec<i64> = (0..chunks.len() as i64).collect();
        assert_eq!(positions, expected);
        assert!(chunks.iter().all(|c| c.total_chunks == chunks.len() as i64));
    }

    #[tokio::test]
    async fn oversize_table_becomes_its_own_chunk() {
        let mut table = String::from("| col a | col b |\n|---|---|\n");
        for i in 0..30 {
            table.push_str(&format!("| value {i} | other {i} |\n"));
        }
        let md = format!("Lead paragraph.\n\n{table}\nTrailing paragraph.");
        let chunks = chunk_markdown("d1", &md, &opts(40, 0.0), &encoder())
            .await
            .unwrap();

        let oversized: Vec<&Chunk> = chunks.iter().filter(|c| c.oversized).collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].chunk_type, ChunkType::Table);
        assert_eq!(oversized[0].overlap_start, 0);
        assert_eq!(oversized[0].overlap_end, 0);
        assert!(oversized[0].text.contains("| value 29 |"));
    }

    #[tokio::test]
    async fn unpreserved_table_is_split_like_text() {
        let mut table = String::from("| col a | col b |\n|---|---|\n");
        for i in 0..40 {
            table.push_str(&format!("| cell holds value {i}. | other cell {i}. |\n"));
        }
        let options = ChunkerOptions {
            preserve_tables: false,
            ..opts(40, 0.0)
        };
        let chunks = chunk_markdown("d1", &table, &options, &encoder())
            .await
            .unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.oversized && c.token_count <= 40));
    }

    #[tokio::test]
    async fn equation_block_stays_whole() {
        let md = "Before.\n\n$$\nE = mc^2\n$$\n\nAfter.";
        let chunks = chunk_markdown("d1", md, &opts(1024, 0.0), &encoder())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("$$\nE = mc^2\n$$"));
        assert_eq!(chunks[0].chunk_type, ChunkType::Mixed);
    }

    #[tokio::test]
    async fn atomic_block_beyond_encoder_limit_is_an_error() {
        let mut table = String::from("| a |\n|---|\n");
        for i in 0..50 {
            table.push_str(&format!("| row {i} |\n"));
        }
        let small_limit = LexicalEncoder::new(32, 40);
        let result = chunk_markdown("d1", &table, &opts(40, 0.0), &small_limit).await;
        assert!(matches!(
            result,
            Err(PipelineError::ChunkSizeExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn oversize_paragraph_splits_at_sentence_boundaries() {
        let sentences: Vec<String> = (0..20)
            .map(|i| format!("Sentence number {i} has a handful of words."))
            .collect();
        let md = sentences.join(" ");
        let chunks = chunk_markdown("d1", &md, &opts(30, 0.0), &encoder())
            .await
            .unwrap();

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 30);
            // Boundaries fall after terminators, never mid-sentence.
            assert!(c.text.trim_end().ends_with('.'));
        }
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect::<String>();
        assert!(rebuilt.contains("Sentence number 19"));
    }

    #[tokio::test]
    async fn single_unsplittable_sentence_is_oversized() {
        let words: Vec<String> = (0..60).map(|i| format!("word{i}")).collect();
        let md = words.join(" ");
        let chunks = chunk_markdown("d1", &md, &opts(30, 0.0), &encoder())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].oversized);
        assert!(chunks[0].token_count > 30);
    }

    #[tokio::test]
    async fn overlap_suffix_matches_next_prefix() {
        let sentences: Vec<String> = (0..24)
            .map(|i| format!("Distinct sentence {i} contributes content."))
            .collect();
        let md = sentences.join(" ");
        let chunks = chunk_markdown("d1", &md, &opts(20, 0.5), &encoder())
            .await
            .unwrap();

        assert!(chunks.len() > 1);
        let mut saw_overlap = false;
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].overlap_end, pair[1].overlap_start);
            if pair[1].overlap_start > 0 {
                saw_overlap = true;
                assert!(
                    shared_boundary(&pair[0].text, &pair[1].text) > 0,
                    "carried text must open the next chunk verbatim"
                );
            }
        }
        assert!(saw_overlap);
    }

    #[tokio::test]
    async fn zero_overlap_produces_disjoint_chunks() {
        let sentences: Vec<String> = (0..20)
            .map(|i| format!("Plain sentence {i} goes here."))
            .collect();
        let md = sentences.join(" ");
        let chunks = chunk_markdown("d1", &md, &opts(25, 0.0), &encoder())
            .await
            .unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.overlap_start == 0 && c.overlap_end == 0));
    }

    #[tokio::test]
    async fn last_chunk_carries_no_forward_overlap() {
        let sentences: Vec<String> = (0..18)
            .map(|i| format!("Sentence {i} adds a few tokens."))
            .collect();
        let md = sentences.join(" ");
        let chunks = chunk_markdown("d1", &md, &opts(24, 0.5), &encoder())
            .await
            .unwrap();
        assert_eq!(chunks.last().unwrap().overlap_end, 0);
    }

    #[tokio::test]
    async fn section_paths_follow_the_heading_tree() {
        let md = "# Paper Title\n\nAbstract text.\n\n## Methods\n\nMethod details.\n\n### Data\n\nData details.\n\n## Results\n\nResult text.\n";
        let chunks = chunk_markdown("d1", md, &opts(1024, 0.0), &encoder())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);

        // Force per-section chunks with a tiny budget to observe the paths.
        let chunks = chunk_markdown("d1", md, &opts(6, 0.0), &encoder())
            .await
            .unwrap();
        let data_chunk = chunks
            .iter()
            .find(|c| c.text.contains("Data details."))
            .unwrap();
        assert_eq!(
            data_chunk.section_path,
            vec!["Paper Title", "Methods", "Data"]
        );
        let results_chunk = chunks
            .iter()
            .find(|c| c.text.contains("Result text."))
            .unwrap();
        assert_eq!(results_chunk.section_path, vec!["Paper Title", "Results"]);
    }

    #[tokio::test]
    async fn mixed_chunk_type_for_text_plus_table() {
        let md = "Some text before.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
        let chunks = chunk_markdown("d1", md, &opts(1024, 0.0), &encoder())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Mixed);
    }

    #[test]
    fn sentence_splitter_keeps_exact_substrings() {
        let text = "First one. Second two! Third three? Tail without end";
        let ranges = split_sentences(text);
        assert_eq!(ranges.len(), 4);
        let rebuilt: String = ranges.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(rebuilt, text);
        assert_eq!(&text[ranges[0].clone()], "First one. ");
        assert_eq!(&text[ranges[3].clone()], "Tail without end");
    }

    #[tokio::test]
    async fn long_lists_chunk_between_items() {
        let items: Vec<String> = (0..40)
            .map(|i| format!("- item {i} describes one finding"))
            .collect();
        let md = format!("# Findings\n\n{}", items.join("\n"));
        let chunks = chunk_markdown("d1", &md, &opts(30, 0.0), &encoder())
            .await
            .unwrap();

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 30, "chunk over budget: {}", c.token_count);
            assert!(!c.oversized);
        }
        let all: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert!(all.contains("- item 39"));
    }

    #[test]
    fn bullet_and_numbered_lines_parse_as_list_items() {
        let md = "- alpha\n- beta\n1. gamma\n2) delta\nplain paragraph text";
        let blocks = parse_blocks(md, &opts(1024, 0.0));
        assert_eq!(blocks.len(), 5);
        assert!(blocks[..4].iter().all(|b| b.kind == BlockKind::ListItem));
        assert_eq!(blocks[4].kind, BlockKind::Paragraph);

        // An indented line continues the item it belongs to.
        let md = "- first item\n  carries onto a second line\n- second item";
        let blocks = parse_blocks(md, &opts(1024, 0.0));
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].text.contains("second line"));
    }

    #[test]
    fn code_fences_parse_as_atomic_blocks() {
        let md = "Intro.\n\n```rust\nfn main() {}\n```\n\nOutro.";
        let blocks = parse_blocks(md, &opts(1024, 0.0));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].kind, BlockKind::CodeFence);
        assert!(blocks[1].atomic);
        assert!(blocks[1].text.contains("fn main() {}"));
    }
}
