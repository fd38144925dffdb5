//! Splits admissions documents into retrievable chunks.
//!
//! The primary pass splits on section lines and on lines that open a program
//! record. When it yields too few chunks, a line-by-line pass that also
//! recognises program labels in the middle of a line is tried instead.

#[cfg(test)]
mod tests;

pub mod metadata;
pub mod splitter;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use metadata::{ProgramFields, extract_program_fields};
use splitter::{SplitSettings, split_with_overlap};

static SECTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:section|القسم|قسم)(?:[^\S\n]*[:：\-–][^\S\n]*|[^\S\n]+)(\S.*?)\s*$")
        .expect("section pattern is valid")
});

static PROGRAM_START_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+\s*[.)\-–]\s*|[-•*▪●]\s*)?(?:اسم البرنامج|program name)\s*[:：]")
        .expect("program start pattern is valid")
});

static SEPARATOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([-=_*#~─━])\1{4,}\s*$").expect("separator pattern is valid")
});

static NOTES_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:ملاحظات|تعليمات|إرشادات|notes|instructions)")
        .expect("notes pattern is valid")
});

static PROGRAM_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:اسم البرنامج|program name)\s*[:：]").expect("program label pattern is valid")
});

static CODE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:رمز البرنامج|كود البرنامج|program code)\s*[:：]")
        .expect("code label pattern is valid")
});

/// Kind of content a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    OrganizationalNotes,
    SectionHeader,
    Program,
}

impl ChunkType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::OrganizationalNotes => "organizational_notes",
            Self::SectionHeader => "section_header",
            Self::Program => "program",
        }
    }
}

impl fmt::Display for ChunkType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = anyhow::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizational_notes" => Ok(Self::OrganizationalNotes),
            "section_header" => Ok(Self::SectionHeader),
            "program" => Ok(Self::Program),
            other => Err(anyhow::anyhow!("Unknown chunk type: {}", other)),
        }
    }
}

/// Metadata extracted for a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub chunk_type: ChunkType,
    pub chunk_index: u32,
}

impl ChunkMetadata {
    fn new(chunk_type: ChunkType) -> Self {
        Self {
            program_name: None,
            program_code: None,
            institution: None,
            section: None,
            chunk_type,
            chunk_index: 0,
        }
    }

    fn program(fields: ProgramFields, section: Option<String>) -> Self {
        Self {
            program_name: fields.name,
            program_code: fields.code,
            institution: fields.institution,
            section,
            chunk_type: ChunkType::Program,
            chunk_index: 0,
        }
    }
}

/// A contiguous excerpt of a source document plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Blocks shorter than this many characters are dropped
    pub min_block_chars: usize,
    /// The line-by-line pass is tried when the primary pass yields fewer chunks
    pub min_chunk_count: usize,
    /// Whether over-long chunks are re-split into overlapping pieces
    pub split_long_chunks: bool,
    /// Chunks longer than this many characters are re-split
    pub max_chunk_chars: usize,
    /// Preferred length of re-split pieces
    pub target_chunk_chars: usize,
    /// Characters shared by adjacent re-split pieces
    pub overlap_chars: usize,
    /// How far back from a cut to look for a paragraph/sentence/word boundary
    pub boundary_window_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            min_block_chars: 50,
            min_chunk_count: 10,
            split_long_chunks: true,
            max_chunk_chars: 2000,
            target_chunk_chars: 1500,
            overlap_chars: 200,
            boundary_window_chars: 300,
        }
    }
}

impl ChunkingConfig {
    fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            max_chars: self.max_chunk_chars,
            target_chars: self.target_chunk_chars,
            overlap_chars: self.overlap_chars,
            boundary_window_chars: self.boundary_window_chars,
        }
    }
}

#[derive(Debug)]
enum BlockKind {
    Section(String),
    Record,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    lines: Vec<String>,
    fields: ProgramFields,
}

impl Block {
    fn record() -> Self {
        Self {
            kind: BlockKind::Record,
            lines: Vec::new(),
            fields: ProgramFields::default(),
        }
    }

    fn section(name: String, line: &str) -> Self {
        Self {
            kind: BlockKind::Section(name),
            lines: vec![line.to_string()],
            fields: ProgramFields::default(),
        }
    }

    fn content(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }

    fn has_content(&self) -> bool {
        self.lines.iter().any(|l| !l.trim().is_empty())
    }
}

/// Chunk a raw admissions document.
///
/// Deterministic: the same text and configuration always produce the same
/// chunks. `chunk_index` runs from zero without gaps.
#[inline]
pub fn chunk_document(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let (notes, body) = split_notes_preamble(&text);

    let mut chunks = Vec::new();
    if let Some(notes) = notes {
        if notes.chars().count() >= config.min_block_chars {
            chunks.push(Chunk {
                content: notes,
                metadata: ChunkMetadata::new(ChunkType::OrganizationalNotes),
            });
        }
    }

    let primary = primary_split(&body, config);
    let body_chunks = if primary.len() < config.min_chunk_count {
        let fallback = line_by_line_split(&body, config);
        debug!(
            "Primary split produced {} chunks, line-by-line split produced {}",
            primary.len(),
            fallback.len()
        );
        if fallback.len() >= primary.len() {
            fallback
        } else {
            primary
        }
    } else {
        primary
    };
    chunks.extend(body_chunks);

    if config.split_long_chunks {
        chunks = split_long_chunks(chunks, &config.split_settings());
    }

    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.metadata.chunk_index = u32::try_from(index).unwrap_or(u32::MAX);
    }

    debug!("Chunked document into {} chunks", chunks.len());
    chunks
}

/// Separate a leading organizational-notes block from the rest of the text
fn split_notes_preamble(text: &str) -> (Option<String>, String) {
    if !matches(&NOTES_PREAMBLE, text) {
        return (None, text.to_string());
    }

    let lines: Vec<&str> = text.lines().collect();
    let boundary = lines
        .iter()
        .position(|line| section_name(line).is_some() || is_record_start(line))
        .unwrap_or(lines.len());

    let notes = lines[..boundary].join("\n").trim().to_string();
    let body = lines[boundary..].join("\n");
    ((!notes.is_empty()).then_some(notes), body)
}

/// Split on section lines, program-start lines and separator lines
fn primary_split(body: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut blocks = Vec::new();
    let mut current = Block::record();

    for line in body.lines() {
        if let Some(name) = section_name(line) {
            blocks.push(std::mem::replace(&mut current, Block::section(name, line)));
        } else if is_separator(line) {
            blocks.push(std::mem::replace(&mut current, Block::record()));
        } else if is_record_start(line) {
            blocks.push(std::mem::replace(&mut current, Block::record()));
            current.lines.push(line.to_string());
        } else {
            current.lines.push(line.to_string());
        }
    }
    blocks.push(current);

    let mut section: Option<String> = None;
    let mut chunks = Vec::new();
    for block in blocks {
        if let BlockKind::Section(name) = &block.kind {
            section = Some(name.clone());
        }
        let fields = match block.kind {
            BlockKind::Section(_) => ProgramFields::default(),
            BlockKind::Record => {
                if !is_long_enough(&block, config) {
                    continue;
                }
                extract_program_fields(&block.content())
            }
        };
        if let Some(chunk) = block_to_chunk(block, fields, section.clone(), config) {
            chunks.push(chunk);
        }
    }

    chunks
}

/// Line-by-line state machine used when the primary split under-delivers.
///
/// Fields accumulate line by line (first value wins) and the current block is
/// flushed on a section line, a separator line, any line carrying a program
/// name label, or a program code label that cannot belong to the current block.
fn line_by_line_split(body: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut section: Option<String> = None;
    let mut current = Block::record();

    let flush = |block: Block, section: &Option<String>, chunks: &mut Vec<Chunk>| {
        if !block.has_content() {
            return;
        }
        let fields = block.fields.clone();
        if let Some(chunk) = block_to_chunk(block, fields, section.clone(), config) {
            chunks.push(chunk);
        }
    };

    for line in body.lines() {
        if let Some(name) = section_name(line) {
            let previous = std::mem::replace(&mut current, Block::section(name.clone(), line));
            flush(previous, &section, &mut chunks);
            section = Some(name);
            continue;
        }

        if is_separator(line) {
            let previous = std::mem::replace(&mut current, Block::record());
            flush(previous, &section, &mut chunks);
            continue;
        }

        let in_section = matches!(current.kind, BlockKind::Section(_));
        let starts_record = matches(&PROGRAM_LABEL, line)
            || ((in_section || current.fields.code.is_some()) && matches(&CODE_LABEL, line));
        if starts_record && current.has_content() {
            let previous = std::mem::replace(&mut current, Block::record());
            flush(previous, &section, &mut chunks);
        }

        if matches!(current.kind, BlockKind::Record) {
            current.fields.fill_from(extract_program_fields(line));
        }
        current.lines.push(line.to_string());
    }
    flush(current, &section, &mut chunks);

    chunks
}

fn block_to_chunk(
    block: Block,
    fields: ProgramFields,
    section: Option<String>,
    config: &ChunkingConfig,
) -> Option<Chunk> {
    if !is_long_enough(&block, config) {
        return None;
    }
    let content = block.content();

    match block.kind {
        BlockKind::Section(name) => {
            let mut metadata = ChunkMetadata::new(ChunkType::SectionHeader);
            metadata.section = Some(name);
            Some(Chunk { content, metadata })
        }
        BlockKind::Record => {
            if !fields.is_identified() {
                debug!("Discarding block without program name or code");
                return None;
            }
            Some(Chunk {
                content,
                metadata: ChunkMetadata::program(fields, section),
            })
        }
    }
}

fn split_long_chunks(chunks: Vec<Chunk>, settings: &SplitSettings) -> Vec<Chunk> {
    chunks
        .into_iter()
        .flat_map(|chunk| {
            if chunk.content.chars().count() <= settings.max_chars {
                return vec![chunk];
            }
            split_with_overlap(&chunk.content, settings)
                .into_iter()
                .map(|content| Chunk {
                    content,
                    metadata: chunk.metadata.clone(),
                })
                .collect()
        })
        .collect()
}

fn is_long_enough(block: &Block, config: &ChunkingConfig) -> bool {
    block.content().chars().count() >= config.min_block_chars
}

/// Name of the section a line opens, if it opens one
#[inline]
pub fn section_name(line: &str) -> Option<String> {
    let captures = SECTION_LINE.captures(line).ok().flatten()?;
    let name = captures.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn is_record_start(line: &str) -> bool {
    matches(&PROGRAM_START_LINE, line) || is_separator(line)
}

fn is_separator(line: &str) -> bool {
    matches(&SEPARATOR_LINE, line)
}

fn matches(pattern: &Regex, text: &str) -> bool {
    pattern.is_match(text).unwrap_or(false)
}
