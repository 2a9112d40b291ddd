use std::ops::Range;

use memchr::memchr_iter;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Tag, TagEnd};

use crate::markdown;

/// Half-open, 0-based source line range recorded on a rendered block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceAnnotation {
    pub start_line: usize,
    pub end_line: usize,
}

/// Kind of a top-level rendered block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    List,
    BlockQuote,
    /// Fenced or indented code. The annotation covers the whole block
    /// including the fence lines.
    Code {
        language: Option<String>,
    },
    Table,
    Html,
    Rule,
}

/// One top-level rendered block: its kind, plain-text content, and the
/// source lines that produced it. Synthetic blocks with no backing
/// source carry `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedBlock {
    pub kind: BlockKind,
    pub text: String,
    pub source: Option<SourceAnnotation>,
}

/// Byte-offset to 0-based line lookup over one source string.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr_iter(b'\n', source.as_bytes()).map(|at| at + 1));
        Self { line_starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    fn annotation(&self, range: &Range<usize>) -> Option<SourceAnnotation> {
        if range.end <= range.start {
            return None;
        }
        Some(SourceAnnotation {
            start_line: self.line_of(range.start),
            end_line: self.line_of(range.end - 1) + 1,
        })
    }
}

struct OpenBlock {
    kind: BlockKind,
    text: String,
    range: Range<usize>,
}

impl OpenBlock {
    fn push(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn break_line(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    fn finish(mut self, index: &LineIndex) -> RenderedBlock {
        while self.text.ends_with('\n') {
            self.text.pop();
        }
        RenderedBlock {
            kind: self.kind,
            text: self.text,
            source: index.annotation(&self.range),
        }
    }
}

/// Parse markdown into top-level rendered blocks, each annotated with
/// the source line range it came from.
#[must_use]
pub fn annotate(source: &str) -> Vec<RenderedBlock> {
    let index = LineIndex::new(source);
    let mut blocks = Vec::new();
    let mut open: Option<OpenBlock> = None;
    let mut depth = 0usize;

    for (event, range) in markdown::parser(source).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0
                    && let Some(kind) = block_kind(&tag)
                {
                    open = Some(OpenBlock {
                        kind,
                        text: String::new(),
                        range: range.clone(),
                    });
                }
                depth += 1;
            }
            Event::End(end) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(open) = open.take() {
                        blocks.push(open.finish(&index));
                    }
                } else if let Some(open) = open.as_mut()
                    && is_block_end(&end)
                {
                    open.break_line();
                }
            }
            Event::Rule => {
                if depth == 0 {
                    blocks.push(RenderedBlock {
                        kind: BlockKind::Rule,
                        text: String::new(),
                        source: index.annotation(&range),
                    });
                }
            }
            Event::Text(text) | Event::Code(text) | Event::Html(text) | Event::InlineHtml(text) => {
                if let Some(open) = open.as_mut() {
                    open.push(text.as_ref());
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(open) = open.as_mut() {
                    open.break_line();
                }
            }
            _ => {}
        }
    }

    blocks
}

fn block_kind(tag: &Tag<'_>) -> Option<BlockKind> {
    match tag {
        Tag::Heading { level, .. } => Some(BlockKind::Heading(heading_level(*level))),
        Tag::Paragraph => Some(BlockKind::Paragraph),
        Tag::List(_) => Some(BlockKind::List),
        Tag::BlockQuote(_) => Some(BlockKind::BlockQuote),
        Tag::CodeBlock(kind) => {
            let language = match kind {
                CodeBlockKind::Fenced(lang) => {
                    let lang = lang.trim();
                    (!lang.is_empty()).then(|| lang.to_owned())
                }
                CodeBlockKind::Indented => None,
            };
            Some(BlockKind::Code { language })
        }
        Tag::Table(_) => Some(BlockKind::Table),
        Tag::HtmlBlock => Some(BlockKind::Html),
        _ => None,
    }
}

fn is_block_end(end: &TagEnd) -> bool {
    matches!(
        end,
        TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::BlockQuote(_)
            | TagEnd::CodeBlock
            | TagEnd::Item
            | TagEnd::List(_)
            | TagEnd::Table
            | TagEnd::TableHead
            | TagEnd::TableRow
    )
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
