use crate::style::{RunStyle, StyleModifier, apply_modifiers};
use crate::surface::{RenderSurface, TextBaseline};
use crate::table::{TableLayoutEngine, TableModel, TableSource};
use crate::types::{Color, Margins, Pt, Size};
use crate::wrap::wrap_text;

/// Shared vertical cursor threaded through paragraph and table layout.
/// `x`/`max_x` bound the content area horizontally, `top_y`/`bottom_y`
/// vertically; `y` is the next free line position.
#[derive(Debug, Clone, Copy)]
pub struct LayoutCursor {
    pub x: Pt,
    pub y: Pt,
    pub top_y: Pt,
    pub bottom_y: Pt,
    pub max_x: Pt,
}

impl LayoutCursor {
    pub fn new(page: Size, margins: Margins) -> Self {
        Self {
            x: margins.left,
            y: margins.top,
            top_y: margins.top,
            bottom_y: page.height - margins.bottom,
            max_x: page.width - margins.right,
        }
    }
}

/// Pre-parsed styled content tree. Producers hand the engine this structure
/// directly; turning markup into it is an external adapter's job.
#[derive(Debug, Clone)]
pub enum ContentNode {
    Text(String),
    /// Forces a paragraph boundary without opening a block.
    LineBreak,
    Styled {
        modifiers: Vec<StyleModifier>,
        children: Vec<ContentNode>,
    },
    Block {
        kind: BlockKind,
        children: Vec<ContentNode>,
    },
    Table(TableSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading,
    ListItem,
    Div,
}

/// One run of text with its fully resolved inline style.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledRun {
    pub text: String,
    pub style: RunStyle,
}

/// Block-level layout unit. Tables and paragraphs flow through the same
/// dispatcher over one cursor instead of calling into each other.
#[derive(Debug)]
pub enum Block {
    Paragraph(Vec<StyledRun>),
    Table(TableModel),
}

/// Flattens a content tree into blocks. Inline styling accumulates down the
/// tree via [`apply_modifiers`]; block nodes and explicit line breaks flush
/// the run accumulator. A block that closes with nothing accumulated still
/// emits an empty paragraph so the layout stage can apply its empty-content
/// spacing.
pub fn extract_blocks(nodes: &[ContentNode]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    walk(nodes, &RunStyle::default(), &mut blocks, &mut current);
    if !current.is_empty() {
        blocks.push(Block::Paragraph(std::mem::take(&mut current)));
    }
    blocks
}

fn walk(
    nodes: &[ContentNode],
    style: &RunStyle,
    blocks: &mut Vec<Block>,
    current: &mut Vec<StyledRun>,
) {
    for node in nodes {
        match node {
            ContentNode::Text(text) => {
                if !text.is_empty() {
                    current.push(StyledRun {
                        text: text.clone(),
                        style: style.clone(),
                    });
                }
            }
            ContentNode::LineBreak => {
                blocks.push(Block::Paragraph(std::mem::take(current)));
            }
            ContentNode::Styled {
                modifiers,
                children,
            } => {
                let styled = apply_modifiers(style, modifiers);
                walk(children, &styled, blocks, current);
            }
            ContentNode::Block { kind, children } => {
                if !current.is_empty() {
                    blocks.push(Block::Paragraph(std::mem::take(current)));
                }
                let block_style = match kind {
                    BlockKind::Heading => apply_modifiers(style, &[StyleModifier::Bold]),
                    _ => style.clone(),
                };
                if *kind == BlockKind::ListItem {
                    current.push(StyledRun {
                        text: "\u{2022} ".to_string(),
                        style: block_style.clone(),
                    });
                }
                walk(children, &block_style, blocks, current);
                blocks.push(Block::Paragraph(std::mem::take(current)));
            }
            ContentNode::Table(source) => {
                if !current.is_empty() {
                    blocks.push(Block::Paragraph(std::mem::take(current)));
                }
                blocks.push(Block::Table(TableModel::build(source.clone())));
            }
        }
    }
}

enum FlowToken<'a> {
    Word { text: &'a str, run: usize },
    Space { run: usize },
    Break,
}

pub struct TextFlowEngine {
    family: String,
    table_spacing: Pt,
    empty_spacing: Pt,
}

impl TextFlowEngine {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            table_spacing: Pt::from_f32(4.0),
            empty_spacing: Pt::from_f32(6.0),
        }
    }

    /// Vertical gap inserted before and after an embedded table.
    pub fn with_table_spacing(mut self, spacing: Pt) -> Self {
        self.table_spacing = spacing;
        self
    }

    /// Cursor advance for a block with no extractable text.
    pub fn with_empty_spacing(mut self, spacing: Pt) -> Self {
        self.empty_spacing = spacing;
        self
    }

    fn apply_run_font(&self, surface: &mut dyn RenderSurface, style: &RunStyle) {
        let family = style.font_family.as_deref().unwrap_or(&self.family);
        surface.set_font(family, style.variant());
        surface.set_font_size(style.font_size);
    }

    /// Lays out a block list top to bottom, sharing one cursor between
    /// paragraphs and embedded tables.
    pub fn render_blocks(
        &self,
        blocks: &[Block],
        surface: &mut dyn RenderSurface,
        cursor: &mut LayoutCursor,
    ) {
        for block in blocks {
            match block {
                Block::Paragraph(runs) => self.layout_paragraph(runs, surface, cursor),
                Block::Table(model) => {
                    cursor.y += self.table_spacing;
                    let engine = TableLayoutEngine::new(self.family.clone());
                    let layout = engine.measure(model, surface, cursor.max_x - cursor.x);
                    engine.render(model, &layout, surface, cursor);
                    cursor.y += self.table_spacing;
                }
            }
        }
    }

    /// Places one paragraph's tokens left to right, wrapping at the content
    /// edge, breaking pages at the bottom boundary, and drawing underline
    /// and strikethrough decorations per placed word.
    pub fn layout_paragraph(
        &self,
        runs: &[StyledRun],
        surface: &mut dyn RenderSurface,
        cursor: &mut LayoutCursor,
    ) {
        if runs.iter().all(|run| run.text.trim().is_empty()) {
            cursor.y += self.empty_spacing;
            return;
        }
        let line_height = runs
            .iter()
            .map(|run| run.style.font_size.mul_ratio(6, 5))
            .fold(Pt::ZERO, Pt::max);
        let line_width = cursor.max_x - cursor.x;

        if cursor.y + line_height > cursor.bottom_y {
            surface.add_page();
            cursor.y = cursor.top_y;
        }

        let tokens = tokenize(runs);
        let mut x = cursor.x;
        let mut pending_space = Pt::ZERO;
        for token in &tokens {
            match token {
                FlowToken::Break => {
                    new_line(surface, cursor, line_height);
                    x = cursor.x;
                    pending_space = Pt::ZERO;
                }
                FlowToken::Space { run } => {
                    if x > cursor.x || pending_space > Pt::ZERO {
                        self.apply_run_font(surface, &runs[*run].style);
                        pending_space += surface.text_width(" ");
                    }
                }
                FlowToken::Word { text, run } => {
                    let style = &runs[*run].style;
                    self.apply_run_font(surface, style);
                    surface.set_text_color(style.color);
                    let width = surface.text_width(text);
                    if width > line_width {
                        // Token wider than the whole line: flush, then
                        // hard-cut it across as many lines as needed.
                        if x > cursor.x {
                            new_line(surface, cursor, line_height);
                        }
                        x = cursor.x;
                        pending_space = Pt::ZERO;
                        let pieces = wrap_text(text, line_width, |t| surface.text_width(t));
                        let last = pieces.len().saturating_sub(1);
                        for (idx, piece) in pieces.iter().enumerate() {
                            let piece_width = surface.text_width(piece);
                            self.draw_word(surface, piece, style, x, cursor.y, piece_width);
                            if idx < last {
                                new_line(surface, cursor, line_height);
                            } else {
                                x += piece_width;
                            }
                        }
                        continue;
                    }
                    if x + pending_space + width > cursor.max_x && x > cursor.x {
                        new_line(surface, cursor, line_height);
                        x = cursor.x;
                        pending_space = Pt::ZERO;
                    }
                    x += pending_space;
                    pending_space = Pt::ZERO;
                    self.draw_word(surface, text, style, x, cursor.y, width);
                    x += width;
                }
            }
        }
        cursor.y += line_height;
    }

    fn draw_word(
        &self,
        surface: &mut dyn RenderSurface,
        text: &str,
        style: &RunStyle,
        x: Pt,
        y: Pt,
        width: Pt,
    ) {
        surface.draw_text(text, x, y, TextBaseline::Top);
        draw_decorations(
            surface,
            x,
            y,
            width,
            style.font_size,
            style.color,
            style.underline,
            style.strike,
        );
    }
}

fn new_line(surface: &mut dyn RenderSurface, cursor: &mut LayoutCursor, line_height: Pt) {
    cursor.y += line_height;
    if cursor.y + line_height > cursor.bottom_y {
        surface.add_page();
        cursor.y = cursor.top_y;
    }
}

fn tokenize(runs: &[StyledRun]) -> Vec<FlowToken<'_>> {
    let mut tokens = Vec::new();
    for (run_idx, run) in runs.iter().enumerate() {
        let mut rest = run.text.as_str();
        while !rest.is_empty() {
            if let Some(stripped) = rest.strip_prefix('\n') {
                tokens.push(FlowToken::Break);
                rest = stripped;
                continue;
            }
            if rest.starts_with(char::is_whitespace) {
                let end = rest
                    .find(|ch: char| ch == '\n' || !ch.is_whitespace())
                    .unwrap_or(rest.len());
                tokens.push(FlowToken::Space { run: run_idx });
                rest = &rest[end..];
                continue;
            }
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            tokens.push(FlowToken::Word {
                text: &rest[..end],
                run: run_idx,
            });
            rest = &rest[end..];
        }
    }
    tokens
}

/// Underline/strikethrough for one placed word. Geometry comes from the
/// surface's font metrics when available, else from size-proportional
/// estimates; offsets are relative to the word's top edge.
pub(crate) fn draw_decorations(
    surface: &mut dyn RenderSurface,
    x: Pt,
    top_y: Pt,
    width: Pt,
    font_size: Pt,
    color: Color,
    underline: bool,
    strike: bool,
) {
    if (!underline && !strike) || width <= Pt::ZERO {
        return;
    }
    surface.set_draw_color(color);
    if underline {
        let (offset, thickness) = surface
            .underline_geometry()
            .unwrap_or((font_size.mul_ratio(9, 10), font_size.mul_ratio(1, 20)));
        surface.set_line_width(thickness.max(Pt::from_f32(0.1)));
        let y = top_y + offset;
        surface.draw_line(x, y, x + width, y);
    }
    if strike {
        let (offset, thickness) = surface
            .strike_geometry()
            .unwrap_or((font_size.mul_ratio(1, 2), font_size.mul_ratio(1, 20)));
        surface.set_line_width(thickness.max(Pt::from_f32(0.1)));
        let y = top_y + offset;
        surface.draw_line(x, y, x + width, y);
    }
}
