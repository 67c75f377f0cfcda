use crate::metrics::GlyphMetrics;
use crate::style::FontVariant;
use crate::types::{Color, Pt, Rect, Size};
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Fill,
    Stroke,
    FillStroke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBaseline {
    Alphabetic,
    Top,
    Middle,
}

/// Abstract drawing target consumed by the layout engines. Implementations
/// wrap a concrete vector backend (a PDF writer, typically); the crate ships
/// [`RecordingSurface`] for tests and for replaying commands elsewhere.
///
/// `text_width` must reflect the currently active font and size.
pub trait RenderSurface {
    /// Stable identity used for idempotent per-surface font registration.
    fn surface_id(&self) -> u64;
    fn page_size(&self) -> Size;

    fn set_font(&mut self, family: &str, variant: FontVariant);
    fn set_font_size(&mut self, size: Pt);
    fn set_text_color(&mut self, color: Color);
    fn set_fill_color(&mut self, color: Color);
    fn set_draw_color(&mut self, color: Color);
    fn set_line_width(&mut self, width: Pt);

    fn text_width(&self, text: &str) -> Pt;
    fn draw_text(&mut self, text: &str, x: Pt, y: Pt, baseline: TextBaseline);
    fn draw_rect(&mut self, rect: Rect, mode: PaintMode);
    fn draw_line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt);
    fn add_page(&mut self);

    /// Copies raw font data (base64-encoded) into the surface's font table.
    fn register_font_data(&mut self, file_name: &str, base64_data: &str);
    /// Declares a (family, variant) pair backed by previously registered data.
    fn declare_font(&mut self, file_name: &str, family: &str, variant: FontVariant);

    /// Underline placement for the active font and size, as (offset below
    /// the text top, stroke thickness). Surfaces without font geometry
    /// return None and callers fall back to size-proportional estimates.
    fn underline_geometry(&self) -> Option<(Pt, Pt)> {
        None
    }

    /// Strikethrough placement, same convention as [`Self::underline_geometry`].
    fn strike_geometry(&self) -> Option<(Pt, Pt)> {
        None
    }

    /// Line height of the active font at the active size, when known.
    fn line_height(&self) -> Option<Pt> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFont { family: String, variant: FontVariant },
    SetFontSize(Pt),
    SetTextColor(Color),
    SetFillColor(Color),
    SetDrawColor(Color),
    SetLineWidth(Pt),
    DrawText {
        text: String,
        x: Pt,
        y: Pt,
        baseline: TextBaseline,
    },
    DrawRect {
        rect: Rect,
        mode: PaintMode,
    },
    DrawLine {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
    },
    RegisterFontData {
        file_name: String,
        bytes_len: usize,
    },
    DeclareFont {
        file_name: String,
        family: String,
        variant: FontVariant,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

/// Command-recording surface. Measures text through real glyph metrics when
/// a matching face has been declared, otherwise through the 0.6 x font-size
/// per-char heuristic, so layout stays deterministic without font files.
pub struct RecordingSurface {
    id: u64,
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    font_data: HashMap<String, Vec<u8>>,
    faces: HashMap<(String, FontVariant), Arc<GlyphMetrics>>,
    active_family: String,
    active_variant: FontVariant,
    font_size: Pt,
}

static SURFACE_COUNTER: AtomicU64 = AtomicU64::new(1);

impl RecordingSurface {
    pub fn new(page_size: Size) -> Self {
        Self {
            id: SURFACE_COUNTER.fetch_add(1, Ordering::Relaxed),
            page_size,
            pages: Vec::new(),
            current: Page::new(),
            font_data: HashMap::new(),
            faces: HashMap::new(),
            active_family: "Helvetica".to_string(),
            active_variant: FontVariant::Regular,
            font_size: Pt::from_f32(10.0),
        }
    }

    pub fn a4() -> Self {
        Self::new(Size::a4())
    }

    pub fn active_font(&self) -> (&str, FontVariant) {
        (&self.active_family, self.active_variant)
    }

    pub fn font_size(&self) -> Pt {
        self.font_size
    }

    pub fn has_face(&self, family: &str, variant: FontVariant) -> bool {
        self.faces.contains_key(&(family.to_string(), variant))
    }

    /// Pages completed so far, not counting the page being drawn.
    pub fn completed_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn current_commands(&self) -> &[Command] {
        &self.current.commands
    }

    pub(crate) fn active_metrics(&self) -> Option<&Arc<GlyphMetrics>> {
        let key = (self.active_family.clone(), self.active_variant);
        if let Some(metrics) = self.faces.get(&key) {
            return Some(metrics);
        }
        // A family registered without this exact variant still measures
        // through its regular face.
        self.faces
            .get(&(self.active_family.clone(), FontVariant::Regular))
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            let current = std::mem::replace(&mut self.current, Page::new());
            self.pages.push(current);
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}

impl RenderSurface for RecordingSurface {
    fn surface_id(&self) -> u64 {
        self.id
    }

    fn page_size(&self) -> Size {
        self.page_size
    }

    fn set_font(&mut self, family: &str, variant: FontVariant) {
        if self.active_family == family && self.active_variant == variant {
            return;
        }
        self.active_family = family.to_string();
        self.active_variant = variant;
        self.current.commands.push(Command::SetFont {
            family: family.to_string(),
            variant,
        });
    }

    fn set_font_size(&mut self, size: Pt) {
        if self.font_size == size {
            return;
        }
        self.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    fn set_text_color(&mut self, color: Color) {
        self.current.commands.push(Command::SetTextColor(color));
    }

    fn set_fill_color(&mut self, color: Color) {
        self.current.commands.push(Command::SetFillColor(color));
    }

    fn set_draw_color(&mut self, color: Color) {
        self.current.commands.push(Command::SetDrawColor(color));
    }

    fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        self.current.commands.push(Command::SetLineWidth(width));
    }

    fn text_width(&self, text: &str) -> Pt {
        if let Some(metrics) = self.active_metrics() {
            return metrics.measure(self.font_size, text);
        }
        let char_width = (self.font_size * 0.6).max(Pt::from_f32(1.0));
        char_width * (text.chars().count() as i32)
    }

    fn draw_text(&mut self, text: &str, x: Pt, y: Pt, baseline: TextBaseline) {
        self.current.commands.push(Command::DrawText {
            text: text.to_string(),
            x,
            y,
            baseline,
        });
    }

    fn draw_rect(&mut self, rect: Rect, mode: PaintMode) {
        self.current.commands.push(Command::DrawRect { rect, mode });
    }

    fn draw_line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.current.commands.push(Command::DrawLine { x1, y1, x2, y2 });
    }

    fn add_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
    }

    fn register_font_data(&mut self, file_name: &str, base64_data: &str) {
        let decoded = match base64::engine::general_purpose::STANDARD.decode(base64_data) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("discarding undecodable font data for {file_name}: {err}");
                return;
            }
        };
        self.current.commands.push(Command::RegisterFontData {
            file_name: file_name.to_string(),
            bytes_len: decoded.len(),
        });
        self.font_data.insert(file_name.to_string(), decoded);
    }

    fn underline_geometry(&self) -> Option<(Pt, Pt)> {
        let metrics = self.active_metrics()?;
        let deco = metrics.underline_metrics()?;
        // Decoration positions are baseline-relative; convert to top-relative
        // so callers can place lines without knowing the ascent.
        let offset = metrics.ascent(self.font_size) - deco.offset_for(self.font_size);
        Some((offset, deco.thickness_for(self.font_size)))
    }

    fn strike_geometry(&self) -> Option<(Pt, Pt)> {
        let metrics = self.active_metrics()?;
        let deco = metrics.strikeout_metrics()?;
        let offset = metrics.ascent(self.font_size) - deco.offset_for(self.font_size);
        Some((offset, deco.thickness_for(self.font_size)))
    }

    fn line_height(&self) -> Option<Pt> {
        Some(self.active_metrics()?.line_height(self.font_size))
    }

    fn declare_font(&mut self, file_name: &str, family: &str, variant: FontVariant) {
        self.current.commands.push(Command::DeclareFont {
            file_name: file_name.to_string(),
            family: family.to_string(),
            variant,
        });
        let Some(data) = self.font_data.get(file_name) else {
            log::warn!("declare_font for {file_name} without registered data");
            return;
        };
        match GlyphMetrics::parse(data.clone()) {
            Ok(metrics) => {
                self.faces
                    .insert((family.to_string(), variant), Arc::new(metrics));
            }
            Err(err) => {
                log::warn!("could not parse font {file_name}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_ids_are_unique() {
        let a = RecordingSurface::a4();
        let b = RecordingSurface::a4();
        assert_ne!(a.surface_id(), b.surface_id());
    }

    #[test]
    fn heuristic_width_scales_with_font_size() {
        let mut surface = RecordingSurface::a4();
        surface.set_font_size(Pt::from_f32(10.0));
        let small = surface.text_width("abcd");
        surface.set_font_size(Pt::from_f32(20.0));
        let large = surface.text_width("abcd");
        assert_eq!(small.to_milli_i64() * 2, large.to_milli_i64());
    }

    #[test]
    fn add_page_completes_current_page() {
        let mut surface = RecordingSurface::a4();
        surface.draw_text("one", Pt::ZERO, Pt::ZERO, TextBaseline::Top);
        surface.add_page();
        surface.draw_text("two", Pt::ZERO, Pt::ZERO, TextBaseline::Top);
        assert_eq!(surface.completed_pages(), 1);
        let doc = surface.finish();
        assert_eq!(doc.pages.len(), 2);
    }

    #[test]
    fn redundant_font_state_is_not_recorded() {
        let mut surface = RecordingSurface::a4();
        surface.set_font("NotoSansSC", FontVariant::Regular);
        surface.set_font("NotoSansSC", FontVariant::Regular);
        let sets = surface
            .current_commands()
            .iter()
            .filter(|cmd| matches!(cmd, Command::SetFont { .. }))
            .count();
        assert_eq!(sets, 1);
    }

    #[test]
    fn bad_base64_font_data_is_discarded() {
        let mut surface = RecordingSurface::a4();
        surface.register_font_data("font.ttf", "!!not-base64!!");
        surface.declare_font("font.ttf", "NotoSansSC", FontVariant::Regular);
        assert!(!surface.has_face("NotoSansSC", FontVariant::Regular));
    }
}
