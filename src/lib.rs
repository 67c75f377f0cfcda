//! Client-side document layout engine: paginated tables with merged cells
//! and styled rich-text flow, drawn as vector commands onto an abstract
//! [`RenderSurface`]. CJK-capable font data is fetched, cached, and
//! registered per surface before any text is measured.

mod cache;
mod error;
mod fetch;
mod flow;
mod metrics;
mod registry;
mod store;
mod style;
mod surface;
mod table;
mod types;
mod wrap;

pub use cache::{FontAssetCache, purge_version};
pub use error::GalleyError;
pub use fetch::{FontFetcher, HttpFetcher};
pub use flow::{
    Block, BlockKind, ContentNode, LayoutCursor, StyledRun, TextFlowEngine, extract_blocks,
};
pub use registry::{
    DocumentFontRegistry, FontSources, FontWeightSource, noto_sans_sc_sources,
};
pub use store::{ByteStore, DirStore, MemoryStore};
pub use style::{
    CellStyle, FontVariant, HAlign, RunStyle, StyleModifier, VAlign, apply_modifiers,
};
pub use surface::{
    Command, Document, Page, PaintMode, RecordingSurface, RenderSurface, TextBaseline,
};
pub use table::{CellSource, RowEntry, TableLayout, TableLayoutEngine, TableModel, TableSource};
pub use types::{Color, Margins, Pt, Rect, Size};
pub use wrap::wrap_text;

use std::sync::Arc;

/// Entry point tying font provisioning and layout together. Construct via
/// [`Galley::builder`]; one instance can render any number of surfaces and
/// fetches its fonts at most once.
pub struct Galley {
    registry: Option<DocumentFontRegistry>,
    fallback_family: String,
    margins: Margins,
    table_spacing: Pt,
    empty_spacing: Pt,
}

impl Galley {
    pub fn builder() -> GalleyBuilder {
        GalleyBuilder::default()
    }

    /// Eagerly fetches and caches all configured font weights. Optional;
    /// [`Galley::render`] prepares lazily and falls back on failure.
    pub fn prepare_fonts(&self) -> Result<(), GalleyError> {
        match &self.registry {
            Some(registry) => registry.prepare(),
            None => Ok(()),
        }
    }

    /// Renders a content tree onto the surface, registering fonts first.
    /// Font failures degrade to the fallback family rather than failing the
    /// render; once layout starts it runs to completion.
    pub fn render(
        &self,
        content: &[ContentNode],
        surface: &mut dyn RenderSurface,
    ) -> Result<(), GalleyError> {
        let page = surface.page_size();
        if self.margins.left + self.margins.right >= page.width
            || self.margins.top + self.margins.bottom >= page.height
        {
            return Err(GalleyError::InvalidConfiguration(
                "margins leave no content area on this page size".to_string(),
            ));
        }
        let family = match &self.registry {
            Some(registry) => {
                registry.ensure_font(surface);
                if registry.is_registered(surface.surface_id()) {
                    registry.family().to_string()
                } else {
                    registry.fallback_family().to_string()
                }
            }
            None => self.fallback_family.clone(),
        };
        let engine = TextFlowEngine::new(family)
            .with_table_spacing(self.table_spacing)
            .with_empty_spacing(self.empty_spacing);
        let mut cursor = LayoutCursor::new(page, self.margins);
        let blocks = extract_blocks(content);
        engine.render_blocks(&blocks, surface, &mut cursor);
        Ok(())
    }
}

/// Builder for [`Galley`]. Without font sources the engine renders with the
/// fallback family only and performs no network or store access.
pub struct GalleyBuilder {
    sources: Option<FontSources>,
    store: Option<Arc<dyn ByteStore>>,
    fetcher: Option<Arc<dyn FontFetcher>>,
    fallback_family: String,
    margins: Margins,
    table_spacing: Pt,
    empty_spacing: Pt,
}

impl Default for GalleyBuilder {
    fn default() -> Self {
        Self {
            sources: None,
            store: None,
            fetcher: None,
            fallback_family: "Helvetica".to_string(),
            margins: Margins::all(40.0),
            table_spacing: Pt::from_f32(4.0),
            empty_spacing: Pt::from_f32(6.0),
        }
    }
}

impl GalleyBuilder {
    pub fn font_sources(mut self, sources: FontSources) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn store(mut self, store: Arc<dyn ByteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn FontFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn fallback_family(mut self, family: impl Into<String>) -> Self {
        self.fallback_family = family.into();
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn table_spacing(mut self, spacing: Pt) -> Self {
        self.table_spacing = spacing;
        self
    }

    pub fn empty_content_spacing(mut self, spacing: Pt) -> Self {
        self.empty_spacing = spacing;
        self
    }

    pub fn build(self) -> Result<Galley, GalleyError> {
        if self.margins.top < Pt::ZERO
            || self.margins.right < Pt::ZERO
            || self.margins.bottom < Pt::ZERO
            || self.margins.left < Pt::ZERO
        {
            return Err(GalleyError::InvalidConfiguration(
                "margins must not be negative".to_string(),
            ));
        }
        let registry = match self.sources {
            Some(sources) => {
                if sources.weights.is_empty() {
                    return Err(GalleyError::InvalidConfiguration(
                        "font sources must declare at least one weight".to_string(),
                    ));
                }
                let store = self
                    .store
                    .unwrap_or_else(|| Arc::new(MemoryStore::new()));
                let fetcher = self
                    .fetcher
                    .unwrap_or_else(|| Arc::new(HttpFetcher::new()));
                Some(
                    DocumentFontRegistry::new(sources, store, fetcher)
                        .with_fallback_family(self.fallback_family.clone()),
                )
            }
            None => None,
        };
        Ok(Galley {
            registry,
            fallback_family: self.fallback_family,
            margins: self.margins,
            table_spacing: self.table_spacing,
            empty_spacing: self.empty_spacing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingFetcher;

    impl FontFetcher for FailingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, GalleyError> {
            Err(GalleyError::Fetch(format!("unreachable: {url}")))
        }
    }

    fn invoice_content() -> Vec<ContentNode> {
        vec![
            ContentNode::Block {
                kind: BlockKind::Heading,
                children: vec![ContentNode::Text("Invoice #42".to_string())],
            },
            ContentNode::Text("Payable within ".to_string()),
            ContentNode::Styled {
                modifiers: vec![StyleModifier::Bold],
                children: vec![ContentNode::Text("30 days".to_string())],
            },
            ContentNode::LineBreak,
            ContentNode::Table(TableSource::new(vec![
                vec![
                    CellSource::header("No."),
                    CellSource::header("Item"),
                    CellSource::header("Qty"),
                ],
                vec![
                    CellSource::text("1"),
                    CellSource::text("Widget, industrial grade"),
                    CellSource::text("2"),
                ],
            ])),
            ContentNode::Text("Thank you for your business.".to_string()),
        ]
    }

    #[test]
    fn negative_margins_are_rejected() {
        let err = Galley::builder()
            .margins(Margins::all(-1.0))
            .build()
            .err()
            .expect("negative margins must not build");
        assert!(matches!(err, GalleyError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_font_sources_are_rejected() {
        let sources = FontSources {
            family: "NotoSansSC".to_string(),
            version: "v1".to_string(),
            weights: Vec::new(),
        };
        let err = Galley::builder()
            .font_sources(sources)
            .build()
            .err()
            .expect("weightless sources must not build");
        assert!(matches!(err, GalleyError::InvalidConfiguration(_)));
    }

    #[test]
    fn oversized_margins_fail_the_render() {
        let galley = Galley::builder()
            .margins(Margins::all(500.0))
            .build()
            .expect("build");
        let mut surface = RecordingSurface::a4();
        let err = galley
            .render(&invoice_content(), &mut surface)
            .unwrap_err();
        assert!(matches!(err, GalleyError::InvalidConfiguration(_)));
    }

    #[test]
    fn rendering_without_font_sources_uses_the_fallback_family() {
        let galley = Galley::builder().build().expect("build");
        let mut surface = RecordingSurface::a4();
        galley.render(&invoice_content(), &mut surface).expect("render");
        let doc = surface.finish();
        assert_eq!(doc.pages.len(), 1);
        let has_text = doc.pages[0]
            .commands
            .iter()
            .any(|cmd| matches!(cmd, Command::DrawText { .. }));
        assert!(has_text);
    }

    #[test]
    fn unreachable_fonts_degrade_instead_of_failing() {
        let galley = Galley::builder()
            .font_sources(noto_sans_sc_sources("https://cdn.example/fonts", "v1"))
            .fetcher(Arc::new(FailingFetcher))
            .build()
            .expect("build");
        let mut surface = RecordingSurface::a4();
        galley.render(&invoice_content(), &mut surface).expect("render");
        assert_eq!(surface.active_font().0, "Helvetica");
        let doc = surface.finish();
        assert!(!doc.pages.is_empty());
    }

    #[test]
    fn long_documents_paginate() {
        let galley = Galley::builder().build().expect("build");
        let mut surface = RecordingSurface::a4();
        let mut content = Vec::new();
        for i in 0..200 {
            content.push(ContentNode::Block {
                kind: BlockKind::Paragraph,
                children: vec![ContentNode::Text(format!("paragraph number {i}"))],
            });
        }
        galley.render(&content, &mut surface).expect("render");
        let doc = surface.finish();
        assert!(doc.pages.len() > 1);
    }
}
