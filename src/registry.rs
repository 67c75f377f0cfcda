use crate::cache::FontAssetCache;
use crate::error::GalleyError;
use crate::fetch::FontFetcher;
use crate::store::ByteStore;
use crate::style::FontVariant;
use crate::surface::RenderSurface;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

/// One downloadable weight of the document family.
#[derive(Debug, Clone)]
pub struct FontWeightSource {
    pub variant: FontVariant,
    /// File name the surface's font table is keyed by.
    pub file_name: String,
    pub gzip_url: String,
    pub plain_url: String,
}

/// Where the document fonts come from. The version string participates in
/// every cache key, so bumping it invalidates the previous generation
/// without touching the store eagerly.
#[derive(Debug, Clone)]
pub struct FontSources {
    pub family: String,
    pub version: String,
    pub weights: Vec<FontWeightSource>,
}

impl FontSources {
    pub(crate) fn bytes_key_for(&self, weight: &FontWeightSource, version: &str) -> String {
        format!("{}-{}", weight.file_name, version)
    }

    pub(crate) fn base64_key_for(&self, weight: &FontWeightSource, version: &str) -> String {
        format!("{}-{}-b64", weight.file_name, version)
    }

    pub(crate) fn keys_for_version(&self, version: &str) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.weights.len() * 2);
        for weight in &self.weights {
            keys.push(self.bytes_key_for(weight, version));
            keys.push(self.base64_key_for(weight, version));
        }
        keys
    }
}

struct PreparedWeight {
    variant: FontVariant,
    file_name: String,
    base64: String,
}

/// Per-process font state with an explicit lifecycle: global preparation is
/// memoized (concurrent callers collapse onto one attempt, success or
/// failure), and each surface is registered at most once, tracked by its
/// surface id. A surface never transitions back to unregistered.
pub struct DocumentFontRegistry {
    sources: FontSources,
    cache: FontAssetCache,
    fallback_family: String,
    prepared: OnceLock<Result<Arc<Vec<PreparedWeight>>, String>>,
    registered: Mutex<HashSet<u64>>,
}

impl DocumentFontRegistry {
    pub fn new(
        sources: FontSources,
        store: Arc<dyn ByteStore>,
        fetcher: Arc<dyn FontFetcher>,
    ) -> Self {
        Self {
            sources,
            cache: FontAssetCache::new(store, fetcher),
            fallback_family: "Helvetica".to_string(),
            prepared: OnceLock::new(),
            registered: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_fallback_family(mut self, family: impl Into<String>) -> Self {
        self.fallback_family = family.into();
        self
    }

    /// The family styled content should resolve to once registration
    /// succeeds.
    pub fn family(&self) -> &str {
        &self.sources.family
    }

    pub fn fallback_family(&self) -> &str {
        &self.fallback_family
    }

    /// Fetches, decompresses, and encodes every configured weight exactly
    /// once per registry instance. Later callers observe the memoized
    /// outcome, including a memoized failure.
    pub fn prepare(&self) -> Result<(), GalleyError> {
        let outcome = self.prepared.get_or_init(|| {
            let mut weights = Vec::with_capacity(self.sources.weights.len());
            for weight in &self.sources.weights {
                let bytes_key = self.sources.bytes_key_for(weight, &self.sources.version);
                let base64_key = self.sources.base64_key_for(weight, &self.sources.version);
                match self.cache.font_base64(
                    &bytes_key,
                    &base64_key,
                    &weight.gzip_url,
                    &weight.plain_url,
                ) {
                    Ok(base64) => weights.push(PreparedWeight {
                        variant: weight.variant,
                        file_name: weight.file_name.clone(),
                        base64,
                    }),
                    Err(err) => {
                        return Err(format!(
                            "preparing {} ({}): {err}",
                            weight.file_name,
                            weight.variant.as_str()
                        ));
                    }
                }
            }
            Ok(Arc::new(weights))
        });
        match outcome {
            Ok(_) => Ok(()),
            Err(message) => Err(GalleyError::Asset(message.clone())),
        }
    }

    pub fn is_registered(&self, surface_id: u64) -> bool {
        self.registered
            .lock()
            .map(|set| set.contains(&surface_id))
            .unwrap_or(false)
    }

    /// Copies the prepared data into the surface's font table and sets the
    /// default active font. Idempotent per surface; prepares inline when
    /// global preparation has not happened yet.
    pub fn register_surface(&self, surface: &mut dyn RenderSurface) -> Result<(), GalleyError> {
        let id = surface.surface_id();
        if self.is_registered(id) {
            return Ok(());
        }
        self.prepare()?;
        let prepared = match self.prepared.get() {
            Some(Ok(weights)) => weights.clone(),
            _ => return Err(GalleyError::Asset("font preparation unavailable".to_string())),
        };

        for weight in prepared.iter() {
            surface.register_font_data(&weight.file_name, &weight.base64);
            surface.declare_font(&weight.file_name, &self.sources.family, weight.variant);
        }
        surface.set_font(&self.sources.family, FontVariant::Regular);

        if let Ok(mut set) = self.registered.lock() {
            set.insert(id);
        }
        Ok(())
    }

    /// Registration that never raises past this call: on any failure the
    /// surface is pointed at the fallback (non-CJK) family and document
    /// generation proceeds with degraded glyph rendering.
    pub fn ensure_font(&self, surface: &mut dyn RenderSurface) {
        if let Err(err) = self.register_surface(surface) {
            log::warn!(
                "font registration failed, falling back to {}: {err}",
                self.fallback_family
            );
            surface.set_font(&self.fallback_family, FontVariant::Regular);
        }
    }

    /// Drops the memoized preparation and all per-surface registration
    /// state. Exists so tests and long-lived hosts can cycle the registry
    /// without process-wide globals.
    pub fn reset(&mut self) {
        self.prepared = OnceLock::new();
        if let Ok(mut set) = self.registered.lock() {
            set.clear();
        }
    }
}

/// Conventional sources for the Noto Sans SC family the document generator
/// ships with: regular and bold weights, gzip-compressed primaries with
/// plain fallbacks, all under one version string.
pub fn noto_sans_sc_sources(base_url: &str, version: &str) -> FontSources {
    let base = base_url.trim_end_matches('/');
    FontSources {
        family: "NotoSansSC".to_string(),
        version: version.to_string(),
        weights: vec![
            FontWeightSource {
                variant: FontVariant::Regular,
                file_name: "NotoSansSC-Regular.ttf".to_string(),
                gzip_url: format!("{base}/NotoSansSC-Regular.ttf.gz?v={version}"),
                plain_url: format!("{base}/NotoSansSC-Regular.ttf?v={version}"),
            },
            FontWeightSource {
                variant: FontVariant::Bold,
                file_name: "NotoSansSC-Bold.ttf".to_string(),
                gzip_url: format!("{base}/NotoSansSC-Bold.ttf.gz?v={version}"),
                plain_url: format!("{base}/NotoSansSC-Bold.ttf?v={version}"),
            },
        ],
    }
}
