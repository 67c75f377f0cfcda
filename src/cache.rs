use crate::error::GalleyError;
use crate::fetch::{FontFetcher, gunzip};
use crate::registry::FontSources;
use crate::store::ByteStore;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Two-tier persistent cache for font assets: raw bytes keyed by a
/// versioned cache key, and a base64 tier derived from the byte tier.
///
/// There is no in-flight request de-duplication: concurrent first callers
/// may fetch the same asset twice, and both writes land on the same key
/// with the same bytes. Store writes are best-effort; a failed write only
/// costs a re-fetch on the next call.
pub struct FontAssetCache {
    store: Arc<dyn ByteStore>,
    fetcher: Arc<dyn FontFetcher>,
}

impl FontAssetCache {
    pub fn new(store: Arc<dyn ByteStore>, fetcher: Arc<dyn FontFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Byte-tier lookup: store hit returns immediately; on a miss the
    /// compressed asset is fetched and gunzipped. If either the fetch or
    /// the decompression fails the uncompressed fallback URL is fetched
    /// instead and stored under the same key. Both failing is an error.
    pub fn font_bytes(
        &self,
        cache_key: &str,
        gzip_url: &str,
        plain_url: &str,
    ) -> Result<Vec<u8>, GalleyError> {
        if let Some(bytes) = self.verified_get(cache_key) {
            return Ok(bytes);
        }

        match self.fetch_compressed(gzip_url) {
            Ok(bytes) => {
                self.put(cache_key, &bytes);
                Ok(bytes)
            }
            Err(primary) => {
                log::warn!("compressed font path failed ({primary}); trying {plain_url}");
                match self.fetcher.fetch(plain_url) {
                    Ok(bytes) => {
                        self.put(cache_key, &bytes);
                        Ok(bytes)
                    }
                    Err(fallback) => Err(GalleyError::Fetch(format!(
                        "{primary}; fallback {plain_url}: {fallback}"
                    ))),
                }
            }
        }
    }

    /// Base64-tier lookup: encodes the byte-tier result on a miss. The
    /// encoded form is what surfaces ingest into their font tables.
    pub fn font_base64(
        &self,
        bytes_key: &str,
        base64_key: &str,
        gzip_url: &str,
        plain_url: &str,
    ) -> Result<String, GalleyError> {
        if let Some(raw) = self.store.get(base64_key) {
            match String::from_utf8(raw) {
                Ok(encoded) => return Ok(encoded),
                Err(_) => self.store.del(base64_key),
            }
        }

        let bytes = self.font_bytes(bytes_key, gzip_url, plain_url)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        if let Err(err) = self.store.set(base64_key, encoded.as_bytes()) {
            log::warn!("base64 cache write for {base64_key} failed: {err}");
        }
        Ok(encoded)
    }

    fn fetch_compressed(&self, gzip_url: &str) -> Result<Vec<u8>, GalleyError> {
        let compressed = self.fetcher.fetch(gzip_url)?;
        gunzip(&compressed)
    }

    /// A stored entry is trusted only if its digest sidecar matches (or
    /// predates digests entirely). A mismatch reads as a miss.
    fn verified_get(&self, cache_key: &str) -> Option<Vec<u8>> {
        let bytes = self.store.get(cache_key)?;
        if let Some(raw) = self.store.get(&digest_key(cache_key)) {
            let expected = String::from_utf8(raw).ok()?;
            if digest_hex(&bytes) != expected {
                log::warn!("digest mismatch for {cache_key}; discarding stored entry");
                self.store.del(cache_key);
                self.store.del(&digest_key(cache_key));
                return None;
            }
        }
        Some(bytes)
    }

    fn put(&self, cache_key: &str, bytes: &[u8]) {
        if let Err(err) = self.store.set(cache_key, bytes) {
            log::warn!("font cache write for {cache_key} failed: {err}");
            return;
        }
        let digest = digest_hex(bytes);
        if let Err(err) = self.store.set(&digest_key(cache_key), digest.as_bytes()) {
            log::warn!("digest write for {cache_key} failed: {err}");
        }
    }
}

fn digest_key(cache_key: &str) -> String {
    format!("{cache_key}.sha256")
}

fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Deletes every cache entry belonging to a superseded font generation.
/// The current generation's keys differ by version string and are left
/// untouched.
pub fn purge_version(store: &dyn ByteStore, sources: &FontSources, version: &str) {
    for key in sources.keys_for_version(version) {
        store.del(&key);
        store.del(&digest_key(&key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        responses: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(responses: &[(&str, Vec<u8>)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FontFetcher for StubFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, GalleyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| GalleyError::Fetch(format!("no stub response for {url}")))
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("gzip write");
        encoder.finish().expect("gzip finish")
    }

    fn cache_with(fetcher: StubFetcher) -> (FontAssetCache, Arc<MemoryStore>, Arc<StubFetcher>) {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(fetcher);
        let cache = FontAssetCache::new(store.clone(), fetcher.clone());
        (cache, store, fetcher)
    }

    #[test]
    fn second_call_is_a_cache_hit() {
        let font = b"fake font program".to_vec();
        let (cache, _store, fetcher) =
            cache_with(StubFetcher::new(&[("https://cdn/font.gz", gzip(&font))]));

        let first = cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .expect("first fetch");
        let second = cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .expect("second fetch");

        assert_eq!(first, font);
        assert_eq!(first, second);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn bad_gzip_falls_back_to_plain_url() {
        let font = b"plain font program".to_vec();
        let (cache, _store, fetcher) = cache_with(StubFetcher::new(&[
            ("https://cdn/font.gz", b"corrupt".to_vec()),
            ("https://cdn/font.ttf", font.clone()),
        ]));

        let bytes = cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .expect("fallback fetch");
        assert_eq!(bytes, font);
        assert_eq!(fetcher.call_count(), 2);

        // The fallback result is cached under the same key.
        cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .expect("cache hit");
        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn both_urls_failing_is_a_fetch_error() {
        let (cache, _store, _fetcher) = cache_with(StubFetcher::new(&[]));
        let err = cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .unwrap_err();
        assert!(matches!(err, GalleyError::Fetch(_)));
    }

    #[test]
    fn corrupted_store_entry_reads_as_miss() {
        let font = b"font program".to_vec();
        let (cache, store, fetcher) =
            cache_with(StubFetcher::new(&[("https://cdn/font.gz", gzip(&font))]));

        cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .expect("populate");
        store.set("noto-v3", b"flipped bits").expect("corrupt");

        let bytes = cache
            .font_bytes("noto-v3", "https://cdn/font.gz", "https://cdn/font.ttf")
            .expect("re-fetch");
        assert_eq!(bytes, font);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn purging_a_version_leaves_other_generations_alone() {
        use crate::registry::noto_sans_sc_sources;

        let store = MemoryStore::new();
        let sources = noto_sans_sc_sources("https://cdn.example/fonts", "v3");
        for key in sources.keys_for_version("v2") {
            store.set(&key, b"old").expect("seed v2");
        }
        for key in sources.keys_for_version("v3") {
            store.set(&key, b"new").expect("seed v3");
        }

        purge_version(&store, &sources, "v2");

        for key in sources.keys_for_version("v2") {
            assert!(store.get(&key).is_none());
        }
        for key in sources.keys_for_version("v3") {
            assert!(store.get(&key).is_some());
        }
    }

    #[test]
    fn base64_tier_skips_byte_fetch_on_hit() {
        let font = b"font program".to_vec();
        let (cache, _store, fetcher) =
            cache_with(StubFetcher::new(&[("https://cdn/font.gz", gzip(&font))]));

        let first = cache
            .font_base64(
                "noto-v3",
                "noto-v3-b64",
                "https://cdn/font.gz",
                "https://cdn/font.ttf",
            )
            .expect("encode");
        assert_eq!(
            first,
            base64::engine::general_purpose::STANDARD.encode(&font)
        );
        assert_eq!(fetcher.call_count(), 1);

        let second = cache
            .font_base64(
                "noto-v3",
                "noto-v3-b64",
                "https://cdn/font.gz",
                "https://cdn/font.ttf",
            )
            .expect("hit");
        assert_eq!(first, second);
        assert_eq!(fetcher.call_count(), 1);
    }
}
