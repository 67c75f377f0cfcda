use crate::error::GalleyError;
use std::io::Read;
use std::time::Duration;

/// Global timeout for font downloads.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum accepted size of one font payload (64 MB). CJK faces are large
/// but bounded; anything beyond this is a misbehaving server.
const MAX_FONT_DOWNLOAD: u64 = 64 * 1024 * 1024;

/// Network retrieval of font binaries by URL. The engine only ever reads;
/// implementations decide transport, TLS, and host policy.
pub trait FontFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, GalleyError>;
}

/// Blocking HTTP fetcher with a global timeout and a response size limit.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FontFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, GalleyError> {
        let bytes = self
            .agent
            .get(url)
            .header("User-Agent", "galley")
            .call()
            .map_err(|err| GalleyError::Fetch(format!("GET {url}: {err}")))?
            .into_body()
            .with_config()
            .limit(MAX_FONT_DOWNLOAD)
            .read_to_vec()
            .map_err(|err| GalleyError::Fetch(format!("reading {url}: {err}")))?;
        Ok(bytes)
    }
}

/// Streaming gzip decompression of a fetched asset.
pub(crate) fn gunzip(data: &[u8]) -> Result<Vec<u8>, GalleyError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| GalleyError::Decompress(err.to_string()))?;
    Ok(out)
}
