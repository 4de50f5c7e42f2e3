//! Content retrieval.

use std::io::{Cursor, Read};
use std::path::PathBuf;

use anyhow::{Context, bail};
use tessera_resource::Capability;
use tessera_resource::namespace::content;
use url::Url;

/// Supplies the bytes behind a content capability.
pub trait ContentReader: Send + Sync {
    /// Open a reader over the capability's payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability has no retrievable content.
    fn open(&self, capability: &Capability) -> anyhow::Result<Box<dyn Read + Send>>;
}

/// Reads embedded bytes, `file:` URLs and plain filesystem paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentReader;

impl DefaultContentReader {
    /// Filesystem path behind a content URL, if it names one.
    ///
    /// `file:` URLs map to their path; strings that are not absolute URLs are
    /// taken as paths. Other schemes yield `None`.
    #[must_use]
    pub fn resolve_path(location: &str) -> Option<PathBuf> {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Ok(_) => None,
            Err(url::ParseError::RelativeUrlWithoutBase) => Some(PathBuf::from(location)),
            Err(_) => None,
        }
    }
}

impl ContentReader for DefaultContentReader {
    fn open(&self, capability: &Capability) -> anyhow::Result<Box<dyn Read + Send>> {
        if let Some(payload) = capability.shared_payload() {
            return Ok(Box::new(Cursor::new(payload)));
        }

        let Some(location) = capability
            .attribute(content::URL)
            .and_then(|v| v.as_str())
        else {
            bail!("{capability} has neither embedded bytes nor a url");
        };
        let Some(path) = Self::resolve_path(location) else {
            bail!("unsupported content location '{location}'");
        };
        let file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open content at {}", path.display()))?;
        Ok(Box::new(std::io::BufReader::new(file)))
    }
}
