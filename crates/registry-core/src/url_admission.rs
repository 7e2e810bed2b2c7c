//! Host allowlisting and credential-parameter stripping for source URLs.

use crate::config::NetworkConfig;
use crate::error::{RegistryError, Result};
use url::Url;

/// Admits or rejects a URL by host suffix, and strips known credential
/// query parameters before the URL is persisted in the catalog.
#[derive(Clone)]
pub struct UrlAdmission {
    allowed_hosts: Vec<String>,
}

impl UrlAdmission {
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self { allowed_hosts }
    }

    pub fn default_allowlist() -> Self {
        Self::new(
            NetworkConfig::DEFAULT_ALLOWED_HOSTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// Returns whether `host` matches the allowlist as a suffix (so
    /// `huggingface.co` also admits `cdn-lfs.huggingface.co`).
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    /// Parses and admits `raw_url`. On success returns the original URL
    /// (used for the actual fetch, including any credentials) alongside
    /// the sanitized form suitable for persistence.
    pub fn admit(&self, raw_url: &str) -> Result<(Url, Url)> {
        let url = Url::parse(raw_url)
            .map_err(|e| RegistryError::UrlForbidden(format!("unparseable url: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| RegistryError::UrlForbidden("url has no host".into()))?;
        if !self.is_host_allowed(host) {
            return Err(RegistryError::UrlForbidden(format!(
                "host {host} is not on the allowlist"
            )));
        }
        Ok((url.clone(), strip_credential_params(&url)))
    }
}

/// Removes known credential query parameter names (case-insensitive) from
/// a URL, returning the sanitized form. The original `url` is untouched and
/// remains usable for the real fetch.
pub fn strip_credential_params(url: &Url) -> Url {
    let mut sanitized = url.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| {
            !NetworkConfig::CREDENTIAL_PARAMS
                .iter()
                .any(|p| p.eq_ignore_ascii_case(name))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if retained.is_empty() {
        sanitized.set_query(None);
    } else {
        sanitized
            .query_pairs_mut()
            .clear()
            .extend_pairs(retained.iter());
    }
    sanitized
}
