//! Ephemeral, in-memory credential broker.
//!
//! Tokens live only inside this map, keyed by `(request_id, provider)`, and
//! are never written to disk or emitted in a log record. `CredentialRef`
//! deliberately does not implement `Debug`/`Display` so that an accidental
//! `tracing::info!(?credential)` call site fails to compile instead of
//! leaking a token at runtime.

use crate::config::NetworkConfig;
use crate::types::AuthProvider;
use reqwest::RequestBuilder;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use zeroize::Zeroizing;

struct Entry {
    provider: AuthProvider,
    token: Zeroizing<String>,
    expires_at: Instant,
}

/// Holds ephemeral per-request tokens and attaches them to outbound
/// requests. Exposes no way to read a token back out. Keyed by
/// `(request_id, provider)` rather than `request_id` alone, since a single
/// request may carry a token for more than one provider concurrently.
#[derive(Default)]
pub struct CredentialBroker {
    entries: Mutex<HashMap<(String, AuthProvider), Entry>>,
}

impl CredentialBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for `request_id`/`provider`, good until it is
    /// scrubbed or the one-hour ceiling elapses, whichever comes first.
    pub fn register(&self, request_id: &str, provider: AuthProvider, token: String) {
        let mut entries = self.entries.lock().expect("credential broker lock poisoned");
        entries.insert(
            (request_id.to_string(), provider),
            Entry {
                provider,
                token: Zeroizing::new(token),
                expires_at: Instant::now() + NetworkConfig::CREDENTIAL_TTL,
            },
        );
    }

    /// Attaches every non-expired credential registered for `request_id` to
    /// `builder`, per each provider's attachment rule. A no-op if nothing is
    /// registered for `request_id`.
    pub fn attach(&self, request_id: &str, builder: RequestBuilder) -> (RequestBuilder, bool) {
        let entries = self.entries.lock().expect("credential broker lock poisoned");
        let now = Instant::now();
        let mut builder = builder;
        let mut attached = false;
        for ((id, _provider), entry) in entries.iter() {
            if id != request_id || now > entry.expires_at {
                continue;
            }
            builder = match entry.provider {
                AuthProvider::Huggingface => builder.bearer_auth(entry.token.as_str()),
                AuthProvider::Civitai => builder.query(&[("token", entry.token.as_str())]),
            };
            attached = true;
        }
        (builder, attached)
    }

    /// Zeroes and removes every entry registered for `request_id`, across
    /// all providers. Idempotent.
    pub fn scrub(&self, request_id: &str) {
        let mut entries = self.entries.lock().expect("credential broker lock poisoned");
        entries.retain(|(id, _provider), _| id != request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_adds_bearer_header_for_huggingface() {
        let broker = CredentialBroker::new();
        broker.register("req1", AuthProvider::Huggingface, "secret-token".into());
        let client = reqwest::Client::new();
        let (builder, attached) = broker.attach("req1", client.get("https://huggingface.co/x"));
        assert!(attached);
        let request = builder.build().unwrap();
        let header = request.headers().get("authorization").unwrap();
        assert_eq!(header, "Bearer secret-token");
    }

    #[test]
    fn scrub_removes_the_entry() {
        let broker = CredentialBroker::new();
        broker.register("req1", AuthProvider::Civitai, "secret".into());
        broker.scrub("req1");
        let client = reqwest::Client::new();
        let (_, attached) = broker.attach("req1", client.get("https://civitai.com/x"));
        assert!(!attached);
    }

    #[test]
    fn unknown_request_id_is_a_no_op() {
        let broker = CredentialBroker::new();
        let client = reqwest::Client::new();
        let (_, attached) = broker.attach("nope", client.get("https://civitai.com/x"));
        assert!(!attached);
    }

    #[test]
    fn two_providers_on_the_same_request_id_both_attach() {
        let broker = CredentialBroker::new();
        broker.register("req1", AuthProvider::Huggingface, "hf-token".into());
        broker.register("req1", AuthProvider::Civitai, "civitai-key".into());
        let client = reqwest::Client::new();
        let (builder, attached) = broker.attach("req1", client.get("https://huggingface.co/x"));
        assert!(attached);
        let request = builder.build().unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer hf-token"
        );
        assert!(request.url().query().unwrap().contains("token=civitai-key"));
    }
}
