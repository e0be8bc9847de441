//! Session token persistence.
//!
//! The backend keeps its session in cookies. The [`SessionStore`] persists the
//! current token set under a fixed storage key, replays matching tokens onto
//! every outgoing request as a `Cookie` header, and captures `Set-Cookie`
//! updates from every response.
//!
//! # Concurrency
//!
//! Each exchange captures on top of the snapshot it replayed and the result
//! overwrites the stored set. Two exchanges completing out of order may
//! therefore overwrite each other's captured tokens; the last write wins.

use api_dispatch_core::environment::KeyValueStore;
use api_dispatch_core::transport::{Headers, TransportResponse};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

fn default_version() -> String {
    "0".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

/// One persisted cookie-like credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain the cookie applies to (a leading dot is ignored)
    pub domain: String,
    /// Path prefix the cookie applies to
    #[serde(default = "default_path")]
    pub path: String,
    /// Cookie version
    #[serde(default = "default_version")]
    pub version: String,
}

impl SessionToken {
    /// Create a token for `domain` with path `/` and version `0`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            version: default_version(),
        }
    }

    /// Whether this token should be sent to `host` for `path`.
    #[must_use]
    pub fn matches(&self, host: &str, path: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        let domain_ok = !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')));
        let prefix = if self.path.is_empty() { "/" } else { self.path.as_str() };
        domain_ok && path.starts_with(prefix)
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.domain.trim_start_matches('.').eq_ignore_ascii_case(other.domain.trim_start_matches('.'))
    }
}

/// Ordered set of session tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(Vec<SessionToken>);

impl TokenSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Tokens in order.
    #[must_use]
    pub fn tokens(&self) -> &[SessionToken] {
        &self.0
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of the first token called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|token| token.name == name)
            .map(|token| token.value.as_str())
    }

    /// Insert `token`, replacing a token with the same name, domain and path.
    pub fn upsert(&mut self, token: SessionToken) {
        match self.0.iter_mut().find(|existing| existing.same_slot(&token)) {
            Some(existing) => *existing = token,
            None => self.0.push(token),
        }
    }

    /// Remove the token with the same name, domain and path as `token`.
    pub fn remove(&mut self, token: &SessionToken) {
        self.0.retain(|existing| !existing.same_slot(token));
    }

    /// `Cookie` header value for `host` and `path`, if any token matches.
    #[must_use]
    pub fn cookie_header(&self, host: &str, path: &str) -> Option<String> {
        let pairs: Vec<String> = self
            .0
            .iter()
            .filter(|token| token.matches(host, path))
            .map(|token| format!("{}={}", token.name, token.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

impl FromIterator<SessionToken> for TokenSet {
    fn from_iter<I: IntoIterator<Item = SessionToken>>(iter: I) -> Self {
        let mut set = Self::new();
        for token in iter {
            set.upsert(token);
        }
        set
    }
}

/// Persists and replays the session token set.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    current: RwLock<TokenSet>,
}

impl SessionStore {
    /// Create a store and load the persisted token set.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let current = read_tokens(storage.as_ref(), &key);
        tracing::debug!(key = %key, tokens = current.len(), "Session tokens loaded");
        Self {
            storage,
            key,
            current: RwLock::new(current),
        }
    }

    /// Reload the token set from storage, replacing the in-memory copy.
    pub fn load(&self) -> TokenSet {
        let tokens = read_tokens(self.storage.as_ref(), &self.key);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = tokens.clone();
        tokens
    }

    /// Snapshot of the current token set.
    #[must_use]
    pub fn tokens(&self) -> TokenSet {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add a `Cookie` header carrying every token of `tokens` that matches `url`.
    ///
    /// Caller-supplied `Cookie` headers are kept; replayed tokens are appended
    /// to the first one.
    pub fn replay(tokens: &TokenSet, url: &str, headers: &mut Headers) {
        let Ok(parsed) = Url::parse(url) else {
            return;
        };
        let Some(host) = parsed.host_str() else {
            return;
        };
        let Some(cookies) = tokens.cookie_header(host, parsed.path()) else {
            return;
        };

        match headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case("cookie"))
        {
            Some((_, existing)) => {
                existing.push_str("; ");
                existing.push_str(&cookies);
            }
            None => headers.push(("Cookie".to_string(), cookies)),
        }
    }

    /// Apply the `Set-Cookie` headers of `response` on top of `replayed`.
    #[must_use]
    pub fn capture(replayed: &TokenSet, response: &TransportResponse, url: &str) -> TokenSet {
        let host = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .unwrap_or_default();

        let mut tokens = replayed.clone();
        for header in response.header_values("set-cookie") {
            match parse_set_cookie(header, &host) {
                Some(SetCookie::Store(token)) => tokens.upsert(token),
                Some(SetCookie::Remove(token)) => tokens.remove(&token),
                None => tracing::debug!(header, "Ignoring malformed Set-Cookie header"),
            }
        }
        tokens
    }

    /// Replace the current token set and write it to storage.
    ///
    /// Storage failures are logged; the in-memory set is updated regardless.
    pub fn persist(&self, tokens: TokenSet) {
        match serde_json::to_vec(&tokens) {
            Ok(bytes) => {
                if let Err(e) = self.storage.set(&self.key, &bytes) {
                    tracing::warn!(error = %e, "Failed to persist session tokens");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode session tokens"),
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .field("tokens", &self.tokens().len())
            .finish_non_exhaustive()
    }
}

fn read_tokens(storage: &dyn KeyValueStore, key: &str) -> TokenSet {
    match storage.get(key) {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Discarding undecodable session tokens");
            TokenSet::new()
        }),
        Ok(None) => TokenSet::new(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read session tokens");
            TokenSet::new()
        }
    }
}

enum SetCookie {
    Store(SessionToken),
    Remove(SessionToken),
}

fn parse_set_cookie(header: &str, default_domain: &str) -> Option<SetCookie> {
    let mut segments = header.split(';');
    let (name, value) = segments.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut token = SessionToken::new(name, value.trim().trim_matches('"'), default_domain);
    let mut expired = false;

    for attribute in segments {
        let (key, val) = attribute
            .split_once('=')
            .map_or((attribute.trim(), ""), |(k, v)| (k.trim(), v.trim()));
        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => token.domain = val.to_string(),
            "path" if val.starts_with('/') => token.path = val.to_string(),
            "version" if !val.is_empty() => token.version = val.to_string(),
            "max-age" => expired = val.parse::<i64>().is_ok_and(|age| age <= 0),
            _ => {}
        }
    }

    Some(if expired {
        SetCookie::Remove(token)
    } else {
        SetCookie::Store(token)
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const URL: &str = "https://api.example.com/v1/user";

    fn store_with(bytes: Option<&[u8]>) -> (Arc<MemoryStore>, SessionStore) {
        let storage = Arc::new(MemoryStore::new());
        if let Some(bytes) = bytes {
            storage.set("cookieStorage", bytes).expect("seed storage");
        }
        let session = SessionStore::new(Arc::clone(&storage) as Arc<dyn KeyValueStore>, "cookieStorage");
        (storage, session)
    }

    #[test]
    fn loads_persisted_tokens() {
        let (_, session) = store_with(Some(
            br#"[{"name":"sid","value":"abc","domain":"api.example.com","path":"/","version":"0"}]"#,
        ));
        assert_eq!(session.tokens().get("sid"), Some("abc"));
    }

    #[test]
    fn undecodable_storage_is_empty() {
        let (_, session) = store_with(Some(b"not json"));
        assert!(session.tokens().is_empty());
    }

    #[test]
    fn replay_adds_matching_cookies_only() {
        let tokens: TokenSet = vec![
            SessionToken::new("sid", "abc", ".example.com"),
            SessionToken::new("other", "x", "elsewhere.org"),
        ]
        .into_iter()
        .collect();

        let mut headers = Vec::new();
        SessionStore::replay(&tokens, URL, &mut headers);
        assert_eq!(headers, vec![("Cookie".to_string(), "sid=abc".to_string())]);
    }

    #[test]
    fn replay_appends_to_existing_cookie_header() {
        let tokens: TokenSet = std::iter::once(SessionToken::new("sid", "abc", "api.example.com")).collect();
        let mut headers = vec![("cookie".to_string(), "theme=dark".to_string())];
        SessionStore::replay(&tokens, URL, &mut headers);
        assert_eq!(headers, vec![("cookie".to_string(), "theme=dark; sid=abc".to_string())]);
    }

    #[test]
    fn domain_match_requires_label_boundary() {
        let token = SessionToken::new("sid", "abc", "example.com");
        assert!(token.matches("api.example.com", "/"));
        assert!(!token.matches("badexample.com", "/"));
    }

    #[test]
    fn path_must_prefix_request_path() {
        let mut token = SessionToken::new("sid", "abc", "api.example.com");
        token.path = "/admin".to_string();
        assert!(!token.matches("api.example.com", "/v1/user"));
        assert!(token.matches("api.example.com", "/admin/users"));
    }

    #[test]
    fn capture_applies_set_cookie_over_snapshot() {
        let replayed: TokenSet = vec![
            SessionToken::new("sid", "old", "api.example.com"),
            SessionToken::new("keep", "1", "api.example.com"),
            SessionToken::new("gone", "1", "api.example.com"),
        ]
        .into_iter()
        .collect();
        let response = TransportResponse::ok("{}")
            .with_header("Set-Cookie", "sid=new; Path=/; HttpOnly")
            .with_header("Set-Cookie", "gone=; Max-Age=0")
            .with_header("Set-Cookie", "fresh=2; Domain=.example.com");

        let captured = SessionStore::capture(&replayed, &response, URL);

        assert_eq!(captured.get("sid"), Some("new"));
        assert_eq!(captured.get("keep"), Some("1"));
        assert_eq!(captured.get("gone"), None);
        assert_eq!(captured.get("fresh"), Some("2"));
        assert_eq!(captured.len(), 3);
    }

    #[test]
    fn persist_overwrites_storage() {
        let (storage, session) = store_with(None);
        let tokens: TokenSet = std::iter::once(SessionToken::new("sid", "abc", "api.example.com")).collect();

        session.persist(tokens.clone());

        let stored = storage.get("cookieStorage").expect("get").expect("persisted");
        let decoded: TokenSet = serde_json::from_slice(&stored).expect("valid json");
        assert_eq!(decoded, tokens);
        assert_eq!(session.tokens(), tokens);

        session.persist(TokenSet::new());
        assert_eq!(session.load(), TokenSet::new());
    }

    #[test]
    fn malformed_set_cookie_is_ignored() {
        let response = TransportResponse::ok("{}").with_header("Set-Cookie", "=novalue");
        let captured = SessionStore::capture(&TokenSet::new(), &response, URL);
        assert!(captured.is_empty());
    }
}
