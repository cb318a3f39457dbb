//! Query parameters of a Shopify OAuth callback.

use std::collections::BTreeMap;

use serde::Deserialize;

/// The full query string Shopify sends to the callback endpoint.
///
/// Every parameter is kept, not just the ones the flow reads: Shopify signs
/// the whole query string (minus `hmac` and `signature`), and new parameters
/// such as `host` appear over time.
///
/// # Example
///
/// ```rust
/// use shopify_onboarding::auth::oauth::CallbackQuery;
///
/// let query = CallbackQuery::from_pairs([
///     ("shop", "my-store.myshopify.com"),
///     ("code", "abc"),
///     ("timestamp", "1700000000"),
///     ("hmac", "deadbeef"),
/// ]);
///
/// assert_eq!(query.code(), Some("abc"));
/// assert_eq!(
///     query.to_signable_string(),
///     "code=abc&shop=my-store.myshopify.com&timestamp=1700000000"
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CallbackQuery {
    params: BTreeMap<String, String>,
}

impl CallbackQuery {
    /// Wraps an already-parsed parameter map.
    #[must_use]
    pub const fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    /// Builds a query from key/value pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Returns a parameter by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The authorization code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.non_empty("code")
    }

    /// The shop domain as sent by Shopify (unvalidated).
    #[must_use]
    pub fn shop(&self) -> Option<&str> {
        self.non_empty("shop")
    }

    /// The state token round-tripped through Shopify.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.non_empty("state")
    }

    /// The hex HMAC Shopify computed over the other parameters.
    #[must_use]
    pub fn hmac(&self) -> Option<&str> {
        self.non_empty("hmac")
    }

    /// Builds the message Shopify signed: every parameter except `hmac` and
    /// `signature`, sorted by key, joined as `key=value` with `&`.
    #[must_use]
    pub fn to_signable_string(&self) -> String {
        self.params
            .iter()
            .filter(|(k, _)| k.as_str() != "hmac" && k.as_str() != "signature")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}
