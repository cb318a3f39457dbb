//! Frontend redirect URLs.
//!
//! Every OAuth flow ends with the browser being sent back to the frontend,
//! with query parameters describing the outcome:
//!
//! ```text
//! success: oauth=complete&is_new=<bool>&merchant_id=<id>&shop=<domain>[&conversation_id=<id>]
//! failure: oauth=complete&error=<code>[&conversation_id=<id>]
//! ```
//!
//! Parameter order is fixed and every value is percent-encoded, so the
//! output for a given outcome is always the same string.

use crate::auth::oauth::FailureReason;
use crate::config::HostUrl;

/// Outcome of an OAuth flow, as reported to the frontend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectParams {
    /// The merchant was stored.
    Success {
        /// Whether this flow created the merchant.
        is_new: bool,
        /// The merchant's ID.
        merchant_id: String,
        /// The shop domain.
        shop: String,
        /// The originating conversation, if known.
        conversation_id: Option<String>,
    },
    /// The flow stopped early.
    Failure {
        /// Public error code.
        reason: FailureReason,
        /// The originating conversation, if it was decoded before failing.
        conversation_id: Option<String>,
    },
}

/// Builds redirect URLs against a fixed frontend base URL.
///
/// A query string already present on the base URL is kept and extended, and
/// a fragment is moved after the new parameters.
///
/// # Example
///
/// ```rust
/// use shopify_onboarding::redirect::{RedirectParams, RedirectUrlBuilder};
/// use shopify_onboarding::auth::oauth::FailureReason;
/// use shopify_onboarding::HostUrl;
///
/// let builder = RedirectUrlBuilder::new(HostUrl::new("https://chat.example.com/app").unwrap());
/// let url = builder.build(&RedirectParams::Failure {
///     reason: FailureReason::InvalidHmac,
///     conversation_id: None,
/// });
/// assert_eq!(url, "https://chat.example.com/app?oauth=complete&error=invalid_hmac");
/// ```
#[derive(Clone, Debug)]
pub struct RedirectUrlBuilder {
    base: HostUrl,
}

impl RedirectUrlBuilder {
    /// Creates a builder for `base`.
    #[must_use]
    pub const fn new(base: HostUrl) -> Self {
        Self { base }
    }

    /// Builds the absolute redirect URL for `params`.
    #[must_use]
    pub fn build(&self, params: &RedirectParams) -> String {
        let mut pairs: Vec<(&str, &str)> = vec![("oauth", "complete")];
        let conversation_id = match params {
            RedirectParams::Success {
                is_new,
                merchant_id,
                shop,
                conversation_id,
            } => {
                pairs.push(("is_new", if *is_new { "true" } else { "false" }));
                pairs.push(("merchant_id", merchant_id));
                pairs.push(("shop", shop));
                conversation_id
            }
            RedirectParams::Failure {
                reason,
                conversation_id,
            } => {
                pairs.push(("error", reason.as_str()));
                conversation_id
            }
        };
        if let Some(conversation_id) = conversation_id {
            pairs.push(("conversation_id", conversation_id));
        }

        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let (head, fragment) = match self.base.as_ref().split_once('#') {
            Some((head, fragment)) => (head, Some(fragment)),
            None => (self.base.as_ref(), None),
        };
        let separator = match head.find('?') {
            None => "?",
            Some(_) if head.ends_with('?') || head.ends_with('&') => "",
            Some(_) => "&",
        };

        let mut url = format!("{head}{separator}{query}");
        if let Some(fragment) = fragment {
            url.push('#');
            url.push_str(fragment);
        }
        url
    }
}
