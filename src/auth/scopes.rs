//! OAuth scope sets.
//!
//! Used twice in the flow: the scopes requested when the authorization
//! redirect is issued, and the scopes Shopify reports as granted in the
//! token response. Comparing the two tells whether a returning merchant
//! needs to re-authorize after the app asked for more access.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A set of Shopify OAuth scopes.
///
/// Write scopes imply the matching read scope (`write_products` implies
/// `read_products`), so sets are expanded when parsed. Iteration and
/// `Display` are sorted, which keeps authorization URLs deterministic.
///
/// ```rust
/// use shopify_onboarding::AuthScopes;
///
/// let granted: AuthScopes = "write_products, read_orders".parse().unwrap();
/// let required: AuthScopes = "read_products".parse().unwrap();
/// assert!(granted.covers(&required));
/// assert_eq!(required.to_string(), "read_products");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AuthScopes {
    scopes: BTreeSet<String>,
}

impl AuthScopes {
    /// Creates an empty scope set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the scope set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Returns `true` if this set contains every scope in `other`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.scopes.is_subset(&self.scopes)
    }

    /// Returns the scopes in `required` that this set lacks.
    #[must_use]
    pub fn missing_from(&self, required: &Self) -> Vec<String> {
        required.scopes.difference(&self.scopes).cloned().collect()
    }

    /// Returns an iterator over the scopes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    fn add_implied_scopes(&mut self) {
        let implied: Vec<String> = self
            .scopes
            .iter()
            .filter_map(|scope| Self::implied_scope(scope))
            .collect();
        self.scopes.extend(implied);
    }

    fn implied_scope(scope: &str) -> Option<String> {
        scope
            .strip_prefix("unauthenticated_write_")
            .map(|rest| format!("unauthenticated_read_{rest}"))
            .or_else(|| {
                scope
                    .strip_prefix("write_")
                    .map(|rest| format!("read_{rest}"))
            })
    }
}

impl AuthScopes {
    /// Parses a comma-separated scope list, skipping invalid entries.
    ///
    /// Returns the valid scopes and the entries that were skipped. Used for
    /// scope lists reported by Shopify, where one odd entry should not throw
    /// away an otherwise usable grant.
    ///
    /// ```rust
    /// use shopify_onboarding::AuthScopes;
    ///
    /// let (scopes, rejected) = AuthScopes::parse_lenient("read_products, bad scope!");
    /// assert_eq!(scopes.to_string(), "read_products");
    /// assert_eq!(rejected, vec!["bad scope!"]);
    /// ```
    #[must_use]
    pub fn parse_lenient(s: &str) -> (Self, Vec<String>) {
        let mut scopes = BTreeSet::new();
        let mut rejected = Vec::new();

        for scope in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if Self::is_valid_scope(scope) {
                scopes.insert(scope.to_string());
            } else {
                rejected.push(scope.to_string());
            }
        }

        let mut auth_scopes = Self { scopes };
        auth_scopes.add_implied_scopes();
        (auth_scopes, rejected)
    }

    fn is_valid_scope(scope: &str) -> bool {
        scope.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl FromStr for AuthScopes {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scopes, rejected) = Self::parse_lenient(s);
        match rejected.first() {
            Some(scope) => Err(ConfigError::InvalidScopes {
                reason: format!("Invalid characters in scope: '{scope}'"),
            }),
            None => Ok(scopes),
        }
    }
}

impl fmt::Display for AuthScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

impl Serialize for AuthScopes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AuthScopes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_scopes_parses_comma_separated() {
        let scopes: AuthScopes = "read_products, write_orders".parse().unwrap();
        assert!(scopes.iter().any(|s| s == "read_products"));
        assert!(scopes.iter().any(|s| s == "write_orders"));
    }

    #[test]
    fn test_auth_scopes_handles_implied_scopes() {
        let scopes: AuthScopes = "write_products,unauthenticated_write_checkouts"
            .parse()
            .unwrap();

        assert!(scopes.iter().any(|s| s == "read_products"));
        assert!(scopes
            .iter()
            .any(|s| s == "unauthenticated_read_checkouts"));
    }

    #[test]
    fn test_auth_scopes_rejects_invalid_characters() {
        let result: Result<AuthScopes, _> = "read_products,write orders".parse();
        assert!(matches!(result, Err(ConfigError::InvalidScopes { .. })));
    }

    #[test]
    fn test_display_is_sorted_and_deterministic() {
        let scopes: AuthScopes = "write_orders,read_customers".parse().unwrap();
        assert_eq!(
            scopes.to_string(),
            "read_customers,read_orders,write_orders"
        );
    }

    #[test]
    fn test_covers_and_missing_from() {
        let granted: AuthScopes = "read_products,write_orders".parse().unwrap();
        let required: AuthScopes = "read_products,read_customers".parse().unwrap();

        assert!(!granted.covers(&required));
        assert_eq!(granted.missing_from(&required), vec!["read_customers"]);

        let subset: AuthScopes = "read_orders".parse().unwrap();
        assert!(granted.covers(&subset));
        assert!(granted.missing_from(&subset).is_empty());
    }

    #[test]
    fn test_lenient_parse_keeps_valid_scopes() {
        let (scopes, rejected) = AuthScopes::parse_lenient("write_orders,read-products, ,read_themes");
        assert_eq!(scopes.to_string(), "read_orders,read_themes,write_orders");
        assert_eq!(rejected, vec!["read-products"]);

        assert!("write_orders,read-products".parse::<AuthScopes>().is_err());
    }

    #[test]
    fn test_empty_string_parses_to_empty_set() {
        let scopes: AuthScopes = "".parse().unwrap();
        assert!(scopes.is_empty());
        assert_eq!(serde_json::to_string(&scopes).unwrap(), r#""""#);
    }

    #[test]
    fn test_serde_uses_comma_separated_string() {
        let original: AuthScopes = "read_products,write_orders".parse().unwrap();
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, r#""read_orders,read_products,write_orders""#);
        let restored: AuthScopes = serde_json::from_str(&json).unwrap();
        assert_eq!(original, restored);
    }
}
