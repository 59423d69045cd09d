use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const NAME: &str = "name";
pub const PREFERRED_USERNAME: &str = "preferred_username";
pub const EMAIL: &str = "email";
pub const ROLE: &str = "role";
pub const GROUPS: &str = "groups";
pub const DIRECTORY_ROLES: &str = "roles";
pub const NONCE: &str = "nonce";

/// Claim types tried, in order, for the identity name.
const IDENTITY_NAME: [&str; 3] = ["unique_name", "upn", "sub"];

pub const UNKNOWN_USER: &str = "Unknown User";

/// Claim values keyed by lowercased claim type. A type may carry several
/// values and their order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    values: BTreeMap<String, Vec<String>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: &str, value: impl Into<String>) {
        self.values
            .entry(kind.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn with(mut self, kind: &str, value: impl Into<String>) -> Self {
        self.add(kind, value);
        self
    }

    pub fn all(&self, kind: &str) -> &[String] {
        self.values
            .get(&kind.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of `kind`, even when it is empty.
    pub fn first_value(&self, kind: &str) -> Option<&str> {
        self.all(kind).first().map(String::as_str)
    }

    /// First non-empty value of `kind`.
    pub fn first(&self, kind: &str) -> Option<&str> {
        self.all(kind)
            .iter()
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }

    /// Total number of claim values.
    pub fn len(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens a decoded token payload. Arrays become repeated claims and
    /// non-string scalars are kept in their JSON text form.
    pub fn from_token(payload: &Map<String, Value>) -> Self {
        let mut claims = Self::new();
        for (kind, value) in payload {
            match value {
                Value::Array(items) => items
                    .iter()
                    .for_each(|item| claims.add(kind, claim_text(item))),
                Value::Null => {}
                other => claims.add(kind, claim_text(other)),
            }
        }
        claims
    }
}

fn claim_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The identity attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub name: Option<String>,
    pub authentication_type: Option<String>,
    pub is_authenticated: bool,
    pub claims: ClaimSet,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(claims: ClaimSet, authentication_type: &str) -> Self {
        let name = IDENTITY_NAME
            .iter()
            .find_map(|kind| claims.first(kind))
            .map(str::to_owned);
        Self {
            name,
            authentication_type: Some(authentication_type.to_owned()),
            is_authenticated: true,
            claims,
        }
    }

    /// Name shown on the Secure page. A present claim wins even when its
    /// value is empty.
    pub fn display_name(&self) -> String {
        self.claims
            .first_value(NAME)
            .or_else(|| self.claims.first_value(PREFERRED_USERNAME))
            .or_else(|| self.claims.first_value(EMAIL))
            .or(self.name.as_deref())
            .unwrap_or(UNKNOWN_USER)
            .to_owned()
    }

    /// Name shown on the landing page, which prefers the e-mail address.
    pub fn landing_name(&self) -> String {
        self.claims
            .first(EMAIL)
            .or_else(|| self.claims.first(PREFERRED_USERNAME))
            .or(self.name.as_deref())
            .unwrap_or("Unknown")
            .to_owned()
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        [ROLE, DIRECTORY_ROLES]
            .iter()
            .any(|kind| self.claims.all(kind).iter().any(|v| v == role))
    }
}

/// Role, group and directory-role claims as display strings, in that order.
/// A directory role is dropped when an earlier entry already mentions it.
pub fn aggregate_roles(claims: &ClaimSet) -> Vec<String> {
    let mut roles: Vec<String> = claims
        .all(ROLE)
        .iter()
        .map(|v| format!("Role: {v}"))
        .chain(claims.all(GROUPS).iter().map(|v| format!("Group: {v}")))
        .collect();
    for dir_role in claims.all(DIRECTORY_ROLES) {
        if !roles.iter().any(|r| r.contains(dir_role.as_str())) {
            roles.push(format!("Directory Role: {dir_role}"));
        }
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn principal(claims: ClaimSet) -> Principal {
        Principal::authenticated(claims, "Bearer")
    }

    #[test]
    fn explicit_name_wins() {
        let p = principal(
            ClaimSet::new()
                .with(EMAIL, "a@contoso.com")
                .with(PREFERRED_USERNAME, "alice")
                .with(NAME, "Alice Smith")
                .with("sub", "abc"),
        );
        assert_eq!(p.display_name(), "Alice Smith");
    }

    #[test]
    fn name_priority_falls_through() {
        let p = principal(
            ClaimSet::new()
                .with(EMAIL, "a@contoso.com")
                .with(PREFERRED_USERNAME, "alice"),
        );
        assert_eq!(p.display_name(), "alice");

        let p = principal(ClaimSet::new().with(EMAIL, "a@contoso.com"));
        assert_eq!(p.display_name(), "a@contoso.com");
    }

    #[test]
    fn falls_back_to_identity_name_then_literal() {
        let p = principal(ClaimSet::new().with("upn", "alice@contoso.com"));
        assert_eq!(p.display_name(), "alice@contoso.com");

        let p = principal(ClaimSet::new().with(ROLE, "Reader"));
        assert_eq!(p.name, None);
        assert_eq!(p.display_name(), UNKNOWN_USER);
    }

    #[test]
    fn present_but_empty_name_claim_still_wins() {
        let p = principal(ClaimSet::new().with(NAME, "").with(EMAIL, "a@contoso.com"));
        assert_eq!(p.display_name(), "");
    }

    #[test]
    fn landing_name_skips_empty_values() {
        let p = principal(
            ClaimSet::new()
                .with(EMAIL, "")
                .with(PREFERRED_USERNAME, "alice"),
        );
        assert_eq!(p.landing_name(), "alice");
    }

    #[test]
    fn landing_name_prefers_email() {
        let p = principal(
            ClaimSet::new()
                .with(NAME, "Alice Smith")
                .with(PREFERRED_USERNAME, "alice")
                .with(EMAIL, "a@contoso.com"),
        );
        assert_eq!(p.landing_name(), "a@contoso.com");
        assert_eq!(Principal::anonymous().landing_name(), "Unknown");
    }

    #[test]
    fn claim_types_are_case_insensitive() {
        let claims = ClaimSet::new().with("Preferred_Username", "alice");
        assert_eq!(claims.first(PREFERRED_USERNAME), Some("alice"));
    }

    #[test]
    fn roles_keep_namespace_order_and_dedup_directory_roles() {
        let claims = ClaimSet::new()
            .with(DIRECTORY_ROLES, "Reader")
            .with(DIRECTORY_ROLES, "Auditor")
            .with(GROUPS, "g-1")
            .with(ROLE, "Reader")
            .with(ROLE, "Writer");
        assert_eq!(
            aggregate_roles(&claims),
            vec![
                "Role: Reader",
                "Role: Writer",
                "Group: g-1",
                "Directory Role: Auditor",
            ]
        );
    }

    #[test]
    fn directory_role_dedup_is_substring_based() {
        let claims = ClaimSet::new()
            .with(GROUPS, "SecureAppUsers-EU")
            .with(DIRECTORY_ROLES, "SecureAppUsers")
            .with(DIRECTORY_ROLES, "Admin")
            .with(DIRECTORY_ROLES, "Admin");
        assert_eq!(
            aggregate_roles(&claims),
            vec!["Group: SecureAppUsers-EU", "Directory Role: Admin"]
        );
    }

    #[test]
    fn no_role_claims_gives_empty_list() {
        assert!(aggregate_roles(&ClaimSet::new().with(NAME, "x")).is_empty());
    }

    #[test]
    fn membership_checks_role_and_directory_role_claims() {
        let p = principal(
            ClaimSet::new()
                .with(DIRECTORY_ROLES, "AppAdministrators")
                .with(GROUPS, "SecureAppUsers"),
        );
        assert!(p.is_in_role("AppAdministrators"));
        assert!(!p.is_in_role("SecureAppUsers"));
        assert!(!p.is_in_role("appadministrators"));
    }

    #[test]
    fn flattens_token_payload() {
        let payload = json!({
            "sub": "abc",
            "roles": ["A", "B"],
            "exp": 1700000000,
            "email_verified": true,
            "missing": null,
        });
        let claims = ClaimSet::from_token(payload.as_object().unwrap());
        assert_eq!(claims.all(DIRECTORY_ROLES), ["A", "B"]);
        assert_eq!(claims.first("exp"), Some("1700000000"));
        assert_eq!(claims.first("email_verified"), Some("true"));
        assert!(claims.all("missing").is_empty());
        assert_eq!(claims.len(), 5);

        let p = Principal::authenticated(claims, "Bearer");
        assert_eq!(p.name.as_deref(), Some("abc"));
        assert!(p.is_authenticated);
    }
}
