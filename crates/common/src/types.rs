//! Core types shared by the client and the test harness

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Normalized response of a single API call.
///
/// Every client call yields one of these regardless of status code; a body
/// that is not valid JSON leaves `json` empty and keeps the raw `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult {
    pub status: u16,
    pub json: Option<Value>,
    pub text: String,
    pub headers: BTreeMap<String, String>,
}

impl ApiResult {
    /// Build a result from the raw pieces, parsing the body when possible
    pub fn from_parts(status: u16, text: String, headers: BTreeMap<String, String>) -> Self {
        let json = serde_json::from_str::<Value>(&text).ok();
        Self {
            status,
            json,
            text,
            headers,
        }
    }

    /// The body's `success` flag, if the body parsed and carries one
    pub fn success_flag(&self) -> Option<bool> {
        self.json
            .as_ref()
            .and_then(|body| body.get("success"))
            .and_then(Value::as_bool)
    }

    /// HTTP 200 with `success: true`
    pub fn is_ok(&self) -> bool {
        self.status == 200 && self.success_flag() == Some(true)
    }

    /// True if `status` is one of `accepted` and the success flag is set
    pub fn succeeded_with(&self, accepted: &[u16]) -> bool {
        accepted.contains(&self.status) && self.success_flag() == Some(true)
    }

    /// The body's `message` field
    pub fn message(&self) -> Option<&str> {
        self.lookup("message").and_then(Value::as_str)
    }

    /// Resolve a dotted path (`user.email`, `orders.0.number`) in the body
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        self.json.as_ref().and_then(|body| lookup_path(body, path))
    }

    /// Access token with any `Bearer ` scheme prefix removed
    pub fn access_token(&self) -> Option<String> {
        self.lookup("accessToken")
            .and_then(Value::as_str)
            .map(strip_bearer)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lookup("refreshToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    /// One-line diagnostic with status and raw body
    pub fn describe(&self) -> String {
        format!("status {}, body: {}", self.status, self.text)
    }
}

/// Resolve a dotted path inside a JSON value. Numeric segments index arrays.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Remove a `Bearer ` credential scheme prefix if present
pub fn strip_bearer(token: &str) -> &str {
    let trimmed = token.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}

/// An account created for the duration of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUser {
    pub email: String,
    pub password: String,
    pub name: String,
    /// Bearer credential without scheme prefix, once obtained
    pub token: Option<String>,
}

impl TestUser {
    pub fn new(email: impl Into<String>, password: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            name: name.into(),
            token: None,
        }
    }

    /// Record a freshly obtained token; empty tokens are ignored
    pub fn set_token(&mut self, token: &str) {
        let token = strip_bearer(token);
        if !token.is_empty() {
            self.token = Some(token.to_string());
        }
    }

    /// Apply the fields of an accepted `PATCH /auth/user` body
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) {
        if let Some(email) = patch.get("email").and_then(Value::as_str) {
            self.email = email.to_string();
        }
        if let Some(password) = patch.get("password").and_then(Value::as_str) {
            self.password = password.to_string();
        }
        if let Some(name) = patch.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
    }
}

/// Ingredient identifiers published by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientCatalog {
    ids: Vec<String>,
}

impl IngredientCatalog {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    /// Collect the `_id` of every entry in the response's `data` array
    pub fn from_response(result: &ApiResult) -> Self {
        let ids = result
            .lookup("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("_id").and_then(Value::as_str))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self { ids }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Pick two or three distinct ingredients, fewer if the catalog is smaller
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        if self.ids.is_empty() {
            return Vec::new();
        }
        let wanted = rng.gen_range(2..=3).min(self.ids.len());
        self.ids
            .choose_multiple(rng, wanted)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn result(status: u16, body: &str) -> ApiResult {
        ApiResult::from_parts(status, body.to_string(), BTreeMap::new())
    }

    #[test]
    fn test_non_json_body_degrades_to_text() {
        let res = result(500, "<html>Internal Server Error</html>");
        assert!(res.json.is_none());
        assert_eq!(res.success_flag(), None);
        assert!(!res.is_ok());
        assert!(res.describe().contains("status 500"));
        assert!(res.describe().contains("Internal Server Error"));
    }

    #[test_case("Bearer abc.def", "abc.def" ; "standard prefix")]
    #[test_case("bearer abc", "abc" ; "lowercase prefix")]
    #[test_case("abc", "abc" ; "no prefix")]
    #[test_case("  Bearer   abc ", "abc" ; "surrounding whitespace")]
    fn test_strip_bearer(input: &str, expected: &str) {
        assert_eq!(strip_bearer(input), expected);
    }

    #[test]
    fn test_access_token_is_stripped() {
        let res = result(200, r#"{"success":true,"accessToken":"Bearer tok","refreshToken":"ref"}"#);
        assert_eq!(res.access_token().as_deref(), Some("tok"));
        assert_eq!(res.refresh_token().as_deref(), Some("ref"));
    }

    #[test]
    fn test_empty_access_token_is_absent() {
        let res = result(200, r#"{"success":true,"accessToken":"Bearer "}"#);
        assert_eq!(res.access_token(), None);
    }

    #[test_case(200, true, &[200, 202] => true ; "ok")]
    #[test_case(202, true, &[200, 202] => true ; "accepted")]
    #[test_case(202, false, &[200, 202] => false ; "flag false")]
    #[test_case(401, true, &[200, 202] => false ; "wrong status")]
    fn test_succeeded_with(status: u16, success: bool, accepted: &[u16]) -> bool {
        let body = json!({ "success": success }).to_string();
        result(status, &body).succeeded_with(accepted)
    }

    #[test]
    fn test_lookup_path_walks_objects_and_arrays() {
        let body = json!({"orders": [{"number": 42}], "user": {"email": "a@b.c"}});
        assert_eq!(lookup_path(&body, "orders.0.number"), Some(&json!(42)));
        assert_eq!(lookup_path(&body, "user.email"), Some(&json!("a@b.c")));
        assert_eq!(lookup_path(&body, "user.missing"), None);
        assert_eq!(lookup_path(&body, "orders.x"), None);
    }

    #[test]
    fn test_apply_patch_updates_credentials() {
        let mut user = TestUser::new("old@example.com", "pw", "Old");
        let patch = json!({"email": "new@example.com", "password": "pw2"});
        user.apply_patch(patch.as_object().unwrap());
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.password, "pw2");
        assert_eq!(user.name, "Old");
    }

    #[test]
    fn test_catalog_from_response_skips_entries_without_id() {
        let res = result(
            200,
            r#"{"success":true,"data":[{"_id":"a"},{"name":"no id"},{"_id":""},{"_id":"b"}]}"#,
        );
        let catalog = IngredientCatalog::from_response(&res);
        assert_eq!(catalog.ids(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_sample_respects_catalog_size() {
        let mut rng = rand::thread_rng();

        let single = IngredientCatalog::new(vec!["only".to_string()]);
        assert_eq!(single.sample(&mut rng), vec!["only".to_string()]);

        let catalog = IngredientCatalog::new((0..10).map(|i| format!("id-{i}")).collect());
        for _ in 0..50 {
            let picked = catalog.sample(&mut rng);
            assert!((2..=3).contains(&picked.len()), "picked {}", picked.len());
            let mut dedup = picked.clone();
            dedup.sort();
            dedup.dedup();
            assert_eq!(dedup.len(), picked.len());
        }
    }
}
