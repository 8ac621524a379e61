//! Derivation of an audit record from an observed request.
//!
//! Pure functions: the HTTP layer captures the request and its outcome into an
//! [`AuditJob`], the worker turns the job into a [`NewAuditRecord`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use haulbase_core::{TenantId, UserId};

use crate::store::NewAuditRecord;

/// Requests whose path contains any of these are never audited.
pub const EXCLUDED_PATHS: &[&str] = &["/health", "/audit", "/auth/refresh", "/metrics"];

/// Body fields removed before the body is persisted.
pub const REDACTED_FIELDS: &[&str] = &["password", "token"];

pub const MAX_DETAILS_LEN: usize = 1000;
pub const MAX_IP_LEN: usize = 45;
pub const MAX_USER_AGENT_LEN: usize = 500;
pub const MAX_ACTION_LEN: usize = 100;
pub const MAX_RESOURCE_LEN: usize = 100;

/// Path segment reserved for authentication endpoints; never a resource.
const AUTH_SEGMENT: &str = "auth";

pub fn is_excluded(url: &str) -> bool {
    EXCLUDED_PATHS.iter().any(|p| url.contains(p))
}

/// First path segment after an optional `api/` prefix, e.g.
/// `/api/orders/12?x=1` -> `orders`.
pub fn extract_resource(url: &str) -> Option<String> {
    let path = url.strip_prefix('/')?;
    let segment_end = |s: &str| s.find(['/', '?']).unwrap_or(s.len());

    let segment = match path.strip_prefix("api/") {
        Some(rest) if segment_end(rest) > 0 => &rest[..segment_end(rest)],
        _ => &path[..segment_end(path)],
    };

    if segment.is_empty() || segment == AUTH_SEGMENT {
        None
    } else {
        Some(segment.to_string())
    }
}

/// First all-digit segment of the URL (`/orders/42/items` -> 42), else a
/// numeric `id` on the response payload.
pub fn extract_resource_id(url: &str, response: Option<&Value>) -> Option<i64> {
    url_resource_id(url).or_else(|| response.and_then(|v| v.get("id")).and_then(Value::as_i64))
}

fn url_resource_id(url: &str) -> Option<i64> {
    let mut rest = url;
    while let Some(slash) = rest.find('/') {
        rest = &rest[slash + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            continue;
        }
        let terminated = matches!(rest.as_bytes().get(digits), None | Some(b'/') | Some(b'?'));
        if terminated {
            if let Ok(id) = rest[..digits].parse() {
                return Some(id);
            }
        }
    }
    None
}

/// `update_orders`, or just the verb when the resource is unknown.
pub fn action_name(method: &str, resource: Option<&str>) -> String {
    let verb = match method.to_ascii_uppercase().as_str() {
        "GET" => "read".to_string(),
        "POST" => "create".to_string(),
        "PUT" | "PATCH" => "update".to_string(),
        "DELETE" => "delete".to_string(),
        _ => method.to_lowercase(),
    };

    match resource {
        Some(resource) => format!("{verb}_{resource}"),
        None => verb,
    }
}

/// Copy of `body` without the redacted fields. Non-object bodies pass through.
pub fn sanitize_body(body: &Value) -> Value {
    match body {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(k, _)| !REDACTED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<_, _>>(),
        ),
        other => other.clone(),
    }
}

/// Prefix of at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub user_id: UserId,
    pub tenant_id: TenantId,
}

/// What the business operation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuditOutcome {
    /// Successful response payload, when it was JSON.
    Success(Option<Value>),
    Failure { message: String },
}

/// Everything captured from one request, handed to the audit worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditJob {
    pub actor: AuditActor,
    pub method: String,
    pub url: String,
    pub body: Option<Value>,
    pub outcome: AuditOutcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditJob {
    pub fn into_record(self) -> NewAuditRecord {
        let resource = extract_resource(&self.url);
        let response = match &self.outcome {
            AuditOutcome::Success(payload) => payload.as_ref(),
            AuditOutcome::Failure { .. } => None,
        };
        let resource_id = extract_resource_id(&self.url, response);
        let action = action_name(&self.method, resource.as_deref());

        let mut details = Map::new();
        match &self.outcome {
            AuditOutcome::Success(_) => {
                let has_fields = match &self.body {
                    Some(Value::Object(fields)) => !fields.is_empty(),
                    Some(Value::Null) | None => false,
                    Some(_) => true,
                };
                if let Some(body) = self.body.as_ref().filter(|_| has_fields) {
                    details.insert("body".to_string(), sanitize_body(body));
                }
            }
            AuditOutcome::Failure { message } => {
                details.insert("error".to_string(), json!(message));
            }
        }
        if let Some(id) = resource_id {
            details.insert("resourceId".to_string(), json!(id));
        }

        NewAuditRecord {
            user_id: self.actor.user_id,
            tenant_id: self.actor.tenant_id,
            action: truncate(&action, MAX_ACTION_LEN),
            resource: resource.map(|r| truncate(&r, MAX_RESOURCE_LEN)),
            resource_id,
            details: Some(truncate(&Value::Object(details).to_string(), MAX_DETAILS_LEN)),
            ip_address: self.ip_address.map(|ip| truncate(&ip, MAX_IP_LEN)),
            user_agent: self.user_agent.map(|ua| truncate(&ua, MAX_USER_AGENT_LEN)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job(method: &str, url: &str, body: Option<Value>, outcome: AuditOutcome) -> AuditJob {
        AuditJob {
            actor: AuditActor {
                user_id: UserId::new(7),
                tenant_id: TenantId::new(1),
            },
            method: method.to_string(),
            url: url.to_string(),
            body,
            outcome,
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("curl/8".into()),
        }
    }

    #[test]
    fn resource_follows_optional_api_prefix() {
        assert_eq!(extract_resource("/api/orders/12").as_deref(), Some("orders"));
        assert_eq!(extract_resource("/orders?page=2").as_deref(), Some("orders"));
        assert_eq!(extract_resource("/roles").as_deref(), Some("roles"));
        assert_eq!(extract_resource("/api").as_deref(), Some("api"));
        assert_eq!(extract_resource("/auth/login"), None);
        assert_eq!(extract_resource("/api/auth/login"), None);
        assert_eq!(extract_resource("/"), None);
    }

    #[test]
    fn resource_id_prefers_url_over_response() {
        let response = json!({ "id": 99 });
        assert_eq!(extract_resource_id("/orders/42", Some(&response)), Some(42));
        assert_eq!(extract_resource_id("/orders/42/items", None), Some(42));
        assert_eq!(extract_resource_id("/orders/42?full=1", None), Some(42));
        assert_eq!(extract_resource_id("/orders", Some(&response)), Some(99));
        assert_eq!(extract_resource_id("/orders/42abc", None), None);
        assert_eq!(extract_resource_id("/orders", Some(&json!({ "id": "abc" }))), None);
    }

    #[test]
    fn action_maps_verbs() {
        assert_eq!(action_name("GET", Some("orders")), "read_orders");
        assert_eq!(action_name("POST", Some("orders")), "create_orders");
        assert_eq!(action_name("PATCH", Some("orders")), "update_orders");
        assert_eq!(action_name("PUT", Some("orders")), "update_orders");
        assert_eq!(action_name("DELETE", None), "delete");
        assert_eq!(action_name("OPTIONS", Some("orders")), "options_orders");
    }

    #[test]
    fn credentials_never_reach_details() {
        let body = json!({ "username": "a", "password": "secret", "token": "xyz" });
        let record = job("POST", "/users", Some(body), AuditOutcome::Success(None)).into_record();

        let details = record.details.unwrap();
        assert!(details.contains("username"));
        assert!(!details.contains("password"));
        assert!(!details.contains("secret"));
        assert!(!details.contains("token"));
    }

    #[test]
    fn failure_details_capture_error_message() {
        let record = job(
            "DELETE",
            "/roles/5",
            Some(json!({ "force": true })),
            AuditOutcome::Failure {
                message: "role in use".into(),
            },
        )
        .into_record();

        assert_eq!(record.action, "delete_roles");
        assert_eq!(record.resource_id, Some(5));
        let details: Value = serde_json::from_str(&record.details.unwrap()).unwrap();
        assert_eq!(details, json!({ "error": "role in use", "resourceId": 5 }));
    }

    #[test]
    fn success_uses_response_id_when_url_has_none() {
        let record = job(
            "POST",
            "/roles",
            Some(json!({ "name": "Dispatcher" })),
            AuditOutcome::Success(Some(json!({ "id": 31, "name": "Dispatcher" }))),
        )
        .into_record();

        assert_eq!(record.resource.as_deref(), Some("roles"));
        assert_eq!(record.resource_id, Some(31));
        let details: Value = serde_json::from_str(&record.details.unwrap()).unwrap();
        assert_eq!(details, json!({ "body": { "name": "Dispatcher" }, "resourceId": 31 }));
    }

    #[test]
    fn oversized_fields_are_truncated() {
        let mut j = job(
            "PUT",
            "/orders/1",
            Some(json!({ "note": "x".repeat(5000) })),
            AuditOutcome::Success(None),
        );
        j.ip_address = Some("1".repeat(100));
        j.user_agent = Some("u".repeat(900));

        let record = j.into_record();
        assert_eq!(record.details.unwrap().chars().count(), MAX_DETAILS_LEN);
        assert_eq!(record.ip_address.unwrap().len(), MAX_IP_LEN);
        assert_eq!(record.user_agent.unwrap().len(), MAX_USER_AGENT_LEN);
    }

    #[test]
    fn exclusion_list_matches_substrings() {
        assert!(is_excluded("/health"));
        assert!(is_excluded("/audit/users/3/activity"));
        assert!(is_excluded("/api/auth/refresh"));
        assert!(!is_excluded("/roles/3"));
    }

    proptest! {
        #[test]
        fn redaction_holds_for_any_object(
            fields in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..8),
            password in "[a-z0-9]{1,8}",
            token in "[a-z0-9]{1,8}",
        ) {
            let mut body: Map<String, Value> = fields.into_iter().map(|(k, v)| (k, json!(v))).collect();
            body.insert("password".into(), json!(password));
            body.insert("token".into(), json!(token));

            let sanitized = sanitize_body(&Value::Object(body.clone()));
            let obj = sanitized.as_object().unwrap();
            prop_assert!(!obj.contains_key("password"));
            prop_assert!(!obj.contains_key("token"));
            prop_assert_eq!(obj.len(), body.len() - 2);
        }

        #[test]
        fn truncate_never_exceeds_limit(s in "\\PC{0,64}", max in 0usize..80) {
            let t = truncate(&s, max);
            prop_assert!(t.chars().count() <= max);
            prop_assert!(s.starts_with(&t));
        }
    }
}
