//! Compute JSON shapes shared by every resource: list envelopes, aggregated
//! lists, error bodies and int64-as-string fields.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::core::{ErrorEnvelope, ErrorKind, Page, ResourceDef};

/// Serialize a record, falling back to `null` for shapes serde rejects
pub fn to_object<T: Serialize>(record: &T) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

/// `{kind, id, items?, selfLink, nextPageToken?}`
pub fn list_response<T: Serialize>(
    def: &ResourceDef,
    self_link: &str,
    collection: &str,
    page: &Page<T>,
) -> Value {
    let mut body = Map::new();
    body.insert("kind".into(), json!(def.list_kind()));
    body.insert("id".into(), json!(collection));
    if !page.items.is_empty() {
        body.insert(
            "items".into(),
            Value::Array(page.items.iter().map(to_object).collect()),
        );
    }
    body.insert("selfLink".into(), json!(self_link));
    if let Some(token) = &page.next_token {
        body.insert("nextPageToken".into(), json!(token));
    }
    Value::Object(body)
}

/// Aggregated list keyed by `zones/{zone}` or `regions/{region}`
///
/// `scopes` lists every scope in output order with the page items that
/// belong to it; scopes without items get the `NO_RESULTS_ON_PAGE` warning.
pub fn aggregated_response(
    def: &ResourceDef,
    self_link: &str,
    collection: &str,
    scopes: Vec<(String, Vec<Value>)>,
    next_token: Option<String>,
) -> Value {
    let mut items = Map::new();
    for (scope, records) in scopes {
        let entry = if records.is_empty() {
            json!({
                "warning": {
                    "code": "NO_RESULTS_ON_PAGE",
                    "message": format!("There are no results for scope '{}' on this page.", scope),
                    "data": [{ "key": "scope", "value": scope }],
                }
            })
        } else {
            let mut entry = Map::new();
            entry.insert(def.collection().to_string(), Value::Array(records));
            Value::Object(entry)
        };
        items.insert(scope, entry);
    }

    let mut body = Map::new();
    body.insert("kind".into(), json!(def.aggregated_list_kind()));
    body.insert("id".into(), json!(collection));
    body.insert("items".into(), Value::Object(items));
    body.insert("selfLink".into(), json!(self_link));
    if let Some(token) = next_token {
        body.insert("nextPageToken".into(), json!(token));
    }
    Value::Object(body)
}

/// `reason` of the single entry in `error.errors`
fn reason(err: &ErrorEnvelope) -> &'static str {
    match err.kind() {
        Some(ErrorKind::NotFound) => "notFound",
        Some(ErrorKind::AlreadyExists) => "alreadyExists",
        Some(ErrorKind::DependencyViolation) => "resourceInUseByAnotherResource",
        Some(ErrorKind::MissingParameter) => "required",
        Some(ErrorKind::InvalidParameterValue) | None => "invalid",
    }
}

/// Compute error body for an envelope
pub fn error_body(err: &ErrorEnvelope) -> Value {
    json!({
        "error": {
            "code": err.http_status,
            "message": err.message,
            "status": err.code,
            "errors": [{
                "domain": "global",
                "reason": reason(err),
                "message": err.message,
            }],
        }
    })
}

/// Render an integer the way Compute renders int64 fields
pub fn int64_string<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Accept an int64 given as a JSON number or a decimal string
pub fn opt_int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("{} is not an int64", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("'{}' is not an int64", s))),
        Some(other) => Err(de::Error::custom(format!("{} is not an int64", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{get_resource, Dialect};

    #[derive(Serialize)]
    struct Item {
        name: &'static str,
    }

    #[test]
    fn test_list_omits_empty_items() {
        let def = get_resource("compute-disks").expect("disks");
        let empty: Page<Item> = Page {
            items: vec![],
            next_token: None,
        };
        let body = list_response(def, "http://x/disks", "projects/p/zones/z/disks", &empty);
        assert_eq!(body["kind"], "compute#diskList");
        assert!(body.get("items").is_none());
        assert!(body.get("nextPageToken").is_none());

        let full = Page {
            items: vec![Item { name: "d1" }],
            next_token: Some("1".to_string()),
        };
        let body = list_response(def, "http://x/disks", "projects/p/zones/z/disks", &full);
        assert_eq!(body["items"][0]["name"], "d1");
        assert_eq!(body["nextPageToken"], "1");
    }

    #[test]
    fn test_aggregated_warning_for_empty_scope() {
        let def = get_resource("compute-disks").expect("disks");
        let body = aggregated_response(
            def,
            "http://x/aggregated/disks",
            "projects/p/aggregated/disks",
            vec![
                ("zones/a".to_string(), vec![json!({"name": "d1"})]),
                ("zones/b".to_string(), vec![]),
            ],
            None,
        );
        assert_eq!(body["kind"], "compute#diskAggregatedList");
        assert_eq!(body["items"]["zones/a"]["disks"][0]["name"], "d1");
        assert_eq!(body["items"]["zones/b"]["warning"]["code"], "NO_RESULTS_ON_PAGE");
    }

    #[test]
    fn test_error_body() {
        let err = ErrorEnvelope::of(Dialect::Gcp, ErrorKind::NotFound, "The resource 'x' was not found");
        let body = error_body(&err);
        assert_eq!(body["error"]["code"], 404);
        assert_eq!(body["error"]["status"], "NOT_FOUND");
        assert_eq!(body["error"]["errors"][0]["reason"], "notFound");
        assert_eq!(body["error"]["errors"][0]["domain"], "global");
    }

    #[test]
    fn test_opt_int64_accepts_strings_and_numbers() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default, deserialize_with = "opt_int64")]
            size: Option<i64>,
        }
        let parse = |s: &str| serde_json::from_str::<Body>(s).map(|b| b.size);
        assert_eq!(parse(r#"{"size": 10}"#).expect("number"), Some(10));
        assert_eq!(parse(r#"{"size": "20"}"#).expect("string"), Some(20));
        assert_eq!(parse(r#"{}"#).expect("absent"), None);
        assert!(parse(r#"{"size": "ten"}"#).is_err());
    }
}
