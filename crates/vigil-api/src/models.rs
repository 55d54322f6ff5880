// Wire types for the sync and push endpoints.
//
// Field names follow the server's camelCase JSON. Unknown fields are
// tolerated everywhere; optional fields default so older servers that
// omit them still parse.

use serde::{Deserialize, Serialize};

/// Response of the configuration-version endpoint.
///
/// `version` is the global configuration generation; `userVersion`
/// changes when the caller's permissions or personal layout change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub user_version: Option<String>,
}

/// A group of telemetry items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// A telemetry item (point, PID loop output, gateway register, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    /// Owning group; `None` for orphan items.
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// An alarm definition attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRecord {
    pub id: String,
    pub item_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// An alarm that is currently raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlarmRecord {
    pub id: String,
    pub item_id: String,
    #[serde(default)]
    pub alarm_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Unix epoch milliseconds when the alarm was raised.
    #[serde(default)]
    pub raised_at: Option<i64>,
}

/// Body for the alarm and active-alarm queries.
///
/// An empty id list is omitted from the body entirely, which the server
/// reads as "every item the caller may see".
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemScope<'a> {
    #[serde(skip_serializing_if = "no_ids")]
    pub item_ids: &'a [String],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_ids(ids: &&[String]) -> bool {
    ids.is_empty()
}

/// Subscription request sent on the push stream right after the upgrade.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest<'a> {
    pub client_id: &'a str,
}

/// One update from the push stream.
///
/// `alarm_count` is the system-wide, unfiltered count. Consumers must not
/// show it to an operator directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFrame {
    pub alarm_count: i64,
    /// Unix epoch milliseconds on the server.
    pub timestamp: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn version_with_nulls() {
        let v: VersionResponse =
            serde_json::from_str(r#"{"version": null, "userVersion": "u7"}"#).unwrap();
        assert_eq!(v.version, None);
        assert_eq!(v.user_version.as_deref(), Some("u7"));
    }

    #[test]
    fn orphan_item_parses() {
        let item: ItemRecord =
            serde_json::from_str(r#"{"id": "i1", "name": "Boiler temp", "extra": 1}"#).unwrap();
        assert!(item.group_id.is_none());
    }

    #[test]
    fn empty_scope_omits_ids() {
        let body = serde_json::to_value(ItemScope { item_ids: &[] }).unwrap();
        assert_eq!(body, serde_json::json!({}));

        let ids = vec!["a".to_string()];
        let body = serde_json::to_value(ItemScope { item_ids: &ids }).unwrap();
        assert_eq!(body, serde_json::json!({ "itemIds": ["a"] }));
    }

    #[test]
    fn alarm_enabled_defaults_true() {
        let alarm: AlarmRecord = serde_json::from_str(r#"{"id": "a1", "itemId": "i1"}"#).unwrap();
        assert!(alarm.enabled);
    }
}
