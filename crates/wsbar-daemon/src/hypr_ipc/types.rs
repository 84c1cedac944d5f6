//! Typed views of the compositor's JSON replies
//!
//! Only the fields the reconciler needs are declared; everything else in the
//! compositor's documents is ignored by serde. Lists are decoded record by
//! record so one malformed entry does not discard the whole reply.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::IpcError;

/// `{"id": 1, "name": "1"}` reference embedded in monitor and client documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkspaceRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// One entry of the `j/workspaces` reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceReport {
    pub id: i64,
    pub name: String,
    /// Output (monitor) name the workspace lives on
    #[serde(default)]
    pub monitor: String,
    /// Number of windows the compositor counts on this workspace
    #[serde(default)]
    pub windows: u32,
    /// Compositor-side persistence, reported by newer compositor versions
    #[serde(default, rename = "ispersistent")]
    pub is_persistent: bool,
}

/// One entry of the `j/monitors` reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub active_workspace: WorkspaceRef,
    #[serde(default)]
    pub special_workspace: WorkspaceRef,
}

/// One entry of the `j/clients` reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientReport {
    /// Window address as `0x...`
    pub address: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub workspace: WorkspaceRef,
    /// Position in the focus history, 0 for the focused window
    #[serde(default = "unfocused", rename = "focusHistoryID")]
    pub focus_history_id: i64,
}

impl ClientReport {
    pub fn is_focused(&self) -> bool {
        self.focus_history_id == 0
    }
}

fn unfocused() -> i64 {
    -1
}

/// One entry of the `j/workspacerules` reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRuleReport {
    pub workspace_string: String,
    #[serde(default)]
    pub monitor: Option<String>,
    #[serde(default)]
    pub persistent: bool,
}

/// Everything one reconciliation tick needs to know about the compositor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositorSnapshot {
    pub workspaces: Vec<WorkspaceReport>,
    pub monitors: Vec<MonitorReport>,
    pub clients: Vec<ClientReport>,
    pub rules: Vec<WorkspaceRuleReport>,
}

impl CompositorSnapshot {
    /// Find a workspace by its raw compositor name
    pub fn workspace_by_raw_name(&self, name: &str) -> Option<&WorkspaceReport> {
        self.workspaces.iter().find(|ws| ws.name == name)
    }

    pub fn workspace_by_id(&self, id: i64) -> Option<&WorkspaceReport> {
        self.workspaces.iter().find(|ws| ws.id == id)
    }

    pub fn focused_monitor(&self) -> Option<&MonitorReport> {
        self.monitors.iter().find(|m| m.focused)
    }
}

/// Decode a JSON array element by element, skipping records that do not fit `T`
pub fn parse_records<T: DeserializeOwned>(request: &str, value: Value) -> Result<Vec<T>, IpcError> {
    let items: Vec<Value> =
        serde_json::from_value(value).map_err(|source| IpcError::DeserializeFailed {
            request: request.to_string(),
            source,
        })?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(record),
            Err(e) => warn!(request = request, "Skipping malformed record: {}", e),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workspace_report_from_json() {
        let value = json!({
            "id": 3,
            "name": "3",
            "monitor": "DP-1",
            "monitorID": 0,
            "windows": 2,
            "hasfullscreen": false,
            "lastwindow": "0x5612",
            "lastwindowtitle": "shell"
        });

        let ws: WorkspaceReport = serde_json::from_value(value).unwrap();
        assert_eq!(ws.id, 3);
        assert_eq!(ws.name, "3");
        assert_eq!(ws.monitor, "DP-1");
        assert_eq!(ws.windows, 2);
        assert!(!ws.is_persistent);
    }

    #[test]
    fn test_monitor_report_from_json() {
        let value = json!({
            "id": 1,
            "name": "HDMI-A-1",
            "x": 1920,
            "y": 0,
            "focused": true,
            "activeWorkspace": {"id": 4, "name": "4"},
            "specialWorkspace": {"id": -98, "name": "special:magic"}
        });

        let monitor: MonitorReport = serde_json::from_value(value).unwrap();
        assert_eq!(monitor.name, "HDMI-A-1");
        assert_eq!(monitor.x, 1920);
        assert!(monitor.focused);
        assert_eq!(monitor.active_workspace.name, "4");
        assert_eq!(monitor.special_workspace.name, "special:magic");
    }

    #[test]
    fn test_client_report_defaults_missing_fields() {
        let value = json!({"address": "0xAB"});

        let client: ClientReport = serde_json::from_value(value).unwrap();
        assert_eq!(client.address, "0xAB");
        assert_eq!(client.class, "");
        assert_eq!(client.title, "");
        assert_eq!(client.workspace, WorkspaceRef::default());
        assert!(!client.is_focused());

        let focused: ClientReport =
            serde_json::from_value(json!({"address": "0xCD", "focusHistoryID": 0})).unwrap();
        assert!(focused.is_focused());
    }

    #[test]
    fn test_workspace_rule_from_json() {
        let value = json!({"workspaceString": "2", "monitor": "DP-1", "persistent": true});

        let rule: WorkspaceRuleReport = serde_json::from_value(value).unwrap();
        assert_eq!(rule.workspace_string, "2");
        assert_eq!(rule.monitor.as_deref(), Some("DP-1"));
        assert!(rule.persistent);
    }

    #[test]
    fn test_parse_records_skips_malformed_entries() {
        let value = json!([
            {"id": 1, "name": "1"},
            {"name": "no id"},
            {"id": 2, "name": "2"}
        ]);

        let records: Vec<WorkspaceReport> = parse_records("j/workspaces", value).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
    }

    #[test]
    fn test_parse_records_rejects_non_array() {
        let value = json!({"id": 1});

        let result: Result<Vec<WorkspaceReport>, _> = parse_records("j/workspaces", value);
        assert!(matches!(result, Err(IpcError::DeserializeFailed { .. })));
    }

    #[test]
    fn test_snapshot_lookups() {
        let snapshot = CompositorSnapshot {
            workspaces: vec![WorkspaceReport {
                id: 1,
                name: "1".to_string(),
                monitor: "DP-1".to_string(),
                windows: 0,
                is_persistent: false,
            }],
            monitors: vec![MonitorReport {
                id: 0,
                name: "DP-1".to_string(),
                x: 0,
                y: 0,
                focused: true,
                active_workspace: WorkspaceRef {
                    id: 1,
                    name: "1".to_string(),
                },
                special_workspace: WorkspaceRef::default(),
            }],
            ..Default::default()
        };

        assert!(snapshot.workspace_by_raw_name("1").is_some());
        assert!(snapshot.workspace_by_id(1).is_some());
        assert!(snapshot.workspace_by_id(2).is_none());
        assert_eq!(snapshot.focused_monitor().map(|m| m.name.as_str()), Some("DP-1"));
    }
}
