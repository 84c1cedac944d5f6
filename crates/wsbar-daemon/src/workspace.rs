//! One workspace's state as seen by the bar
//!
//! A `Workspace` never touches reconciler state. Everything it needs from the
//! module configuration comes through the read-only `ConfigLookup` capability.

use std::collections::BTreeMap;

use tracing::trace;

use crate::hypr_ipc::WorkspaceReport;
use crate::rewrite::RewriteEngine;
use crate::window::{normalize_workspace_ref, WindowRef};

/// Name of the unnamed special workspace
pub const BARE_SPECIAL: &str = "special";

const SPECIAL_PREFIX: &str = "special:";
const NAMED_PREFIX: &str = "name:";

/// Split a compositor workspace name into its display name and special flag
///
/// `name:web` becomes `web`, `special:magic` becomes special `magic`, and the
/// bare `special` workspace keeps its name.
pub fn parse_workspace_name(raw: &str) -> (String, bool) {
    if let Some(name) = raw.strip_prefix(NAMED_PREFIX) {
        (name.to_string(), false)
    } else if raw == BARE_SPECIAL {
        (raw.to_string(), true)
    } else if let Some(name) = raw.strip_prefix(SPECIAL_PREFIX) {
        (name.to_string(), true)
    } else {
        (raw.to_string(), false)
    }
}

/// Read-only view of the module configuration
pub trait ConfigLookup {
    /// Output the bar is drawn on, `None` for every output
    fn bar_output(&self) -> Option<&str>;
    fn window_separator(&self) -> &str;
    fn format_icons(&self) -> &BTreeMap<String, String>;
    fn rewrite_engine(&self) -> &RewriteEngine;
    fn persistent_only(&self) -> bool;
    fn active_only(&self) -> bool;
    fn special_visible_only(&self) -> bool;
    fn move_to_monitor(&self) -> bool;
}

/// Process-local workspace identity, assigned in creation order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspaceKey(pub u64);

impl std::fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceFlags {
    pub active: bool,
    pub special: bool,
    /// Declared persistent by compositor workspace rules
    pub persistent_rule: bool,
    /// Declared persistent by local configuration
    pub persistent_config: bool,
    pub urgent: bool,
    pub visible: bool,
}

impl WorkspaceFlags {
    pub fn is_persistent(&self) -> bool {
        self.persistent_rule || self.persistent_config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    key: WorkspaceKey,
    /// Compositor id; `None` until the compositor reports the workspace
    compositor_id: Option<i64>,
    name: String,
    /// `name` as window records refer to it
    lookup_key: String,
    output: String,
    flags: WorkspaceFlags,
    /// Count reported by the compositor, may differ from `window_map.len()`
    window_count: u32,
    window_map: BTreeMap<String, String>,
    /// Address of the focused window, if it is on this workspace
    active_window: Option<String>,
}

impl Workspace {
    /// Workspace for a compositor report
    pub fn from_report(key: WorkspaceKey, report: &WorkspaceReport) -> Self {
        let (name, special) = parse_workspace_name(&report.name);
        Self {
            key,
            compositor_id: Some(report.id),
            lookup_key: normalize_workspace_ref(&report.name),
            name,
            output: report.monitor.clone(),
            flags: WorkspaceFlags {
                special,
                persistent_rule: report.is_persistent,
                ..Default::default()
            },
            window_count: report.windows,
            window_map: BTreeMap::new(),
            active_window: None,
        }
    }

    /// Config-persistent workspace the compositor has not reported yet
    ///
    /// `raw_name` may carry a `special:` or `name:` qualifier.
    pub fn placeholder(key: WorkspaceKey, raw_name: &str, output: &str) -> Self {
        let (name, special) = parse_workspace_name(raw_name);
        Self {
            key,
            compositor_id: None,
            lookup_key: normalize_workspace_ref(raw_name),
            name,
            output: output.to_string(),
            flags: WorkspaceFlags {
                special,
                persistent_config: true,
                ..Default::default()
            },
            window_count: 0,
            window_map: BTreeMap::new(),
            active_window: None,
        }
    }

    pub fn key(&self) -> WorkspaceKey {
        self.key
    }

    pub fn compositor_id(&self) -> Option<i64> {
        self.compositor_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn flags(&self) -> &WorkspaceFlags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut WorkspaceFlags {
        &mut self.flags
    }

    pub fn window_count(&self) -> u32 {
        self.window_count
    }

    pub fn window_map(&self) -> &BTreeMap<String, String> {
        &self.window_map
    }

    /// Representation of the focused window, if it is here
    pub fn active_window(&self) -> Option<&str> {
        self.active_window
            .as_deref()
            .and_then(|address| self.window_map.get(address))
            .map(String::as_str)
    }

    pub fn is_window_active(&self, address: &str) -> bool {
        self.active_window.as_deref() == Some(address)
    }

    /// Record which window has focus; addresses not held here clear it
    pub fn focus_window(&mut self, address: Option<&str>) {
        self.active_window = address
            .filter(|address| self.window_map.contains_key(*address))
            .map(str::to_string);
    }

    pub fn contains_window(&self, address: &str) -> bool {
        self.window_map.contains_key(address)
    }

    pub fn is_special(&self) -> bool {
        self.flags.special
    }

    pub fn is_persistent(&self) -> bool {
        self.flags.is_persistent()
    }

    /// No windows according to the compositor
    pub fn is_empty(&self) -> bool {
        self.window_count == 0
    }

    /// Refresh identity and counts from the latest compositor report
    pub fn apply_report(&mut self, report: &WorkspaceReport) {
        let (name, special) = parse_workspace_name(&report.name);
        self.compositor_id = Some(report.id);
        self.name = name;
        self.lookup_key = normalize_workspace_ref(&report.name);
        self.flags.special = special;
        self.output = report.monitor.clone();
        self.window_count = report.windows;
    }

    /// The compositor dropped this workspace but configuration keeps it
    pub fn detach(&mut self) {
        self.compositor_id = None;
        self.window_count = 0;
        self.flags.active = false;
        self.flags.visible = false;
        self.flags.urgent = false;
    }

    pub fn rename(&mut self, raw_name: &str) {
        let (name, special) = parse_workspace_name(raw_name);
        self.name = name;
        self.lookup_key = normalize_workspace_ref(raw_name);
        self.flags.special = special;
    }

    pub fn set_output(&mut self, output: &str) {
        self.output = output.to_string();
    }

    /// Add a window under its resolved representation
    ///
    /// Windows with no usable identity and empty representations are skipped.
    /// The caller must already have released `window`'s address from any
    /// other owner.
    pub fn insert_window(&mut self, window: &mut WindowRef, config: &dyn ConfigLookup) {
        let engine = config.rewrite_engine();
        if window.is_empty(engine.uses_title()) {
            trace!(address = window.address(), workspace = %self.name, "Skipping window without identity");
            return;
        }

        let repr = window.repr(engine);
        if repr.is_empty() {
            return;
        }
        if window.is_active() {
            self.active_window = Some(window.address().to_string());
        }
        self.window_map.insert(window.address().to_string(), repr);
    }

    /// Remove a window, returning its representation if it was here
    pub fn remove_window(&mut self, address: &str) -> Option<String> {
        if self.is_window_active(address) {
            self.active_window = None;
        }
        self.window_map.remove(address)
    }

    /// Replace the representation of a window this workspace already holds
    pub fn update_window(&mut self, address: &str, repr: String) -> bool {
        match self.window_map.get_mut(address) {
            Some(existing) => {
                *existing = repr;
                true
            }
            None => false,
        }
    }

    /// Drain every window, e.g. before the workspace is destroyed
    pub fn take_windows(&mut self) -> BTreeMap<String, String> {
        self.active_window = None;
        std::mem::take(&mut self.window_map)
    }

    /// Pick the icon from `icons`, first match wins
    pub fn select_icon<'a>(&'a self, icons: &'a BTreeMap<String, String>) -> &'a str {
        let candidates = [
            (self.flags.urgent, "urgent"),
            (self.flags.active, "active"),
            (self.flags.special, "special"),
            (true, self.name.as_str()),
            (self.flags.visible, "visible"),
            (self.is_empty(), "empty"),
            (self.is_persistent(), "persistent"),
            (true, "default"),
        ];

        candidates
            .iter()
            .filter(|(applies, _)| *applies)
            .find_map(|(_, key)| icons.get(*key))
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// Whether display filters let this workspace through
    pub fn is_shown(&self, config: &dyn ConfigLookup) -> bool {
        if config.persistent_only() && !self.is_persistent() {
            return false;
        }
        if config.active_only()
            && !self.flags.active
            && !self.is_persistent()
            && !self.flags.visible
            && !self.flags.special
        {
            return false;
        }
        if config.special_visible_only() && self.flags.special && !self.flags.visible {
            return false;
        }
        true
    }

    /// Label from `format` plus a tooltip listing the windows
    ///
    /// Placeholders: `{id}`, `{name}`, `{icon}`, `{windows}`. Unknown
    /// placeholders are left as written.
    pub fn render(&self, format: &str, icon: &str, separator: &str) -> (String, String) {
        let reprs: Vec<&str> = self.window_map.values().map(String::as_str).collect();
        let windows = reprs.join(separator);
        let id = self
            .compositor_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        let label = fill_placeholders(
            format,
            &[
                ("id", id.as_str()),
                ("name", self.name.as_str()),
                ("icon", icon),
                ("windows", windows.as_str()),
            ],
        );

        let mut tooltip = self.name.clone();
        for repr in reprs {
            tooltip.push('\n');
            tooltip.push_str(repr);
        }

        (label, tooltip)
    }

    /// Compositor command that focuses this workspace
    pub fn click_command(&self, move_to_monitor: bool) -> String {
        let focus = if move_to_monitor {
            "focusworkspaceoncurrentmonitor"
        } else {
            "workspace"
        };

        match self.compositor_id {
            Some(id) if id > 0 => format!("dispatch {focus} {id}"),
            _ if !self.flags.special => format!("dispatch {focus} name:{}", self.name),
            _ if self.name != BARE_SPECIAL => {
                format!("dispatch togglespecialworkspace {}", self.name)
            }
            _ => "dispatch togglespecialworkspace".to_string(),
        }
    }
}

/// Single-pass `{key}` substitution
fn fill_placeholders(format: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsbar_config::RewriteRuleConfig;

    struct TestConfig {
        engine: RewriteEngine,
        icons: BTreeMap<String, String>,
        persistent_only: bool,
        active_only: bool,
        special_visible_only: bool,
    }

    impl TestConfig {
        fn new() -> Self {
            Self {
                engine: RewriteEngine::new(
                    &[RewriteRuleConfig {
                        pattern: "class<term>".to_string(),
                        template: "T".to_string(),
                        priority: None,
                    }],
                    "?",
                    crate::rewrite::window_priority,
                ),
                icons: BTreeMap::new(),
                persistent_only: false,
                active_only: false,
                special_visible_only: false,
            }
        }
    }

    impl ConfigLookup for TestConfig {
        fn bar_output(&self) -> Option<&str> {
            None
        }
        fn window_separator(&self) -> &str {
            " "
        }
        fn format_icons(&self) -> &BTreeMap<String, String> {
            &self.icons
        }
        fn rewrite_engine(&self) -> &RewriteEngine {
            &self.engine
        }
        fn persistent_only(&self) -> bool {
            self.persistent_only
        }
        fn active_only(&self) -> bool {
            self.active_only
        }
        fn special_visible_only(&self) -> bool {
            self.special_visible_only
        }
        fn move_to_monitor(&self) -> bool {
            false
        }
    }

    fn report(id: i64, name: &str, windows: u32) -> WorkspaceReport {
        WorkspaceReport {
            id,
            name: name.to_string(),
            monitor: "DP-1".to_string(),
            windows,
            is_persistent: false,
        }
    }

    #[test]
    fn test_parse_workspace_name() {
        assert_eq!(parse_workspace_name("1"), ("1".to_string(), false));
        assert_eq!(parse_workspace_name("name:web"), ("web".to_string(), false));
        assert_eq!(
            parse_workspace_name("special:magic"),
            ("magic".to_string(), true)
        );
        assert_eq!(parse_workspace_name("special"), ("special".to_string(), true));
    }

    #[test]
    fn test_from_report() {
        let ws = Workspace::from_report(WorkspaceKey(1), &report(-98, "special:magic", 2));
        assert_eq!(ws.compositor_id(), Some(-98));
        assert_eq!(ws.name(), "magic");
        assert!(ws.is_special());
        assert_eq!(ws.output(), "DP-1");
        assert_eq!(ws.window_count(), 2);
        assert!(ws.window_map().is_empty());
    }

    #[test]
    fn test_insert_and_remove_window() {
        let config = TestConfig::new();
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(1, "1", 1));

        let mut window = WindowRef::from_class_title("1", "0xAB", "term", "shell");
        ws.insert_window(&mut window, &config);
        assert_eq!(ws.window_map().get("AB").map(String::as_str), Some("T"));

        assert_eq!(ws.remove_window("AB"), Some("T".to_string()));
        assert_eq!(ws.remove_window("AB"), None);
    }

    #[test]
    fn test_insert_skips_empty_window() {
        let config = TestConfig::new();
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(1, "1", 1));

        let mut window = WindowRef::from_class_title("1", "AB", "", "");
        ws.insert_window(&mut window, &config);
        assert!(!ws.contains_window("AB"));
    }

    #[test]
    fn test_render_label_and_tooltip() {
        let config = TestConfig::new();
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(3, "3", 2));
        ws.insert_window(&mut WindowRef::from_repr("3", "b", "B"), &config);
        ws.insert_window(&mut WindowRef::from_repr("3", "a", "A"), &config);

        let (label, tooltip) = ws.render("{id}:{name} {icon} [{windows}] {unknown}", "*", "|");
        assert_eq!(label, "3:3 * [A|B] {unknown}");
        assert_eq!(tooltip, "3\nA\nB");

        // Repeated rendering is stable
        assert_eq!(ws.render("{name}", "", " "), ws.render("{name}", "", " "));
    }

    #[test]
    fn test_fill_placeholders_does_not_recurse() {
        let out = fill_placeholders("{name}{", &[("name", "{name}")]);
        assert_eq!(out, "{name}{");
    }

    #[test]
    fn test_select_icon_order() {
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(1, "1", 0));
        let mut icons = BTreeMap::new();

        assert_eq!(ws.select_icon(&icons), "1");

        icons.insert("default".to_string(), "d".to_string());
        assert_eq!(ws.select_icon(&icons), "d");

        icons.insert("empty".to_string(), "e".to_string());
        assert_eq!(ws.select_icon(&icons), "e");

        icons.insert("1".to_string(), "one".to_string());
        assert_eq!(ws.select_icon(&icons), "one");

        icons.insert("active".to_string(), "a".to_string());
        ws.flags_mut().active = true;
        assert_eq!(ws.select_icon(&icons), "a");

        icons.insert("urgent".to_string(), "u".to_string());
        ws.flags_mut().urgent = true;
        assert_eq!(ws.select_icon(&icons), "u");
    }

    #[test]
    fn test_display_filters() {
        let mut config = TestConfig::new();
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(1, "1", 0));
        assert!(ws.is_shown(&config));

        config.persistent_only = true;
        assert!(!ws.is_shown(&config));
        ws.flags_mut().persistent_config = true;
        assert!(ws.is_shown(&config));

        config.persistent_only = false;
        config.active_only = true;
        ws.flags_mut().persistent_config = false;
        assert!(!ws.is_shown(&config));
        ws.flags_mut().visible = true;
        assert!(ws.is_shown(&config));

        config.active_only = false;
        config.special_visible_only = true;
        let special = Workspace::from_report(WorkspaceKey(2), &report(-98, "special:magic", 0));
        assert!(!special.is_shown(&config));
    }

    #[test]
    fn test_click_commands() {
        let numbered = Workspace::from_report(WorkspaceKey(1), &report(4, "4", 0));
        assert_eq!(numbered.click_command(false), "dispatch workspace 4");
        assert_eq!(
            numbered.click_command(true),
            "dispatch focusworkspaceoncurrentmonitor 4"
        );

        let named = Workspace::placeholder(WorkspaceKey(2), "music", "DP-1");
        assert_eq!(named.click_command(false), "dispatch workspace name:music");

        let special = Workspace::from_report(WorkspaceKey(3), &report(-98, "special:magic", 0));
        assert_eq!(
            special.click_command(false),
            "dispatch togglespecialworkspace magic"
        );

        let bare = Workspace::from_report(WorkspaceKey(4), &report(-99, "special", 0));
        assert_eq!(bare.click_command(false), "dispatch togglespecialworkspace");
    }

    #[test]
    fn test_detach_keeps_identity() {
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(2, "2", 3));
        ws.flags_mut().persistent_config = true;
        ws.flags_mut().active = true;
        ws.detach();

        assert_eq!(ws.compositor_id(), None);
        assert_eq!(ws.window_count(), 0);
        assert_eq!(ws.name(), "2");
        assert!(!ws.flags().active);
        assert!(ws.is_persistent());
    }

    #[test]
    fn test_placeholder_keeps_special_qualifier() {
        let special = Workspace::placeholder(WorkspaceKey(1), "special:magic", "DP-1");
        assert_eq!(special.name(), "magic");
        assert!(special.is_special());
        assert!(special.is_persistent());
        assert_eq!(
            special.click_command(false),
            "dispatch togglespecialworkspace magic"
        );

        let named = Workspace::placeholder(WorkspaceKey(2), "name:web", "DP-1");
        assert_eq!(named.name(), "web");
        assert!(!named.is_special());
    }

    #[test]
    fn test_lookup_key_matches_window_records() {
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(7, "my web", 0));
        assert_eq!(ws.name(), "my web");

        let window = WindowRef::from_class_title("my web", "AB", "term", "");
        assert_eq!(ws.lookup_key(), window.workspace_name());

        ws.rename("special:scratch pad");
        assert_eq!(ws.name(), "scratch pad");
        assert_eq!(ws.lookup_key(), "scratch");
    }

    #[test]
    fn test_active_window_follows_focus() {
        let config = TestConfig::new();
        let mut ws = Workspace::from_report(WorkspaceKey(1), &report(1, "1", 2));

        let mut focused = WindowRef::from_repr("1", "a", "A");
        focused.set_active(true);
        ws.insert_window(&mut focused, &config);
        ws.insert_window(&mut WindowRef::from_repr("1", "b", "B"), &config);
        assert_eq!(ws.active_window(), Some("A"));

        ws.focus_window(Some("b"));
        assert_eq!(ws.active_window(), Some("B"));

        ws.focus_window(Some("elsewhere"));
        assert_eq!(ws.active_window(), None);

        ws.focus_window(Some("a"));
        ws.remove_window("a");
        assert_eq!(ws.active_window(), None);
    }
}
