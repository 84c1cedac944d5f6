//! Lazily-resolved window identity

use crate::rewrite::RewriteEngine;
use crate::workspace::parse_workspace_name;

const ADDRESS_PREFIX: &str = "0x";

/// Strip the `0x` prefix JSON replies put on window addresses
///
/// Event records carry the bare hex form, so both sources agree after this.
pub fn normalize_address(address: &str) -> String {
    address
        .strip_prefix(ADDRESS_PREFIX)
        .unwrap_or(address)
        .to_string()
}

/// Reduce a workspace reference to the key windows and workspaces are matched on
///
/// The display name from `parse_workspace_name`, cut at the first space so a
/// trailing disambiguator does not split one workspace into two keys.
pub fn normalize_workspace_ref(name: &str) -> String {
    let (name, _) = parse_workspace_name(name);
    match name.find(' ') {
        Some(idx) => name[..idx].to_string(),
        None => name,
    }
}

/// What is known about a window's display form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowIdentity {
    /// Class and title known, not yet pushed through the rewrite engine
    Identity { class: String, title: String },
    /// Final representation
    Resolved { representation: String },
}

/// A window that is waiting to be placed into a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRef {
    address: String,
    workspace_name: String,
    is_active: bool,
    ticks_uncreated: u32,
    identity: WindowIdentity,
}

impl WindowRef {
    /// Window whose display form is already final
    pub fn from_repr(workspace_name: &str, address: &str, representation: impl Into<String>) -> Self {
        Self::new(
            workspace_name,
            address,
            WindowIdentity::Resolved {
                representation: representation.into(),
            },
        )
    }

    /// Window that still needs rewriting
    pub fn from_class_title(
        workspace_name: &str,
        address: &str,
        class: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self::new(
            workspace_name,
            address,
            WindowIdentity::Identity {
                class: class.into(),
                title: title.into(),
            },
        )
    }

    fn new(workspace_name: &str, address: &str, identity: WindowIdentity) -> Self {
        Self {
            address: normalize_address(address),
            workspace_name: normalize_workspace_ref(workspace_name),
            is_active: false,
            ticks_uncreated: 0,
            identity,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn workspace_name(&self) -> &str {
        &self.workspace_name
    }

    pub fn identity(&self) -> &WindowIdentity {
        &self.identity
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn ticks_uncreated(&self) -> u32 {
        self.ticks_uncreated
    }

    /// Retarget to another workspace, e.g. after a move event
    pub fn move_to(&mut self, workspace_name: &str) {
        self.workspace_name = normalize_workspace_ref(workspace_name);
    }

    /// Replace the title of a not-yet-resolved window
    ///
    /// Returns false when the window is already resolved and the title
    /// cannot be applied.
    pub fn set_title(&mut self, new_title: impl Into<String>) -> bool {
        match &mut self.identity {
            WindowIdentity::Identity { title, .. } => {
                *title = new_title.into();
                true
            }
            WindowIdentity::Resolved { .. } => false,
        }
    }

    /// Resolved representation, computed through `engine` on first use
    pub fn repr(&mut self, engine: &RewriteEngine) -> String {
        match &self.identity {
            WindowIdentity::Resolved { representation } => representation.clone(),
            WindowIdentity::Identity { class, title } => {
                let representation = engine.resolve_window(class, title);
                self.identity = WindowIdentity::Resolved {
                    representation: representation.clone(),
                };
                representation
            }
        }
    }

    /// True when the identity carries nothing worth displaying
    pub fn is_empty(&self, uses_title: bool) -> bool {
        match &self.identity {
            WindowIdentity::Identity { class, title } => {
                class.is_empty() && (!uses_title || title.is_empty())
            }
            WindowIdentity::Resolved { .. } => false,
        }
    }

    pub fn increment_ticks_uncreated(&mut self) -> u32 {
        self.ticks_uncreated += 1;
        self.ticks_uncreated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsbar_config::RewriteRuleConfig;

    fn engine() -> RewriteEngine {
        RewriteEngine::new(
            &[RewriteRuleConfig {
                pattern: "class<term>".to_string(),
                template: "T".to_string(),
                priority: None,
            }],
            "?",
            crate::rewrite::window_priority,
        )
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("0xAB"), "AB");
        assert_eq!(normalize_address("AB"), "AB");
        assert_eq!(normalize_address("0x"), "");
    }

    #[test]
    fn test_normalize_workspace_ref() {
        assert_eq!(normalize_workspace_ref("special:magic"), "magic");
        assert_eq!(normalize_workspace_ref("name:web"), "web");
        assert_eq!(normalize_workspace_ref("3 (DP-1)"), "3");
        assert_eq!(normalize_workspace_ref("special"), "special");
    }

    #[test]
    fn test_construction_normalizes_once() {
        let window = WindowRef::from_class_title("special:magic", "0xAB", "term", "shell");
        assert_eq!(window.address(), "AB");
        assert_eq!(window.workspace_name(), "magic");
        assert_eq!(window.ticks_uncreated(), 0);
        assert!(!window.is_active());
    }

    #[test]
    fn test_repr_resolves_and_caches() {
        let engine = engine();
        let mut window = WindowRef::from_class_title("1", "AB", "term", "shell");

        assert_eq!(window.repr(&engine), "T");
        assert_eq!(
            window.identity(),
            &WindowIdentity::Resolved {
                representation: "T".to_string()
            }
        );
        assert_eq!(window.repr(&engine), "T");
    }

    #[test]
    fn test_repr_of_resolved_window_is_unchanged() {
        let engine = engine();
        let mut window = WindowRef::from_repr("1", "AB", "already");
        assert_eq!(window.repr(&engine), "already");
    }

    #[test]
    fn test_is_empty() {
        let no_class = WindowRef::from_class_title("1", "AB", "", "shell");
        assert!(no_class.is_empty(false));
        assert!(!no_class.is_empty(true));

        let nothing = WindowRef::from_class_title("1", "AB", "", "");
        assert!(nothing.is_empty(true));

        let classed = WindowRef::from_class_title("1", "AB", "term", "");
        assert!(!classed.is_empty(true));

        let resolved = WindowRef::from_repr("1", "AB", "");
        assert!(!resolved.is_empty(true));
    }

    #[test]
    fn test_ticks_and_title() {
        let mut window = WindowRef::from_class_title("1", "AB", "term", "a");
        assert_eq!(window.increment_ticks_uncreated(), 1);
        assert_eq!(window.increment_ticks_uncreated(), 2);

        assert!(window.set_title("b"));
        assert_eq!(
            window.identity(),
            &WindowIdentity::Identity {
                class: "term".to_string(),
                title: "b".to_string()
            }
        );

        window.move_to("special:scratch");
        assert_eq!(window.workspace_name(), "scratch");

        let mut resolved = WindowRef::from_repr("1", "AB", "x");
        assert!(!resolved.set_title("b"));
    }
}
