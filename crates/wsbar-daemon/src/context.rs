//! Compiled module settings shared by the reconciler and its workspaces

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use tracing::error;

use wsbar_config::{SortMethod, WorkspacesConfig};

use crate::rewrite::RewriteEngine;
use crate::workspace::{parse_workspace_name, ConfigLookup};

/// `WorkspacesConfig` with its regexes compiled
#[derive(Debug)]
pub struct ModuleContext {
    config: WorkspacesConfig,
    engine: RewriteEngine,
    ignore: Vec<Regex>,
}

impl ModuleContext {
    pub fn new(config: WorkspacesConfig) -> Self {
        let engine = RewriteEngine::from_config(&config);
        let ignore = config
            .ignore_workspaces
            .iter()
            .filter_map(|pattern| {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        error!(pattern = %pattern, "Invalid ignore-workspaces pattern, dropped: {}", e);
                        None
                    }
                }
            })
            .collect();

        Self {
            config,
            engine,
            ignore,
        }
    }

    pub fn sort_method(&self) -> SortMethod {
        self.config.sort_by
    }

    pub fn format(&self) -> &str {
        &self.config.format
    }

    pub fn window_retry_budget(&self) -> u32 {
        self.config.window_retry_budget
    }

    /// Whether workspaces on every output are shown
    pub fn spans_all_outputs(&self) -> bool {
        self.config.all_outputs || self.config.output.is_none()
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|regex| regex.is_match(name))
    }

    /// Whether a workspace with this name and placement gets a local entity at all
    pub fn should_instantiate(&self, name: &str, output: &str, special: bool) -> bool {
        if special && !self.config.show_special {
            return false;
        }
        if !self.spans_all_outputs() && self.bar_output() != Some(output) {
            return false;
        }
        !self.is_ignored(name)
    }

    /// Config-persistent workspace names for the bar's output, in declaration order
    ///
    /// Names keep their `special:` / `name:` qualifier. Two declarations
    /// with the same display name count once.
    pub fn persistent_names(&self) -> Vec<String> {
        let output = if self.config.all_outputs {
            None
        } else {
            self.bar_output()
        };

        let mut names: Vec<String> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for declared in &self.config.persistent_workspaces {
            for raw in declared.names_for_output(output) {
                let (name, _) = parse_workspace_name(&raw);
                if !seen.contains(&name) && !self.is_ignored(&name) {
                    seen.push(name);
                    names.push(raw);
                }
            }
        }
        names
    }
}

impl ConfigLookup for ModuleContext {
    fn bar_output(&self) -> Option<&str> {
        self.config.output.as_deref()
    }

    fn window_separator(&self) -> &str {
        &self.config.window_separator
    }

    fn format_icons(&self) -> &BTreeMap<String, String> {
        &self.config.format_icons
    }

    fn rewrite_engine(&self) -> &RewriteEngine {
        &self.engine
    }

    fn persistent_only(&self) -> bool {
        self.config.persistent_only
    }

    fn active_only(&self) -> bool {
        self.config.active_only
    }

    fn special_visible_only(&self) -> bool {
        self.config.special_visible_only
    }

    fn move_to_monitor(&self) -> bool {
        self.config.move_to_monitor
    }
}
