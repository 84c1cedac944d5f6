//! Priority-ordered regex rewriting of window identities
//!
//! A rule is a case-insensitive regex searched anywhere in the input plus a
//! template that may reference capture groups (`$1`, `${name}`). Rules are
//! tried in descending priority; equal priorities keep declaration order.
//! The first match wins, otherwise the default is returned.
//!
//! Results are memoized per input string for the lifetime of the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::{Regex, RegexBuilder};
use tracing::{debug, error};

use wsbar_config::{RewriteRuleConfig, WorkspacesConfig};

/// Default priority for window rewrite patterns
///
/// Patterns that constrain both class and title are the most specific.
pub fn window_priority(pattern: &str) -> i32 {
    let has_class = pattern.contains("class");
    let has_title = pattern.contains("title");
    match (has_class, has_title) {
        (true, true) => 3,
        (false, true) => 2,
        (true, false) => 1,
        (false, false) => 0,
    }
}

#[derive(Debug)]
struct Rule {
    regex: Regex,
    template: String,
    priority: i32,
}

/// Compiled rule set with its memoization cache
#[derive(Debug)]
pub struct RewriteEngine {
    rules: Vec<Rule>,
    default: Arc<str>,
    uses_title: bool,
    cache: Mutex<HashMap<String, (Arc<str>, bool)>>,
}

impl RewriteEngine {
    /// Compile `rules`; patterns that fail to compile are logged and skipped
    pub fn new<F>(rules: &[RewriteRuleConfig], default: &str, priority: F) -> Self
    where
        F: Fn(&str) -> i32,
    {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                Ok(regex) => regex,
                Err(e) => {
                    error!(pattern = %rule.pattern, "Invalid rewrite pattern, rule dropped: {}", e);
                    continue;
                }
            };
            compiled.push(Rule {
                regex,
                template: rule.template.clone(),
                priority: rule.priority.unwrap_or_else(|| priority(&rule.pattern)),
            });
        }

        // sort_by is stable: equal priorities keep declaration order
        compiled.sort_by(|a, b| b.priority.cmp(&a.priority));

        let uses_title = compiled.iter().any(|r| r.regex.as_str().contains("title"));

        Self {
            rules: compiled,
            default: Arc::from(default),
            uses_title,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Engine for the `window-rewrite` section of the workspaces config
    pub fn from_config(config: &WorkspacesConfig) -> Self {
        Self::new(
            &config.window_rewrite,
            &config.window_rewrite_default,
            window_priority,
        )
    }

    /// Resolve `input`, returning the default when no rule matches
    pub fn resolve(&self, input: &str) -> Arc<str> {
        self.resolve_with_match(input).0
    }

    /// Resolve `input` and report whether a rule (rather than the default) produced it
    pub fn resolve_with_match(&self, input: &str) -> (Arc<str>, bool) {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some((value, matched)) = cache.get(input) {
            return (value.clone(), *matched);
        }

        let resolved = self.find_match(input);
        cache.insert(input.to_string(), resolved.clone());
        resolved
    }

    fn find_match(&self, input: &str) -> (Arc<str>, bool) {
        for rule in &self.rules {
            if let Some(caps) = rule.regex.captures(input) {
                let mut out = String::new();
                caps.expand(&rule.template, &mut out);
                debug!(input = input, pattern = rule.regex.as_str(), "Rewrite rule matched");
                return (Arc::from(out), true);
            }
        }
        (self.default.clone(), false)
    }

    /// Whether any active rule keys on window titles
    pub fn uses_title(&self) -> bool {
        self.uses_title
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Rewrite input for a window with this class and title
    pub fn window_key(&self, class: &str, title: &str) -> String {
        if self.uses_title {
            format!("class<{class}> title<{title}>")
        } else {
            format!("class<{class}>")
        }
    }

    /// Resolve a window identity and fill `{class}` / `{title}` in the result
    pub fn resolve_window(&self, class: &str, title: &str) -> String {
        let resolved = self.resolve(&self.window_key(class, title));
        resolved.replace("{class}", class).replace("{title}", title)
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, template: &str, priority: Option<i32>) -> RewriteRuleConfig {
        RewriteRuleConfig {
            pattern: pattern.to_string(),
            template: template.to_string(),
            priority,
        }
    }

    #[test]
    fn test_window_priority() {
        assert_eq!(window_priority("class<kitty> title<vim>"), 3);
        assert_eq!(window_priority("title<.*youtube.*>"), 2);
        assert_eq!(window_priority("class<firefox>"), 1);
        assert_eq!(window_priority("firefox"), 0);
    }

    #[test]
    fn test_higher_priority_wins_over_more_specific_match() {
        let engine = RewriteEngine::new(
            &[rule("^foo", "A", Some(10)), rule("^foobar", "B", Some(5))],
            "?",
            |_| 0,
        );

        assert_eq!(&*engine.resolve("foobar"), "A");
    }

    #[test]
    fn test_equal_priority_keeps_declaration_order() {
        let engine = RewriteEngine::new(
            &[rule("bar", "first", None), rule("foo", "second", None)],
            "?",
            |_| 0,
        );

        assert_eq!(&*engine.resolve("foobar"), "first");
    }

    #[test]
    fn test_repeated_resolution_returns_cached_instance() {
        let engine = RewriteEngine::new(&[rule("^term", "T", None)], "?", |_| 0);

        let first = engine.resolve("terminal");
        let second = engine.resolve("terminal");
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_entries(), 1);
    }

    #[test]
    fn test_no_match_returns_default_and_reports_it() {
        let engine = RewriteEngine::new(&[rule("^term", "T", None)], "?", |_| 0);

        assert_eq!(engine.resolve_with_match("browser"), (Arc::from("?"), false));
        assert_eq!(engine.resolve_with_match("term"), (Arc::from("T"), true));
    }

    #[test]
    fn test_matched_output_equal_to_default_is_distinguishable() {
        let engine = RewriteEngine::new(&[rule("^x", "?", None)], "?", |_| 0);

        let (value, matched) = engine.resolve_with_match("xterm");
        assert_eq!(&*value, "?");
        assert!(matched);
    }

    #[test]
    fn test_backreferences_and_case_insensitivity() {
        let engine = RewriteEngine::new(&[rule(r"class<org\.(\w+)>", "[$1]", None)], "?", |_| 0);

        assert_eq!(&*engine.resolve("class<ORG.Gnome>"), "[Gnome]");
    }

    #[test]
    fn test_pattern_is_searched_not_anchored() {
        let engine = RewriteEngine::new(&[rule("fox", "F", None)], "?", |_| 0);

        assert_eq!(&*engine.resolve("class<firefox>"), "F");
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let engine = RewriteEngine::new(
            &[rule("class<(unclosed", "X", None), rule("class<kitty>", "K", None)],
            "?",
            window_priority,
        );

        assert_eq!(engine.rule_count(), 1);
        assert_eq!(&*engine.resolve("class<kitty>"), "K");
    }

    #[test]
    fn test_priority_function_orders_rules() {
        let engine = RewriteEngine::new(
            &[
                rule("class<firefox>", "F", None),
                rule("class<firefox> title<.*youtube.*>", "Y", None),
            ],
            "?",
            window_priority,
        );

        assert_eq!(&*engine.resolve("class<firefox> title<YouTube - music>"), "Y");
        assert_eq!(&*engine.resolve("class<firefox> title<docs>"), "F");
    }

    #[test]
    fn test_window_key_depends_on_title_rules() {
        let class_only = RewriteEngine::new(&[rule("class<kitty>", "K", None)], "?", window_priority);
        assert!(!class_only.uses_title());
        assert_eq!(class_only.window_key("kitty", "shell"), "class<kitty>");

        let with_title = RewriteEngine::new(&[rule("title<vim>", "V", None)], "?", window_priority);
        assert!(with_title.uses_title());
        assert_eq!(
            with_title.window_key("kitty", "shell"),
            "class<kitty> title<shell>"
        );
    }

    #[test]
    fn test_resolve_window_fills_placeholders() {
        let engine = RewriteEngine::new(
            &[rule("class<kitty>", "{class}:{title}", None)],
            "?",
            window_priority,
        );

        assert_eq!(engine.resolve_window("kitty", "shell"), "kitty:shell");
        assert_eq!(engine.resolve_window("foot", "shell"), "?");
    }

    #[test]
    fn test_from_config_uses_configured_default() {
        let config = WorkspacesConfig {
            window_rewrite_default: "-".to_string(),
            window_rewrite: vec![rule("class<firefox>", "F", None)],
            ..Default::default()
        };

        let engine = RewriteEngine::from_config(&config);
        assert_eq!(engine.resolve_window("firefox", ""), "F");
        assert_eq!(engine.resolve_window("kitty", ""), "-");
    }
}
