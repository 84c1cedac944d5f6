//! KDL configuration parser

use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::*;

/// Upper bound for `"*" N` in `persistent-workspaces`
pub const MAX_PERSISTENT_COUNT: u32 = 100;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl pulls in an older miette, so the span is rebuilt from offset/len
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "workspaces" => {
                config.workspaces = parse_workspaces(node)?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

/// Positional (unnamed) arguments of a node, in order
fn arguments(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn property<'a>(node: &'a kdl::KdlNode, key: &str) -> Option<&'a kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value() == key).unwrap_or(false))
        .map(|e| e.value())
}

fn string_arg(node: &kdl::KdlNode) -> Result<String, ConfigError> {
    arguments(node)
        .next()
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: node.name().value().to_string(),
            expected: "a string",
        })
}

/// A bare flag node (`all-outputs`) counts as `true`
fn bool_arg(node: &kdl::KdlNode) -> Result<bool, ConfigError> {
    match arguments(node).next() {
        None => Ok(true),
        Some(value) => value.as_bool().ok_or_else(|| ConfigError::InvalidValue {
            key: node.name().value().to_string(),
            expected: "a boolean",
        }),
    }
}

fn u64_arg(node: &kdl::KdlNode) -> Result<u64, ConfigError> {
    arguments(node)
        .next()
        .and_then(|v| v.as_i64())
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: node.name().value().to_string(),
            expected: "a non-negative integer",
        })
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    let val = string_arg(child)?;
                    global.log_level = val
                        .parse()
                        .map_err(|e| ConfigError::Invalid { message: e })?;
                }
                "request-timeout-ms" => {
                    let ms = u64_arg(child)?;
                    global.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                }
                "refresh-interval-ms" => {
                    let ms = u64_arg(child)?;
                    if ms == 0 {
                        return Err(ConfigError::Invalid {
                            message: "refresh-interval-ms must be greater than zero".to_string(),
                        });
                    }
                    global.refresh_interval = Duration::from_millis(ms);
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_workspaces(node: &kdl::KdlNode) -> Result<WorkspacesConfig, ConfigError> {
    let mut ws = WorkspacesConfig::default();

    let Some(children) = node.children() else {
        return Ok(ws);
    };

    for child in children.nodes() {
        match child.name().value() {
            "output" => ws.output = Some(string_arg(child)?),
            "all-outputs" => ws.all_outputs = bool_arg(child)?,
            "show-special" => ws.show_special = bool_arg(child)?,
            "special-visible-only" => ws.special_visible_only = bool_arg(child)?,
            "active-only" => ws.active_only = bool_arg(child)?,
            "persistent-only" => ws.persistent_only = bool_arg(child)?,
            "move-to-monitor" => ws.move_to_monitor = bool_arg(child)?,
            "sort-by" => {
                let val = string_arg(child)?;
                ws.sort_by = val.parse().unwrap_or_else(|e| {
                    tracing::warn!("{}, falling back to DEFAULT", e);
                    SortMethod::Default
                });
            }
            "format" => ws.format = string_arg(child)?,
            "format-window-separator" => ws.window_separator = string_arg(child)?,
            "window-retry-budget" => {
                let budget = u64_arg(child)?;
                ws.window_retry_budget = u32::try_from(budget).unwrap_or(u32::MAX);
            }
            "ignore-workspaces" => {
                for value in arguments(child) {
                    match value.as_string() {
                        Some(pattern) => ws.ignore_workspaces.push(pattern.to_string()),
                        None => tracing::warn!("Ignoring non-string ignore-workspaces entry"),
                    }
                }
            }
            "format-icons" => ws.format_icons = parse_format_icons(child)?,
            "persistent-workspaces" => {
                ws.persistent_workspaces = parse_persistent_workspaces(child)?;
            }
            "window-rewrite-default" => ws.window_rewrite_default = string_arg(child)?,
            "window-rewrite" => ws.window_rewrite = parse_window_rewrite(child),
            name => {
                tracing::warn!("Unknown workspaces config option: {}", name);
            }
        }
    }

    Ok(ws)
}

fn parse_format_icons(
    node: &kdl::KdlNode,
) -> Result<std::collections::BTreeMap<String, String>, ConfigError> {
    let mut icons = std::collections::BTreeMap::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            icons.insert(child.name().value().to_string(), string_arg(child)?);
        }
    }

    Ok(icons)
}

fn parse_persistent_workspaces(
    node: &kdl::KdlNode,
) -> Result<Vec<PersistentWorkspace>, ConfigError> {
    let mut declared = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let name = child.name().value();
            if name == "*" {
                let count = u64_arg(child)?;
                let clamped = u32::try_from(count)
                    .unwrap_or(u32::MAX)
                    .min(MAX_PERSISTENT_COUNT);
                if u64::from(clamped) != count {
                    tracing::warn!(
                        count = count,
                        max = MAX_PERSISTENT_COUNT,
                        "persistent-workspaces count too large, clamping"
                    );
                }
                declared.push(PersistentWorkspace::Count(clamped));
                continue;
            }

            let mut outputs = Vec::new();
            for value in arguments(child) {
                match value.as_string() {
                    Some(output) => outputs.push(output.to_string()),
                    None => {
                        return Err(ConfigError::InvalidValue {
                            key: format!("persistent-workspaces.{}", name),
                            expected: "output names as strings",
                        })
                    }
                }
            }
            declared.push(PersistentWorkspace::Named {
                name: name.to_string(),
                outputs,
            });
        }
    }

    Ok(declared)
}

/// Rules with a missing template are dropped with a warning rather than failing the load
fn parse_window_rewrite(node: &kdl::KdlNode) -> Vec<RewriteRuleConfig> {
    let mut rules = Vec::new();

    let Some(children) = node.children() else {
        return rules;
    };

    for child in children.nodes() {
        let pattern = child.name().value().to_string();
        let Some(template) = arguments(child).next().and_then(|v| v.as_string()) else {
            tracing::warn!(pattern = %pattern, "window-rewrite rule has no template, skipping");
            continue;
        };

        let priority = match property(child, "priority") {
            Some(value) => match value.as_i64().and_then(|p| i32::try_from(p).ok()) {
                Some(p) => Some(p),
                None => {
                    tracing::warn!(pattern = %pattern, "Invalid rule priority, using default");
                    None
                }
            },
            None => None,
        };

        rules.push(RewriteRuleConfig {
            pattern,
            template: template.to_string(),
            priority,
        });
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_config() {
        let config = r#"
            global {
                log-level "debug"
                request-timeout-ms 250
            }

            workspaces {
                output "DP-1"
                sort-by "number"
                format "{icon} {windows}"
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert_eq!(result.global.log_level, LogLevel::Debug);
        assert_eq!(
            result.global.request_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(result.workspaces.output.as_deref(), Some("DP-1"));
        assert_eq!(result.workspaces.sort_by, SortMethod::Number);
        assert_eq!(result.workspaces.format, "{icon} {windows}");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let result = parse_config_str("").unwrap();
        assert_eq!(result.global.log_level, LogLevel::Info);
        assert_eq!(result.global.request_timeout, None);
        assert_eq!(result.workspaces.sort_by, SortMethod::Default);
        assert_eq!(result.workspaces.window_rewrite_default, "?");
        assert_eq!(result.workspaces.window_retry_budget, 5);
    }

    #[test]
    fn test_sort_method_is_case_insensitive() {
        assert_eq!("id".parse::<SortMethod>(), Ok(SortMethod::Id));
        assert_eq!("Name".parse::<SortMethod>(), Ok(SortMethod::Name));
        assert_eq!(
            "special-centered".parse::<SortMethod>(),
            Ok(SortMethod::SpecialCentered)
        );
        assert_eq!(
            "SPECIAL_CENTERED".parse::<SortMethod>(),
            Ok(SortMethod::SpecialCentered)
        );
        assert!("sideways".parse::<SortMethod>().is_err());
    }

    #[test]
    fn test_unknown_sort_method_falls_back_to_default() {
        let config = r#"
            workspaces {
                sort-by "sideways"
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert_eq!(result.workspaces.sort_by, SortMethod::Default);
    }

    #[test]
    fn test_boolean_flags() {
        let config = r#"
            workspaces {
                all-outputs true
                show-special
                active-only false
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert!(result.workspaces.all_outputs);
        assert!(result.workspaces.show_special);
        assert!(!result.workspaces.active_only);
    }

    #[test]
    fn test_boolean_flag_rejects_string() {
        let config = r#"
            workspaces {
                all-outputs "yes"
            }
        "#;

        match parse_config_str(config) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "all-outputs"),
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }
    }

    #[test]
    fn test_window_rewrite_keeps_declaration_order_and_priority() {
        let config = r#"
            workspaces {
                window-rewrite-default "?"
                window-rewrite {
                    "class<firefox>" "F"
                    "title<.*youtube.*>" "Y" priority=10
                    "class<kitty>"
                }
            }
        "#;

        let result = parse_config_str(config).unwrap();
        let rules = &result.workspaces.window_rewrite;
        assert_eq!(rules.len(), 2, "rule without template is dropped");
        assert_eq!(rules[0].pattern, "class<firefox>");
        assert_eq!(rules[0].template, "F");
        assert_eq!(rules[0].priority, None);
        assert_eq!(rules[1].pattern, "title<.*youtube.*>");
        assert_eq!(rules[1].priority, Some(10));
    }

    #[test]
    fn test_persistent_workspaces() {
        let config = r#"
            workspaces {
                persistent-workspaces {
                    "1"
                    "music" "DP-1" "HDMI-A-1"
                    "*" 3
                }
            }
        "#;

        let result = parse_config_str(config).unwrap();
        let declared = &result.workspaces.persistent_workspaces;
        assert_eq!(declared.len(), 3);
        assert_eq!(
            declared[0],
            PersistentWorkspace::Named {
                name: "1".to_string(),
                outputs: vec![]
            }
        );
        assert_eq!(
            declared[1],
            PersistentWorkspace::Named {
                name: "music".to_string(),
                outputs: vec!["DP-1".to_string(), "HDMI-A-1".to_string()]
            }
        );
        assert_eq!(declared[2], PersistentWorkspace::Count(3));
    }

    #[test]
    fn test_persistent_count_is_clamped() {
        let config = r#"
            workspaces {
                persistent-workspaces {
                    "*" 4000000000000
                }
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert_eq!(
            result.workspaces.persistent_workspaces,
            vec![PersistentWorkspace::Count(MAX_PERSISTENT_COUNT)]
        );
    }

    #[test]
    fn test_persistent_names_for_output() {
        let music = PersistentWorkspace::Named {
            name: "music".to_string(),
            outputs: vec!["DP-1".to_string()],
        };
        assert_eq!(music.names_for_output(Some("DP-1")), vec!["music"]);
        assert!(music.names_for_output(Some("HDMI-A-1")).is_empty());
        assert_eq!(music.names_for_output(None), vec!["music"]);

        let count = PersistentWorkspace::Count(3);
        assert_eq!(count.names_for_output(Some("DP-1")), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_format_icons_and_ignore_list() {
        let config = r#"
            workspaces {
                ignore-workspaces "^scratch" "^tmp"
                format-icons {
                    active "A"
                    default "o"
                    "1" "one"
                }
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert_eq!(result.workspaces.ignore_workspaces, vec!["^scratch", "^tmp"]);
        assert_eq!(result.workspaces.format_icons.get("active").map(String::as_str), Some("A"));
        assert_eq!(result.workspaces.format_icons.get("1").map(String::as_str), Some("one"));
    }

    #[test]
    fn test_invalid_kdl_reports_parse_error() {
        let result = parse_config_str("workspaces {");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let config = r#"
            global {
                refresh-interval-ms 0
            }
        "#;
        assert!(matches!(
            parse_config_str(config),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.kdl");
        assert!(matches!(
            parse_config(&path),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_parse_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, "workspaces {\n    format \"<{name}>\"\n}\n").unwrap();

        let config = parse_config(&path).unwrap();
        assert_eq!(config.workspaces.format, "<{name}>");
    }
}
