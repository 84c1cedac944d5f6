//! Render-ready workspace list and the sinks that consume it

use std::io::Write;

use serde::Serialize;

use crate::workspace::{ConfigLookup, Workspace};

/// Everything a bar needs to draw one workspace button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedWorkspace {
    pub id: Option<i64>,
    pub name: String,
    pub output: String,
    pub label: String,
    pub tooltip: String,
    pub windows: u32,
    /// Representation of the focused window when it is on this workspace
    pub active_window: Option<String>,
    /// Style classes: `active`, `special`, `empty`, `persistent`, `urgent`,
    /// `visible`, `hosting-monitor`
    pub classes: Vec<&'static str>,
    /// Command to send to the compositor when the button is clicked
    pub command: String,
}

impl RenderedWorkspace {
    pub fn from_workspace(ws: &Workspace, format: &str, config: &dyn ConfigLookup) -> Self {
        let icon = ws.select_icon(config.format_icons());
        let (label, tooltip) = ws.render(format, icon, config.window_separator());

        let flags = ws.flags();
        let classes = [
            (flags.active, "active"),
            (flags.special, "special"),
            (ws.is_empty(), "empty"),
            (ws.is_persistent(), "persistent"),
            (flags.urgent, "urgent"),
            (flags.visible, "visible"),
            (config.bar_output() == Some(ws.output()), "hosting-monitor"),
        ]
        .into_iter()
        .filter_map(|(set, class)| set.then_some(class))
        .collect();

        Self {
            id: ws.compositor_id(),
            name: ws.name().to_string(),
            output: ws.output().to_string(),
            label,
            tooltip,
            windows: ws.window_count(),
            active_window: ws.active_window().map(str::to_string),
            classes,
            command: ws.click_command(config.move_to_monitor()),
        }
    }
}

/// Consumer of the ordered workspace list produced by each tick
pub trait RenderSink {
    fn render(&mut self, workspaces: &[RenderedWorkspace]) -> std::io::Result<()>;
}

/// Writes one JSON array per line, skipping output identical to the previous one
#[derive(Debug)]
pub struct JsonLineSink<W: Write> {
    writer: W,
    last: Option<Vec<RenderedWorkspace>>,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, last: None }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RenderSink for JsonLineSink<W> {
    fn render(&mut self, workspaces: &[RenderedWorkspace]) -> std::io::Result<()> {
        if self.last.as_deref() == Some(workspaces) {
            return Ok(());
        }

        serde_json::to_writer(&mut self.writer, workspaces)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.last = Some(workspaces.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RenderedWorkspace {
        RenderedWorkspace {
            id: Some(1),
            name: name.to_string(),
            output: "DP-1".to_string(),
            label: name.to_string(),
            tooltip: name.to_string(),
            windows: 0,
            active_window: None,
            classes: vec!["empty"],
            command: format!("dispatch workspace {name}"),
        }
    }

    #[test]
    fn test_json_line_sink_skips_unchanged_output() {
        let mut sink = JsonLineSink::new(Vec::new());

        sink.render(&[entry("1")]).unwrap();
        sink.render(&[entry("1")]).unwrap();
        sink.render(&[entry("1"), entry("2")]).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed[1]["name"], "2");
        assert_eq!(parsed[0]["classes"][0], "empty");
    }
}
