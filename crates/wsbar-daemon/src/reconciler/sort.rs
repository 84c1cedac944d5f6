//! Workspace ordering
//!
//! Every method falls back to creation order for ties, so the result is
//! deterministic for any input.

use std::cmp::Ordering;

use wsbar_config::SortMethod;

use crate::hypr_ipc::MonitorReport;
use crate::workspace::Workspace;

/// Order `workspaces` according to `method`
pub fn sort_workspaces(workspaces: &mut Vec<&Workspace>, method: SortMethod, monitors: &[MonitorReport]) {
    match method {
        SortMethod::Id => workspaces.sort_by(|a, b| by_id(a, b).then_with(|| by_creation(a, b))),
        SortMethod::Name => {
            let numeric = workspaces.iter().all(|ws| ws.name().parse::<i64>().is_ok());
            workspaces.sort_by(|a, b| {
                let primary = if numeric {
                    number(a).cmp(&number(b))
                } else {
                    a.name().cmp(b.name())
                };
                primary.then_with(|| by_creation(a, b))
            });
        }
        SortMethod::Number => {
            workspaces.sort_by(|a, b| {
                // Numeric names first, by value
                let primary = match (number(a), number(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                primary.then_with(|| by_creation(a, b))
            });
        }
        SortMethod::Coordinates => {
            workspaces.sort_by(|a, b| {
                position(a, monitors)
                    .cmp(&position(b, monitors))
                    .then_with(|| by_creation(a, b))
            });
        }
        SortMethod::SpecialCentered => special_centered(workspaces),
        SortMethod::Default => workspaces.sort_by(|a, b| by_creation(a, b)),
    }
}

fn by_creation(a: &Workspace, b: &Workspace) -> Ordering {
    a.key().cmp(&b.key())
}

/// Compositor id, workspaces not yet reported last
fn by_id(a: &Workspace, b: &Workspace) -> Ordering {
    match (a.compositor_id(), b.compositor_id()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn number(ws: &Workspace) -> Option<i64> {
    ws.name().parse().ok()
}

/// Monitor position; unknown monitors sort after every known one
fn position(ws: &Workspace, monitors: &[MonitorReport]) -> (bool, i32, i32) {
    match monitors.iter().find(|m| m.name == ws.output()) {
        Some(m) => (false, m.x, m.y),
        None => (true, 0, 0),
    }
}

/// Regular workspaces by id with the special ones spliced into the middle
fn special_centered(workspaces: &mut Vec<&Workspace>) {
    let (mut specials, mut regular): (Vec<&Workspace>, Vec<&Workspace>) =
        workspaces.iter().copied().partition(|ws| ws.is_special());

    regular.sort_by(|a, b| by_id(a, b).then_with(|| by_creation(a, b)));
    specials.sort_by(|a, b| by_creation(a, b));

    let center = regular.len() / 2;
    let tail = regular.split_off(center);

    workspaces.clear();
    workspaces.extend(regular);
    workspaces.extend(specials);
    workspaces.extend(tail);
}
