//! Cross-task handoff between the event listener and the reconciler
//!
//! The listener only appends here. Draining happens at the start of a tick.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::trace;

use crate::hypr_ipc::{CompositorClient, CompositorEvent, SubscriptionId};

/// Event names the reconciler subscribes to
///
/// The v2 variants carry ids, so the v1 duplicates the compositor also emits
/// are left out.
pub const TRACKED_EVENTS: &[&str] = &[
    "workspacev2",
    "createworkspacev2",
    "destroyworkspacev2",
    "renameworkspace",
    "moveworkspacev2",
    "activespecial",
    "focusedmon",
    "openwindow",
    "closewindow",
    "movewindowv2",
    "windowtitlev2",
    "urgent",
    "activewindowv2",
    "configreloaded",
];

pub fn is_tracked_event(name: &str) -> bool {
    TRACKED_EVENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceOp {
    Created { id: Option<i64>, name: String },
    Destroyed { id: Option<i64>, name: String },
    Renamed { id: i64, name: String },
    Moved { name: String, monitor: String },
    Activated { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOp {
    Opened {
        address: String,
        workspace: String,
        class: String,
        title: String,
    },
    Closed {
        address: String,
    },
    Moved {
        address: String,
        workspace: String,
    },
    TitleChanged {
        address: String,
        title: Option<String>,
    },
    Urgent {
        address: String,
    },
    /// Keyboard focus moved to `address`, or to no window
    Focused {
        address: Option<String>,
    },
}

/// Work accumulated since the last tick
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Pending {
    pub workspace_ops: Vec<WorkspaceOp>,
    pub window_ops: Vec<WindowOp>,
    pub monitor_dirty: bool,
    pub config_dirty: bool,
}

impl Pending {
    pub fn is_empty(&self) -> bool {
        self.workspace_ops.is_empty()
            && self.window_ops.is_empty()
            && !self.monitor_dirty
            && !self.config_dirty
    }

    fn push_workspace_op(&mut self, op: WorkspaceOp) {
        match &op {
            WorkspaceOp::Created { name, .. } => {
                // A repeated creation collapses into the first one
                if self.workspace_ops.iter().any(
                    |queued| matches!(queued, WorkspaceOp::Created { name: n, .. } if n == name),
                ) {
                    return;
                }
            }
            WorkspaceOp::Destroyed { name, .. } => {
                // Created and destroyed within one tick: the creation never happened
                self.workspace_ops.retain(
                    |queued| !matches!(queued, WorkspaceOp::Created { name: n, .. } if n == name),
                );
            }
            _ => {}
        }
        self.workspace_ops.push(op);
    }
}

/// Mutex-guarded pending work plus an edge-triggered wakeup
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Pending>,
    notify: Notify,
}

impl EventQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Map a compositor event to queued work
    ///
    /// Returns false for events the reconciler does not track.
    pub fn push_event(&self, event: &CompositorEvent) -> bool {
        {
            let mut pending = match self.pending.lock() {
                Ok(pending) => pending,
                Err(poisoned) => poisoned.into_inner(),
            };

            match event.clone() {
                CompositorEvent::WorkspaceCreated { id, name } => {
                    pending.push_workspace_op(WorkspaceOp::Created { id, name })
                }
                CompositorEvent::WorkspaceDestroyed { id, name } => {
                    pending.push_workspace_op(WorkspaceOp::Destroyed { id, name })
                }
                CompositorEvent::WorkspaceRenamed { id, name } => {
                    pending.push_workspace_op(WorkspaceOp::Renamed { id, name })
                }
                CompositorEvent::WorkspaceMoved { name, monitor } => {
                    pending.push_workspace_op(WorkspaceOp::Moved { name, monitor })
                }
                CompositorEvent::WorkspaceActivated { name } => {
                    pending.push_workspace_op(WorkspaceOp::Activated { name })
                }
                CompositorEvent::WindowOpened {
                    address,
                    workspace,
                    class,
                    title,
                } => pending.window_ops.push(WindowOp::Opened {
                    address,
                    workspace,
                    class,
                    title,
                }),
                CompositorEvent::WindowClosed { address } => {
                    pending.window_ops.push(WindowOp::Closed { address })
                }
                CompositorEvent::WindowMoved { address, workspace } => pending
                    .window_ops
                    .push(WindowOp::Moved { address, workspace }),
                CompositorEvent::WindowTitleChanged { address, title } => pending
                    .window_ops
                    .push(WindowOp::TitleChanged { address, title }),
                CompositorEvent::Urgent { address } => {
                    pending.window_ops.push(WindowOp::Urgent { address })
                }
                CompositorEvent::WindowFocused { address } => {
                    pending.window_ops.push(WindowOp::Focused { address })
                }
                CompositorEvent::SpecialActivated { .. } | CompositorEvent::MonitorFocused { .. } => {
                    pending.monitor_dirty = true
                }
                CompositorEvent::ConfigReloaded => pending.config_dirty = true,
                CompositorEvent::Other { name, .. } => {
                    trace!(event = %name, "Ignoring untracked event");
                    return false;
                }
            }
        }

        self.notify.notify_one();
        true
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Pending {
        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *pending)
    }

    /// Wait until work has been queued since the last wakeup
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Route tracked events from `client` into this queue
    pub fn attach(self: &Arc<Self>, client: &CompositorClient) -> SubscriptionId {
        let queue = Arc::clone(self);
        client.subscribe(is_tracked_event, move |event| {
            queue.push_event(event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tracked_events() {
        assert!(is_tracked_event("openwindow"));
        assert!(is_tracked_event("configreloaded"));
        assert!(!is_tracked_event("workspace"));
        assert!(!is_tracked_event("activewindow"));
    }

    #[test]
    fn test_events_map_to_queues() {
        let queue = EventQueue::new();

        assert!(queue.push_event(&CompositorEvent::parse("createworkspacev2>>3,3").unwrap()));
        assert!(queue.push_event(&CompositorEvent::parse("openwindow>>ab,3,term,shell").unwrap()));
        assert!(queue.push_event(&CompositorEvent::parse("focusedmon>>DP-1,3").unwrap()));
        assert!(!queue.push_event(&CompositorEvent::parse("activelayout>>kbd,us").unwrap()));

        let pending = queue.drain();
        assert_eq!(
            pending.workspace_ops,
            vec![WorkspaceOp::Created {
                id: Some(3),
                name: "3".to_string()
            }]
        );
        assert_eq!(pending.window_ops.len(), 1);
        assert!(pending.monitor_dirty);
        assert!(!pending.config_dirty);

        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_create_then_destroy_cancels_creation() {
        let queue = EventQueue::new();
        queue.push_event(&CompositorEvent::parse("createworkspacev2>>4,4").unwrap());
        queue.push_event(&CompositorEvent::parse("createworkspacev2>>4,4").unwrap());
        queue.push_event(&CompositorEvent::parse("destroyworkspacev2>>4,4").unwrap());

        let pending = queue.drain();
        assert_eq!(pending.workspace_ops.len(), 1);
        assert!(matches!(
            pending.workspace_ops[0],
            WorkspaceOp::Destroyed { .. }
        ));
    }

    #[test]
    fn test_window_ops_keep_arrival_order() {
        let queue = EventQueue::new();
        queue.push_event(&CompositorEvent::parse("openwindow>>ab,1,term,shell").unwrap());
        queue.push_event(&CompositorEvent::parse("closewindow>>ab").unwrap());
        queue.push_event(&CompositorEvent::parse("openwindow>>ab,1,term,shell").unwrap());

        let ops = queue.drain().window_ops;
        assert!(matches!(ops[0], WindowOp::Opened { .. }));
        assert!(matches!(ops[1], WindowOp::Closed { .. }));
        assert!(matches!(ops[2], WindowOp::Opened { .. }));
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = EventQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.notified().await })
        };

        queue.push_event(&CompositorEvent::ConfigReloaded);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(queue.drain().config_dirty);
    }
}
