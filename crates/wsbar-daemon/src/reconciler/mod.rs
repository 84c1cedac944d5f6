//! Workspace/window state reconciliation
//!
//! The reconciler keeps the bar's model of workspaces and windows in step
//! with the compositor. Events only append to the `EventQueue`; all state
//! changes happen in `tick`, which runs to completion on the caller's task:
//!
//! 1. removals: destroyed workspaces go away, their windows become orphans
//! 2. creations: new workspaces are instantiated and claim waiting orphans
//! 3. window operations, in arrival order; orphans age and are evicted
//! 4. flags and window focus are recomputed from the latest snapshot
//! 5. the collection is sorted
//! 6. shown workspaces are rendered
//!
//! Ownership: every known window address lives in exactly one workspace's
//! window map or in the orphan map. `window_index` records which.

mod queue;
mod sort;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use wsbar_config::WorkspacesConfig;

use crate::context::ModuleContext;
use crate::hypr_ipc::{
    ClientReport, CompositorClient, CompositorSnapshot, IpcError, SubscriptionId, WorkspaceRef,
    WorkspaceReport,
};
use crate::render::RenderedWorkspace;
use crate::window::{normalize_address, normalize_workspace_ref, WindowRef};
use crate::workspace::{parse_workspace_name, ConfigLookup, Workspace, WorkspaceKey};

pub use queue::{is_tracked_event, EventQueue, Pending, WindowOp, WorkspaceOp, TRACKED_EVENTS};
pub use sort::sort_workspaces;

/// Where a window address currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Workspace(WorkspaceKey),
    Orphan,
}

/// Owner of the workspace model
///
/// Build one per compositor connection, `attach` it to the client, then call
/// `refresh` (or `tick` with a snapshot fetched elsewhere) whenever the queue
/// is notified.
#[derive(Debug)]
pub struct Reconciler {
    context: ModuleContext,
    queue: Arc<EventQueue>,
    workspaces: BTreeMap<WorkspaceKey, Workspace>,
    /// Sorted order from the last tick
    order: Vec<WorkspaceKey>,
    window_index: HashMap<String, Location>,
    orphans: HashMap<String, WindowRef>,
    /// Raw configured names, qualifiers kept
    persistent_names: Vec<String>,
    /// Normalized address of the focused window
    focused_window: Option<String>,
    next_key: u64,
    loaded: bool,
}

impl Reconciler {
    /// Empty model; the first `tick` loads it from a snapshot
    pub fn new(config: WorkspacesConfig) -> Self {
        let context = ModuleContext::new(config);
        let persistent_names = context.persistent_names();
        Self {
            context,
            queue: EventQueue::new(),
            workspaces: BTreeMap::new(),
            order: Vec::new(),
            window_index: HashMap::new(),
            orphans: HashMap::new(),
            persistent_names,
            focused_window: None,
            next_key: 0,
            loaded: false,
        }
    }

    pub fn context(&self) -> &ModuleContext {
        &self.context
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Subscribe this reconciler's queue to `client`'s event stream
    ///
    /// Pass the returned id to `CompositorClient::unsubscribe` once the
    /// reconciler is dropped.
    pub fn attach(&self, client: &CompositorClient) -> SubscriptionId {
        self.queue.attach(client)
    }

    /// Fetch a snapshot from `client` and run one tick
    ///
    /// # Errors
    ///
    /// Returns the `IpcError` of the first snapshot query that fails. The
    /// model and the queue are left untouched in that case, so the next
    /// successful refresh applies everything that was pending.
    pub async fn refresh(
        &mut self,
        client: &CompositorClient,
    ) -> Result<Vec<RenderedWorkspace>, IpcError> {
        let snapshot = client.snapshot().await?;
        Ok(self.tick(&snapshot))
    }

    /// Drain queued work, apply it against `snapshot` and render
    ///
    /// The first tick, and any tick after `configreloaded`, rebuilds the
    /// model from the snapshot alone.
    pub fn tick(&mut self, snapshot: &CompositorSnapshot) -> Vec<RenderedWorkspace> {
        let pending = self.queue.drain();

        if !self.loaded || pending.config_dirty {
            if self.loaded {
                info!("Compositor configuration reloaded, rebuilding workspace model");
            }
            self.rebuild(snapshot);
        } else {
            if pending.monitor_dirty {
                trace!("Monitor focus changed");
            }
            let aging: Vec<String> = self.orphans.keys().cloned().collect();

            let destroyed = self.apply_removals(&pending.workspace_ops, snapshot);
            self.apply_workspace_ops(&pending.workspace_ops, snapshot);
            self.discover(snapshot, &destroyed);
            self.ensure_placeholders();
            self.apply_window_ops(pending.window_ops, snapshot);
            self.age_orphans(&aging);
        }

        self.refresh_flags(snapshot);
        self.sort(snapshot);

        if cfg!(debug_assertions) {
            if let Err(violation) = self.verify_ownership() {
                error!("Window ownership invariant violated: {}", violation);
            }
        }

        trace!(
            workspaces = self.workspaces.len(),
            orphans = self.orphans.len(),
            "Reconciliation tick complete"
        );

        self.render()
    }

    /// Workspaces in display order, including hidden ones
    pub fn workspaces(&self) -> impl Iterator<Item = &Workspace> {
        self.order.iter().filter_map(|key| self.workspaces.get(key))
    }

    /// Look up a workspace by display name, qualified name or window reference
    pub fn workspace(&self, name: &str) -> Option<&Workspace> {
        self.find_by_name(name).and_then(|key| self.workspaces.get(&key))
    }

    /// Windows waiting for their workspace, keyed by address
    pub fn orphans(&self) -> &HashMap<String, WindowRef> {
        &self.orphans
    }

    /// Address of the window that has focus, if any
    pub fn focused_window(&self) -> Option<&str> {
        self.focused_window.as_deref()
    }

    /// Current owner of a window; `0x` prefixed addresses are accepted
    pub fn location_of(&self, address: &str) -> Option<Location> {
        self.window_index.get(&normalize_address(address)).copied()
    }

    /// Command that focuses the workspace called `name`
    pub fn click_command(&self, name: &str) -> Option<String> {
        self.workspace(name)
            .map(|ws| ws.click_command(self.context.move_to_monitor()))
    }

    /// Render every shown workspace in display order
    pub fn render(&self) -> Vec<RenderedWorkspace> {
        self.workspaces()
            .filter(|ws| ws.is_shown(&self.context))
            .map(|ws| RenderedWorkspace::from_workspace(ws, self.context.format(), &self.context))
            .collect()
    }

    /// Check that the index and the owners agree
    ///
    /// # Errors
    ///
    /// Returns a description of the first window found with zero or two
    /// owners, or of an index entry pointing at the wrong owner.
    pub fn verify_ownership(&self) -> Result<(), String> {
        let mut seen: HashSet<&str> = HashSet::new();

        for (key, ws) in &self.workspaces {
            for address in ws.window_map().keys() {
                if !seen.insert(address) {
                    return Err(format!("{address} owned twice (found again in {key})"));
                }
                if self.window_index.get(address) != Some(&Location::Workspace(*key)) {
                    return Err(format!("{address} in {key} but index says {:?}", self.window_index.get(address)));
                }
            }
        }
        for address in self.orphans.keys() {
            if !seen.insert(address) {
                return Err(format!("{address} is both owned and orphaned"));
            }
            if self.window_index.get(address) != Some(&Location::Orphan) {
                return Err(format!("{address} orphaned but index disagrees"));
            }
        }
        if seen.len() != self.window_index.len() {
            return Err(format!(
                "index has {} entries for {} windows",
                self.window_index.len(),
                seen.len()
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookup

    fn find_by_compositor_id(&self, id: i64) -> Option<WorkspaceKey> {
        self.workspaces
            .values()
            .find(|ws| ws.compositor_id() == Some(id))
            .map(Workspace::key)
    }

    /// Exact display name first, then the space-truncated key windows use
    fn find_by_name(&self, name: &str) -> Option<WorkspaceKey> {
        let (display, _) = parse_workspace_name(name);
        if let Some(ws) = self.workspaces.values().find(|ws| ws.name() == display) {
            return Some(ws.key());
        }
        let key = normalize_workspace_ref(name);
        self.workspaces
            .values()
            .find(|ws| ws.lookup_key() == key)
            .map(Workspace::key)
    }

    fn is_config_persistent(&self, name: &str) -> bool {
        declares(&self.persistent_names, name)
    }

    /// Local entity for a report: same id, or a not-yet-reported entity with the same name
    fn find_for_report(&self, report: &WorkspaceReport) -> Option<WorkspaceKey> {
        if let Some(key) = self.find_by_compositor_id(report.id) {
            return Some(key);
        }
        let (name, _) = parse_workspace_name(&report.name);
        self.workspaces
            .values()
            .find(|ws| ws.compositor_id().is_none() && ws.name() == name)
            .map(Workspace::key)
    }

    fn client_for<'a>(snapshot: &'a CompositorSnapshot, address: &str) -> Option<&'a ClientReport> {
        snapshot
            .clients
            .iter()
            .find(|c| normalize_address(&c.address) == address)
    }

    // -------------------------------------------------------------------------
    // Ownership primitives

    fn allocate_key(&mut self) -> WorkspaceKey {
        self.next_key += 1;
        WorkspaceKey(self.next_key)
    }

    /// Detach `address` from whoever owns it
    fn release(&mut self, address: &str) -> Option<WindowRef> {
        match self.window_index.remove(address)? {
            Location::Workspace(key) => {
                let ws = self.workspaces.get_mut(&key)?;
                let repr = ws.remove_window(address)?;
                Some(WindowRef::from_repr(ws.name(), address, repr))
            }
            Location::Orphan => self.orphans.remove(address),
        }
    }

    /// Give `window` to workspace `key`, taking it from any previous owner
    fn place_window(&mut self, key: WorkspaceKey, mut window: WindowRef) {
        let address = window.address().to_string();
        self.release(&address);
        window.set_active(self.focused_window.as_deref() == Some(address.as_str()));

        let Some(ws) = self.workspaces.get_mut(&key) else {
            return;
        };
        ws.insert_window(&mut window, &self.context);
        if ws.contains_window(&address) {
            self.window_index.insert(address, Location::Workspace(key));
        } else {
            debug!(address = %address, workspace = %ws.name(), "Window has no usable identity, dropped");
        }
    }

    fn orphan_window(&mut self, mut window: WindowRef) {
        let address = window.address().to_string();
        self.release(&address);
        window.set_active(self.focused_window.as_deref() == Some(address.as_str()));
        trace!(address = %address, workspace = window.workspace_name(), "Window orphaned");
        self.orphans.insert(address.clone(), window);
        self.window_index.insert(address, Location::Orphan);
    }

    /// Move every orphan waiting for workspace `key` into it
    fn claim_orphans(&mut self, key: WorkspaceKey) {
        let Some(name) = self.workspaces.get(&key).map(|ws| ws.lookup_key().to_string()) else {
            return;
        };

        let waiting: Vec<String> = self
            .orphans
            .iter()
            .filter(|(_, window)| window.workspace_name() == name)
            .map(|(address, _)| address.clone())
            .collect();

        for address in waiting {
            if let Some(window) = self.orphans.remove(&address) {
                self.window_index.remove(&address);
                debug!(address = %address, workspace = %name, "Orphan window claimed");
                self.place_window(key, window);
            }
        }
    }

    /// Destroy a workspace locally; its windows become orphans where possible
    fn remove_workspace(&mut self, key: WorkspaceKey, snapshot: &CompositorSnapshot) {
        let Some(ws) = self.workspaces.get_mut(&key) else {
            return;
        };
        let name = ws.name().to_string();
        let windows = ws.take_windows();

        if ws.flags().persistent_config {
            debug!(workspace = %name, "Keeping config-persistent workspace");
            ws.detach();
        } else {
            self.workspaces.remove(&key);
            self.order.retain(|k| *k != key);
            debug!(workspace = %name, key = %key, "Workspace removed");
        }

        for (address, repr) in windows {
            self.window_index.remove(&address);
            match Self::client_for(snapshot, &address) {
                Some(client) => {
                    let window = WindowRef::from_repr(&client.workspace.name, &address, repr);
                    self.orphan_window(window);
                }
                None => {
                    debug!(address = %address, workspace = %name, "Window of removed workspace is gone, dropped");
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Workspaces

    /// Bring a reported workspace into the model, creating it if needed
    fn ensure_workspace(&mut self, report: &WorkspaceReport, snapshot: &CompositorSnapshot) {
        let (name, special) = parse_workspace_name(&report.name);
        if !self
            .context
            .should_instantiate(&name, &report.monitor, special)
        {
            return;
        }

        let key = match self.find_for_report(report) {
            Some(key) => {
                let Some(ws) = self.workspaces.get_mut(&key) else {
                    return;
                };
                let attaching = ws.compositor_id().is_none();
                ws.apply_report(report);
                if !attaching {
                    self.claim_orphans(key);
                    return;
                }
                debug!(workspace = %name, id = report.id, "Persistent workspace reported by compositor");
                key
            }
            None => {
                let key = self.allocate_key();
                let mut ws = Workspace::from_report(key, report);
                ws.flags_mut().persistent_config = self.is_config_persistent(&name);
                debug!(workspace = %name, id = report.id, key = %key, "Workspace created");
                self.workspaces.insert(key, ws);
                self.order.push(key);
                key
            }
        };

        self.populate(key, report.id, snapshot);
        self.claim_orphans(key);
    }

    /// Fill a workspace from the snapshot's client list
    fn populate(&mut self, key: WorkspaceKey, id: i64, snapshot: &CompositorSnapshot) {
        for client in snapshot.clients.iter().filter(|c| c.workspace.id == id) {
            let window = WindowRef::from_class_title(
                &client.workspace.name,
                &client.address,
                client.class.as_str(),
                client.title.as_str(),
            );
            if self.window_index.get(window.address()) == Some(&Location::Workspace(key)) {
                continue;
            }
            self.place_window(key, window);
        }
    }

    fn create_from_snapshot(&mut self, raw_name: &str, snapshot: &CompositorSnapshot) {
        match snapshot.workspace_by_raw_name(raw_name) {
            Some(report) => self.ensure_workspace(report, snapshot),
            None => {
                let name = normalize_workspace_ref(raw_name);
                match snapshot
                    .workspaces
                    .iter()
                    .find(|ws| normalize_workspace_ref(&ws.name) == name)
                {
                    Some(report) => self.ensure_workspace(report, snapshot),
                    None => debug!(workspace = %raw_name, "Workspace not in snapshot yet"),
                }
            }
        }
    }

    /// Step 1: returns the names destroyed this tick
    fn apply_removals(&mut self, ops: &[WorkspaceOp], snapshot: &CompositorSnapshot) -> HashSet<String> {
        let mut destroyed = HashSet::new();

        for op in ops {
            let WorkspaceOp::Destroyed { id, name } = op else {
                continue;
            };
            let (base, _) = parse_workspace_name(name);
            let key = id
                .and_then(|id| self.find_by_compositor_id(id))
                .or_else(|| self.find_by_name(&base));

            match key {
                Some(key) => self.remove_workspace(key, snapshot),
                None => debug!(workspace = %name, "Destroy for unknown workspace ignored"),
            }
            destroyed.insert(base);
        }

        destroyed
    }

    /// Step 2: everything that is not a removal, in arrival order
    fn apply_workspace_ops(&mut self, ops: &[WorkspaceOp], snapshot: &CompositorSnapshot) {
        for op in ops {
            match op {
                WorkspaceOp::Destroyed { .. } => {}
                WorkspaceOp::Created { id, name } => {
                    let report = match id {
                        Some(id) => snapshot.workspace_by_id(*id),
                        None => snapshot.workspace_by_raw_name(name),
                    };
                    match report {
                        Some(report) => self.ensure_workspace(report, snapshot),
                        None => debug!(workspace = %name, "Created workspace not in snapshot yet"),
                    }
                }
                WorkspaceOp::Renamed { id, name } => match self.find_by_compositor_id(*id) {
                    Some(key) => self.rename_workspace(key, name, snapshot),
                    None => debug!(id = *id, "Rename for unknown workspace ignored"),
                },
                WorkspaceOp::Moved { name, monitor } => match self.find_by_name(name) {
                    Some(key) => {
                        let keep = match self.workspaces.get_mut(&key) {
                            Some(ws) => {
                                ws.set_output(monitor);
                                self.context
                                    .should_instantiate(ws.name(), monitor, ws.is_special())
                            }
                            None => true,
                        };
                        if !keep {
                            debug!(workspace = %name, monitor = %monitor, "Workspace moved off this output");
                            self.remove_workspace(key, snapshot);
                        }
                    }
                    None => self.create_from_snapshot(name, snapshot),
                },
                WorkspaceOp::Activated { name } => {
                    if self.find_by_name(name).is_none() {
                        self.create_from_snapshot(name, snapshot);
                    }
                }
            }
        }
    }

    fn rename_workspace(&mut self, key: WorkspaceKey, raw_name: &str, snapshot: &CompositorSnapshot) {
        let (name, _) = parse_workspace_name(raw_name);
        let persistent = self.is_config_persistent(&name);

        let keep = match self.workspaces.get_mut(&key) {
            Some(ws) => {
                debug!(from = %ws.name(), to = %raw_name, "Workspace renamed");
                ws.rename(raw_name);
                ws.flags_mut().persistent_config = persistent;
                self.context
                    .should_instantiate(ws.name(), ws.output(), ws.is_special())
            }
            None => return,
        };

        if keep {
            self.claim_orphans(key);
        } else {
            debug!(workspace = %name, "Workspace renamed out of the bar");
            self.remove_workspace(key, snapshot);
        }
    }

    /// Config-persistent workspaces with no entity get a placeholder
    fn ensure_placeholders(&mut self) {
        let output = self.context.bar_output().unwrap_or_default().to_string();

        for raw in self.persistent_names.clone() {
            let (name, special) = parse_workspace_name(&raw);
            if self.find_by_name(&raw).is_some()
                || !self.context.should_instantiate(&name, &output, special)
            {
                continue;
            }
            let key = self.allocate_key();
            debug!(workspace = %raw, key = %key, "Persistent workspace created from config");
            self.workspaces
                .insert(key, Workspace::placeholder(key, &raw, &output));
            self.order.push(key);
        }
    }

    /// Converge with the snapshot: create what is missing, drop what vanished
    fn discover(&mut self, snapshot: &CompositorSnapshot, destroyed: &HashSet<String>) {
        let stale: Vec<WorkspaceKey> = self
            .workspaces
            .values()
            .filter(|ws| match ws.compositor_id() {
                Some(id) => match snapshot.workspace_by_id(id) {
                    Some(report) => {
                        let (name, special) = parse_workspace_name(&report.name);
                        !self
                            .context
                            .should_instantiate(&name, &report.monitor, special)
                    }
                    None => true,
                },
                None => false,
            })
            .map(Workspace::key)
            .collect();

        for key in stale {
            debug!(key = %key, "Workspace no longer reported, removing");
            self.remove_workspace(key, snapshot);
        }

        let mut reports: Vec<&WorkspaceReport> = snapshot.workspaces.iter().collect();
        reports.sort_by_key(|report| report.id);
        for report in reports {
            let (name, _) = parse_workspace_name(&report.name);
            if destroyed.contains(&name) {
                continue;
            }
            self.ensure_workspace(report, snapshot);
        }
    }

    /// Replace the whole model with the snapshot's view
    fn rebuild(&mut self, snapshot: &CompositorSnapshot) {
        self.workspaces.clear();
        self.order.clear();
        self.window_index.clear();
        self.orphans.clear();

        self.discover(snapshot, &HashSet::new());
        self.ensure_placeholders();

        self.loaded = true;
        info!(workspaces = self.workspaces.len(), "Workspace model loaded");
    }

    // -------------------------------------------------------------------------
    // Windows

    /// Step 3
    fn apply_window_ops(&mut self, ops: Vec<WindowOp>, snapshot: &CompositorSnapshot) {
        for op in ops {
            match op {
                WindowOp::Opened {
                    address,
                    workspace,
                    class,
                    title,
                } => {
                    let window = WindowRef::from_class_title(&workspace, &address, class, title);
                    self.window_opened(window);
                }
                WindowOp::Closed { address } => {
                    let address = normalize_address(&address);
                    if self.release(&address).is_none() {
                        debug!(address = %address, "Close for unknown window ignored");
                    }
                }
                WindowOp::Moved { address, workspace } => {
                    self.window_moved(&normalize_address(&address), &workspace, snapshot);
                }
                WindowOp::TitleChanged { address, title } => {
                    self.window_retitled(&normalize_address(&address), title, snapshot);
                }
                WindowOp::Urgent { address } => {
                    self.window_urgent(&normalize_address(&address), snapshot);
                }
                WindowOp::Focused { address } => {
                    self.focused_window = address.as_deref().map(normalize_address);
                    self.apply_focus();
                }
            }
        }
    }

    fn window_opened(&mut self, window: WindowRef) {
        let address = window.address();
        let target = self.find_by_name(window.workspace_name());

        // Replayed open for a window already where it belongs
        match (self.window_index.get(address), target) {
            (Some(Location::Workspace(owner)), Some(key)) if *owner == key => return,
            (Some(Location::Orphan), None) => {
                if self
                    .orphans
                    .get(address)
                    .is_some_and(|o| o.workspace_name() == window.workspace_name())
                {
                    return;
                }
            }
            _ => {}
        }

        match target {
            Some(key) => self.place_window(key, window),
            None => self.orphan_window(window),
        }
    }

    fn window_moved(&mut self, address: &str, workspace: &str, snapshot: &CompositorSnapshot) {
        let window = match self.release(address) {
            Some(mut window) => {
                window.move_to(workspace);
                window
            }
            None => match Self::client_for(snapshot, address) {
                Some(client) => WindowRef::from_class_title(
                    workspace,
                    address,
                    client.class.as_str(),
                    client.title.as_str(),
                ),
                None => {
                    debug!(address = %address, "Move for unknown window ignored");
                    return;
                }
            },
        };

        match self.find_by_name(window.workspace_name()) {
            Some(key) => self.place_window(key, window),
            None => self.orphan_window(window),
        }
    }

    fn window_retitled(&mut self, address: &str, title: Option<String>, snapshot: &CompositorSnapshot) {
        match self.window_index.get(address).copied() {
            Some(Location::Workspace(key)) => {
                let Some(client) = Self::client_for(snapshot, address) else {
                    debug!(address = %address, "Title change for window missing from snapshot");
                    return;
                };
                let title = title.unwrap_or_else(|| client.title.clone());
                let Some(ws) = self.workspaces.get_mut(&key) else {
                    return;
                };
                let repr = WindowRef::from_class_title(ws.name(), address, client.class.as_str(), title)
                    .repr(self.context.rewrite_engine());
                ws.update_window(address, repr);
            }
            Some(Location::Orphan) => {
                let title = title.or_else(|| Self::client_for(snapshot, address).map(|c| c.title.clone()));
                if let (Some(window), Some(title)) = (self.orphans.get_mut(address), title) {
                    window.set_title(title);
                }
            }
            None => debug!(address = %address, "Title change for unknown window ignored"),
        }
    }

    fn window_urgent(&mut self, address: &str, snapshot: &CompositorSnapshot) {
        let key = match self.window_index.get(address) {
            Some(Location::Workspace(key)) => Some(*key),
            _ => Self::client_for(snapshot, address)
                .and_then(|client| self.find_by_compositor_id(client.workspace.id)),
        };

        match key.and_then(|key| self.workspaces.get_mut(&key)) {
            Some(ws) => ws.flags_mut().urgent = true,
            None => debug!(address = %address, "Urgent window on unknown workspace"),
        }
    }

    /// Age orphans that were already waiting at the start of the tick
    fn age_orphans(&mut self, aging: &[String]) {
        let budget = self.context.window_retry_budget();

        for address in aging {
            let Some(window) = self.orphans.get_mut(address) else {
                continue;
            };
            let ticks = window.increment_ticks_uncreated();
            if ticks > budget {
                warn!(
                    address = %address,
                    workspace = window.workspace_name(),
                    ticks = ticks,
                    "Evicting window whose workspace never appeared"
                );
                self.orphans.remove(address);
                self.window_index.remove(address);
            }
        }
    }

    /// Mark the focused window on its owner and clear it everywhere else
    fn apply_focus(&mut self) {
        let focused = self.focused_window.as_deref();
        for ws in self.workspaces.values_mut() {
            ws.focus_window(focused);
        }
        for (address, window) in self.orphans.iter_mut() {
            window.set_active(focused == Some(address.as_str()));
        }
    }

    // -------------------------------------------------------------------------
    // Derived state

    /// Step 4: flags always come from the latest snapshot
    fn refresh_flags(&mut self, snapshot: &CompositorSnapshot) {
        let focused = snapshot.focused_monitor();
        if let Some(client) = snapshot.clients.iter().find(|c| c.is_focused()) {
            self.focused_window = Some(normalize_address(&client.address));
        }

        for ws in self.workspaces.values_mut() {
            let report = ws.compositor_id().and_then(|id| snapshot.workspace_by_id(id));
            if let Some(report) = report {
                ws.apply_report(report);
            }

            let id = ws.compositor_id();
            let shows = |r: &WorkspaceRef| id.is_some_and(|id| id != 0 && r.id == id);
            let active = focused.is_some_and(|m| shows(&m.active_workspace) || shows(&m.special_workspace));
            let visible = snapshot
                .monitors
                .iter()
                .any(|m| shows(&m.active_workspace) || shows(&m.special_workspace));

            let persistent_rule = report.is_some_and(|r| r.is_persistent)
                || snapshot.rules.iter().any(|rule| {
                    rule.persistent
                        && parse_workspace_name(&rule.workspace_string).0 == ws.name()
                        && rule.monitor.as_deref().map_or(true, |m| m == ws.output())
                });

            let persistent_config = declares(&self.persistent_names, ws.name());

            let flags = ws.flags_mut();
            flags.persistent_config = persistent_config;
            flags.active = active;
            flags.visible = visible;
            flags.persistent_rule = persistent_rule;
            if active {
                flags.urgent = false;
            }
        }

        self.apply_focus();
    }

    /// Step 5
    fn sort(&mut self, snapshot: &CompositorSnapshot) {
        let mut list: Vec<&Workspace> = self.workspaces.values().collect();
        sort_workspaces(&mut list, self.context.sort_method(), &snapshot.monitors);
        self.order = list.iter().map(|ws| ws.key()).collect();
    }
}

/// Whether any raw configured name has display name `name`
fn declares(persistent_names: &[String], name: &str) -> bool {
    persistent_names
        .iter()
        .any(|raw| parse_workspace_name(raw).0 == name)
}
