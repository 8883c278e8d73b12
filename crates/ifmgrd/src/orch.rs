//! InterfaceOrch - the per-interface reconciliation engine.
//!
//! Every handler is a pure function of currently-observable state: it reads
//! the configuration, the advisory port map and the persisted operational
//! entries fresh, computes the target state and applies it idempotently.
//! There is no global lock and no retry bookkeeping — any later event
//! re-runs the same derivation, which is what heals partial failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use ifm_cache::{
    BridgeIndex, DpnInterfaceIndex, LivenessCache, LportIndex, MonitorIndex, ParentChildIndex,
};
use ifm_common::{EventOp, EventQueue, IfmResult, KeyedEvent, Orch, TaskStatusExt};
use ifm_datastore::{tables, DataStore, DataStoreExt, Partition, Transaction};
use ifm_monitor::{AlivenessClient, MonitorMgr};
use ifm_types::{
    AdminStatus, BridgeEntry, BridgeRef, BridgeRefEntry, DpnId, InterfaceConfig, InterfaceKind,
    InterfaceState, LportTag, OperStatus, PortId, TunnelKind,
};

use crate::flow::{ingress_flow_for, FlowProgrammer, FlowRef, INGRESS_TABLE};
use crate::idpool::{IdAllocator, IF_INDEX_POOL};
use crate::southbound::{derive_oper_status, FlowCapablePort};

/// Engine counters.
#[derive(Debug, Default)]
pub struct InterfaceOrchStats {
    /// Config set events applied.
    pub configs_applied: AtomicU64,
    /// Config delete events applied.
    pub configs_removed: AtomicU64,
    /// Southbound port events processed.
    pub ports_seen: AtomicU64,
    /// Ingress flows installed (upserts included).
    pub flows_installed: AtomicU64,
    /// Ingress flows withdrawn.
    pub flows_withdrawn: AtomicU64,
    /// Parent-to-child status cascades run.
    pub cascades: AtomicU64,
    /// Transitions that failed and were left for re-derivation.
    pub tx_failures: AtomicU64,
}

impl InterfaceOrchStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The interface reconciliation engine.
pub struct InterfaceOrch {
    store: Arc<dyn DataStore>,
    ids: Arc<dyn IdAllocator>,
    flows: Arc<dyn FlowProgrammer>,
    monitor: MonitorMgr,

    lports: LportIndex,
    bridges: BridgeIndex,
    children: ParentChildIndex,
    dpn_interfaces: DpnInterfaceIndex,
    liveness: LivenessCache,

    /// Advisory map of ports the southbound has reported, by port name.
    known_ports: DashMap<String, FlowCapablePort>,

    config_events: Mutex<EventQueue<InterfaceConfig>>,
    port_events: Mutex<EventQueue<FlowCapablePort>>,

    stats: InterfaceOrchStats,
}

impl InterfaceOrch {
    /// Creates an engine over the store and its external collaborators.
    pub fn new(
        store: Arc<dyn DataStore>,
        ids: Arc<dyn IdAllocator>,
        flows: Arc<dyn FlowProgrammer>,
        monitor_client: Arc<dyn AlivenessClient>,
    ) -> Self {
        let monitor_index = Arc::new(MonitorIndex::new(store.clone()));
        Self {
            monitor: MonitorMgr::new(monitor_client, monitor_index),
            lports: LportIndex::new(store.clone()),
            bridges: BridgeIndex::new(store.clone()),
            children: ParentChildIndex::new(store.clone()),
            dpn_interfaces: DpnInterfaceIndex::new(store.clone()),
            liveness: LivenessCache::new(),
            known_ports: DashMap::new(),
            config_events: Mutex::new(EventQueue::new()),
            port_events: Mutex::new(EventQueue::new()),
            stats: InterfaceOrchStats::default(),
            store,
            ids,
            flows,
        }
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> &InterfaceOrchStats {
        &self.stats
    }

    /// Returns the monitor adapter.
    pub fn monitor(&self) -> &MonitorMgr {
        &self.monitor
    }

    /// Returns the lport-tag index.
    pub fn lports(&self) -> &LportIndex {
        &self.lports
    }

    /// Returns the bridge index.
    pub fn bridges(&self) -> &BridgeIndex {
        &self.bridges
    }

    /// Returns the parent/child index.
    pub fn children(&self) -> &ParentChildIndex {
        &self.children
    }

    /// Returns the dpn-to-interface index.
    pub fn dpn_interfaces(&self) -> &DpnInterfaceIndex {
        &self.dpn_interfaces
    }

    /// Enqueues a configuration set event.
    pub fn enqueue_config_set(&self, config: InterfaceConfig) {
        let key = config.name.clone();
        self.config_events
            .lock()
            .expect("config queue lock poisoned")
            .push(KeyedEvent::set(key, config));
    }

    /// Enqueues a configuration delete event.
    pub fn enqueue_config_del(&self, name: &str) {
        self.config_events
            .lock()
            .expect("config queue lock poisoned")
            .push(KeyedEvent::del(name));
    }

    /// Enqueues a southbound port appearance/update.
    pub fn enqueue_port(&self, port: FlowCapablePort) {
        let key = port.name.clone();
        self.port_events
            .lock()
            .expect("port queue lock poisoned")
            .push(KeyedEvent::set(key, port));
    }

    /// Enqueues a southbound port removal.
    pub fn enqueue_port_removed(&self, name: &str) {
        self.port_events
            .lock()
            .expect("port queue lock poisoned")
            .push(KeyedEvent::del(name));
    }

    // ------------------------------------------------------------------
    // Config events
    // ------------------------------------------------------------------

    /// Applies a configuration set: mirrors it into CONFIG and dispatches to
    /// the add or update path.
    #[instrument(skip(self, config), fields(name = %config.name))]
    pub async fn on_config_set(&self, config: InterfaceConfig) -> IfmResult<()> {
        let old: Option<InterfaceConfig> = self
            .store
            .read_json(Partition::Config, tables::INTERFACES, &config.name)
            .await?;

        let mut tx = Transaction::new();
        tx.put_json(Partition::Config, tables::INTERFACES, &config.name, &config)?;
        self.store.submit(tx).await?;

        match old {
            None => self.apply_config_add(&config).await?,
            Some(old) => self.apply_config_update(&old, &config).await?,
        }
        InterfaceOrchStats::bump(&self.stats.configs_applied);
        Ok(())
    }

    async fn apply_config_add(&self, config: &InterfaceConfig) -> IfmResult<()> {
        info!(
            "Interface {} configured ({})",
            config.name,
            config.kind.name()
        );

        // The lport tag is reserved up front, never gated on southbound
        // timing
        self.ensure_lport_tag(&config.name).await?;

        if let (Some(parent), Some(mode)) = (config.parent.as_deref(), config.child_mode()) {
            self.children
                .create_child_entry_if_not_present(parent, &config.name, mode)
                .await?;
        }

        if let Some(tunnel) = config.tunnel_config() {
            self.bridges
                .add_bridge_interface(tunnel.dpn, &config.name)
                .await?;
            if self.monitor.monitoring_eligible(tunnel)
                && self
                    .monitor
                    .index()
                    .monitor_ids(&config.name)
                    .await?
                    .is_empty()
            {
                self.monitor.start_monitoring(tunnel, &config.name).await?;
            }
        }

        // Covers the switch-connected-before-config arrival order
        self.reconcile_interface(&config.name).await?;
        Ok(())
    }

    async fn apply_config_update(
        &self,
        old: &InterfaceConfig,
        new: &InterfaceConfig,
    ) -> IfmResult<()> {
        debug!("Interface {} updated", new.name);

        if let (Some(old_tunnel), Some(new_tunnel)) = (old.tunnel_config(), new.tunnel_config()) {
            let monitoring_changed = old_tunnel.monitor_enabled != new_tunnel.monitor_enabled
                || old_tunnel.monitor_interval_ms != new_tunnel.monitor_interval_ms
                || old_tunnel.monitor_protocol != new_tunnel.monitor_protocol;
            if monitoring_changed {
                self.monitor
                    .handle_tunnel_update(&new.name, old_tunnel, new_tunnel)
                    .await?;
            }
        }

        if old.parent != new.parent {
            if let Some(old_parent) = &old.parent {
                self.children.remove_child(old_parent, &new.name).await?;
            }
            if let (Some(parent), Some(mode)) = (new.parent.as_deref(), new.child_mode()) {
                self.children
                    .create_child_entry_if_not_present(parent, &new.name, mode)
                    .await?;
            }
        }

        self.reconcile_interface(&new.name).await?;
        Ok(())
    }

    /// Applies a configuration delete: releases the tag and removes every
    /// mapping, flow and binding recorded for the interface.
    ///
    /// Safe to run with the switch already disconnected — all removals are
    /// delete-if-present.
    #[instrument(skip(self))]
    pub async fn on_config_del(&self, name: &str) -> IfmResult<()> {
        let config: Option<InterfaceConfig> = self
            .store
            .read_json(Partition::Config, tables::INTERFACES, name)
            .await?;

        let mut tx = Transaction::new();
        tx.delete(Partition::Config, tables::INTERFACES, name);
        self.store.submit(tx).await?;

        let Some(config) = config else {
            debug!("No configuration recorded for {}", name);
            return Ok(());
        };

        if let Some(tunnel) = config.tunnel_config() {
            if let Err(e) = self.monitor.stop_monitoring(tunnel, name).await {
                warn!("Monitor stop during delete of {} failed: {}", name, e);
            }
            if let Err(e) = self
                .bridges
                .remove_bridge_interface(tunnel.dpn, name)
                .await
            {
                warn!("Bridge-interface cleanup for {} failed: {}", name, e);
            }
        }

        if let Some(parent) = &config.parent {
            if let Err(e) = self.children.remove_child(parent, name).await {
                warn!("Child-entry cleanup for {} failed: {}", name, e);
            }
        }

        let prev: Option<InterfaceState> = self
            .store
            .read_json(Partition::Operational, tables::INTERFACES_STATE, name)
            .await?;
        if let Some(prev) = &prev {
            self.withdraw_ingress(name, prev, Some(&config.kind)).await;
            if let Some(port) = prev.lower_layer_if {
                if let Err(e) = self.dpn_interfaces.remove(port.dpn, name).await {
                    warn!("Dpn-index cleanup for {} failed: {}", name, e);
                }
            }
        }

        let mut tx = Transaction::new();
        tx.delete(Partition::Operational, tables::INTERFACES_STATE, name);
        self.store.submit(tx).await?;

        self.lports.remove(name).await?;
        self.ids.release_id(IF_INDEX_POOL, name).await?;
        self.liveness.remove(name);

        InterfaceOrchStats::bump(&self.stats.configs_removed);
        info!("Interface {} removed", name);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Southbound events
    // ------------------------------------------------------------------

    /// Applies a port appearance or update reported by the switch.
    #[instrument(skip(self, port), fields(name = %port.name))]
    pub async fn on_port_event(&self, port: FlowCapablePort) -> IfmResult<()> {
        InterfaceOrchStats::bump(&self.stats.ports_seen);
        debug!(
            "Port {} reported as {} (live={}, blocked={})",
            port.name, port.port, port.live, port.blocked
        );
        let name = port.name.clone();
        self.known_ports.insert(name.clone(), port);

        self.reconcile_interface(&name).await?;

        // Interfaces riding on this port re-derive from the fresh flags
        for child in self.children.children(&name).await? {
            self.reconcile_interface(&child.name).await?;
        }
        Ok(())
    }

    /// Applies a port disappearance.
    ///
    /// Southbound-sourced state dies with its port; tunnel state only goes
    /// Down (the engine owns the tunnel's termination point); config-sourced
    /// interfaces fall back to the tag-reserved shape.
    #[instrument(skip(self))]
    pub async fn on_port_removed(&self, name: &str) -> IfmResult<()> {
        self.known_ports.remove(name);

        let config: Option<InterfaceConfig> = self
            .store
            .read_json(Partition::Config, tables::INTERFACES, name)
            .await?;
        let prev: Option<InterfaceState> = self
            .store
            .read_json(Partition::Operational, tables::INTERFACES_STATE, name)
            .await?;

        match config {
            Some(config) if config.is_tunnel() => {
                if let Some(prev) = &prev {
                    if prev.oper_status != OperStatus::Down {
                        self.write_oper_status(name, OperStatus::Down).await?;
                        self.withdraw_ingress(name, prev, Some(&config.kind)).await;
                        self.cascade_to_children(name, OperStatus::Down).await?;
                    }
                }
            }
            Some(_) => {
                self.reconcile_interface(name).await?;
            }
            None => {
                if let Some(prev) = &prev {
                    self.withdraw_ingress(name, prev, None).await;
                    if let Some(port) = prev.lower_layer_if {
                        self.dpn_interfaces.remove(port.dpn, name).await?;
                    }
                    let mut tx = Transaction::new();
                    tx.delete(Partition::Operational, tables::INTERFACES_STATE, name);
                    self.store.submit(tx).await?;
                    self.lports.remove(name).await?;
                    self.ids.release_id(IF_INDEX_POOL, name).await?;
                }
            }
        }

        for child in self.children.children(name).await? {
            self.reconcile_interface(&child.name).await?;
        }
        info!("Port {} removed", name);
        Ok(())
    }

    /// Applies a bridge connection: records the live pointer, persists the
    /// durable entry and replays the tunnel interfaces expected on it.
    #[instrument(skip(self, bridge))]
    pub async fn on_bridge_connected(&self, dpn: DpnId, bridge: BridgeRef) -> IfmResult<()> {
        self.bridges
            .add_bridge_ref(BridgeRefEntry::new(dpn, bridge.clone()))
            .await?;
        self.bridges
            .add_bridge_entry(BridgeEntry::new(dpn, bridge))
            .await?;
        info!("Bridge connected on dpn {}", dpn);

        for name in self.bridges.bridge_interfaces(dpn).await? {
            debug!("Replaying tunnel {} on dpn {}", name, dpn);
            self.reconcile_interface(&name).await?;
        }
        Ok(())
    }

    /// Applies a bridge disconnect: drops the live pointer only, keeping the
    /// durable entry for replay on reconnect.
    #[instrument(skip(self))]
    pub async fn on_bridge_disconnected(&self, dpn: DpnId) -> IfmResult<()> {
        self.bridges.remove_bridge_ref(dpn).await?;
        info!("Bridge disconnected on dpn {}", dpn);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Liveness callbacks
    // ------------------------------------------------------------------

    /// Routes a liveness callback back to its interface and re-derives.
    ///
    /// The transient liveness cache filters redundant updates before any
    /// datastore write happens.
    #[instrument(skip(self))]
    pub async fn on_liveness_update(&self, monitor_id: u32, status: OperStatus) -> IfmResult<()> {
        let Some(name) = self.monitor.index().interface_for(monitor_id).await? else {
            debug!("No interface recorded for monitor id {}", monitor_id);
            return Ok(());
        };

        if !self.liveness.update(&name, status) {
            debug!("Liveness status for {} unchanged ({})", name, status);
            return Ok(());
        }

        info!("Liveness reports {} for {}", status, name);
        self.reconcile_interface(&name).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconciliation core
    // ------------------------------------------------------------------

    /// Recomputes one interface's operational state from the currently
    /// visible configuration, port map and liveness cache, and applies the
    /// deltas. Idempotent; safe to run from any event path.
    pub async fn reconcile_interface(&self, name: &str) -> IfmResult<Option<OperStatus>> {
        let config: Option<InterfaceConfig> = self
            .store
            .read_json(Partition::Config, tables::INTERFACES, name)
            .await?;
        let prev: Option<InterfaceState> = self
            .store
            .read_json(Partition::Operational, tables::INTERFACES_STATE, name)
            .await?;

        match config {
            Some(config) => self.reconcile_configured(&config, prev).await,
            None => self.reconcile_unconfigured(name, prev).await,
        }
    }

    async fn reconcile_configured(
        &self,
        config: &InterfaceConfig,
        prev: Option<InterfaceState>,
    ) -> IfmResult<Option<OperStatus>> {
        let tag = self.ensure_lport_tag(&config.name).await?;
        let admin = AdminStatus::from_enabled(config.enabled);
        let port_name = config
            .parent
            .clone()
            .unwrap_or_else(|| config.name.clone());
        let port = self.known_ports.get(&port_name).map(|p| p.value().clone());
        let prev_status = prev.as_ref().map(|s| s.oper_status);

        let status = match port {
            Some(port) => {
                let mut status = derive_oper_status(config.enabled, &port);
                if config.is_tunnel() && self.liveness.get(&config.name) == Some(OperStatus::Down)
                {
                    status = OperStatus::Down;
                }

                let mut state = InterfaceState::reserved(&config.name, tag, admin)
                    .with_port(port.port)
                    .with_oper_status(status);
                if let Some(mac) = &port.mac {
                    state = state.with_phys_address(mac.clone());
                }
                if let Some(prev) = &prev {
                    state.discontinuity_time = prev.discontinuity_time;
                }

                self.write_state(&config.name, &state, prev.as_ref()).await?;

                self.dpn_interfaces
                    .add(port.port.dpn, &config.name, config.kind.name())
                    .await?;

                if status == OperStatus::Up {
                    self.install_ingress(config, port.port, tag).await;
                } else if prev_status == Some(OperStatus::Up) {
                    if let Some(prev) = &prev {
                        self.withdraw_ingress(&config.name, prev, Some(&config.kind))
                            .await;
                    }
                }

                info!(
                    "Interface {} reconciled: {} on {}",
                    config.name, status, port.port
                );
                status
            }
            None => {
                // No switch binding: keep the tag-reserved shape
                let mut state = InterfaceState::reserved(&config.name, tag, admin);
                if let Some(prev) = &prev {
                    state.discontinuity_time = prev.discontinuity_time;
                }

                self.write_state(&config.name, &state, prev.as_ref()).await?;

                if let Some(prev) = &prev {
                    if let Some(old_port) = prev.lower_layer_if {
                        self.withdraw_ingress(&config.name, prev, Some(&config.kind))
                            .await;
                        self.dpn_interfaces
                            .remove(old_port.dpn, &config.name)
                            .await?;
                    }
                }
                debug!("Interface {} has no switch binding yet", config.name);
                OperStatus::Down
            }
        };

        if prev_status != Some(status) {
            Box::pin(self.cascade_to_children(&config.name, status)).await?;
        }
        Ok(Some(status))
    }

    async fn reconcile_unconfigured(
        &self,
        name: &str,
        prev: Option<InterfaceState>,
    ) -> IfmResult<Option<OperStatus>> {
        let Some(port) = self.known_ports.get(name).map(|p| p.value().clone()) else {
            return Ok(prev.map(|s| s.oper_status));
        };

        // Switch event raced ahead of configuration: write defaults, no
        // flows; the config-add path re-runs the full derivation later
        let tag = self.ensure_lport_tag(name).await?;
        let status = derive_oper_status(true, &port);
        let mut state = InterfaceState::reserved(name, tag, AdminStatus::Enabled)
            .with_port(port.port)
            .with_oper_status(status);
        if let Some(mac) = &port.mac {
            state = state.with_phys_address(mac.clone());
        }
        if let Some(prev) = &prev {
            state.discontinuity_time = prev.discontinuity_time;
        }

        self.write_state(name, &state, prev.as_ref()).await?;

        self.dpn_interfaces
            .add(port.port.dpn, name, "other")
            .await?;

        debug!("Default state written for unconfigured port {}", name);
        Ok(Some(status))
    }

    /// Cascades a status flip to every child recorded under `parent`.
    ///
    /// Down is forced onto children with a merge write (a child inherits
    /// Down from its parent regardless of its own port flags); Up re-runs
    /// each child's own derivation instead, since a child may stay Down on
    /// its own account.
    async fn cascade_to_children(&self, parent: &str, status: OperStatus) -> IfmResult<()> {
        let children = self.children.children(parent).await?;
        if children.is_empty() {
            return Ok(());
        }
        InterfaceOrchStats::bump(&self.stats.cascades);

        for child in children {
            match status {
                OperStatus::Down | OperStatus::Unknown => {
                    let state: Option<InterfaceState> = self
                        .store
                        .read_json(Partition::Operational, tables::INTERFACES_STATE, &child.name)
                        .await?;
                    let Some(state) = state else { continue };
                    if state.oper_status == OperStatus::Down {
                        continue;
                    }

                    self.write_oper_status(&child.name, OperStatus::Down).await?;
                    self.withdraw_ingress(&child.name, &state, None).await;
                    debug!("Child {} inherited Down from {}", child.name, parent);
                    Box::pin(self.cascade_to_children(&child.name, OperStatus::Down)).await?;
                }
                OperStatus::Up => {
                    Box::pin(self.reconcile_interface(&child.name)).await?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn ensure_lport_tag(&self, name: &str) -> IfmResult<LportTag> {
        let id = self.ids.allocate_id(IF_INDEX_POOL, name).await?;
        let tag = LportTag::new(id);
        self.lports.add(name, tag).await?;
        Ok(tag)
    }

    /// Writes the recomputed state: put on creation, merge on update (so an
    /// update never clobbers fields this derivation does not own), and no
    /// write at all when nothing changed.
    async fn write_state(
        &self,
        name: &str,
        state: &InterfaceState,
        prev: Option<&InterfaceState>,
    ) -> IfmResult<()> {
        if prev == Some(state) {
            return Ok(());
        }

        let mut tx = Transaction::new();
        if prev.is_some() {
            tx.merge_json(Partition::Operational, tables::INTERFACES_STATE, name, state)?;
        } else {
            tx.put_json(Partition::Operational, tables::INTERFACES_STATE, name, state)?;
        }
        self.store.submit(tx).await
    }

    /// Merge-writes only the oper status, leaving unrelated fields alone.
    async fn write_oper_status(&self, name: &str, status: OperStatus) -> IfmResult<()> {
        let mut tx = Transaction::new();
        tx.merge(
            Partition::Operational,
            tables::INTERFACES_STATE,
            name,
            json!({ "oper_status": status }),
        );
        self.store.submit(tx).await
    }

    async fn install_ingress(&self, config: &InterfaceConfig, port: PortId, tag: LportTag) {
        let Some(flow) = ingress_flow_for(&config.kind, &config.name, port, tag) else {
            debug!("No ingress flow applies to {}", config.name);
            return;
        };

        match self.flows.add_flow(&flow).await {
            Ok(()) => InterfaceOrchStats::bump(&self.stats.flows_installed),
            Err(e) => {
                warn!("Ingress flow install for {} failed: {}", config.name, e);
                InterfaceOrchStats::bump(&self.stats.tx_failures);
            }
        }
        if let Err(e) = self.flows.bind_default_egress(&config.name, tag).await {
            warn!("Egress binding for {} failed: {}", config.name, e);
        }
    }

    /// Withdraws the deterministic ingress flow and the egress binding.
    /// Best-effort: failures are logged, the next event re-derives.
    async fn withdraw_ingress(
        &self,
        name: &str,
        state: &InterfaceState,
        kind: Option<&InterfaceKind>,
    ) {
        let Some(port) = state.lower_layer_if else {
            return;
        };
        if let Some(InterfaceKind::Tunnel(tunnel)) = kind {
            if tunnel.kind == TunnelKind::LogicalGroup {
                return;
            }
        }

        let flow_ref = FlowRef::new(port.dpn, INGRESS_TABLE, name);
        match self
            .flows
            .remove_flow(port.dpn, &flow_ref, INGRESS_TABLE)
            .await
        {
            Ok(()) => InterfaceOrchStats::bump(&self.stats.flows_withdrawn),
            Err(e) => {
                warn!("Ingress flow withdrawal for {} failed: {}", name, e);
                InterfaceOrchStats::bump(&self.stats.tx_failures);
            }
        }
        if let Err(e) = self.flows.unbind_default_egress(name).await {
            warn!("Egress unbinding for {} failed: {}", name, e);
        }
    }
}

#[async_trait]
impl Orch for InterfaceOrch {
    fn name(&self) -> &str {
        "interface-orch"
    }

    async fn do_task(&mut self) {
        let config_events = self
            .config_events
            .lock()
            .expect("config queue lock poisoned")
            .drain();
        for event in config_events {
            let result = match event.op {
                EventOp::Set(config) => self.on_config_set(config).await,
                EventOp::Del => self.on_config_del(&event.key).await,
            };
            if let Err(e) = &result {
                warn!("Config event for {} failed: {}", event.key, e);
            }
            if result.to_status().is_deferred() {
                InterfaceOrchStats::bump(&self.stats.tx_failures);
            }
        }

        let port_events = self
            .port_events
            .lock()
            .expect("port queue lock poisoned")
            .drain();
        for event in port_events {
            let result = match event.op {
                EventOp::Set(port) => self.on_port_event(port).await,
                EventOp::Del => self.on_port_removed(&event.key).await,
            };
            if let Err(e) = &result {
                warn!("Port event for {} failed: {}", event.key, e);
            }
            if result.to_status().is_deferred() {
                InterfaceOrchStats::bump(&self.stats.tx_failures);
            }
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.config_events
            .lock()
            .expect("config queue lock poisoned")
            .has_pending()
            || self
                .port_events
                .lock()
                .expect("port queue lock poisoned")
                .has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut pending = self
            .config_events
            .lock()
            .expect("config queue lock poisoned")
            .dump();
        pending.extend(
            self.port_events
                .lock()
                .expect("port queue lock poisoned")
                .dump(),
        );
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::net::{IpAddr, Ipv4Addr};

    use ifm_datastore::MemDataStore;
    use ifm_monitor::{MonitorProfileParams, MonitorStartRequest, RpcResult};
    use ifm_types::{MonitorProtocol, PortId, TunnelConfig};

    use crate::flow::FlowEntity;
    use crate::idpool::MemIdAllocator;
    use crate::lifecycle::InterfaceLifecycle;

    #[derive(Default)]
    struct RecordingFlows {
        flows: Mutex<HashMap<String, FlowEntity>>,
        bound: Mutex<HashSet<String>>,
    }

    impl RecordingFlows {
        fn flow_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> = self.flows.lock().unwrap().keys().cloned().collect();
            ids.sort();
            ids
        }

        fn has_flow(&self, flow_ref: &str) -> bool {
            self.flows.lock().unwrap().contains_key(flow_ref)
        }

        fn is_bound(&self, interface: &str) -> bool {
            self.bound.lock().unwrap().contains(interface)
        }
    }

    #[async_trait]
    impl FlowProgrammer for RecordingFlows {
        async fn add_flow(&self, flow: &FlowEntity) -> IfmResult<()> {
            self.flows
                .lock()
                .unwrap()
                .insert(flow.flow_ref.to_string(), flow.clone());
            Ok(())
        }

        async fn remove_flow(
            &self,
            _dpn: DpnId,
            flow_ref: &FlowRef,
            _table_id: u8,
        ) -> IfmResult<()> {
            self.flows.lock().unwrap().remove(&flow_ref.to_string());
            Ok(())
        }

        async fn bind_default_egress(&self, interface: &str, _tag: LportTag) -> IfmResult<()> {
            self.bound.lock().unwrap().insert(interface.to_string());
            Ok(())
        }

        async fn unbind_default_egress(&self, interface: &str) -> IfmResult<()> {
            self.bound.lock().unwrap().remove(interface);
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubAliveness {
        next_monitor_id: Mutex<u32>,
        stopped: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl AlivenessClient for StubAliveness {
        async fn profile_create(&self, _params: &MonitorProfileParams) -> RpcResult<u32> {
            RpcResult::ok(77)
        }

        async fn profile_get(&self, _params: &MonitorProfileParams) -> RpcResult<u32> {
            RpcResult::ok(77)
        }

        async fn profile_delete(&self, _profile_id: u32) -> RpcResult<()> {
            RpcResult::ok(())
        }

        async fn monitor_start(&self, _request: &MonitorStartRequest) -> RpcResult<u32> {
            let mut next = self.next_monitor_id.lock().unwrap();
            *next += 1;
            RpcResult::ok(1000 + *next)
        }

        async fn monitor_stop(&self, monitor_id: u32) -> RpcResult<()> {
            self.stopped.lock().unwrap().push(monitor_id);
            RpcResult::ok(())
        }
    }

    struct Harness {
        store: Arc<MemDataStore>,
        flows: Arc<RecordingFlows>,
        orch: InterfaceOrch,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemDataStore::new());
        let flows = Arc::new(RecordingFlows::default());
        let orch = InterfaceOrch::new(
            store.clone(),
            Arc::new(MemIdAllocator::new()),
            flows.clone(),
            Arc::new(StubAliveness::default()),
        );
        Harness { store, flows, orch }
    }

    async fn state_of(store: &MemDataStore, name: &str) -> Option<InterfaceState> {
        store
            .read_json(Partition::Operational, tables::INTERFACES_STATE, name)
            .await
            .unwrap()
    }

    fn eth0_port() -> FlowCapablePort {
        FlowCapablePort::up("eth0", PortId::new(DpnId::new(1), 2)).with_mac("0a:0b:0c:0d:0e:0f")
    }

    fn internal_tunnel() -> TunnelConfig {
        TunnelConfig::new(
            TunnelKind::Vxlan,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            DpnId::new(1),
        )
        .internal()
        .with_monitoring(MonitorProtocol::Lldp)
    }

    #[tokio::test]
    async fn test_config_add_reserves_tag_before_any_port() {
        let h = harness();

        h.orch
            .on_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100))
            .await
            .unwrap();

        let state = state_of(&h.store, "vlan1").await.unwrap();
        assert_eq!(
            InterfaceLifecycle::of(Some(&state)),
            InterfaceLifecycle::LportReserved
        );
        assert_eq!(state.oper_status, OperStatus::Down);
        assert!(h.orch.lports().tag_for("vlan1").await.unwrap().is_some());
        assert!(h.flows.flow_ids().is_empty());
    }

    #[tokio::test]
    async fn test_port_without_config_writes_default_state() {
        let h = harness();

        h.orch.on_port_event(eth0_port()).await.unwrap();

        let state = state_of(&h.store, "eth0").await.unwrap();
        assert_eq!(state.oper_status, OperStatus::Up);
        assert!(state.is_bound());
        // Defaults only: no flows for an unconfigured port
        assert!(h.flows.flow_ids().is_empty());
        let on_dpn = h
            .orch
            .dpn_interfaces()
            .interfaces_on(DpnId::new(1))
            .await
            .unwrap();
        assert!(on_dpn.iter().any(|e| e.name == "eth0" && e.kind == "other"));
    }

    #[tokio::test]
    async fn test_admin_disabled_stays_down_on_live_port() {
        let h = harness();

        h.orch
            .on_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100).with_enabled(false))
            .await
            .unwrap();
        h.orch.on_port_event(eth0_port()).await.unwrap();

        let state = state_of(&h.store, "vlan1").await.unwrap();
        assert_eq!(state.oper_status, OperStatus::Down);
        assert_eq!(state.admin_status, AdminStatus::Disabled);
        assert!(!h.flows.has_flow("10vlan1"));

        // Enabling the interface brings it up without any new port event
        h.orch
            .on_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100))
            .await
            .unwrap();
        let state = state_of(&h.store, "vlan1").await.unwrap();
        assert_eq!(state.oper_status, OperStatus::Up);
        assert!(h.flows.has_flow("10vlan1"));
    }

    #[tokio::test]
    async fn test_port_down_reverts_configured_interface_to_reserved() {
        let h = harness();

        h.orch
            .on_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100))
            .await
            .unwrap();
        h.orch.on_port_event(eth0_port()).await.unwrap();
        assert!(h.flows.has_flow("10vlan1"));

        h.orch.on_port_removed("eth0").await.unwrap();

        let state = state_of(&h.store, "vlan1").await.unwrap();
        assert_eq!(
            InterfaceLifecycle::of(Some(&state)),
            InterfaceLifecycle::LportReserved
        );
        assert!(!h.flows.has_flow("10vlan1"));
        assert!(!h.flows.is_bound("vlan1"));
        // The discovered default state for eth0 itself is gone with the port
        assert!(state_of(&h.store, "eth0").await.is_none());
    }

    #[tokio::test]
    async fn test_tunnel_monitoring_starts_on_config_add() {
        let h = harness();

        h.orch
            .on_config_set(InterfaceConfig::tunnel("tun0", internal_tunnel()))
            .await
            .unwrap();

        let ids = h.orch.monitor().index().monitor_ids("tun0").await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(h
            .orch
            .bridges()
            .bridge_interfaces(DpnId::new(1))
            .await
            .unwrap()
            .contains(&"tun0".to_string()));

        // Re-applying the same config does not start a second session
        h.orch
            .on_config_set(InterfaceConfig::tunnel("tun0", internal_tunnel()))
            .await
            .unwrap();
        assert_eq!(
            h.orch.monitor().index().monitor_ids("tun0").await.unwrap(),
            ids
        );
    }

    #[tokio::test]
    async fn test_liveness_down_overrides_live_port() {
        let h = harness();

        h.orch
            .on_config_set(InterfaceConfig::tunnel("tun0", internal_tunnel()))
            .await
            .unwrap();
        h.orch
            .on_port_event(FlowCapablePort::up("tun0", PortId::new(DpnId::new(1), 5)))
            .await
            .unwrap();
        assert_eq!(
            state_of(&h.store, "tun0").await.unwrap().oper_status,
            OperStatus::Up
        );
        assert!(h.flows.has_flow("10tun0"));

        let monitor_id = h.orch.monitor().index().monitor_ids("tun0").await.unwrap()[0];
        h.orch
            .on_liveness_update(monitor_id, OperStatus::Down)
            .await
            .unwrap();

        assert_eq!(
            state_of(&h.store, "tun0").await.unwrap().oper_status,
            OperStatus::Down
        );
        assert!(!h.flows.has_flow("10tun0"));

        // A duplicate callback is filtered by the liveness cache
        h.orch
            .on_liveness_update(monitor_id, OperStatus::Down)
            .await
            .unwrap();

        // Recovery reinstalls the flow
        h.orch
            .on_liveness_update(monitor_id, OperStatus::Up)
            .await
            .unwrap();
        assert_eq!(
            state_of(&h.store, "tun0").await.unwrap().oper_status,
            OperStatus::Up
        );
        assert!(h.flows.has_flow("10tun0"));
    }

    #[tokio::test]
    async fn test_bridge_entry_retained_and_replayed() {
        let h = harness();
        let dpn = DpnId::new(1);
        let bridge = BridgeRef::new("ovsdb://node-1/br-int");

        h.orch
            .on_config_set(InterfaceConfig::tunnel("tun0", internal_tunnel()))
            .await
            .unwrap();
        h.orch
            .on_bridge_connected(dpn, bridge.clone())
            .await
            .unwrap();
        h.orch.on_bridge_disconnected(dpn).await.unwrap();

        // Live ref gone, durable entry kept
        assert!(h.orch.bridges().bridge_ref(dpn).await.unwrap().is_none());
        assert_eq!(
            h.orch
                .bridges()
                .bridge_entry(dpn)
                .await
                .unwrap()
                .unwrap()
                .bridge,
            bridge
        );

        // Reconnect replays the expected tunnel without re-deriving it
        h.orch.on_bridge_connected(dpn, bridge).await.unwrap();
        assert!(state_of(&h.store, "tun0").await.is_some());
    }

    #[tokio::test]
    async fn test_do_task_drains_coalesced_queues() {
        let mut h = harness();

        h.orch
            .enqueue_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100));
        h.orch.enqueue_port(eth0_port());
        assert!(h.orch.has_pending_tasks());

        h.orch.do_task().await;

        assert!(!h.orch.has_pending_tasks());
        assert!(h.flows.has_flow("10vlan1"));

        // A del that follows a pending set collapses to the delete
        h.orch
            .enqueue_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 101));
        h.orch.enqueue_config_del("vlan1");
        h.orch.do_task().await;

        assert!(state_of(&h.store, "vlan1").await.is_none());
        assert!(!h.flows.has_flow("10vlan1"));
    }

    #[tokio::test]
    async fn test_failed_transition_is_left_for_rederivation() {
        let h = harness();

        h.store.fail_submits(1);
        assert!(h
            .orch
            .on_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100))
            .await
            .is_err());

        // The next event re-derives the same target state
        h.orch
            .on_config_set(InterfaceConfig::vlan_member("vlan1", "eth0", 100))
            .await
            .unwrap();
        assert!(state_of(&h.store, "vlan1").await.is_some());
    }
}
