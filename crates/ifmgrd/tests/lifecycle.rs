//! End-to-end interface lifecycle scenarios.
//!
//! Drives the engine through whole event sequences — config changes, switch
//! port events, liveness callbacks — against the in-memory store and
//! capture-style collaborators, and checks the externally observable triple:
//! lport tag, oper status, programmed flows.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use ifm_common::IfmResult;
use ifm_datastore::{tables, DataStore, DataStoreExt, MemDataStore, Partition};
use ifm_monitor::{
    AlivenessClient, MonitorProfileParams, MonitorStartRequest, RpcResult,
};
use ifm_types::{
    DpnId, InterfaceConfig, InterfaceState, LportTag, MonitorProtocol, OperStatus, PortId,
    TunnelConfig, TunnelKind,
};
use ifmgrd::{
    FlowCapablePort, FlowEntity, FlowProgrammer, FlowRef, InterfaceOrch, MemIdAllocator,
};

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

    fn bound_interfaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bound.lock().unwrap().iter().cloned().collect();
        names.sort();
        names
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

    async fn remove_flow(&self, _dpn: DpnId, flow_ref: &FlowRef, _table_id: u8) -> IfmResult<()> {
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
    started: Mutex<Vec<MonitorStartRequest>>,
    stopped: Mutex<Vec<u32>>,
    deleted_profiles: Mutex<Vec<u32>>,
    fail_profile_delete: bool,
}

#[async_trait]
impl AlivenessClient for StubAliveness {
    async fn profile_create(&self, params: &MonitorProfileParams) -> RpcResult<u32> {
        // Profile id derived from the interval keeps distinct intervals on
        // distinct profiles
        RpcResult::ok(params.interval_ms / 100 + 1)
    }

    async fn profile_get(&self, params: &MonitorProfileParams) -> RpcResult<u32> {
        RpcResult::ok(params.interval_ms / 100 + 1)
    }

    async fn profile_delete(&self, profile_id: u32) -> RpcResult<()> {
        if self.fail_profile_delete {
            return RpcResult::failed("profile in use");
        }
        self.deleted_profiles.lock().unwrap().push(profile_id);
        RpcResult::ok(())
    }

    async fn monitor_start(&self, request: &MonitorStartRequest) -> RpcResult<u32> {
        self.started.lock().unwrap().push(request.clone());
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
    aliveness: Arc<StubAliveness>,
    orch: InterfaceOrch,
}

fn harness() -> Harness {
    harness_with(StubAliveness::default())
}

fn harness_with(aliveness: StubAliveness) -> Harness {
    let store = Arc::new(MemDataStore::new());
    let flows = Arc::new(RecordingFlows::default());
    let aliveness = Arc::new(aliveness);
    let orch = InterfaceOrch::new(
        store.clone(),
        Arc::new(MemIdAllocator::new()),
        flows.clone(),
        aliveness.clone(),
    );
    Harness {
        store,
        flows,
        aliveness,
        orch,
    }
}

async fn state_of(store: &MemDataStore, name: &str) -> Option<InterfaceState> {
    store
        .read_json(Partition::Operational, tables::INTERFACES_STATE, name)
        .await
        .unwrap()
}

fn eth0_port(dpn: u64) -> FlowCapablePort {
    FlowCapablePort::up("eth0", PortId::new(DpnId::new(dpn), 2)).with_mac("0a:0b:0c:0d:0e:0f")
}

fn vlan1_config() -> InterfaceConfig {
    InterfaceConfig::vlan_member("vlan1", "eth0", 100)
}

fn monitored_tunnel(interval_ms: u32) -> TunnelConfig {
    TunnelConfig::new(
        TunnelKind::Vxlan,
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        DpnId::new(1),
    )
    .internal()
    .with_monitoring(MonitorProtocol::Lldp)
    .with_interval_ms(interval_ms)
}

/// Applying the same config-add twice yields exactly one state, one tag and
/// one set of ingress flows.
#[tokio::test]
async fn config_add_is_idempotent() {
    let h = harness();

    h.orch.on_config_set(vlan1_config()).await.unwrap();
    h.orch.on_port_event(eth0_port(1)).await.unwrap();
    h.orch.on_config_set(vlan1_config()).await.unwrap();

    let state_keys = h
        .store
        .read_keys(Partition::Operational, tables::INTERFACES_STATE)
        .await
        .unwrap();
    assert_eq!(
        state_keys,
        vec!["eth0".to_string(), "vlan1".to_string()],
        "one state per interface"
    );

    let tag_keys = h
        .store
        .read_keys(Partition::Operational, tables::IF_LPORT_MAP)
        .await
        .unwrap();
    assert_eq!(tag_keys.len(), 2);

    assert_eq!(h.flows.flow_ids(), vec!["10vlan1".to_string()]);
    assert_eq!(h.flows.bound_interfaces(), vec!["vlan1".to_string()]);
}

/// {config-add(eth0), switch-port-up(eth0)} applied in either order converge
/// to the same (lport tag, oper status, flows) triple.
#[tokio::test]
async fn config_and_port_events_commute() {
    let eth0_config = || InterfaceConfig::new("eth0", ifm_types::InterfaceKind::Plain);

    let config_first = harness();
    config_first
        .orch
        .on_config_set(eth0_config())
        .await
        .unwrap();
    config_first
        .orch
        .on_port_event(eth0_port(1))
        .await
        .unwrap();

    let port_first = harness();
    port_first.orch.on_port_event(eth0_port(1)).await.unwrap();
    port_first.orch.on_config_set(eth0_config()).await.unwrap();

    let a = state_of(&config_first.store, "eth0").await.unwrap();
    let b = state_of(&port_first.store, "eth0").await.unwrap();

    assert_eq!(a.lport_tag, b.lport_tag);
    assert_eq!(a.oper_status, b.oper_status);
    assert_eq!(a.oper_status, OperStatus::Up);
    assert_eq!(a.lower_layer_if, b.lower_layer_if);
    assert_eq!(config_first.flows.flow_ids(), port_first.flows.flow_ids());
    assert_eq!(config_first.flows.flow_ids(), vec!["10eth0".to_string()]);
    assert_eq!(
        config_first.flows.bound_interfaces(),
        port_first.flows.bound_interfaces()
    );
}

/// For all live interface states, name->tag and tag->name agree and no two
/// interfaces share a tag.
#[tokio::test]
async fn lport_tag_mapping_stays_bijective() {
    let h = harness();

    for name in ["vlan1", "vlan2", "vlan3"] {
        h.orch
            .on_config_set(InterfaceConfig::vlan_member(name, "eth0", 100))
            .await
            .unwrap();
    }
    h.orch.on_port_event(eth0_port(1)).await.unwrap();

    let names = h
        .store
        .read_keys(Partition::Operational, tables::INTERFACES_STATE)
        .await
        .unwrap();

    let mut seen_tags = HashSet::new();
    for name in names {
        let state = state_of(&h.store, &name).await.unwrap();
        assert!(
            seen_tags.insert(state.lport_tag),
            "tag {} assigned twice",
            state.lport_tag
        );

        let forward = h.orch.lports().tag_for(&name).await.unwrap().unwrap();
        assert_eq!(forward, state.lport_tag);
        let reverse = h
            .orch
            .lports()
            .interface_for(state.lport_tag)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reverse, name);
    }
}

/// A parent flipping Up->Down downs every recorded child in the same pass
/// and withdraws their ingress flows.
#[tokio::test]
async fn parent_down_cascades_to_children() {
    let h = harness();

    h.orch.on_config_set(vlan1_config()).await.unwrap();
    h.orch
        .on_config_set(InterfaceConfig::vlan_member("vlan2", "eth0", 200))
        .await
        .unwrap();
    h.orch.on_port_event(eth0_port(1)).await.unwrap();

    assert_eq!(
        state_of(&h.store, "vlan1").await.unwrap().oper_status,
        OperStatus::Up
    );
    assert!(h.flows.has_flow("10vlan1"));
    assert!(h.flows.has_flow("10vlan2"));

    // The link dies
    h.orch.on_port_event(eth0_port(1).down()).await.unwrap();

    for name in ["vlan1", "vlan2"] {
        let state = state_of(&h.store, name).await.unwrap();
        assert_eq!(state.oper_status, OperStatus::Down, "{} not downed", name);
    }
    assert!(!h.flows.has_flow("10vlan1"));
    assert!(!h.flows.has_flow("10vlan2"));
}

/// The whole VLAN lifecycle end to end: eager tag reservation, Up on parent
/// port appearance with the deterministic flow id, and full cleanup on
/// config delete.
#[tokio::test]
async fn vlan_interface_full_lifecycle() {
    let h = harness();
    let dpn = DpnId::new(1);

    // Config arrives before the switch knows the port
    h.orch.on_config_set(vlan1_config()).await.unwrap();

    let state = state_of(&h.store, "vlan1").await.unwrap();
    assert_eq!(state.oper_status, OperStatus::Down);
    let tag = h.orch.lports().tag_for("vlan1").await.unwrap();
    assert!(tag.is_some(), "lport tag must be reserved eagerly");

    // Parent port comes up
    h.orch.on_port_event(eth0_port(dpn.value())).await.unwrap();

    let state = state_of(&h.store, "vlan1").await.unwrap();
    assert_eq!(state.oper_status, OperStatus::Up);
    assert_eq!(state.lport_tag, tag.unwrap());
    let expected_flow = format!("{}0vlan1", dpn);
    assert!(h.flows.has_flow(&expected_flow));

    // Config removed: state, tag mapping and flow all disappear
    h.orch.on_config_del("vlan1").await.unwrap();

    assert!(state_of(&h.store, "vlan1").await.is_none());
    assert!(h.orch.lports().tag_for("vlan1").await.unwrap().is_none());
    assert!(h
        .orch
        .lports()
        .interface_for(tag.unwrap())
        .await
        .unwrap()
        .is_none());
    assert!(!h.flows.has_flow(&expected_flow));
    assert!(h.flows.bound_interfaces().is_empty());
}

/// Internal tunnel with LLDP monitoring: session starts on config-add, an
/// interval change restarts the session and attempts the old profile's
/// delete, and a refused delete does not abort the update.
#[tokio::test]
async fn tunnel_monitor_full_lifecycle() {
    let h = harness();

    h.orch
        .on_config_set(InterfaceConfig::tunnel("tun0", monitored_tunnel(10_000)))
        .await
        .unwrap();

    let old_ids = h.orch.monitor().index().monitor_ids("tun0").await.unwrap();
    assert_eq!(old_ids.len(), 1, "start must record a monitor mapping");
    assert_eq!(
        h.orch
            .monitor()
            .index()
            .interface_for(old_ids[0])
            .await
            .unwrap(),
        Some("tun0".to_string())
    );

    // Interval update: old session stopped, new one started, old profile
    // delete attempted
    h.orch
        .on_config_set(InterfaceConfig::tunnel("tun0", monitored_tunnel(5_000)))
        .await
        .unwrap();

    assert_eq!(*h.aliveness.stopped.lock().unwrap(), old_ids);
    let new_ids = h.orch.monitor().index().monitor_ids("tun0").await.unwrap();
    assert_eq!(new_ids.len(), 1);
    assert_ne!(new_ids[0], old_ids[0]);
    assert_eq!(h.aliveness.deleted_profiles.lock().unwrap().len(), 1);
}

/// Same update with the profile delete refused (profile shared elsewhere):
/// the failure is tolerated and the new session still exists.
#[tokio::test]
async fn tunnel_monitor_update_tolerates_profile_delete_failure() {
    let h = harness_with(StubAliveness {
        fail_profile_delete: true,
        ..StubAliveness::default()
    });

    h.orch
        .on_config_set(InterfaceConfig::tunnel("tun0", monitored_tunnel(10_000)))
        .await
        .unwrap();
    h.orch
        .on_config_set(InterfaceConfig::tunnel("tun0", monitored_tunnel(5_000)))
        .await
        .unwrap();

    assert_eq!(
        h.orch
            .monitor()
            .index()
            .monitor_ids("tun0")
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(h.aliveness.deleted_profiles.lock().unwrap().is_empty());
}
