//! ifmgrd - interface reconciliation daemon
//!
//! Entry point for the ifmgrd daemon.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ifm_datastore::MemDataStore;
use ifm_monitor::{
    AlivenessClient, MonitorProfileParams, MonitorStartRequest, RpcResult,
};
use ifmgrd::{FlowEntity, FlowProgrammer, FlowRef, InterfaceOrch, MemIdAllocator};

use async_trait::async_trait;
use ifm_common::IfmResult;
use ifm_types::{DpnId, LportTag};

/// Initializes tracing/logging subsystem
fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Flow programmer that logs programmed entities until a southbound
/// connection is wired in.
struct LoggingFlowProgrammer;

#[async_trait]
impl FlowProgrammer for LoggingFlowProgrammer {
    async fn add_flow(&self, flow: &FlowEntity) -> IfmResult<()> {
        info!("Program flow {} on dpn {}", flow.flow_ref, flow.dpn);
        Ok(())
    }

    async fn remove_flow(&self, dpn: DpnId, flow_ref: &FlowRef, _table_id: u8) -> IfmResult<()> {
        info!("Withdraw flow {} on dpn {}", flow_ref, dpn);
        Ok(())
    }

    async fn bind_default_egress(&self, interface: &str, tag: LportTag) -> IfmResult<()> {
        info!("Bind egress dispatcher for {} (tag {})", interface, tag);
        Ok(())
    }

    async fn unbind_default_egress(&self, interface: &str) -> IfmResult<()> {
        info!("Unbind egress dispatcher for {}", interface);
        Ok(())
    }
}

/// Monitor client stub reporting the service as unavailable; the engine
/// proceeds without monitoring until the real RPC endpoint is configured.
struct UnavailableAliveness;

#[async_trait]
impl AlivenessClient for UnavailableAliveness {
    async fn profile_create(&self, _params: &MonitorProfileParams) -> RpcResult<u32> {
        RpcResult::failed("aliveness service not configured")
    }

    async fn profile_get(&self, _params: &MonitorProfileParams) -> RpcResult<u32> {
        RpcResult::failed("aliveness service not configured")
    }

    async fn profile_delete(&self, _profile_id: u32) -> RpcResult<()> {
        RpcResult::failed("aliveness service not configured")
    }

    async fn monitor_start(&self, _request: &MonitorStartRequest) -> RpcResult<u32> {
        RpcResult::failed("aliveness service not configured")
    }

    async fn monitor_stop(&self, _monitor_id: u32) -> RpcResult<()> {
        RpcResult::failed("aliveness service not configured")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    info!("--- Starting ifmgrd ---");

    let store = Arc::new(MemDataStore::new());
    let _orch = InterfaceOrch::new(
        store,
        Arc::new(MemIdAllocator::new()),
        Arc::new(LoggingFlowProgrammer),
        Arc::new(UnavailableAliveness),
    );

    // TODO: wire the OpenFlow/OVSDB southbound listeners into the event
    // queues once the connection layer is available
    info!("ifmgrd initialization complete (no southbound configured)");

    ExitCode::SUCCESS
}
