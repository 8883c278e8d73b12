//! Monitor profile and probe-session lifecycle manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use ifm_cache::MonitorIndex;
use ifm_common::IfmResult;
use ifm_types::{MonitorProtocol, TunnelConfig};

use crate::client::{AlivenessClient, MonitorProfileParams, MonitorStartRequest};

/// Sentinel profile id meaning "monitoring unavailable, proceed without it".
pub const NO_PROFILE: u32 = 0;

/// Default failure threshold for tunnel probes.
pub const DEFAULT_MONITOR_THRESHOLD: u32 = 4;

/// Default averaging window for tunnel probes.
pub const DEFAULT_MONITOR_WINDOW: u32 = 4;

/// The probe protocol this adapter drives.
const SUPPORTED_PROTOCOL: MonitorProtocol = MonitorProtocol::Lldp;

/// Adapter counters.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Profiles successfully created or recovered.
    pub profiles_allocated: AtomicU64,
    /// Probe sessions started.
    pub sessions_started: AtomicU64,
    /// Probe sessions stopped.
    pub sessions_stopped: AtomicU64,
    /// RPC calls that failed or returned unsuccessful results.
    pub rpc_failures: AtomicU64,
}

impl MonitorStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns liveness-probe profiles and per-tunnel sessions.
pub struct MonitorMgr {
    client: Arc<dyn AlivenessClient>,
    index: Arc<MonitorIndex>,
    stats: MonitorStats,
}

impl MonitorMgr {
    /// Creates an adapter over the monitor service and the shared index.
    pub fn new(client: Arc<dyn AlivenessClient>, index: Arc<MonitorIndex>) -> Self {
        Self {
            client,
            index,
            stats: MonitorStats::default(),
        }
    }

    /// Returns the adapter counters.
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Returns the monitor-id index this adapter maintains.
    pub fn index(&self) -> &Arc<MonitorIndex> {
        &self.index
    }

    /// Returns true when the adapter drives monitoring for this tunnel.
    pub fn monitoring_eligible(&self, tunnel: &TunnelConfig) -> bool {
        tunnel.internal && tunnel.monitor_enabled && tunnel.monitor_protocol == SUPPORTED_PROTOCOL
    }

    /// Allocates (or recovers) a monitoring profile.
    ///
    /// A failed create falls back to a get with the identical parameter
    /// tuple, covering the race where another caller created the same
    /// profile concurrently. When both calls fail, returns [`NO_PROFILE`]:
    /// monitoring is unavailable and callers proceed without it.
    pub async fn allocate_profile(
        &self,
        threshold: u32,
        interval_ms: u32,
        window: u32,
        protocol: MonitorProtocol,
    ) -> u32 {
        let params = MonitorProfileParams {
            threshold,
            interval_ms,
            window,
            protocol,
        };

        let created = self.client.profile_create(&params).await;
        if let Some(profile_id) = created.into_success() {
            MonitorStats::bump(&self.stats.profiles_allocated);
            return profile_id;
        }
        MonitorStats::bump(&self.stats.rpc_failures);
        debug!(
            "Profile create failed for interval {} ms, trying get",
            interval_ms
        );

        let fetched = self.client.profile_get(&params).await;
        if let Some(profile_id) = fetched.into_success() {
            MonitorStats::bump(&self.stats.profiles_allocated);
            return profile_id;
        }
        MonitorStats::bump(&self.stats.rpc_failures);
        warn!(
            "No monitor profile available (threshold {}, interval {} ms, window {}, {})",
            threshold,
            interval_ms,
            window,
            protocol.as_str()
        );
        NO_PROFILE
    }

    /// Starts a probe session for an internal, monitoring-enabled tunnel.
    ///
    /// On RPC success the returned monitor id is recorded in both directions
    /// of the index within one transaction. On RPC failure nothing is
    /// recorded; the next reconciliation pass retries.
    pub async fn start_monitoring(&self, tunnel: &TunnelConfig, name: &str) -> IfmResult<()> {
        if !self.monitoring_eligible(tunnel) {
            debug!("Monitoring not applicable for {}", name);
            return Ok(());
        }

        let profile_id = self
            .allocate_profile(
                DEFAULT_MONITOR_THRESHOLD,
                tunnel.monitor_interval_ms,
                DEFAULT_MONITOR_WINDOW,
                tunnel.monitor_protocol,
            )
            .await;
        if profile_id == NO_PROFILE {
            warn!("Monitoring unavailable for {}, proceeding without it", name);
            return Ok(());
        }

        let request = MonitorStartRequest {
            interface: name.to_string(),
            source_ip: tunnel.src_ip,
            profile_id,
        };
        let started = self.client.monitor_start(&request).await;
        let Some(monitor_id) = started.into_success() else {
            MonitorStats::bump(&self.stats.rpc_failures);
            warn!("Monitor start failed for {}", name);
            return Ok(());
        };

        self.index.add(monitor_id, name).await?;
        MonitorStats::bump(&self.stats.sessions_started);
        info!("Monitoring started for {} (monitor id {})", name, monitor_id);
        Ok(())
    }

    /// Stops the probe session recorded for an interface.
    ///
    /// Walks the interface's monitor-id list but processes only the first id
    /// whose reverse mapping still resolves to an interface — at most one
    /// real session is handled per call.
    pub async fn stop_monitoring(&self, tunnel: &TunnelConfig, name: &str) -> IfmResult<()> {
        if !tunnel.monitor_enabled {
            debug!("Monitoring was never enabled for {}", name);
            return Ok(());
        }

        let monitor_ids = self.index.monitor_ids(name).await?;
        if monitor_ids.is_empty() {
            debug!("No monitor session recorded for {}", name);
            return Ok(());
        }

        for monitor_id in monitor_ids {
            let Some(mapped) = self.index.interface_for(monitor_id).await? else {
                debug!("Monitor id {} has no live reverse mapping", monitor_id);
                continue;
            };

            let stopped = self.client.monitor_stop(monitor_id).await;
            if !stopped.successful {
                MonitorStats::bump(&self.stats.rpc_failures);
                warn!("Monitor stop failed for {} (id {})", mapped, monitor_id);
            }
            self.index.remove(monitor_id, &mapped).await?;
            MonitorStats::bump(&self.stats.sessions_stopped);
            info!("Monitoring stopped for {} (monitor id {})", mapped, monitor_id);
            break;
        }

        Ok(())
    }

    /// Applies a tunnel configuration update.
    ///
    /// The old session is stopped unconditionally; a new one is started when
    /// the new configuration still wants monitoring. A changed interval also
    /// retires the now-unused profile — the delete may fail when the profile
    /// is shared by interfaces with identical parameters, which is expected
    /// and only logged.
    pub async fn handle_tunnel_update(
        &self,
        name: &str,
        old: &TunnelConfig,
        new: &TunnelConfig,
    ) -> IfmResult<()> {
        self.stop_monitoring(old, name).await?;

        if self.monitoring_eligible(new) {
            self.start_monitoring(new, name).await?;
        }

        if old.monitor_interval_ms != new.monitor_interval_ms {
            self.retire_profile(old).await;
        }
        Ok(())
    }

    /// Deletes the profile matching the old tunnel parameters, if it exists.
    async fn retire_profile(&self, old: &TunnelConfig) {
        let params = MonitorProfileParams {
            threshold: DEFAULT_MONITOR_THRESHOLD,
            interval_ms: old.monitor_interval_ms,
            window: DEFAULT_MONITOR_WINDOW,
            protocol: old.monitor_protocol,
        };

        let Some(profile_id) = self.client.profile_get(&params).await.into_success() else {
            debug!(
                "No profile found for retired interval {} ms",
                old.monitor_interval_ms
            );
            return;
        };
        if profile_id == NO_PROFILE {
            return;
        }

        let deleted = self.client.profile_delete(profile_id).await;
        if !deleted.successful {
            // Shared profiles refuse deletion while in use elsewhere
            debug!(
                "Profile {} still in use, delete skipped: {:?}",
                profile_id, deleted.errors
            );
        } else {
            info!("Deleted unused monitor profile {}", profile_id);
        }
    }
}
