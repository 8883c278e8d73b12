//! RPC contract of the external liveness-monitor service.

use std::net::IpAddr;

use async_trait::async_trait;

use ifm_types::MonitorProtocol;

/// Result-with-errors wrapper returned by every monitor RPC.
///
/// `result` is only meaningful when `successful` is true.
#[derive(Debug, Clone)]
pub struct RpcResult<T> {
    /// Whether the call succeeded.
    pub successful: bool,
    /// Payload, present on success.
    pub result: Option<T>,
    /// Error strings, populated on failure.
    pub errors: Vec<String>,
}

impl<T> RpcResult<T> {
    /// Creates a successful result.
    pub fn ok(result: T) -> Self {
        Self {
            successful: true,
            result: Some(result),
            errors: Vec::new(),
        }
    }

    /// Creates a failed result.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            successful: false,
            result: None,
            errors: vec![error.into()],
        }
    }

    /// Returns the payload when the call succeeded.
    pub fn into_success(self) -> Option<T> {
        if self.successful {
            self.result
        } else {
            None
        }
    }
}

/// Parameters identifying a monitoring profile.
///
/// Profiles are deduplicated by this whole tuple on the monitor service
/// side, which is what makes the create-then-get fallback work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorProfileParams {
    /// Failure threshold (missed probes before declaring the peer dead).
    pub threshold: u32,
    /// Probe interval in milliseconds.
    pub interval_ms: u32,
    /// Averaging window.
    pub window: u32,
    /// Probe protocol.
    pub protocol: MonitorProtocol,
}

/// Request to start a probe session.
#[derive(Debug, Clone)]
pub struct MonitorStartRequest {
    /// Interface name the session belongs to.
    pub interface: String,
    /// Local tunnel endpoint the probes are sourced from.
    pub source_ip: IpAddr,
    /// Profile governing the session.
    pub profile_id: u32,
}

/// Liveness-monitor RPC service.
///
/// Calls are synchronous from the caller's point of view (the future is
/// awaited with no timeout at this layer); a hung service stalls the one
/// transition that called it, not the others.
#[async_trait]
pub trait AlivenessClient: Send + Sync {
    /// Creates a monitoring profile; returns its id.
    async fn profile_create(&self, params: &MonitorProfileParams) -> RpcResult<u32>;

    /// Looks up an existing profile with identical parameters.
    async fn profile_get(&self, params: &MonitorProfileParams) -> RpcResult<u32>;

    /// Deletes a profile. Fails while the profile is in use elsewhere.
    async fn profile_delete(&self, profile_id: u32) -> RpcResult<()>;

    /// Starts a probe session; returns the monitor id.
    async fn monitor_start(&self, request: &MonitorStartRequest) -> RpcResult<u32>;

    /// Stops a probe session.
    async fn monitor_stop(&self, monitor_id: u32) -> RpcResult<()>;
}
