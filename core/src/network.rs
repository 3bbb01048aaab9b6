//! OS-level reachability, delegated to the host.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkReachability {
    #[default]
    NotReachable,
    ReachableViaCarrierDataNetwork,
    ReachableViaLocalAreaNetwork,
}

impl NetworkReachability {
    pub fn is_available(&self) -> bool {
        *self != NetworkReachability::NotReachable
    }

    /// Human-readable connection kind.
    pub fn network_type(&self) -> &'static str {
        match self {
            NetworkReachability::ReachableViaCarrierDataNetwork => "Mobile Data",
            NetworkReachability::ReachableViaLocalAreaNetwork => "WiFi",
            NetworkReachability::NotReachable => "No Network",
        }
    }
}

/// Answers the current reachability state. Queried on demand, never cached.
pub trait ReachabilitySource: Send + Sync {
    fn reachability(&self) -> NetworkReachability;
}

impl ReachabilitySource for NetworkReachability {
    fn reachability(&self) -> NetworkReachability {
        *self
    }
}
