//! Caller identity as resolved by the gateway.

use std::fmt;

use serde::Serialize;

use super::plan::PlanTier;

/// The subject of a request. Only used as a key into usage and audit records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    /// Holder of the owner secret
    Owner,
    /// Device authenticated with its static secret
    Device { id: String },
    /// Service authenticated with an HMAC-signed request
    Service { id: String },
    /// Unauthenticated caller, fingerprinted from address and client signature
    Anonymous { fingerprint: String },
}

impl Identity {
    /// Stable key used in usage-ledger and audit records
    pub fn key(&self) -> String {
        match self {
            Identity::Owner => "owner".to_string(),
            Identity::Device { id } => format!("device:{id}"),
            Identity::Service { id } => format!("service:{id}"),
            Identity::Anonymous { fingerprint } => format!("anon:{fingerprint}"),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Identity::Owner)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous { .. })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Identity plus the plan it is billed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub identity: Identity,
    pub plan: PlanTier,
}

impl AuthContext {
    pub fn new(identity: Identity, plan: PlanTier) -> Self {
        Self { identity, plan }
    }
}
