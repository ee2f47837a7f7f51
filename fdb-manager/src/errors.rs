// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FdbError {
    /// The interface does not exist right now. Callers treat this as "the
    /// VNI is offline", not as an operator-visible failure.
    #[error("link {0} not found")]
    LinkNotFound(String),

    #[error("link {0} exists but is not a vxlan device")]
    NotVxlan(String),

    #[error("no IPv4 address on interface {0}")]
    NoIpv4(String),

    #[error("netlink request failed: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("netlink socket: {0}")]
    Socket(#[from] std::io::Error),
}

impl FdbError {
    /// Matched by identity where reconciliation must degrade gracefully
    /// instead of logging an error.
    #[must_use]
    pub fn is_link_not_found(&self) -> bool {
        matches!(self, FdbError::LinkNotFound(_))
    }
}
