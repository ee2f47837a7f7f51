// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reconcile the flood FDB of local VXLAN interfaces with a desired set of
//! remote VTEPs.
//!
//! The kernel surface is narrow and lives behind [`NetlinkOps`] so the
//! layers above can be exercised without netlink. [`VxlanManager`] owns one
//! VXLAN interface and drives its head-end replication entries (all-zero
//! MAC, `NTF_SELF`) toward the desired member set.

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

mod errors;
mod netlink;
mod vxlan;

pub use errors::FdbError; // re-export
pub use netlink::{FLOOD_MAC, Link, LinkKind, Netlink, NetlinkOps}; // re-export
pub use vxlan::VxlanManager; // re-export
