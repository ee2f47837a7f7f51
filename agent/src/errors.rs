// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("derive local address: {0}")]
    LocalAddress(#[from] fdb_manager::FdbError),

    #[error("announce self: {0}")]
    Advertise(#[source] tonic::Status),

    #[error("watch stream: {0}")]
    Watch(#[source] tonic::Status),

    #[error("watch stream ended")]
    WatchStreamEnded,
}
