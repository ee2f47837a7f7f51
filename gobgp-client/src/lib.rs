// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! GoBGP API bindings and the thin client the agent uses to watch best
//! paths, pull table snapshots, and publish its own membership route.

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

/// Generated bindings for the vendored GoBGP proto subset.
#[allow(clippy::all, clippy::pedantic)]
pub mod apipb {
    tonic::include_proto!("apipb");
}

mod client;
pub mod path;

pub use client::{GobgpClient, PathBatchStream, RouteService, WATCH_BATCH_SIZE}; // re-export
