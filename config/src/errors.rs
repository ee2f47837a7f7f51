// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type for configuration / validation failures.
//! Any result returned by the load or validation methods in this crate is a
//! `ConfigError`.

use std::path::PathBuf;

use thiserror::Error;

use crate::community::{Community, CommunityError};
use crate::vni::Vni;

/// The reasons why we may reject a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("At least one VNI must be configured or communityAsn must be set")]
    NoVniSource,
    #[error("communityAsn {0} does not fit 16 bits")]
    AsnOverflow(u32),
    #[error("VNI {0} has no community and communityAsn is not set")]
    MissingCommunity(Vni),
    #[error("Community '{0}' is already in use by another VNI")]
    DuplicateCommunity(Community),
    #[error("VNI {0} cannot derive a community: {1}")]
    BadDerivedCommunity(Vni, #[source] CommunityError),
}
