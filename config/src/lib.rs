// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration models for the EVPN agent. The external model is the exact
//! shape of the YAML file; [`load`] develops it into the validated internal
//! [`Config`] that the rest of the system consumes, with defaults applied.
//! The crate also owns the two domain types every layer shares: [`Vni`] and
//! [`Community`].

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

pub mod community;
pub mod errors;
mod external;
pub mod vni;

pub use community::{Community, CommunityError}; // re-export
pub use errors::ConfigError; // re-export
pub use vni::{InvalidVni, Vni}; // re-export

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Log verbosity, as named in the config file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> LogLevel {
        LogLevel::Info
    }
}

/// The top-level, validated agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    pub advertise_self: bool,
    /// ASN half used for communities derived from VNI ids; 0 means unset.
    pub community_asn: u16,
    pub gobgp: GobgpConfig,
    pub node: NodeConfig,
    /// Static VNI table; empty means dynamic mode.
    pub vnis: Vec<VniConfig>,
}

/// How the agent talks to gobgpd.
#[derive(Debug, Clone)]
pub struct GobgpConfig {
    pub address: String,
    /// Timeout applied to every unary RPC and to full-table snapshots.
    pub timeout: Duration,
}

impl GobgpConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}

impl Default for GobgpConfig {
    fn default() -> GobgpConfig {
        GobgpConfig {
            address: "127.0.0.1:50051".to_string(),
            timeout: GobgpConfig::DEFAULT_TIMEOUT,
        }
    }
}

/// Local node settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Explicit underlay IPv4; when unset it is derived from `local_interface`.
    pub local_address: Option<Ipv4Addr>,
    pub local_interface: String,
    /// Underlay UDP port (informational).
    pub vxlan_port: u16,
    /// Tri-state: unset resolves per operating mode, see [`Config::link_cleanup`].
    pub skip_link_cleanup: Option<bool>,
    /// Reserved; accepted in the file but has no effect.
    pub auto_recreate_vxlan: bool,
}

impl NodeConfig {
    pub const DEFAULT_PORT: u16 = 4789;
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            local_address: None,
            local_interface: "eth0".to_string(),
            vxlan_port: NodeConfig::DEFAULT_PORT,
            skip_link_cleanup: None,
            auto_recreate_vxlan: false,
        }
    }
}

/// A single overlay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VniConfig {
    pub id: Vni,
    /// The community naming this VNI on the wire.
    pub community: Community,
    /// Local VXLAN interface name.
    pub device: String,
    /// Physical interface carrying the underlay traffic.
    pub underlay_interface: String,
}

impl Config {
    /// True when the VNI registry is derived from local vxlan devices.
    #[must_use]
    pub fn dynamic_vni(&self) -> bool {
        self.vnis.is_empty()
    }

    /// Whether shutdown may delete the VXLAN interfaces the agent manages.
    ///
    /// An explicit `skipLinkCleanup` always wins. When unset, dynamic mode
    /// never deletes: the interfaces were created by the operator, not us.
    #[must_use]
    pub fn link_cleanup(&self) -> bool {
        match self.node.skip_link_cleanup {
            Some(skip) => !skip,
            None => !self.dynamic_vni(),
        }
    }
}

/// Load configuration from a YAML file, apply defaults, and validate.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    from_str(&raw)
}

/// Develop a configuration from YAML text. Split from [`load`] for tests.
pub fn from_str(raw: &str) -> Result<Config, ConfigError> {
    let file: external::FileConfig = serde_yaml::from_str(raw)?;
    file.develop()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn static_config_with_defaults() {
        let cfg = from_str(
            r"
            vnis:
              - id: 100
                community: 65000:100
            ",
        )
        .unwrap();
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(!cfg.advertise_self);
        assert_eq!(cfg.gobgp.address, "127.0.0.1:50051");
        assert_eq!(cfg.gobgp.timeout, Duration::from_secs(5));
        assert_eq!(cfg.node.local_interface, "eth0");
        assert_eq!(cfg.node.vxlan_port, 4789);
        assert!(!cfg.dynamic_vni());
        let vni = &cfg.vnis[0];
        assert_eq!(vni.id.as_u32(), 100);
        assert_eq!(vni.community, Community::new(65000, 100));
        assert_eq!(vni.device, "vxlan100");
        assert_eq!(vni.underlay_interface, "eth0");
    }

    #[test]
    fn community_derived_from_asn_and_id() {
        let cfg = from_str(
            r"
            communityAsn: 65000
            vnis:
              - id: 200
                device: vx200
                underlayInterface: bond0
            ",
        )
        .unwrap();
        let vni = &cfg.vnis[0];
        assert_eq!(vni.community, Community::new(65000, 200));
        assert_eq!(vni.device, "vx200");
        assert_eq!(vni.underlay_interface, "bond0");
    }

    #[test]
    fn dynamic_mode_needs_an_asn() {
        assert!(matches!(
            from_str("advertiseSelf: true"),
            Err(ConfigError::NoVniSource)
        ));
        let cfg = from_str("communityAsn: 65000").unwrap();
        assert!(cfg.dynamic_vni());
        assert_eq!(cfg.community_asn, 65000);
    }

    #[test]
    fn duplicate_communities_are_rejected() {
        let err = from_str(
            r"
            vnis:
              - id: 100
                community: 65000:1
              - id: 200
                community: 65000:1
            ",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCommunity(c) if c == Community::new(65000, 1)));
    }

    #[test]
    fn missing_community_without_asn_is_rejected() {
        assert!(matches!(
            from_str("vnis: [{id: 100}]"),
            Err(ConfigError::MissingCommunity(_))
        ));
    }

    #[test]
    fn oversized_asn_is_rejected() {
        assert!(matches!(
            from_str("communityAsn: 70000"),
            Err(ConfigError::AsnOverflow(70000))
        ));
    }

    #[test]
    fn local_address_must_be_ipv4() {
        let err = from_str(
            r"
            communityAsn: 65000
            node:
              localAddress: 'fe80::1'
            ",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn durations_parse_in_human_form() {
        let cfg = from_str(
            r"
            communityAsn: 65000
            gobgp:
              address: 127.0.0.1:50052
              timeout: 2m
            ",
        )
        .unwrap();
        assert_eq!(cfg.gobgp.timeout, Duration::from_secs(120));
    }

    #[test]
    fn link_cleanup_defaults_depend_on_mode() {
        let dynamic = from_str("communityAsn: 65000").unwrap();
        assert!(!dynamic.link_cleanup());
        let fixed = from_str("vnis: [{id: 1, community: '65000:1'}]").unwrap();
        assert!(fixed.link_cleanup());
        let forced = from_str(
            r"
            communityAsn: 65000
            node:
              skipLinkCleanup: false
            ",
        )
        .unwrap();
        assert!(forced.link_cleanup());
    }
}
