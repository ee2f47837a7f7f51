// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The external configuration model: the exact shape of the YAML file. An
//! external configuration gets developed into the validated [`Config`] the
//! rest of the system consumes; defaults are applied here, during that step.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Deserialize;

use crate::community::Community;
use crate::errors::ConfigError;
use crate::vni::Vni;
use crate::{Config, GobgpConfig, LogLevel, NodeConfig, VniConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct FileConfig {
    #[serde(default)]
    log_level: LogLevel,
    #[serde(default)]
    advertise_self: bool,
    #[serde(default)]
    community_asn: u32,
    #[serde(default)]
    gobgp: FileGobgp,
    #[serde(default)]
    node: FileNode,
    #[serde(default)]
    vnis: Vec<FileVni>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileGobgp {
    address: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileNode {
    local_address: Option<Ipv4Addr>,
    local_interface: Option<String>,
    vxlan_port: Option<u16>,
    skip_link_cleanup: Option<bool>,
    #[serde(default)]
    auto_recreate_vxlan: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileVni {
    id: Vni,
    community: Option<Community>,
    device: Option<String>,
    underlay_interface: Option<String>,
}

impl FileConfig {
    /// Apply defaults and validate, producing the internal [`Config`].
    pub(crate) fn develop(self) -> Result<Config, ConfigError> {
        if self.vnis.is_empty() && self.community_asn == 0 {
            return Err(ConfigError::NoVniSource);
        }
        let community_asn = u16::try_from(self.community_asn)
            .map_err(|_| ConfigError::AsnOverflow(self.community_asn))?;

        let node = NodeConfig {
            local_address: self.node.local_address,
            local_interface: self
                .node
                .local_interface
                .unwrap_or_else(|| NodeConfig::default().local_interface),
            vxlan_port: self.node.vxlan_port.unwrap_or(NodeConfig::DEFAULT_PORT),
            skip_link_cleanup: self.node.skip_link_cleanup,
            auto_recreate_vxlan: self.node.auto_recreate_vxlan,
        };

        let mut vnis = Vec::with_capacity(self.vnis.len());
        for vni in self.vnis {
            let community = match vni.community {
                Some(community) => community,
                None => {
                    if community_asn == 0 {
                        return Err(ConfigError::MissingCommunity(vni.id));
                    }
                    Community::for_vni(community_asn, vni.id)
                        .map_err(|err| ConfigError::BadDerivedCommunity(vni.id, err))?
                }
            };
            if vnis.iter().any(|v: &VniConfig| v.community == community) {
                return Err(ConfigError::DuplicateCommunity(community));
            }
            vnis.push(VniConfig {
                id: vni.id,
                community,
                device: vni.device.unwrap_or_else(|| format!("vxlan{}", vni.id)),
                underlay_interface: vni
                    .underlay_interface
                    .unwrap_or_else(|| node.local_interface.clone()),
            });
        }

        Ok(Config {
            log_level: self.log_level,
            advertise_self: self.advertise_self,
            community_asn,
            gobgp: GobgpConfig {
                address: self
                    .gobgp
                    .address
                    .unwrap_or_else(|| GobgpConfig::default().address),
                timeout: self.gobgp.timeout.unwrap_or(GobgpConfig::DEFAULT_TIMEOUT),
            },
            node,
            vnis,
        })
    }
}
