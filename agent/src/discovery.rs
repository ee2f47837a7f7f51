// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dynamic mode: derive the VNI registry from the VXLAN interfaces present
//! on the host instead of static configuration.

use std::collections::BTreeSet;
use std::sync::Arc;

use config::{Community, Vni, VniConfig};
use fdb_manager::{LinkKind, VxlanManager};
use tracing::{info, warn};

use crate::agent::{Agent, lock};

impl Agent {
    /// One discovery pass: register VNIs for newly appeared VXLAN
    /// interfaces, resync the RIB if anything was registered (route events
    /// delivered before a VNI existed would otherwise be lost), and drop
    /// registrations whose interface disappeared.
    pub(crate) async fn refresh_dynamic_vnis(&self) {
        let links = match self.netlink.list_links().await {
            Ok(links) => links,
            Err(err) => {
                warn!("list links failed: {err}");
                return;
            }
        };

        let mut present: BTreeSet<Vni> = BTreeSet::new();
        let mut created = false;
        for link in links {
            let LinkKind::Vxlan { vni } = link.kind else {
                continue;
            };
            // VNI 0 carries no overlay; some drivers report it for
            // half-configured devices.
            let Ok(vni) = Vni::new_checked(vni) else {
                continue;
            };
            present.insert(vni);

            let community = match Community::for_vni(self.cfg.community_asn, vni) {
                Ok(community) => community,
                Err(err) => {
                    warn!("vni {vni} on {}: cannot derive community: {err}", link.name);
                    continue;
                }
            };

            {
                let mut maps = lock(&self.maps);
                if maps.by_id.contains_key(&vni) {
                    continue;
                }
                let vni_cfg = VniConfig {
                    id: vni,
                    community,
                    device: link.name.clone(),
                    underlay_interface: self.cfg.node.local_interface.clone(),
                };
                maps.by_community.insert(community, vni);
                maps.by_id.insert(vni, vni_cfg.clone());
                maps.managers.insert(
                    vni,
                    Arc::new(VxlanManager::new(
                        vni_cfg,
                        self.cfg.node.vxlan_port,
                        self.local_ip,
                        Arc::clone(&self.netlink),
                    )),
                );
            }
            info!(
                "discovered vxlan vni {vni} dev {} community {community}",
                link.name
            );
            created = true;
        }

        if created {
            let touched = self.resync_rib().await;
            for vni in touched {
                self.reconcile_vni(vni).await;
            }
        }

        // Deregister VNIs whose interface no longer exists. The ensure call
        // flips them offline first, which withdraws their community from the
        // local advertisement.
        let missing: Vec<Vni> = {
            lock(&self.maps)
                .managers
                .keys()
                .filter(|vni| !present.contains(*vni))
                .copied()
                .collect()
        };
        for vni in missing {
            self.ensure_vni(vni).await;
            let device = {
                let mut maps = lock(&self.maps);
                let device = maps.by_id.get(&vni).map(|cfg| cfg.device.clone());
                maps.by_id.remove(&vni);
                maps.by_community.retain(|_, id| *id != vni);
                maps.managers.remove(&vni);
                device
            };
            lock(&self.desired).remove(&vni);
            lock(&self.online).remove(&vni);
            info!(
                "unregistered vxlan vni {vni} dev {}",
                device.unwrap_or_default()
            );
        }
    }

    /// Rebuild the whole desired table from a full RIB snapshot. The
    /// snapshot is collected before the desired lock is taken.
    pub(crate) async fn resync_rib(&self) -> BTreeSet<Vni> {
        let paths = match self.bgp.list_paths().await {
            Ok(paths) => paths,
            Err(err) => {
                warn!("list path failed: {err}");
                return BTreeSet::new();
            }
        };
        let vni_by_community = lock(&self.maps).by_community.clone();
        let mut desired = lock(&self.desired);
        desired.clear();
        crate::decode::fold_paths(self.local_ip, &vni_by_community, &mut desired, &paths)
    }
}
