// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fold a batch of best-path records into the per-VNI desired-member table.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

use config::{Community, Vni};
use gobgp_client::apipb::Path;
use gobgp_client::path;

/// Apply one batch of path records to `desired`, returning the set of VNIs
/// whose member set was touched.
///
/// A record contributes iff it is an IPv4-unicast host route for somebody
/// else's address and carries at least one community naming a registered
/// VNI. Withdrawals remove the peer from the VNI's member set,
/// advertisements insert it; a community not in `vni_by_community` is
/// someone else's business and is skipped.
pub(crate) fn fold_paths(
    local_ip: Ipv4Addr,
    vni_by_community: &HashMap<Community, Vni>,
    desired: &mut HashMap<Vni, BTreeSet<Ipv4Addr>>,
    paths: &[Path],
) -> BTreeSet<Vni> {
    let mut touched = BTreeSet::new();
    for record in paths {
        let Some(peer) = path::host_prefix(record) else {
            continue;
        };
        if peer == local_ip {
            continue;
        }
        for community in path::communities(record) {
            let Some(&vni) = vni_by_community.get(&Community::from(community)) else {
                continue;
            };
            let members = desired.entry(vni).or_default();
            if record.is_withdraw {
                members.remove(&peer);
            } else {
                members.insert(peer);
            }
            touched.insert(vni);
        }
    }
    touched
}
