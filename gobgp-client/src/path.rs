// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Encode and decode the pieces of a GoBGP path the agent cares about: the
//! IPv4 host-route NLRI and the standard-communities attribute, both packed
//! as `google.protobuf.Any` the way gobgpd marshals them.

use std::net::Ipv4Addr;

use prost::Message;
use prost_types::Any;

use crate::apipb::{
    CommunitiesAttribute, Family, IpAddressPrefix, NextHopAttribute, OriginAttribute, Path, family,
};

const ORIGIN_IGP: u32 = 0;

/// Pack a message the way the GoBGP API does: `type.googleapis.com/apipb.<Name>`.
fn pack<M: Message>(type_name: &str, message: &M) -> Any {
    Any {
        type_url: format!("type.googleapis.com/apipb.{type_name}"),
        value: message.encode_to_vec(),
    }
}

fn unpack<M: Message + Default>(any: &Any, type_name: &str) -> Option<M> {
    let (_, name) = any.type_url.rsplit_once('/')?;
    if name != format!("apipb.{type_name}") {
        return None;
    }
    M::decode(any.value.as_slice()).ok()
}

/// The IPv4 address of a host route, if this path is an IPv4-unicast `/32`.
/// Anything else (other families, shorter prefixes, undecodable NLRI) is `None`.
#[must_use]
pub fn host_prefix(path: &Path) -> Option<Ipv4Addr> {
    let family = path.family.as_ref()?;
    if family.afi != family::Afi::Ip as i32 || family.safi != family::Safi::Unicast as i32 {
        return None;
    }
    let prefix: IpAddressPrefix = unpack(path.nlri.as_ref()?, "IPAddressPrefix")?;
    if prefix.prefix_len != 32 {
        return None;
    }
    prefix.prefix.parse().ok()
}

/// All standard communities carried by the path, in attribute order.
#[must_use]
pub fn communities(path: &Path) -> Vec<u32> {
    path.pattrs
        .iter()
        .filter_map(|attr| unpack::<CommunitiesAttribute>(attr, "CommunitiesAttribute"))
        .flat_map(|attr| attr.communities)
        .collect()
}

/// Build the agent's own membership route: origin IGP, next-hop and NLRI
/// both the local underlay address, tagged with `communities`. An empty
/// community list yields a path without the attribute.
#[must_use]
pub fn build_host_path(local: Ipv4Addr, communities: &[u32]) -> Path {
    let nlri = pack(
        "IPAddressPrefix",
        &IpAddressPrefix {
            prefix_len: 32,
            prefix: local.to_string(),
        },
    );
    let mut pattrs = vec![
        pack("OriginAttribute", &OriginAttribute { origin: ORIGIN_IGP }),
        pack(
            "NextHopAttribute",
            &NextHopAttribute {
                next_hop: local.to_string(),
            },
        ),
    ];
    if !communities.is_empty() {
        pattrs.push(pack(
            "CommunitiesAttribute",
            &CommunitiesAttribute {
                communities: communities.to_vec(),
            },
        ));
    }
    Path {
        nlri: Some(nlri),
        pattrs,
        family: Some(Family {
            afi: family::Afi::Ip as i32,
            safi: family::Safi::Unicast as i32,
        }),
        ..Path::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn built_path_decodes_back() {
        let local = Ipv4Addr::new(10, 0, 0, 1);
        let comms = [(65000u32 << 16) | 100, (65000 << 16) | 200];
        let path = build_host_path(local, &comms);
        assert_eq!(host_prefix(&path), Some(local));
        assert_eq!(communities(&path), comms.to_vec());
        assert!(!path.is_withdraw);
    }

    #[test]
    fn empty_community_list_omits_the_attribute() {
        let path = build_host_path(Ipv4Addr::new(10, 0, 0, 1), &[]);
        assert_eq!(path.pattrs.len(), 2);
        assert!(communities(&path).is_empty());
    }

    #[test]
    fn non_host_prefixes_are_ignored() {
        let mut path = build_host_path(Ipv4Addr::new(10, 0, 0, 1), &[]);
        path.nlri = Some(pack(
            "IPAddressPrefix",
            &IpAddressPrefix {
                prefix_len: 24,
                prefix: "10.0.0.0".to_string(),
            },
        ));
        assert_eq!(host_prefix(&path), None);
    }

    #[test]
    fn other_families_are_ignored() {
        let mut path = build_host_path(Ipv4Addr::new(10, 0, 0, 1), &[]);
        path.family = Some(Family {
            afi: family::Afi::Ip6 as i32,
            safi: family::Safi::Unicast as i32,
        });
        assert_eq!(host_prefix(&path), None);
        path.family = None;
        assert_eq!(host_prefix(&path), None);
    }

    #[test]
    fn foreign_attributes_do_not_parse_as_communities() {
        let mut path = build_host_path(Ipv4Addr::new(10, 0, 0, 1), &[1]);
        // A next-hop attribute must not be mistaken for a communities list.
        path.pattrs = vec![pack(
            "NextHopAttribute",
            &NextHopAttribute {
                next_hop: "10.0.0.1".to_string(),
            },
        )];
        assert!(communities(&path).is_empty());
    }
}
