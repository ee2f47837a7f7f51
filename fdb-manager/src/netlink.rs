// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Thin capability surface over the kernel's link and bridge-FDB operations.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroI32;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use rtnetlink::Handle;
use rtnetlink::packet_core::{
    NLM_F_ACK, NLM_F_APPEND, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REQUEST, NetlinkMessage,
    NetlinkPayload,
};
use rtnetlink::packet_route::address::AddressAttribute;
use rtnetlink::packet_route::link::{InfoData, InfoKind, InfoVxlan, LinkAttribute, LinkInfo, LinkMessage};
use rtnetlink::packet_route::neighbour::{
    NeighbourAddress, NeighbourAttribute, NeighbourFlags, NeighbourMessage, NeighbourState,
};
use rtnetlink::packet_route::{AddressFamily, RouteNetlinkMessage};

use crate::errors::FdbError;

/// The all-zero MAC identifying head-end replication flood entries.
pub const FLOOD_MAC: [u8; 6] = [0, 0, 0, 0, 0, 0];

/// A kernel network interface, as much of it as this crate cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub index: u32,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Vxlan { vni: u32 },
    Other,
}

/// The kernel operations higher layers need. Implemented by [`Netlink`] for
/// the real thing and by in-memory doubles in tests.
#[async_trait]
pub trait NetlinkOps: Send + Sync {
    /// Enumerate all interfaces on the host.
    async fn list_links(&self) -> Result<Vec<Link>, FdbError>;

    /// Look up one interface by name. Absence is [`FdbError::LinkNotFound`].
    async fn link_by_name(&self, name: &str) -> Result<Link, FdbError>;

    /// First IPv4 address assigned to the named interface.
    async fn ipv4_for_interface(&self, name: &str) -> Result<Ipv4Addr, FdbError>;

    /// Destinations of all flood entries (bridge family, all-zero MAC) on a link.
    async fn flood_entries(&self, index: u32) -> Result<BTreeSet<Ipv4Addr>, FdbError>;

    /// Append a flood entry. Append, not replace: the kernel keeps several
    /// flood entries with the same MAC and different destinations, and
    /// replace semantics would collapse them.
    async fn append_flood(&self, index: u32, dst: Ipv4Addr) -> Result<(), FdbError>;

    /// Delete one flood entry.
    async fn delete_flood(&self, index: u32, dst: Ipv4Addr) -> Result<(), FdbError>;

    /// Delete an interface (shutdown cleanup only).
    async fn delete_link(&self, index: u32) -> Result<(), FdbError>;
}

/// The rtnetlink-backed implementation of [`NetlinkOps`].
#[derive(Clone)]
pub struct Netlink {
    handle: Handle,
}

impl Netlink {
    /// Open a netlink socket and spawn its connection task on the current
    /// tokio runtime.
    pub fn connect() -> Result<Netlink, FdbError> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Ok(Netlink { handle })
    }

    /// Issue a hand-built request and wait for its ack.
    async fn acked(&self, req: NetlinkMessage<RouteNetlinkMessage>) -> Result<(), FdbError> {
        let mut handle = self.handle.clone();
        let mut response = handle.request(req)?;
        while let Some(message) = response.next().await {
            if let NetlinkPayload::Error(err) = message.payload {
                if err.code.is_some() {
                    return Err(rtnetlink::Error::NetlinkError(err).into());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NetlinkOps for Netlink {
    async fn list_links(&self) -> Result<Vec<Link>, FdbError> {
        let mut links = Vec::new();
        let mut dump = self.handle.link().get().execute();
        while let Some(message) = dump.try_next().await? {
            if let Some(link) = parse_link(&message) {
                links.push(link);
            }
        }
        Ok(links)
    }

    async fn link_by_name(&self, name: &str) -> Result<Link, FdbError> {
        let mut dump = self.handle.link().get().match_name(name.to_string()).execute();
        match dump.try_next().await {
            Ok(Some(message)) => {
                parse_link(&message).ok_or_else(|| FdbError::LinkNotFound(name.to_string()))
            }
            Ok(None) => Err(FdbError::LinkNotFound(name.to_string())),
            Err(err) if is_not_found(&err) => Err(FdbError::LinkNotFound(name.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn ipv4_for_interface(&self, name: &str) -> Result<Ipv4Addr, FdbError> {
        let link = self.link_by_name(name).await?;
        let mut dump = self
            .handle
            .address()
            .get()
            .set_link_index_filter(link.index)
            .execute();
        while let Some(message) = dump.try_next().await? {
            for attribute in &message.attributes {
                if let AddressAttribute::Address(IpAddr::V4(ip)) = attribute {
                    return Ok(*ip);
                }
            }
        }
        Err(FdbError::NoIpv4(name.to_string()))
    }

    async fn flood_entries(&self, index: u32) -> Result<BTreeSet<Ipv4Addr>, FdbError> {
        // The typed neighbour dump cannot ask for AF_BRIDGE, so build the
        // RTM_GETNEIGH request by hand.
        let mut message = NeighbourMessage::default();
        message.header.family = AddressFamily::Bridge;
        message.header.ifindex = index;
        let mut req = NetlinkMessage::from(RouteNetlinkMessage::GetNeighbour(message));
        req.header.flags = NLM_F_REQUEST | NLM_F_DUMP;

        let mut handle = self.handle.clone();
        let mut response = handle.request(req)?;
        let mut entries = BTreeSet::new();
        while let Some(message) = response.next().await {
            match message.payload {
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewNeighbour(neighbour)) => {
                    if let Some(dst) = flood_destination(&neighbour, index) {
                        entries.insert(dst);
                    }
                }
                NetlinkPayload::Error(err) if err.code.is_some() => {
                    return Err(rtnetlink::Error::NetlinkError(err).into());
                }
                _ => {}
            }
        }
        Ok(entries)
    }

    async fn append_flood(&self, index: u32, dst: Ipv4Addr) -> Result<(), FdbError> {
        let mut req =
            NetlinkMessage::from(RouteNetlinkMessage::NewNeighbour(flood_message(index, dst)));
        req.header.flags = NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_APPEND;
        self.acked(req).await
    }

    async fn delete_flood(&self, index: u32, dst: Ipv4Addr) -> Result<(), FdbError> {
        let mut req =
            NetlinkMessage::from(RouteNetlinkMessage::DelNeighbour(flood_message(index, dst)));
        req.header.flags = NLM_F_REQUEST | NLM_F_ACK;
        self.acked(req).await
    }

    async fn delete_link(&self, index: u32) -> Result<(), FdbError> {
        self.handle.link().del(index).execute().await?;
        Ok(())
    }
}

/// Build the neighbour message describing one flood entry:
/// `(link index, all-zero MAC, destination, NUD_PERMANENT, NTF_SELF, AF_BRIDGE)`.
fn flood_message(index: u32, dst: Ipv4Addr) -> NeighbourMessage {
    let mut message = NeighbourMessage::default();
    message.header.family = AddressFamily::Bridge;
    message.header.ifindex = index;
    message.header.state = NeighbourState::Permanent;
    message.header.flags = NeighbourFlags::Own;
    message
        .attributes
        .push(NeighbourAttribute::LinkLayerAddress(FLOOD_MAC.to_vec()));
    message
        .attributes
        .push(NeighbourAttribute::Destination(NeighbourAddress::Inet(dst)));
    message
}

/// Extract the IPv4 destination from a dumped neighbour iff it is a flood
/// entry on the given link. Entries with a real MAC (unicast learning
/// results and friends) are invisible to this crate.
fn flood_destination(neighbour: &NeighbourMessage, index: u32) -> Option<Ipv4Addr> {
    if neighbour.header.family != AddressFamily::Bridge || neighbour.header.ifindex != index {
        return None;
    }
    let mut lladdr = None;
    let mut destination = None;
    for attribute in &neighbour.attributes {
        match attribute {
            NeighbourAttribute::LinkLayerAddress(addr) => lladdr = Some(addr.as_slice()),
            NeighbourAttribute::Destination(addr) => destination = Some(addr),
            _ => {}
        }
    }
    if lladdr != Some(FLOOD_MAC.as_slice()) {
        return None;
    }
    match destination {
        Some(NeighbourAddress::Inet(ip)) => Some(*ip),
        _ => None,
    }
}

fn parse_link(message: &LinkMessage) -> Option<Link> {
    let mut name = None;
    let mut kind = LinkKind::Other;
    for attribute in &message.attributes {
        match attribute {
            LinkAttribute::IfName(ifname) => name = Some(ifname.clone()),
            LinkAttribute::LinkInfo(infos) => kind = vxlan_kind(infos),
            _ => {}
        }
    }
    Some(Link {
        name: name?,
        index: message.header.index,
        kind,
    })
}

fn vxlan_kind(infos: &[LinkInfo]) -> LinkKind {
    let mut is_vxlan = false;
    let mut vni = None;
    for info in infos {
        match info {
            LinkInfo::Kind(InfoKind::Vxlan) => is_vxlan = true,
            LinkInfo::Data(InfoData::Vxlan(data)) => {
                for datum in data {
                    if let InfoVxlan::Id(id) = datum {
                        vni = Some(*id);
                    }
                }
            }
            _ => {}
        }
    }
    match (is_vxlan, vni) {
        (true, Some(vni)) => LinkKind::Vxlan { vni },
        _ => LinkKind::Other,
    }
}

fn is_not_found(err: &rtnetlink::Error) -> bool {
    match err {
        rtnetlink::Error::NetlinkError(message) => matches!(
            message.code.map(NonZeroI32::get),
            Some(code) if -code == libc::ENODEV || -code == libc::ENOENT
        ),
        _ => false,
    }
}
