// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-VNI ownership of one VXLAN interface and its flood FDB entries.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use config::{Vni, VniConfig};
use tracing::debug;

use crate::errors::FdbError;
use crate::netlink::{LinkKind, NetlinkOps};

/// Owns one VXLAN interface. The link handle is resolved lazily, cached,
/// and invalidated whenever a lookup fails; callers treat a failed resolve
/// as the VNI being offline.
pub struct VxlanManager {
    cfg: VniConfig,
    udp_port: u16,
    local_ip: Ipv4Addr,
    netlink: Arc<dyn NetlinkOps>,
    cached_index: Mutex<Option<u32>>,
}

impl VxlanManager {
    #[must_use]
    pub fn new(
        cfg: VniConfig,
        udp_port: u16,
        local_ip: Ipv4Addr,
        netlink: Arc<dyn NetlinkOps>,
    ) -> VxlanManager {
        VxlanManager {
            cfg,
            udp_port,
            local_ip,
            netlink,
            cached_index: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &VniConfig {
        &self.cfg
    }

    #[must_use]
    pub fn vni(&self) -> Vni {
        self.cfg.id
    }

    #[must_use]
    pub fn device(&self) -> &str {
        &self.cfg.device
    }

    #[must_use]
    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    #[must_use]
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// Resolve the configured device, verify it is a VXLAN interface, and
    /// refresh the cached handle.
    pub async fn load_link(&self) -> Result<u32, FdbError> {
        match self.netlink.link_by_name(&self.cfg.device).await {
            Ok(link) => match link.kind {
                LinkKind::Vxlan { .. } => {
                    *self.cache() = Some(link.index);
                    Ok(link.index)
                }
                LinkKind::Other => {
                    *self.cache() = None;
                    Err(FdbError::NotVxlan(self.cfg.device.clone()))
                }
            },
            Err(err) => {
                *self.cache() = None;
                Err(err)
            }
        }
    }

    /// Drive the link's flood FDB toward `desired`: append what is missing,
    /// delete what is stale, leave everything else alone. The first error is
    /// returned but the remaining operations are still attempted; a partially
    /// converged FDB is retried by the next cycle.
    pub async fn sync_fdb(&self, desired: &BTreeSet<Ipv4Addr>) -> Result<(), FdbError> {
        let index = self.load_link().await?;
        let current = self.netlink.flood_entries(index).await?;

        let mut first_error = None;
        for dst in desired.difference(&current) {
            debug!("vni {}: adding flood entry {dst} on {}", self.cfg.id, self.cfg.device);
            if let Err(err) = self.netlink.append_flood(index, *dst).await {
                first_error.get_or_insert(err);
            }
        }
        for dst in current.difference(desired) {
            debug!("vni {}: removing flood entry {dst} on {}", self.cfg.id, self.cfg.device);
            if let Err(err) = self.netlink.delete_flood(index, *dst).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Delete the interface. Only reached from the shutdown path, and only
    /// when link cleanup is enabled.
    pub async fn delete_link(&self) -> Result<(), FdbError> {
        let cached = *self.cache();
        let index = match cached {
            Some(index) => index,
            None => self.netlink.link_by_name(&self.cfg.device).await?.index,
        };
        self.netlink.delete_link(index).await
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<u32>> {
        self.cached_index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::netlink::{FLOOD_MAC, Link};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory kernel double: links plus a per-link FDB that keeps real-MAC
    /// entries alongside flood entries, like the real one does.
    #[derive(Default)]
    struct FakeKernel {
        links: Mutex<Vec<Link>>,
        fdb: Mutex<HashMap<u32, Vec<([u8; 6], Ipv4Addr)>>>,
        appended: Mutex<Vec<Ipv4Addr>>,
        deleted: Mutex<Vec<Ipv4Addr>>,
    }

    impl FakeKernel {
        fn with_links(links: Vec<Link>) -> FakeKernel {
            FakeKernel {
                links: Mutex::new(links),
                ..FakeKernel::default()
            }
        }

        fn seed_fdb(&self, index: u32, entries: Vec<([u8; 6], Ipv4Addr)>) {
            self.fdb.lock().unwrap().insert(index, entries);
        }

        fn fdb_of(&self, index: u32) -> Vec<([u8; 6], Ipv4Addr)> {
            self.fdb.lock().unwrap().get(&index).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl NetlinkOps for FakeKernel {
        async fn list_links(&self) -> Result<Vec<Link>, FdbError> {
            Ok(self.links.lock().unwrap().clone())
        }

        async fn link_by_name(&self, name: &str) -> Result<Link, FdbError> {
            self.links
                .lock()
                .unwrap()
                .iter()
                .find(|link| link.name == name)
                .cloned()
                .ok_or_else(|| FdbError::LinkNotFound(name.to_string()))
        }

        async fn ipv4_for_interface(&self, name: &str) -> Result<Ipv4Addr, FdbError> {
            Err(FdbError::NoIpv4(name.to_string()))
        }

        async fn flood_entries(&self, index: u32) -> Result<BTreeSet<Ipv4Addr>, FdbError> {
            Ok(self
                .fdb_of(index)
                .into_iter()
                .filter(|(mac, _)| *mac == FLOOD_MAC)
                .map(|(_, dst)| dst)
                .collect())
        }

        async fn append_flood(&self, index: u32, dst: Ipv4Addr) -> Result<(), FdbError> {
            self.fdb.lock().unwrap().entry(index).or_default().push((FLOOD_MAC, dst));
            self.appended.lock().unwrap().push(dst);
            Ok(())
        }

        async fn delete_flood(&self, index: u32, dst: Ipv4Addr) -> Result<(), FdbError> {
            if let Some(entries) = self.fdb.lock().unwrap().get_mut(&index) {
                entries.retain(|(mac, entry)| !(*mac == FLOOD_MAC && *entry == dst));
            }
            self.deleted.lock().unwrap().push(dst);
            Ok(())
        }

        async fn delete_link(&self, index: u32) -> Result<(), FdbError> {
            self.links.lock().unwrap().retain(|link| link.index != index);
            Ok(())
        }
    }

    fn vxlan_link(name: &str, index: u32, vni: u32) -> Link {
        Link {
            name: name.to_string(),
            index,
            kind: LinkKind::Vxlan { vni },
        }
    }

    fn manager(kernel: &Arc<FakeKernel>, device: &str, vni: u32) -> VxlanManager {
        let cfg = VniConfig {
            id: Vni::new_checked(vni).unwrap(),
            community: config::Community::new(65000, vni as u16),
            device: device.to_string(),
            underlay_interface: "eth0".to_string(),
        };
        VxlanManager::new(
            cfg,
            4789,
            Ipv4Addr::new(10, 0, 0, 1),
            Arc::clone(kernel) as Arc<dyn NetlinkOps>,
        )
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[tokio::test]
    async fn sync_converges_to_desired_set() {
        let kernel = Arc::new(FakeKernel::with_links(vec![vxlan_link("vxlan100", 7, 100)]));
        kernel.seed_fdb(7, vec![(FLOOD_MAC, addr(9)), (FLOOD_MAC, addr(2))]);
        let manager = manager(&kernel, "vxlan100", 100);

        let desired: BTreeSet<Ipv4Addr> = [addr(2), addr(10)].into_iter().collect();
        manager.sync_fdb(&desired).await.unwrap();

        let observed = kernel.flood_entries(7).await.unwrap();
        assert_eq!(observed, desired);
        assert_eq!(*kernel.appended.lock().unwrap(), vec![addr(10)]);
        assert_eq!(*kernel.deleted.lock().unwrap(), vec![addr(9)]);
    }

    #[tokio::test]
    async fn sync_leaves_unicast_entries_alone() {
        let unicast_mac = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        let kernel = Arc::new(FakeKernel::with_links(vec![vxlan_link("vxlan100", 7, 100)]));
        kernel.seed_fdb(7, vec![(unicast_mac, addr(3)), (FLOOD_MAC, addr(9))]);
        let manager = manager(&kernel, "vxlan100", 100);

        let desired: BTreeSet<Ipv4Addr> = [addr(10)].into_iter().collect();
        manager.sync_fdb(&desired).await.unwrap();

        assert_eq!(*kernel.appended.lock().unwrap(), vec![addr(10)]);
        assert_eq!(*kernel.deleted.lock().unwrap(), vec![addr(9)]);
        assert!(kernel.fdb_of(7).contains(&(unicast_mac, addr(3))));
    }

    #[tokio::test]
    async fn sync_from_arbitrary_start_matches_desired() {
        // One pass must make the flood set equal the desired set, whatever
        // the starting FDB contents.
        let starts: Vec<Vec<u8>> = vec![vec![], vec![2], vec![9, 2, 4], vec![10, 11, 12]];
        let desired: BTreeSet<Ipv4Addr> = [addr(2), addr(5), addr(11)].into_iter().collect();
        for start in starts {
            let kernel = Arc::new(FakeKernel::with_links(vec![vxlan_link("vxlan100", 7, 100)]));
            kernel.seed_fdb(7, start.into_iter().map(|last| (FLOOD_MAC, addr(last))).collect());
            let manager = manager(&kernel, "vxlan100", 100);
            manager.sync_fdb(&desired).await.unwrap();
            assert_eq!(kernel.flood_entries(7).await.unwrap(), desired);
        }
    }

    #[tokio::test]
    async fn missing_link_is_reported_as_such() {
        let kernel = Arc::new(FakeKernel::default());
        let manager = manager(&kernel, "vxlan100", 100);
        let err = manager.sync_fdb(&BTreeSet::new()).await.unwrap_err();
        assert!(err.is_link_not_found());
    }

    #[tokio::test]
    async fn non_vxlan_device_is_fatal_for_the_vni() {
        let kernel = Arc::new(FakeKernel::with_links(vec![Link {
            name: "vxlan100".to_string(),
            index: 7,
            kind: LinkKind::Other,
        }]));
        let manager = manager(&kernel, "vxlan100", 100);
        let err = manager.load_link().await.unwrap_err();
        assert!(matches!(err, FdbError::NotVxlan(_)));
        assert!(!err.is_link_not_found());
    }

    #[tokio::test]
    async fn delete_link_uses_the_cached_handle() {
        let kernel = Arc::new(FakeKernel::with_links(vec![vxlan_link("vxlan100", 7, 100)]));
        let manager = manager(&kernel, "vxlan100", 100);
        manager.load_link().await.unwrap();
        manager.delete_link().await.unwrap();
        assert!(kernel.list_links().await.unwrap().is_empty());
    }
}
