// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The agent: shared state, the watch consumer, the poll loop, and per-VNI
//! reconciliation.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use config::{Config, Vni, VniConfig};
use fdb_manager::{NetlinkOps, VxlanManager};
use gobgp_client::apipb::Path;
use gobgp_client::{PathBatchStream, RouteService};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decode;
use crate::errors::AgentError;

/// How long to wait before re-subscribing after the watch stream ends.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
/// Cadence of the periodic probe that catches manual vxlan create/delete.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The VNI registry: community and id lookups plus the per-VNI managers.
/// All three maps move together; dynamic mode adds and removes entries
/// atomically under one lock.
#[derive(Default)]
pub(crate) struct VniMaps {
    pub(crate) by_community: HashMap<config::Community, Vni>,
    pub(crate) by_id: HashMap<Vni, VniConfig>,
    pub(crate) managers: HashMap<Vni, Arc<VxlanManager>>,
}

/// The agent's most recently published membership route, if any, and the
/// community list it carried. Used to turn redundant updates into no-ops.
#[derive(Default)]
pub(crate) struct LocalPathState {
    pub(crate) published: Option<Path>,
    pub(crate) communities: Vec<u32>,
}

pub struct Agent {
    pub(crate) cfg: Config,
    pub(crate) local_ip: Ipv4Addr,
    pub(crate) dynamic_vni: bool,
    pub(crate) bgp: Arc<dyn RouteService>,
    pub(crate) netlink: Arc<dyn NetlinkOps>,
    // Lock order, when more than one is needed: maps, desired, online,
    // local_path. None is ever held across an RPC or netlink call.
    pub(crate) maps: Mutex<VniMaps>,
    pub(crate) desired: Mutex<HashMap<Vni, BTreeSet<Ipv4Addr>>>,
    pub(crate) online: Mutex<HashMap<Vni, bool>>,
    pub(crate) local_path: Mutex<LocalPathState>,
}

/// Mutex access that shrugs off poisoning; no guard outlives a statement
/// that does I/O.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Agent {
    /// Build the agent from a validated config and the two capability
    /// surfaces it drives. Resolves the local underlay address and registers
    /// all statically configured VNIs.
    pub async fn new(
        cfg: Config,
        bgp: Arc<dyn RouteService>,
        netlink: Arc<dyn NetlinkOps>,
    ) -> Result<Agent, AgentError> {
        let local_ip = match cfg.node.local_address {
            Some(ip) => ip,
            None => netlink.ipv4_for_interface(&cfg.node.local_interface).await?,
        };

        let mut maps = VniMaps::default();
        for vni_cfg in &cfg.vnis {
            maps.by_community.insert(vni_cfg.community, vni_cfg.id);
            maps.by_id.insert(vni_cfg.id, vni_cfg.clone());
            maps.managers.insert(
                vni_cfg.id,
                Arc::new(VxlanManager::new(
                    vni_cfg.clone(),
                    cfg.node.vxlan_port,
                    local_ip,
                    Arc::clone(&netlink),
                )),
            );
        }

        if cfg.node.auto_recreate_vxlan {
            info!("autoRecreateVxlan is set but reserved; it has no effect");
        }

        let dynamic_vni = cfg.dynamic_vni();
        Ok(Agent {
            cfg,
            local_ip,
            dynamic_vni,
            bgp,
            netlink,
            maps: Mutex::new(maps),
            desired: Mutex::new(HashMap::new()),
            online: Mutex::new(HashMap::new()),
            local_path: Mutex::new(LocalPathState::default()),
        })
    }

    #[must_use]
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// Run until cancellation: seed the registry, probe online state, start
    /// the poll loop, and consume the watch stream, re-subscribing on error.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), AgentError> {
        if self.dynamic_vni {
            self.refresh_dynamic_vnis().await;
        }
        // Initial probe: only update online state, never create anything.
        for vni in self.registered_vnis() {
            self.ensure_vni(vni).await;
        }
        if self.cfg.advertise_self {
            self.update_local_path().await.map_err(AgentError::Advertise)?;
        }

        let poller = tokio::spawn({
            let agent = Arc::clone(&self);
            let shutdown = shutdown.clone();
            async move { agent.poll_loop(shutdown).await }
        });

        let result = self.watch_loop(&shutdown).await;
        shutdown.cancel();
        let _ = poller.await;
        result
    }

    /// Shutdown path: optionally delete the interfaces our managers hold.
    pub async fn close(&self) {
        if !self.cfg.link_cleanup() {
            return;
        }
        let managers: Vec<Arc<VxlanManager>> =
            lock(&self.maps).managers.values().cloned().collect();
        for manager in managers {
            if let Err(err) = manager.delete_link().await {
                debug!("cleanup of {} skipped: {err}", manager.device());
            }
        }
    }

    async fn watch_loop(&self, shutdown: &CancellationToken) -> Result<(), AgentError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            match self.watch_once(shutdown).await {
                Ok(()) => return Ok(()),
                Err(err) => warn!("watch stream ended, retrying: {err}"),
            }
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                () = sleep(RECONNECT_BACKOFF) => {}
            }
        }
    }

    /// One watch subscription: decode every delivered batch and reconcile
    /// the touched VNIs. Returns `Ok` only on cancellation.
    async fn watch_once(&self, shutdown: &CancellationToken) -> Result<(), AgentError> {
        let mut batches: PathBatchStream =
            self.bgp.watch_best_paths().await.map_err(AgentError::Watch)?;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                batch = batches.next() => match batch {
                    Some(Ok(paths)) => self.apply_batch(&paths).await,
                    Some(Err(status)) => return Err(AgentError::Watch(status)),
                    None => return Err(AgentError::WatchStreamEnded),
                },
            }
        }
    }

    pub(crate) async fn apply_batch(&self, paths: &[Path]) {
        let touched = {
            let vni_by_community = lock(&self.maps).by_community.clone();
            let mut desired = lock(&self.desired);
            decode::fold_paths(self.local_ip, &vni_by_community, &mut desired, paths)
        };
        for vni in touched {
            self.reconcile_vni(vni).await;
        }
    }

    /// Evaluate online state and, when online, drive the kernel FDB to the
    /// current desired set. A missing link is the normal offline case and
    /// only worth a debug line; everything else is an error and will be
    /// retried by the next cycle.
    pub(crate) async fn reconcile_vni(&self, vni: Vni) {
        if !self.ensure_vni(vni).await {
            return;
        }
        let Some(manager) = self.manager(vni) else {
            return;
        };
        let snapshot = self.snapshot_desired(vni);
        if let Err(err) = manager.sync_fdb(&snapshot).await {
            if err.is_link_not_found() {
                debug!("vni {vni}: fdb sync skipped, link missing");
            } else {
                error!("vni {vni}: fdb sync failed: {err}");
            }
        }
    }

    /// Probe the VNI's interface and keep the online flag in sync with it.
    /// Every transition republishes the local advertisement.
    pub(crate) async fn ensure_vni(&self, vni: Vni) -> bool {
        let Some(manager) = self.manager(vni) else {
            return false;
        };
        match manager.load_link().await {
            Ok(_) => {
                if !self.online(vni) {
                    info!("vxlan detected: vni {vni} dev {}", manager.device());
                    self.set_online(vni, true);
                    if let Err(err) = self.update_local_path().await {
                        warn!("local path update failed: {err}");
                    }
                }
                true
            }
            Err(_) => {
                if self.online(vni) {
                    info!("vxlan removed: vni {vni} dev {}", manager.device());
                    self.set_online(vni, false);
                    if let Err(err) = self.update_local_path().await {
                        warn!("local path update failed: {err}");
                    }
                }
                false
            }
        }
    }

    /// Timer-driven safety net: re-discover VNIs (dynamic mode) and re-sync
    /// every registered VNI, catching interface changes and FDB drift that
    /// happened between route events.
    async fn poll_loop(&self, shutdown: CancellationToken) {
        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if self.dynamic_vni {
                self.refresh_dynamic_vnis().await;
            }
            for vni in self.registered_vnis() {
                self.reconcile_vni(vni).await;
            }
        }
    }

    pub(crate) fn manager(&self, vni: Vni) -> Option<Arc<VxlanManager>> {
        lock(&self.maps).managers.get(&vni).cloned()
    }

    pub(crate) fn registered_vnis(&self) -> Vec<Vni> {
        lock(&self.maps).managers.keys().copied().collect()
    }

    pub(crate) fn online(&self, vni: Vni) -> bool {
        lock(&self.online).get(&vni).copied().unwrap_or(false)
    }

    pub(crate) fn set_online(&self, vni: Vni, up: bool) {
        lock(&self.online).insert(vni, up);
    }

    /// Shallow copy of one VNI's member set, taken under the desired lock so
    /// FDB sync can run without holding it.
    pub(crate) fn snapshot_desired(&self, vni: Vni) -> BTreeSet<Ipv4Addr> {
        lock(&self.desired).get(&vni).cloned().unwrap_or_default()
    }
}
