// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Keep the agent's own tagged `/32` in sync with which VNIs are online.

use gobgp_client::path;
use tonic::Status;
use tracing::{info, warn};

use crate::agent::{Agent, lock};

impl Agent {
    /// Communities of every online VNI, ascending and deduplicated. Two
    /// identical online sets always produce the same list, which is what
    /// makes the no-op comparison in [`Agent::update_local_path`] sound.
    pub(crate) fn collect_local_communities(&self) -> Vec<u32> {
        let maps = lock(&self.maps);
        let online = lock(&self.online);
        let mut communities: Vec<u32> = online
            .iter()
            .filter(|(_, up)| **up)
            .filter_map(|(vni, _)| maps.by_id.get(vni))
            .map(|cfg| cfg.community.as_u32())
            .collect();
        communities.sort_unstable();
        communities.dedup();
        communities
    }

    /// Publish, replace, or withdraw the local membership route so that it
    /// carries exactly the online communities. Identical recomputations are
    /// no-ops and cost zero RPCs. Replacement is delete-then-add: the daemon
    /// keys paths by their attributes, so changing the community list needs
    /// an explicit retract for downstream consumers to observe a coherent
    /// transition.
    pub(crate) async fn update_local_path(&self) -> Result<(), Status> {
        if !self.cfg.advertise_self {
            return Ok(());
        }
        let communities = self.collect_local_communities();
        let previous = {
            let mut state = lock(&self.local_path);
            if state.communities == communities {
                return Ok(());
            }
            state.communities = communities.clone();
            state.published.take()
        };

        if let Some(previous) = previous {
            if let Err(err) = self.bgp.delete_path(previous).await {
                warn!("withdrawing previous local path failed: {err}");
            }
        }
        if communities.is_empty() {
            return Ok(());
        }

        let published = path::build_host_path(self.local_ip, &communities);
        self.bgp.add_path(published.clone()).await?;
        lock(&self.local_path).published = Some(published);
        info!(
            "advertised membership: {}/32 communities {communities:?}",
            self.local_ip
        );
        Ok(())
    }
}
