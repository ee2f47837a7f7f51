// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Streaming and unary RPC plumbing against a co-located gobgpd.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;
use tonic::transport::{Channel, Endpoint};

use crate::apipb::gobgp_api_client::GobgpApiClient;
use crate::apipb::{
    AddPathRequest, Family, ListPathRequest, Path, TableType, WatchEventRequest,
    watch_event_request, watch_event_response,
};

/// Paths per watch-event batch requested from the daemon.
pub const WATCH_BATCH_SIZE: u32 = 128;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// A stream of best-path batches from the daemon's watch subscription.
pub type PathBatchStream = Pin<Box<dyn Stream<Item = Result<Vec<Path>, Status>> + Send>>;

/// The routing-daemon operations the agent needs. Implemented by
/// [`GobgpClient`] for the real daemon and by in-memory doubles in tests.
#[async_trait]
pub trait RouteService: Send + Sync {
    /// Subscribe to best-path changes on the global table, initial snapshot
    /// included. The stream is unbounded; it ends when the daemon goes away.
    async fn watch_best_paths(&self) -> Result<PathBatchStream, Status>;

    /// Full IPv4-unicast snapshot of the global table, flattened to paths.
    /// The configured timeout bounds the whole call.
    async fn list_paths(&self) -> Result<Vec<Path>, Status>;

    async fn add_path(&self, path: Path) -> Result<(), Status>;

    async fn delete_path(&self, path: Path) -> Result<(), Status>;
}

/// tonic-backed GoBGP client. Cheap to clone; all clones share the channel.
#[derive(Clone)]
pub struct GobgpClient {
    inner: GobgpApiClient<Channel>,
    timeout: Duration,
}

impl GobgpClient {
    /// Connect to gobgpd over insecure loopback transport. The connect
    /// itself is bounded by `timeout`; failure here is fatal to startup.
    pub async fn connect(
        address: &str,
        timeout: Duration,
    ) -> Result<GobgpClient, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))?
            .connect_timeout(timeout)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);
        let channel = endpoint.connect().await?;
        Ok(GobgpClient {
            inner: GobgpApiClient::new(channel),
            timeout,
        })
    }

    fn ipv4_unicast() -> Family {
        Family {
            afi: crate::apipb::family::Afi::Ip as i32,
            safi: crate::apipb::family::Safi::Unicast as i32,
        }
    }
}

#[async_trait]
impl RouteService for GobgpClient {
    async fn watch_best_paths(&self) -> Result<PathBatchStream, Status> {
        let request = WatchEventRequest {
            peer: None,
            table: Some(watch_event_request::Table {
                filters: vec![watch_event_request::table::Filter {
                    r#type: watch_event_request::table::filter::Type::Best as i32,
                    init: true,
                    peer_address: String::new(),
                }],
            }),
            batch_size: WATCH_BATCH_SIZE,
        };
        let stream = self
            .inner
            .clone()
            .watch_event(request)
            .await?
            .into_inner();
        let batches = stream.filter_map(|event| match event {
            Ok(response) => match response.event {
                Some(watch_event_response::Event::Table(table)) => Some(Ok(table.paths)),
                _ => None,
            },
            Err(status) => Some(Err(status)),
        });
        Ok(Box::pin(batches))
    }

    async fn list_paths(&self) -> Result<Vec<Path>, Status> {
        let request = ListPathRequest {
            table_type: TableType::Global as i32,
            name: String::new(),
            family: Some(GobgpClient::ipv4_unicast()),
        };
        let mut client = self.inner.clone();
        let snapshot = async {
            let mut stream = client.list_path(request).await?.into_inner();
            let mut paths = Vec::new();
            while let Some(response) = stream.next().await {
                if let Some(destination) = response?.destination {
                    paths.extend(destination.paths);
                }
            }
            Ok(paths)
        };
        time::timeout(self.timeout, snapshot)
            .await
            .map_err(|_| Status::deadline_exceeded("list path timed out"))?
    }

    async fn add_path(&self, path: Path) -> Result<(), Status> {
        let request = AddPathRequest {
            table_type: TableType::Global as i32,
            vrf_id: String::new(),
            path: Some(path),
        };
        let mut client = self.inner.clone();
        time::timeout(self.timeout, client.add_path(request))
            .await
            .map_err(|_| Status::deadline_exceeded("add path timed out"))??;
        Ok(())
    }

    async fn delete_path(&self, path: Path) -> Result<(), Status> {
        let request = crate::apipb::DeletePathRequest {
            table_type: TableType::Global as i32,
            vrf_id: String::new(),
            family: Some(GobgpClient::ipv4_unicast()),
            path: Some(path),
            uuid: Vec::new(),
        };
        let mut client = self.inner.clone();
        time::timeout(self.timeout, client.delete_path(request))
            .await
            .map_err(|_| Status::deadline_exceeded("delete path timed out"))??;
        Ok(())
    }
}
