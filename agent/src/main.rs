// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::process::ExitCode;
use std::sync::Arc;

use evpn_agent::Agent;
use fdb_manager::Netlink;
use gobgp_client::GobgpClient;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod args;
use args::{CmdArgs, Parser};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CmdArgs::parse();
    let cfg = config::load(&args.config);
    init_tracing(cfg.as_ref().map_or(config::LogLevel::Info, |c| c.log_level));
    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            return ExitCode::FAILURE;
        }
    };

    let netlink = match Netlink::connect() {
        Ok(netlink) => netlink,
        Err(err) => {
            error!("failed to open netlink socket: {err}");
            return ExitCode::FAILURE;
        }
    };
    let bgp = match GobgpClient::connect(&cfg.gobgp.address, cfg.gobgp.timeout).await {
        Ok(client) => client,
        Err(err) => {
            error!("connect gobgp at {}: {err}", cfg.gobgp.address);
            return ExitCode::FAILURE;
        }
    };

    let agent = match Agent::new(cfg, Arc::new(bgp), Arc::new(netlink)).await {
        Ok(agent) => Arc::new(agent),
        Err(err) => {
            error!("failed to init agent: {err}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let result = Arc::clone(&agent).run(shutdown).await;
    agent.close().await;
    match result {
        Ok(()) => {
            info!("agent stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("agent exited with error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
        error!("failed to install SIGINT handler");
        return;
    };
    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        error!("failed to install SIGTERM handler");
        return;
    };
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    info!("signal received, shutting down");
    shutdown.cancel();
}

fn init_tracing(level: config::LogLevel) {
    let max_level = match level {
        config::LogLevel::Debug => tracing::Level::DEBUG,
        config::LogLevel::Info => tracing::Level::INFO,
        config::LogLevel::Warn => tracing::Level::WARN,
        config::LogLevel::Error => tracing::Level::ERROR,
    };
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .init();
}
