// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::path::PathBuf;

pub(crate) use clap::Parser;

#[derive(Parser)]
#[command(name = "evpn-agent")]
#[command(about = "Fold gobgpd best paths into VXLAN flood-FDB state", long_about = None)]
pub(crate) struct CmdArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "PATH", default_value = "/etc/evpn-agent/config.yaml")]
    pub(crate) config: PathBuf,
}
