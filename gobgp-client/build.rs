// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        unsafe {
            std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
        }
    }
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/gobgp.proto"], &["proto"])?;
    Ok(())
}
