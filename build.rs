//! Build script for proto compilation.
//!
//! Generates the provider protocol types and the gRPC server trait from
//! `proto/provider.proto` into `OUT_DIR`. Only the server side is built;
//! the host owns the client.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_client(false)
        .build_server(true)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}
