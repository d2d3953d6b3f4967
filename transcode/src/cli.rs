//! # CLI
//!
//! Command-line interface of the `transcode` gateway. Everything but the configuration file
//! path is optional and, when given, overrides the value read from that file.
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "transcode", version, about = "HTTP/JSON gateway for gRPC services")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "transcode.toml")]
    pub config: PathBuf,

    /// Address the HTTP server listens on (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// The upstream gRPC server URL (e.g. http://localhost:50051)
    #[arg(short, long)]
    pub upstream: Option<String>,

    /// Path to a binary FileDescriptorSet describing the exposed services
    #[arg(short, long)]
    pub descriptor_set: Option<PathBuf>,
}
