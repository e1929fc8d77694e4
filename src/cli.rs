use clap::{Parser, Subcommand};
use std::net::SocketAddr;

use hookbox::humanize::HumanDuration;

#[derive(Parser, Debug)]
#[command(name = "hookbox")]
#[command(about = "Artifact event notifications: webhooks and P2P preheat", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline and the status hook API
    Serve(ServeArgs),
    /// Remove terminal delivery records older than the retention TTL
    Prune,
    /// Publish an image push event, as the registry would
    Push(PushArgs),
    /// Print the effective configuration as TOML (secrets omitted)
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct PushArgs {
    #[arg(long)]
    pub project_id: u64,
    /// Pushed artifact as repository:tag
    #[arg(long)]
    pub image: String,
    /// Label ids attached to the artifact
    #[arg(long = "label")]
    pub labels: Vec<i64>,
    /// How long to let in-process deliveries run before exiting
    #[arg(long, default_value = "5s")]
    pub wait: HumanDuration,
}
