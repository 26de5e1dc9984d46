use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskrelay")]
#[command(about = "Rate limited job relay for Taskwarrior sync", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and job worker
    Server(ServerArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind, overriding `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file, overriding `TASKRELAY_CONFIG`
    #[arg(long)]
    pub config: Option<PathBuf>,
}
