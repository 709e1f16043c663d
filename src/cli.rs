use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "bet-uplink",
    version,
    about = "Lottery agency batch upload client"
)]
pub struct Cli {
    /// JSON config file providing defaults for the flags below
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Agency identifier (0-255), stamped on every frame
    #[clap(short, long)]
    pub agency: Option<u8>,

    /// Aggregator address, host:port
    #[clap(short, long)]
    pub server_addr: Option<String>,

    /// Pause between batches, in milliseconds
    #[clap(short = 'p', long)]
    pub loop_period_ms: Option<u64>,

    /// Maximum records per batch (clamped to 255)
    #[clap(short, long)]
    pub batch_max: Option<usize>,

    /// CSV file with one bet per line
    #[clap(short, long)]
    pub data_file: Option<PathBuf>,
}
