//! Process configuration, loaded from CLI flags (teacher's `clap::Parser` style).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "sqs-broker", about = "In-process, SQS wire-compatible message broker")]
pub struct Args {
    #[arg(long, default_value = "9324")]
    pub port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: String,
    #[arg(long, default_value = "us-east-1")]
    pub region: String,
    #[arg(long, default_value = "000000000000")]
    pub account_id: String,
    /// Optional path to persist/restore a snapshot of all queue state.
    #[arg(long)]
    pub snapshot_path: Option<String>,
    /// How often the background sweep re-evaluates visibility/delay deadlines.
    #[arg(long, default_value = "50")]
    pub dispatcher_tick_millis: u64,
}
