use clap::{Parser, Subcommand};

/// Inspect Outlook recurrence patterns and replay calendars through the
/// meeting presence tracker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Decode a recurrence blob and print its fields
    Decode(DecodeCommand),
    /// Show the next occurrences of a recurrence blob
    Preview(PreviewCommand),
    /// List the Windows to IANA time zone mapping
    Timezones(TimezonesCommand),
    /// Replay a calendar snapshot file through the presence tracker
    Watch(WatchCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct DecodeCommand {
    /// Hex-encoded blob, or @path to a file holding it
    pub blob: String,
    /// Zone the meeting was created in (Windows, display or IANA name)
    #[clap(long)]
    pub timezone: Option<String>,
    /// Busy status of the meeting (free, tentative, busy, oof, elsewhere or a number)
    #[clap(long, default_value = "busy")]
    pub busy: String,
}

#[derive(Parser, Debug, Clone)]
pub struct PreviewCommand {
    /// Hex-encoded blob, or @path to a file holding it
    pub blob: String,
    /// Zone the meeting was created in (Windows, display or IANA name)
    #[clap(long)]
    pub timezone: Option<String>,
    /// Reference time (e.g., 'now', 'next monday 9am', '2025-03-10 14:00')
    #[clap(long)]
    pub now: Option<String>,
    /// Number of occurrences to show
    #[clap(long, short, default_value = "10")]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct TimezonesCommand {
    /// Only show entries whose Windows or IANA name contains this text
    #[clap(long)]
    pub search: Option<String>,
    /// Resolve a single name and show how it maps
    #[clap(long, conflicts_with = "search")]
    pub resolve: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct WatchCommand {
    /// JSON snapshot of calendar items and timed changes
    pub snapshot: std::path::PathBuf,
    /// Seconds of wall-clock time to run before printing the dump
    #[clap(long = "for", default_value = "5")]
    pub duration_secs: u64,
    /// Simulated start time; the clock runs forward from it in real time
    #[clap(long)]
    pub at: Option<String>,
}
