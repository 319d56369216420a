//! CLI argument parsing for callscope

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "callscope")]
#[command(version)]
#[command(about = "Replay a recorded call/line capture through the request collector", long_about = None)]
pub struct Cli {
    /// Capture file (JSON lines) to replay
    #[arg(value_name = "CAPTURE")]
    pub capture: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project root used to filter and relativize paths (default: current directory)
    #[arg(short = 'r', long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Root of installed third-party dependencies
    #[arg(long = "dependency-root", value_name = "DIR")]
    pub dependency_root: Option<PathBuf>,

    /// Directory for calls.json, lines.json and returns.json
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print only totals instead of per-owner method counts
    #[arg(long = "no-detail")]
    pub no_detail: bool,

    /// Do not trace line events
    #[arg(long = "no-lines")]
    pub no_lines: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
