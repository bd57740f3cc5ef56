//! Command-line configuration (§10.1): a `clap` derive surface mirroring
//! the source's `argparse` layout — a required shared-folder path, a port,
//! and, server-only, a sync-mode integer validated at parse time.

use crate::reconciler::SyncMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default port both peers fall back to when `--port` is omitted, matching
/// the source's `argparse` default (its constructor defaults of `60000`
/// were never reachable from the CLI).
pub const DEFAULT_PORT: u16 = 50000;

#[derive(Parser, Debug)]
#[command(name = "foldersync", about = "Bidirectional folder synchronization over TCP")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for one peer and sync its shared folder against ours.
    Server(ServerArgs),
    /// Connect to a running server and sync against it.
    Client(ClientArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Shared folder path.
    #[arg(value_parser = parse_shared_folder)]
    pub shared_folder: PathBuf,

    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Sync mode: 0=CLIENT_PRIORITY, 1=SERVER_PRIORITY, 2=CLIENT_OVERWRITING, 3=SERVER_OVERWRITING.
    #[arg(long, default_value_t = 0, value_parser = parse_sync_mode)]
    pub mode: i64,
}

impl ServerArgs {
    pub fn sync_mode(&self) -> SyncMode {
        SyncMode::from_i64(self.mode).expect("validated at parse time by parse_sync_mode")
    }
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Shared folder path.
    #[arg(value_parser = parse_shared_folder)]
    pub shared_folder: PathBuf,

    /// Server address to connect to.
    #[arg(long, default_value = "0.0.0.0")]
    pub ip: String,

    /// Server port to connect to.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

fn parse_shared_folder(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("not a valid directory path for shared folder: {s}"))
    }
}

fn parse_sync_mode(s: &str) -> Result<i64, String> {
    let value: i64 = s.parse().map_err(|_| format!("invalid sync mode: {s:?}"))?;
    if (0..=3).contains(&value) {
        Ok(value)
    } else {
        Err(format!("sync mode must be 0..=3, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sync_mode_rejects_out_of_range_values() {
        assert!(parse_sync_mode("4").is_err());
        assert!(parse_sync_mode("-1").is_err());
        assert_eq!(parse_sync_mode("2").unwrap(), 2);
    }

    #[test]
    fn parse_shared_folder_rejects_non_directories() {
        assert!(parse_shared_folder("/definitely/not/a/real/path").is_err());
    }

    #[test]
    fn server_args_parses_from_cli_tokens() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::parse_from([
            "foldersync",
            "server",
            dir.path().to_str().unwrap(),
            "--port",
            "12345",
            "--mode",
            "1",
        ]);
        match cli.command {
            Command::Server(args) => {
                assert_eq!(args.port, 12345);
                assert_eq!(args.sync_mode(), SyncMode::ServerPriority);
            }
            Command::Client(_) => panic!("expected server subcommand"),
        }
    }
}
