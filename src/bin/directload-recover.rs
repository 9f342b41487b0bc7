//! Stand-alone recovery tool: repairs partially written relations left
//! behind by a loader that crashed or was killed mid-load
//! (spec.md §4.8). Run once per data directory, before the host
//! database is brought back up.
//!
//! Usage: `directload-recover <datadir>`

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use env_logger::Builder;
use log::{error, info};

use directload::recovery::{self, AssumeUncleanShutdown};

fn init_log() {
    let mut builder = Builder::from_default_env();
    builder
        .format_timestamp_secs()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();
}

fn main() -> ExitCode {
    init_log();

    let datadir = match std::env::args().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => {
            eprintln!("usage: directload-recover <datadir>");
            return ExitCode::FAILURE;
        }
    };

    // Interpreting global/pg_control's DB_SHUTDOWNED state is the host
    // database's job, not this tool's; until it's wired to a real
    // reader, recovery conservatively assumes the worst and always
    // repairs page content.
    match recovery::run(&datadir, &AssumeUncleanShutdown) {
        Ok(outcome) => {
            info!(
                "recovery complete: {} load status file(s) examined, {} block(s) zeroed",
                outcome.lsfs_examined, outcome.blocks_zeroed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("recovery failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
