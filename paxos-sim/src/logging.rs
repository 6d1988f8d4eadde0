//! Dual file + console logging, ported from `original_source/utils/logger.py`:
//! a single timestamped file under `logs/`, plus everything mirrored to
//! stdout, both at the CLI-selected level.

use std::fs::{self, OpenOptions, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Initializes the global logger at `level`, writing to both stdout and a
/// fresh file under `logs/`. Returns the file's path for the caller to log.
pub fn init(level: log::LevelFilter) -> PathBuf {
    fs::create_dir_all("logs").expect("failed to create logs directory");
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs();
    let log_path = PathBuf::from(format!("logs/paxos_{timestamp}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|err| panic!("failed to open {}: {err}", log_path.display()));

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(buf, "{} - {} - {} - {}", buf.timestamp(), record.target(), record.level(), record.args())
        })
        .target(env_logger::Target::Pipe(Box::new(Tee { file })))
        .init();

    log_path
}
