#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use std::{
    fmt,
    io::{BufRead, BufWriter, Write},
    path::Path,
    str::FromStr,
};

use anyhow::Context;
use clap::ArgMatches;
use compress_io::compress::CompressIo;
use serde::{de::DeserializeOwned, Serialize};

/// LogLevel
///
/// Represents minimum level of messages that will be logged
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel {
    pub level: usize,
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel { level: 0 }),
            "warn" => Ok(LogLevel { level: 1 }),
            "info" => Ok(LogLevel { level: 2 }),
            "debug" => Ok(LogLevel { level: 3 }),
            "trace" => Ok(LogLevel { level: 4 }),
            "none" => Ok(LogLevel { level: 5 }),
            _ => Err("no match"),
        }
    }
}

impl LogLevel {
    pub fn is_none(&self) -> bool {
        self.level > 4
    }
    pub fn get_level(&self) -> usize {
        if self.level > 4 {
            0
        } else {
            self.level
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_str = ["error", "warn", "info", "debug", "trace", "none"];
        if self.level < 6 {
            write!(f, "{}", level_str[self.level])
        } else {
            write!(f, "unknown")
        }
    }
}

/// Initialize logging from command line arguments
pub fn init_log(m: &ArgMatches) -> anyhow::Result<()> {
    let verbose = m
        .get_one::<LogLevel>("loglevel")
        .copied()
        .unwrap_or(LogLevel { level: 2 });
    let quiet = verbose.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .copied()
        .unwrap_or(stderrlog::Timestamp::Off);

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbose.get_level())
        .timestamp(ts)
        .init()
        .with_context(|| "Could not initialize logging")
}

/// Read in next line and split on tabs after trimming white space
pub fn get_next_line<'a, R: BufRead>(
    rdr: &mut R,
    buf: &'a mut String,
) -> anyhow::Result<Option<Vec<&'a str>>> {
    buf.clear();
    if rdr.read_line(buf)? == 0 {
        Ok(None)
    } else {
        Ok(Some(buf.trim().split('\t').collect()))
    }
}

/// Read a JSON document from a (possibly compressed) file
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(fname: P) -> anyhow::Result<T> {
    let fname = fname.as_ref();
    trace!("Opening JSON file {} for reading", fname.display());
    let rdr = CompressIo::new()
        .path(fname)
        .bufreader()
        .with_context(|| format!("Error opening JSON file {}", fname.display()))?;
    serde_json::from_reader(rdr)
        .with_context(|| format!("Error parsing JSON from {}", fname.display()))
}

/// Write a JSON document with four space indentation.
///
/// Output goes to a temporary file next to the target which is then renamed
/// over it, so the target is either the old or the complete new document.
/// The temporary file is removed if writing fails.
pub fn write_json<T: Serialize, P: AsRef<Path>>(fname: P, data: &T) -> anyhow::Result<()> {
    let fname = fname.as_ref();
    let file_name = fname
        .file_name()
        .ok_or_else(|| anyhow!("Invalid output file name {}", fname.display()))?;
    let dir = match fname.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };

    let tmp = tempfile::Builder::new()
        .prefix(file_name)
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Error creating temporary file in {}", dir.display()))?;
    trace!("Writing JSON to temporary file {}", tmp.path().display());

    let mut wrt = BufWriter::new(tmp);
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut wrt, fmt);
    data.serialize(&mut ser)
        .with_context(|| format!("Error writing JSON for {}", fname.display()))?;
    writeln!(wrt)?;
    let tmp = wrt
        .into_inner()
        .map_err(|e| anyhow!("Error flushing output for {}: {}", fname.display(), e.error()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Error syncing output for {}", fname.display()))?;

    tmp.persist(fname)
        .with_context(|| format!("Error renaming temporary file to {}", fname.display()))?;
    Ok(())
}
