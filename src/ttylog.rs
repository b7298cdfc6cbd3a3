//! Binary framed tty log writer.
//!
//! Per-session append-only recording used for session replay. Each
//! event on the wire: 4-byte little-endian op code, 4-byte
//! little-endian payload length, 8-byte little-endian timestamp
//! (seconds, then microseconds, each as u32), then the payload bytes.
//! Framing style follows `protocol.rs`'s `ChunkExt`, swapped from
//! msgpack-length-prefixing to the fixed tty-log header this format
//! needs.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::consts::{TTYLOG_OP_OPEN, TTYLOG_OP_READ, TTYLOG_OP_WRITE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Builds the conventional tty log path:
/// `<log_path>/tty/<%Y%m%d-%H%M%S>-<random 0..9999>.log`
pub fn session_log_path(log_path: &str, start: DateTime<Utc>) -> PathBuf {
    let disambiguator: u32 = rand::thread_rng().gen_range(0..10000);
    let filename = format!("{}-{:04}.log", start.format("%Y%m%d-%H%M%S"), disambiguator);
    Path::new(log_path).join("tty").join(filename)
}

pub struct TtyLog {
    file: File,
}

impl TtyLog {
    /// Opens (creating parent directories as needed) and writes the
    /// initial OPEN frame.
    pub fn open(path: &Path, start: DateTime<Utc>) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating tty log directory '{}'", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("opening tty log '{}'", path.display()))?;
        let mut log = TtyLog { file };
        log.write_frame(TTYLOG_OP_OPEN, start, &[])?;
        Ok(log)
    }

    pub fn log_read(&mut self, at: DateTime<Utc>, payload: &[u8]) -> anyhow::Result<()> {
        self.write_frame(TTYLOG_OP_READ, at, payload)
    }

    pub fn log_write(&mut self, at: DateTime<Utc>, payload: &[u8]) -> anyhow::Result<()> {
        self.write_frame(TTYLOG_OP_WRITE, at, payload)
    }

    fn write_frame(&mut self, op: u32, at: DateTime<Utc>, payload: &[u8]) -> anyhow::Result<()> {
        let secs = at.timestamp() as u32;
        let micros = at.timestamp_subsec_micros();

        self.file.write_u32::<LittleEndian>(op)?;
        self.file.write_u32::<LittleEndian>(payload.len() as u32)?;
        self.file.write_u32::<LittleEndian>(secs)?;
        self.file.write_u32::<LittleEndian>(micros)?;
        self.file.write_all(payload)?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
pub mod test_reader {
    //! Minimal reader used only by tests to assert on frame content;
    //! a real replay tool is an external collaborator.
    use byteorder::{LittleEndian, ReadBytesExt};
    use std::io::Read;

    #[derive(Debug, PartialEq, Eq)]
    pub struct Frame {
        pub op: u32,
        pub secs: u32,
        pub micros: u32,
        pub payload: Vec<u8>,
    }

    pub fn read_all(mut r: impl Read) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            let op = match r.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(_) => break,
            };
            let len = r.read_u32::<LittleEndian>().unwrap();
            let secs = r.read_u32::<LittleEndian>().unwrap();
            let micros = r.read_u32::<LittleEndian>().unwrap();
            let mut payload = vec![0u8; len as usize];
            r.read_exact(&mut payload).unwrap();
            frames.push(Frame { op, secs, micros, payload });
        }
        frames
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consts::{TTYLOG_OP_OPEN, TTYLOG_OP_READ, TTYLOG_OP_WRITE};
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn open_writes_open_frame_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tty/sess.log");
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        {
            let mut log = TtyLog::open(&path, start).unwrap();
            log.log_read(start, b"l").unwrap();
            log.log_write(start, b"ls\r\n").unwrap();
            log.flush().unwrap();
        }

        let frames = test_reader::read_all(File::open(&path).unwrap());
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].op, TTYLOG_OP_OPEN);
        assert_eq!(frames[0].payload, Vec::<u8>::new());
        assert_eq!(frames[1].op, TTYLOG_OP_READ);
        assert_eq!(frames[1].payload, b"l");
        assert_eq!(frames[2].op, TTYLOG_OP_WRITE);
        assert_eq!(frames[2].payload, b"ls\r\n");
    }

    #[test]
    fn session_log_path_has_expected_shape() {
        let start = Utc.with_ymd_and_hms(2026, 7, 28, 10, 30, 0).unwrap();
        let path = session_log_path("/var/log/honeyssh", start);
        let s = path.to_string_lossy();
        assert!(s.starts_with("/var/log/honeyssh/tty/20260728-103000-"));
        assert!(s.ends_with(".log"));
    }
}
