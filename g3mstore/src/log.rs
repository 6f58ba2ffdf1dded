/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Local;
use slog::{Discard, Drain, KV, Key, Level, Logger, OwnedKVList, Record, Serializer, slog_o};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Default)]
struct KvCollector {
    pairs: Vec<(String, String)>,
}

impl Serializer for KvCollector {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        self.pairs.push((key.to_string(), val.to_string()));
        Ok(())
    }
}

fn write_plain<W: Write>(
    io: &mut W,
    level: Level,
    message: &str,
    pairs: &[(String, String)],
) -> io::Result<()> {
    write!(io, "{}", Local::now().format(TIME_FORMAT))?;
    write!(io, " {level}")?;
    for (k, v) in pairs {
        write!(io, " {k}: {v},")?;
    }
    if message.is_empty() {
        writeln!(io, " ()")
    } else {
        writeln!(io, " {message}")
    }
}

/// Synchronous drain writing one plain text line per record.
pub struct PlainDrain<W: Write> {
    io: Mutex<W>,
}

impl<W: Write> PlainDrain<W> {
    pub fn new(io: W) -> Self {
        PlainDrain { io: Mutex::new(io) }
    }
}

impl<W: Write> Drain for PlainDrain<W> {
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let mut kv = KvCollector::default();
        record
            .kv()
            .serialize(record, &mut kv)
            .and_then(|_| values.serialize(record, &mut kv))
            .map_err(|_| io::Error::other("failed to serialize log key-values"))?;

        let mut buf = Vec::with_capacity(256);
        write_plain(&mut buf, record.level(), &record.msg().to_string(), &kv.pairs)?;

        let mut io = self.io.lock().unwrap_or_else(|e| e.into_inner());
        io.write_all(&buf)?;
        io.flush()
    }
}

pub fn new_stderr_logger(level: Level) -> Logger {
    let drain = PlainDrain::new(io::stderr())
        .filter_level(level)
        .ignore_res();
    Logger::root(drain, slog_o!("daemon" => "g3mstore"))
}

pub fn discard_logger() -> Logger {
    Logger::root(Discard, slog_o!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::slog_info;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_line() {
        let mut buf = Vec::new();
        let pairs = vec![("name".to_string(), "hits".to_string())];
        write_plain(&mut buf, Level::Warning, "restore done", &pairs).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.ends_with(" WARN name: hits, restore done\n"));

        let mut buf = Vec::new();
        write_plain(&mut buf, Level::Info, "", &[]).unwrap();
        assert!(String::from_utf8(buf).unwrap().ends_with(" INFO ()\n"));
    }

    #[test]
    fn drain_filter() {
        let out = SharedBuf::default();
        let drain = PlainDrain::new(out.clone())
            .filter_level(Level::Info)
            .ignore_res();
        let logger = Logger::root(drain, slog_o!("component" => "test"));

        slog::slog_debug!(logger, "hidden");
        slog_info!(logger, "saved {} metrics", 3; "kind" => "gauge");

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("kind: gauge,"));
        assert!(text.contains("component: test,"));
        assert!(text.ends_with("saved 3 metrics\n"));
    }
}
