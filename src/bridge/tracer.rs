//! Debug tracer for bridge activity.
//!
//! Captures handle traffic, trampoline calls and type builds with minimal
//! overhead: buffered writes, lazy formatting and early-exit checks when
//! tracing is disabled.
//!
//! ## Environment Variables
//!
//! - `EXTBRIDGE_TRACE`: Enable tracing
//!   - `"1"`, `"true"`, or `"stdout"`: Write to stdout
//!   - `"stderr"`: Write to stderr
//!   - `<path>`: Write to file at path
//!
//! - `EXTBRIDGE_TRACE_FLUSH_INTERVAL`: Number of messages before auto-flush
//!   (default: 10000)
//!
//! The environment is read once, when the bridge is constructed; there is
//! no process-wide tracer state.

use std::{
    cell::{Cell, RefCell},
    env,
    fs::File,
    io::{stderr, stdout, BufWriter, Write},
};

const BUFFER_SIZE: usize = 256 * 1024;
const AUTO_FLUSH_INTERVAL: usize = 10_000;

pub struct Tracer {
    enabled: bool,
    writer: RefCell<Option<BufWriter<Box<dyn Write + Send>>>>,
    message_count: Cell<usize>,
    auto_flush_interval: usize,
}

// No GC pointers to trace
unsafe impl gc_arena::Collect for Tracer {
    fn trace(&self, _cc: &gc_arena::Collection) {}
}

impl Tracer {
    pub fn from_env() -> Self {
        let trace_env = env::var("EXTBRIDGE_TRACE");
        let (enabled, writer): (bool, Option<Box<dyn Write + Send>>) = match trace_env {
            Ok(val) if val == "1" || val == "true" || val == "stdout" => {
                (true, Some(Box::new(stdout())))
            }
            Ok(val) if val == "stderr" => (true, Some(Box::new(stderr()))),
            Ok(val) if !val.is_empty() => match File::create(&val) {
                Ok(f) => (true, Some(Box::new(f))),
                Err(e) => {
                    eprintln!("Failed to create trace file {}: {}", val, e);
                    (false, None)
                }
            },
            _ => (false, None),
        };

        let auto_flush_interval = env::var("EXTBRIDGE_TRACE_FLUSH_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(AUTO_FLUSH_INTERVAL);

        Self {
            enabled,
            writer: RefCell::new(writer.map(|w| BufWriter::with_capacity(BUFFER_SIZE, w))),
            message_count: Cell::new(0),
            auto_flush_interval,
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn msg(&self, args: std::fmt::Arguments) {
        if !self.enabled {
            return;
        }
        if let Some(ref mut writer) = *self.writer.borrow_mut() {
            let _ = writer.write_fmt(args);
            let _ = writer.write_all(b"\n");

            let count = self.message_count.get() + 1;
            self.message_count.set(count);
            if count >= self.auto_flush_interval {
                let _ = writer.flush();
                self.message_count.set(0);
            }
        }
    }

    pub fn flush(&self) {
        if self.enabled {
            if let Some(ref mut writer) = *self.writer.borrow_mut() {
                let _ = writer.flush();
            }
            self.message_count.set(0);
        }
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.flush();
    }
}
