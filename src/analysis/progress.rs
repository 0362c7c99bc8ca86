//! Scan progress counters and the reporters that display them.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

/// Live counters of a scan. Advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    /// Files whose declarations were extracted successfully.
    pub files_scanned: usize,
    /// Files skipped because extraction failed.
    pub files_failed: usize,
    /// Records merged so far.
    pub total_components_found: usize,
    /// Directory or file currently being visited.
    pub current_path: String,
}

/// Receives the counters after every visited file.
pub trait ProgressReporter {
    fn report(&mut self, counters: &ProgressCounters);

    /// Called once when the walk is over.
    fn finish(&mut self, _counters: &ProgressCounters) {}
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for &mut P {
    fn report(&mut self, counters: &ProgressCounters) {
        (**self).report(counters)
    }

    fn finish(&mut self, counters: &ProgressCounters) {
        (**self).finish(counters)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _counters: &ProgressCounters) {}
}

/// Emits progress as `debug` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&mut self, counters: &ProgressCounters) {
        debug!(
            path = %counters.current_path,
            files_scanned = counters.files_scanned,
            files_failed = counters.files_failed,
            components = counters.total_components_found,
            "Scan progress"
        );
    }
}

/// Lines in the progress block.
const BLOCK_LINES: u16 = 4;

/// The drawn block and the stream it lives on.
struct Block<W: Write> {
    out: W,
    /// Text of the block currently on screen, if any.
    shown: Option<String>,
}

impl<W: Write> Block<W> {
    /// Erase the block. The cursor ends at the start of its first line.
    fn clear(&mut self) -> io::Result<()> {
        if self.shown.take().is_some() {
            // The cursor sits at the end of the last block line.
            queue!(
                self.out,
                MoveToPreviousLine(BLOCK_LINES - 1),
                Clear(ClearType::FromCursorDown)
            )?;
        }
        Ok(())
    }

    fn draw(&mut self, text: String) -> io::Result<()> {
        self.clear()?;
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        self.shown = Some(text);
        Ok(())
    }

    /// Write `bytes` above the block, then put the block back.
    fn write_above(&mut self, bytes: &[u8]) -> io::Result<()> {
        let shown = self.shown.clone();
        self.clear()?;
        self.out.write_all(bytes)?;
        if !bytes.ends_with(b"\n") {
            self.out.write_all(b"\n")?;
        }
        match shown {
            Some(text) => self.draw(text),
            None => self.out.flush(),
        }
    }
}

fn lock<W: Write>(block: &Mutex<Block<W>>) -> MutexGuard<'_, Block<W>> {
    block.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Redraws a fixed block of lines in place on a terminal.
///
/// Anything else written to the same stream while the block is up must go
/// through [`TerminalProgress::log_writer`], which lifts the block out of
/// the way and redraws it below the new text.
pub struct TerminalProgress<W: Write> {
    block: Arc<Mutex<Block<W>>>,
}

impl TerminalProgress<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            block: Arc::new(Mutex::new(Block { out, shown: None })),
        }
    }

    /// A `tracing` writer sharing this block's stream.
    pub fn log_writer(&self) -> ProgressLogWriter<W> {
        ProgressLogWriter {
            block: Arc::clone(&self.block),
        }
    }
}

impl<W: Write> ProgressReporter for TerminalProgress<W> {
    fn report(&mut self, counters: &ProgressCounters) {
        let text = format!(
            "Scanning path    : {}\nFiles scanned    : {}\nFiles failed     : {}\nComponents found : {}",
            counters.current_path,
            counters.files_scanned,
            counters.files_failed,
            counters.total_components_found
        );
        // Release the lock before logging: log lines go through the block.
        let drawn = lock(&self.block).draw(text);
        if let Err(e) = drawn {
            debug!("Failed to draw progress: {}", e);
        }
    }

    /// Leaves the last block on screen and moves below it.
    fn finish(&mut self, _counters: &ProgressCounters) {
        let mut block = lock(&self.block);
        if block.shown.take().is_some() {
            let _ = writeln!(block.out);
            let _ = block.out.flush();
        }
    }
}

/// [`MakeWriter`] that prints log lines above a [`TerminalProgress`] block.
pub struct ProgressLogWriter<W: Write> {
    block: Arc<Mutex<Block<W>>>,
}

impl<W: Write> Clone for ProgressLogWriter<W> {
    fn clone(&self) -> Self {
        Self {
            block: Arc::clone(&self.block),
        }
    }
}

impl<'a, W: Write + 'a> MakeWriter<'a> for ProgressLogWriter<W> {
    type Writer = LogLine<'a, W>;

    fn make_writer(&'a self) -> Self::Writer {
        LogLine {
            block: &self.block,
            buffer: Vec::new(),
        }
    }
}

/// One buffered log event, written above the block when dropped.
pub struct LogLine<'a, W: Write> {
    block: &'a Mutex<Block<W>>,
    buffer: Vec<u8>,
}

impl<W: Write> Write for LogLine<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Drop for LogLine<'_, W> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            let _ = lock(self.block).write_above(&self.buffer);
        }
    }
}
