use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Bounded-memory capture of a provider's combined stdout/stderr.
///
/// Bytes observed are always counted via [`OutputBuffer::bytes_seen`], which
/// the `Watchdog` samples to decide whether a task is making progress — this
/// counter climbs even once the in-memory capture is full and lines are being
/// spilled to disk, so a verbose-but-alive provider is never mistaken for a
/// stalled one. Mirrors the discard-with-marker discipline of
/// `wrapper_events`'s bounded line reader, generalized from "per-line cap" to
/// "whole-run capture budget."
pub struct OutputBuffer {
    max_capture_bytes: usize,
    captured: Mutex<Vec<u8>>,
    captured_len: AtomicU64,
    total_bytes_seen: AtomicU64,
    truncated: AtomicBool,
    spill: Mutex<Option<File>>,
    spill_path: Option<PathBuf>,
}

impl OutputBuffer {
    pub fn new(max_capture_bytes: usize) -> Self {
        Self {
            max_capture_bytes,
            captured: Mutex::new(Vec::new()),
            captured_len: AtomicU64::new(0),
            total_bytes_seen: AtomicU64::new(0),
            truncated: AtomicBool::new(false),
            spill: Mutex::new(None),
            spill_path: None,
        }
    }

    /// Spills bytes beyond the in-memory cap to `path` instead of discarding
    /// them outright, so the full transcript survives for the artifact
    /// writer even when it's too large to hold in memory.
    pub fn with_spill_path(mut self, path: PathBuf) -> Self {
        self.spill_path = Some(path);
        self
    }

    /// Appends a chunk of raw child output. Always advances the progress
    /// counter; only appends to the in-memory capture (or spill file) while
    /// budget remains.
    pub fn append(&self, chunk: &[u8]) -> std::io::Result<()> {
        self.total_bytes_seen
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);

        let mut captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = self
            .max_capture_bytes
            .saturating_sub(captured.len());

        if remaining > 0 {
            let take = remaining.min(chunk.len());
            captured.extend_from_slice(&chunk[..take]);
            self.captured_len
                .store(captured.len() as u64, Ordering::Relaxed);
            if take < chunk.len() {
                self.truncated.store(true, Ordering::Relaxed);
                self.spill(&chunk[take..])?;
            }
        } else {
            self.truncated.store(true, Ordering::Relaxed);
            drop(captured);
            self.spill(chunk)?;
        }
        Ok(())
    }

    fn spill(&self, chunk: &[u8]) -> std::io::Result<()> {
        let Some(path) = &self.spill_path else {
            return Ok(());
        };
        let mut guard = self.spill.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(File::create(path)?);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(chunk)?;
        }
        Ok(())
    }

    /// Total bytes observed since creation, regardless of capture/spill
    /// state. Monotonically non-decreasing; the `Watchdog` compares
    /// successive samples of this to detect stalls.
    pub fn bytes_seen(&self) -> u64 {
        self.total_bytes_seen.load(Ordering::Relaxed)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::Relaxed)
    }

    pub fn spill_path(&self) -> Option<&PathBuf> {
        self.spill_path.as_ref()
    }

    /// Lossily decodes the in-memory capture. Does not include spilled
    /// bytes; callers that need the full transcript should read
    /// `spill_path()` separately.
    pub fn captured_text(&self) -> String {
        let captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&captured).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_counter_advances_past_capture_budget() {
        let buf = OutputBuffer::new(4);
        buf.append(b"abcd").unwrap();
        buf.append(b"efgh").unwrap();
        assert_eq!(buf.bytes_seen(), 8);
        assert_eq!(buf.captured_text(), "abcd");
        assert!(buf.is_truncated());
    }

    #[test]
    fn under_budget_capture_is_exact_and_not_truncated() {
        let buf = OutputBuffer::new(64);
        buf.append(b"hello ").unwrap();
        buf.append(b"world").unwrap();
        assert_eq!(buf.captured_text(), "hello world");
        assert!(!buf.is_truncated());
        assert_eq!(buf.bytes_seen(), 11);
    }

    #[test]
    fn spill_path_receives_overflow_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let spill_path = dir.path().join("spill.log");
        let buf = OutputBuffer::new(2).with_spill_path(spill_path.clone());
        buf.append(b"abcdef").unwrap();
        assert_eq!(buf.captured_text(), "ab");
        let spilled = std::fs::read_to_string(&spill_path).unwrap();
        assert_eq!(spilled, "cdef");
    }
}
