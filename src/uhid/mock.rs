//! In-memory gateway standing in for `/dev/uhid`.
//!
//! Clones share state, so a test keeps one clone for inspection while the
//! device handle owns the other.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::{EventType, Frame, FrameError, Gateway};

/// One operation observed on the mock, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Read(Option<EventType>),
    Write(Option<EventType>),
}

#[derive(Default)]
struct MockState {
    reads: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    log: Vec<MockOp>,
    write_calls: usize,
    short_writes: HashMap<usize, usize>,
    failing_writes: HashMap<usize, io::ErrorKind>,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a frame for the kernel side to deliver.
    pub fn queue_frame(&self, frame: &Frame) -> Result<(), FrameError> {
        let bytes = frame.encode()?;
        self.queue_raw(bytes);
        Ok(())
    }

    /// Queue raw bytes for a single read. An empty buffer reads as end of stream.
    pub fn queue_raw(&self, bytes: Vec<u8>) {
        self.lock().reads.push_back(bytes);
    }

    pub fn queue_eof(&self) {
        self.queue_raw(Vec::new());
    }

    /// Make write call number `call` (0-based) accept only `len` bytes.
    pub fn truncate_write(&self, call: usize, len: usize) {
        self.lock().short_writes.insert(call, len);
    }

    /// Make write call number `call` (0-based) fail with `kind`.
    pub fn fail_write(&self, call: usize, kind: io::ErrorKind) {
        self.lock().failing_writes.insert(call, kind);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Writes that decode as whole frames.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.lock()
            .writes
            .iter()
            .filter_map(|w| Frame::decode(w).ok())
            .collect()
    }

    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    pub fn pending_reads(&self) -> usize {
        self.lock().reads.len()
    }

    pub fn log(&self) -> Vec<MockOp> {
        self.lock().log.clone()
    }
}

fn tag_of(bytes: &[u8]) -> Option<EventType> {
    let raw = bytes.get(..4)?;
    EventType::from_raw(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

impl Read for MockGateway {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let Some(next) = state.reads.pop_front() else {
            return Ok(0);
        };
        let n = next.len().min(buf.len());
        buf[..n].copy_from_slice(&next[..n]);
        state.log.push(MockOp::Read(tag_of(&next)));
        Ok(n)
    }
}

impl Write for MockGateway {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let call = state.write_calls;
        state.write_calls += 1;

        if let Some(kind) = state.failing_writes.get(&call) {
            return Err(io::Error::from(*kind));
        }

        let n = state
            .short_writes
            .get(&call)
            .copied()
            .unwrap_or(buf.len())
            .min(buf.len());
        state.writes.push(buf[..n].to_vec());
        state.log.push(MockOp::Write(tag_of(buf)));
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Gateway for MockGateway {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.lock().reads.is_empty() {
            return Ok(true);
        }
        thread::sleep(timeout);
        Ok(!self.lock().reads.is_empty())
    }
}
