//! Shared datagram buffer pool
//!
//! Every UDP relay loop borrows its receive buffer from one server-wide
//! pool. Buffers are zeroed before reuse so no payload bytes leak between
//! sessions.

use std::sync::Mutex;

/// Pool of fixed-size byte buffers
#[derive(Debug)]
pub struct BytePool {
    size: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BytePool {
    /// Create a pool handing out buffers of `size` bytes
    pub fn new(size: usize) -> Self {
        BytePool {
            size,
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Buffer size handed out by this pool
    pub fn buffer_size(&self) -> usize {
        self.size
    }

    /// Take a zeroed buffer from the pool, allocating if empty
    pub fn get(&self) -> Vec<u8> {
        let pooled = self.buffers.lock().expect("byte pool lock poisoned").pop();
        pooled.unwrap_or_else(|| vec![0u8; self.size])
    }

    /// Return a buffer to the pool, zeroing it first
    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.len() != self.size {
            return;
        }

        buf.fill(0);
        self.buffers
            .lock()
            .expect("byte pool lock poisoned")
            .push(buf);
    }
}
