use std::num::NonZeroUsize;

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

/// Bounded pool of encode buffers.
///
/// At most `max_pooled` idle buffers are retained; buffers released into a
/// full pool, or grown far past the configured capacity, are dropped.
#[derive(Debug)]
pub struct EnvelopeBufferPool {
    buffers: ArrayQueue<BytesMut>,
    buffer_capacity: usize,
}

impl EnvelopeBufferPool {
    pub fn new(max_pooled: NonZeroUsize, buffer_capacity: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(max_pooled.get()),
            buffer_capacity,
        }
    }

    /// Take an empty buffer, allocating if the pool is drained.
    pub fn acquire(&self) -> BytesMut {
        self.buffers
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity))
    }

    /// Return a buffer for reuse.
    pub fn release(&self, mut buffer: BytesMut) {
        if buffer.capacity() > self.buffer_capacity.saturating_mul(4) {
            return;
        }
        buffer.clear();
        let _ = self.buffers.push(buffer);
    }

    /// Idle buffers currently pooled.
    pub fn available(&self) -> usize {
        self.buffers.len()
    }

    pub fn max_pooled(&self) -> usize {
        self.buffers.capacity()
    }
}
