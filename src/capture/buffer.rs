//! Bounded chunk buffer
//!
//! Holds the encoded chunks of a single recording in arrival order. Once the
//! buffered total exceeds the ceiling the oldest chunks are dropped, which
//! keeps very long recordings from exhausting memory at the cost of their
//! beginning.

use std::collections::VecDeque;

/// Default memory ceiling for one recording (50 MiB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug)]
pub struct ChunkBuffer {
    chunks: VecDeque<Vec<u8>>,
    total_bytes: usize,
    max_bytes: usize,
    evicted_bytes: usize,
}

impl ChunkBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            total_bytes: 0,
            max_bytes,
            evicted_bytes: 0,
        }
    }

    /// Append a chunk, evicting the oldest ones if the ceiling is exceeded.
    ///
    /// Empty chunks are ignored. Returns the number of bytes evicted by this
    /// push. The newest chunk is always kept, even if it alone is larger than
    /// the ceiling.
    pub fn push(&mut self, chunk: Vec<u8>) -> usize {
        if chunk.is_empty() {
            return 0;
        }

        self.total_bytes += chunk.len();
        self.chunks.push_back(chunk);

        let mut evicted = 0;
        while self.total_bytes > self.max_bytes && self.chunks.len() > 1 {
            if let Some(oldest) = self.chunks.pop_front() {
                self.total_bytes -= oldest.len();
                evicted += oldest.len();
            }
        }
        self.evicted_bytes += evicted;
        evicted
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Bytes dropped by the ceiling since the buffer was created
    pub fn evicted_bytes(&self) -> usize {
        self.evicted_bytes
    }

    /// Concatenate all buffered chunks into one payload, leaving the buffer empty
    pub fn take_payload(&mut self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks.drain(..) {
            payload.extend_from_slice(&chunk);
        }
        self.total_bytes = 0;
        payload
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut buffer = ChunkBuffer::new(1024);
        buffer.push(vec![1, 2]);
        buffer.push(vec![3]);
        buffer.push(vec![4, 5, 6]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_bytes(), 6);
        assert_eq!(buffer.take_payload(), vec![1, 2, 3, 4, 5, 6]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn test_empty_chunks_ignored() {
        let mut buffer = ChunkBuffer::new(1024);
        buffer.push(Vec::new());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_evicts_oldest_over_ceiling() {
        let mut buffer = ChunkBuffer::new(10);
        buffer.push(vec![0; 4]);
        buffer.push(vec![1; 4]);
        let evicted = buffer.push(vec![2; 4]);

        assert_eq!(evicted, 4);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_bytes(), 8);
        assert_eq!(buffer.evicted_bytes(), 4);

        let payload = buffer.take_payload();
        assert_eq!(&payload[..4], &[1; 4]);
        assert_eq!(&payload[4..], &[2; 4]);
    }

    #[test]
    fn test_oversized_chunk_is_kept() {
        let mut buffer = ChunkBuffer::new(4);
        buffer.push(vec![0; 2]);
        buffer.push(vec![9; 16]);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_bytes(), 16);
    }
}
