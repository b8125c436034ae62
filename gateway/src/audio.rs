//! The Input-Audio Buffer (spec §3, §4.3): an append-only log of PCM bytes
//! with a sample-offset cursor, a committed low-water mark, and capacity
//! based backpressure.

use crate::error::GatewayError;

pub struct InputAudioBuffer {
    bytes: Vec<u8>,
    committed_offset: usize,
    capacity_bytes: usize,
}

impl InputAudioBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            bytes: Vec::new(),
            committed_offset: 0,
            capacity_bytes,
        }
    }

    pub fn write_cursor(&self) -> usize {
        self.bytes.len()
    }

    pub fn committed_offset(&self) -> usize {
        self.committed_offset
    }

    pub fn pending_len(&self) -> usize {
        self.bytes.len() - self.committed_offset
    }

    /// Appends PCM bytes. Fails with `input_audio_buffer_overrun` without
    /// mutating the buffer when the append would exceed capacity —
    /// previously accepted bytes are always retained.
    pub fn append(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        let projected_pending = self.pending_len() + data.len();
        if projected_pending > self.capacity_bytes {
            return Err(GatewayError::InputAudioBufferOverrun(format!(
                "appending {} bytes would exceed the {}-byte buffer cap",
                data.len(),
                self.capacity_bytes
            )));
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Resets the write cursor to `committed_offset`, dropping any
    /// un-committed bytes.
    pub fn clear(&mut self) {
        self.bytes.truncate(self.committed_offset);
    }

    /// Seals the pending region `(committed_offset, write_cursor]` and
    /// advances `committed_offset` to the write cursor. Returns `None` if
    /// there is nothing pending.
    pub fn commit(&mut self) -> Option<Vec<u8>> {
        if self.pending_len() == 0 {
            return None;
        }
        let sealed = self.bytes[self.committed_offset..].to_vec();
        self.committed_offset = self.bytes.len();
        Some(sealed)
    }

    /// Seals the pending region up to (but not including) `end_offset`,
    /// used by server-VAD auto-commit on a falling edge. `end_offset` is
    /// clamped to the current write cursor.
    pub fn commit_to(&mut self, end_offset: usize) -> Option<Vec<u8>> {
        let end = end_offset.min(self.bytes.len());
        if end <= self.committed_offset {
            return None;
        }
        let sealed = self.bytes[self.committed_offset..end].to_vec();
        self.committed_offset = end;
        Some(sealed)
    }

    pub fn bytes_in_flight(&self) -> &[u8] {
        &self.bytes[self.committed_offset..]
    }
}
