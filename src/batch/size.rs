use std::io;

use serde::Serialize;

use crate::error::Result;

/// Write sink that keeps nothing but the number of bytes written.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteCounter {
    written: u64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Exact length of `serde_json::to_vec(value)` without building the buffer.
///
/// Uses the same compact serializer as the upload payload, so batch sizes
/// line up with what is sent.
pub fn json_size<T: Serialize + ?Sized>(value: &T) -> Result<u64> {
    let mut counter = ByteCounter::new();
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.written())
}

/// A document paired with its serialized size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measured<D> {
    document: D,
    size: u64,
}

impl<D: Serialize> Measured<D> {
    pub fn new(document: D) -> Result<Self> {
        let size = json_size(&document)?;
        Ok(Self { document, size })
    }
}

impl<D> Measured<D> {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn into_parts(self) -> (D, u64) {
        (self.document, self.size)
    }
}
