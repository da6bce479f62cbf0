use serde::Serialize;

use crate::batch::size::Measured;
use crate::error::Result;

/// Documents ready for a single upload call.
///
/// Every batch produced by a [`BatchAccumulator`] satisfies
/// `len() <= max_count` and `bytes() <= max_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<D> {
    documents: Vec<D>,
    bytes: u64,
}

impl<D> Batch<D> {
    pub fn documents(&self) -> &[D] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Sum of the serialized sizes of the documents.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_documents(self) -> Vec<D> {
        self.documents
    }
}

/// Result of offering one document to the accumulator.
#[derive(Debug)]
pub enum Admission<D> {
    /// The document is buffered. If it did not fit next to the buffered ones,
    /// the previous contents were flushed first and are returned here.
    Accepted { flushed: Option<Batch<D>> },
    /// The document alone exceeds the per-document ceiling and can never be uploaded.
    Oversize { document: D, size: u64 },
}

/// Count- and size-bounded batching with flush-before-add.
#[derive(Debug)]
pub struct BatchAccumulator<D> {
    documents: Vec<D>,
    bytes: u64,
    max_count: usize,
    max_bytes: u64,
    max_document_bytes: u64,
}

impl<D> BatchAccumulator<D> {
    /// `max_count` of zero is treated as one.
    pub fn new(max_count: usize, max_bytes: u64) -> Self {
        let max_count = max_count.max(1);
        Self {
            documents: Vec::with_capacity(max_count.min(4096)),
            bytes: 0,
            max_count,
            max_bytes,
            max_document_bytes: max_bytes,
        }
    }

    /// Reject single documents above `bytes`; capped at the batch ceiling.
    pub fn with_max_document_bytes(mut self, bytes: u64) -> Self {
        self.max_document_bytes = bytes.min(self.max_bytes);
        self
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn max_document_bytes(&self) -> u64 {
        self.max_document_bytes
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Running size of the buffered documents.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_full(&self) -> bool {
        self.documents.len() >= self.max_count
    }

    /// Offer a document whose serialized size is already known.
    pub fn consider_add_measured(&mut self, measured: Measured<D>) -> Admission<D> {
        let (document, size) = measured.into_parts();
        if size > self.max_document_bytes {
            return Admission::Oversize { document, size };
        }

        let flushed = if self.is_full() || self.bytes.saturating_add(size) > self.max_bytes {
            self.take()
        } else {
            None
        };

        self.documents.push(document);
        self.bytes += size;
        Admission::Accepted { flushed }
    }

    /// Emit the buffered documents.
    ///
    /// Without `force` only a full buffer is emitted; with `force` any
    /// non-empty buffer is (end of stream).
    pub fn flush(&mut self, force: bool) -> Option<Batch<D>> {
        if force || self.is_full() {
            self.take()
        } else {
            None
        }
    }

    fn take(&mut self) -> Option<Batch<D>> {
        if self.documents.is_empty() {
            return None;
        }
        let documents = std::mem::replace(
            &mut self.documents,
            Vec::with_capacity(self.max_count.min(4096)),
        );
        let bytes = std::mem::take(&mut self.bytes);
        Some(Batch { documents, bytes })
    }
}

impl<D: Serialize> BatchAccumulator<D> {
    /// Measure `document` and offer it. Fails only if it cannot be serialized.
    pub fn consider_add(&mut self, document: D) -> Result<Admission<D>> {
        Ok(self.consider_add_measured(Measured::new(document)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted<D: std::fmt::Debug>(admission: Admission<D>) -> Option<Batch<D>> {
        match admission {
            Admission::Accepted { flushed } => flushed,
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn flushes_by_count() {
        let mut acc = BatchAccumulator::new(2, u64::MAX);
        assert!(accepted(acc.consider_add(1u32).unwrap()).is_none());
        assert!(!acc.is_full());
        assert!(accepted(acc.consider_add(2u32).unwrap()).is_none());
        assert!(acc.is_full());

        let batch = acc.flush(false).unwrap();
        assert_eq!(batch.documents(), &[1, 2]);
        assert!(acc.is_empty());
        assert_eq!(acc.bytes(), 0);
    }

    #[test]
    fn flushes_before_add_when_bytes_would_overflow() {
        // "aaaa" serializes to 6 bytes
        let mut acc = BatchAccumulator::new(10, 13);
        assert!(accepted(acc.consider_add("aaaa").unwrap()).is_none());
        assert!(accepted(acc.consider_add("bbbb").unwrap()).is_none());
        assert_eq!(acc.bytes(), 12);

        let flushed = accepted(acc.consider_add("cccc").unwrap()).unwrap();
        assert_eq!(flushed.documents(), &["aaaa", "bbbb"]);
        assert_eq!(flushed.bytes(), 12);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.bytes(), 6);
    }

    #[test]
    fn exact_fit_does_not_flush() {
        let mut acc = BatchAccumulator::new(10, 12);
        accepted(acc.consider_add("aaaa").unwrap());
        assert!(accepted(acc.consider_add("bbbb").unwrap()).is_none());
        assert_eq!(acc.bytes(), 12);
    }

    #[test]
    fn oversize_document_never_enters_a_batch() {
        let mut acc = BatchAccumulator::new(10, 5);
        match acc.consider_add("too long").unwrap() {
            Admission::Oversize { document, size } => {
                assert_eq!(document, "too long");
                assert_eq!(size, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(acc.is_empty());
        assert!(acc.flush(true).is_none());
    }

    #[test]
    fn document_ceiling_is_separate_from_batch_ceiling() {
        // "aaaa" is 6 bytes, "aaaaaaaa" is 10
        let mut acc = BatchAccumulator::new(10, 100).with_max_document_bytes(8);
        assert!(matches!(
            acc.consider_add("aaaaaaaa").unwrap(),
            Admission::Oversize { size: 10, .. }
        ));
        accepted(acc.consider_add("aaaa").unwrap());
        accepted(acc.consider_add("bbbb").unwrap());
        assert_eq!(acc.bytes(), 12);

        let capped = BatchAccumulator::<u8>::new(10, 100).with_max_document_bytes(1_000);
        assert_eq!(capped.max_document_bytes(), 100);
    }

    #[test]
    fn full_buffer_is_flushed_before_the_next_add() {
        let mut acc = BatchAccumulator::new(1, u64::MAX);
        accepted(acc.consider_add(1u8).unwrap());
        let flushed = accepted(acc.consider_add(2u8).unwrap()).unwrap();
        assert_eq!(flushed.documents(), &[1]);
        assert_eq!(acc.flush(true).unwrap().documents(), &[2]);
    }

    #[test]
    fn forced_flush_emits_partial_batch_only_when_non_empty() {
        let mut acc = BatchAccumulator::new(3, u64::MAX);
        assert!(acc.flush(true).is_none());
        accepted(acc.consider_add(7u8).unwrap());
        assert!(acc.flush(false).is_none());
        assert_eq!(acc.flush(true).unwrap().into_documents(), vec![7]);
    }
}
