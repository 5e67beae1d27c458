//! Epoch-aware cursor over a finite, re-openable batch source.
//!
//! Resuming re-opens the source and discards `position` batches, so a
//! [`DataLoader`] must yield the same sequence every time it is opened.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{KarasError, Result};

/// A finite, ordered source of batches that can be re-opened from its start.
///
/// `open` must be deterministic and free of side effects: the iterator
/// re-opens it at every epoch boundary and when fast-forwarding on resume.
pub trait DataLoader {
    type Batch;

    /// Number of batches in one epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh pass over the source, starting at its first batch.
    fn open(&self) -> Box<dyn Iterator<Item = Self::Batch>>;
}

/// In-memory loader over pre-built batches.
#[derive(Debug, Clone)]
pub struct VecLoader<B> {
    batches: Arc<Vec<B>>,
}

impl<B: Clone + 'static> VecLoader<B> {
    pub fn new(batches: Vec<B>) -> Self {
        Self {
            batches: Arc::new(batches),
        }
    }
}

impl<T: Clone + 'static> VecLoader<Vec<T>> {
    /// Group samples into batches of `batch_size`; the last batch may be short.
    pub fn from_samples(samples: Vec<T>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(KarasError::config("batch_size must be positive"));
        }
        let batches = samples
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        Ok(Self::new(batches))
    }
}

impl<B: Clone + 'static> DataLoader for VecLoader<B> {
    type Batch = B;

    fn len(&self) -> usize {
        self.batches.len()
    }

    fn open(&self) -> Box<dyn Iterator<Item = B>> {
        let batches = Arc::clone(&self.batches);
        Box::new((0..batches.len()).map(move |i| batches[i].clone()))
    }
}

/// Serializable cursor position of a [`DataIterator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorState {
    pub epoch: u64,
    pub position: usize,
    pub is_new_epoch: bool,
    pub previous_epoch_detail: Option<f64>,
    pub repeat: bool,
}

/// Cursor that tracks epoch, position and iteration over a [`DataLoader`].
///
/// Each [`advance`](Self::advance) consumes exactly one batch, so
/// `iteration == epoch * len + position` grows by one per call. When the
/// last batch of an epoch is drawn the cursor wraps: `epoch` increments,
/// `position` returns to 0 and `is_new_epoch` is set.
pub struct DataIterator<B> {
    loader: Arc<dyn DataLoader<Batch = B>>,
    cursor: Box<dyn Iterator<Item = B>>,
    repeat: bool,
    epoch: u64,
    position: usize,
    is_new_epoch: bool,
    previous_epoch_detail: Option<f64>,
}

impl<B> DataIterator<B> {
    pub fn new(loader: Arc<dyn DataLoader<Batch = B>>, repeat: bool) -> Result<Self> {
        if loader.is_empty() {
            return Err(KarasError::config("data loader has no batches"));
        }
        let cursor = loader.open();
        Ok(Self {
            loader,
            cursor,
            repeat,
            epoch: 0,
            position: 0,
            is_new_epoch: false,
            previous_epoch_detail: None,
        })
    }

    /// Draw the next batch, wrapping to a new epoch when the source is exhausted.
    pub fn advance(&mut self) -> Result<B> {
        self.previous_epoch_detail = Some(self.epoch_detail());

        let (batch, wrapped) = match self.cursor.next() {
            Some(batch) => (batch, false),
            None => {
                // The source ended before its declared length.
                self.start_epoch();
                let batch = self
                    .cursor
                    .next()
                    .ok_or_else(|| KarasError::config("data loader yielded no batches"))?;
                (batch, true)
            }
        };

        self.position += 1;
        if self.position >= self.loader.len() {
            self.start_epoch();
            self.is_new_epoch = true;
        } else {
            self.is_new_epoch = wrapped;
        }
        Ok(batch)
    }

    /// True while more data is available: always when repeating, otherwise
    /// until the first full pass completes.
    pub fn has_next(&self) -> bool {
        self.repeat || self.epoch == 0
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn iteration(&self) -> u64 {
        self.epoch * self.loader.len() as u64 + self.position as u64
    }

    pub fn is_new_epoch(&self) -> bool {
        self.is_new_epoch
    }

    /// Continuous progress: `epoch + position / len`.
    pub fn epoch_detail(&self) -> f64 {
        self.epoch as f64 + self.position as f64 / self.loader.len() as f64
    }

    /// Epoch detail before the most recent advance; `None` before the first.
    pub fn previous_epoch_detail(&self) -> Option<f64> {
        self.previous_epoch_detail
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn len(&self) -> usize {
        self.loader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loader.is_empty()
    }

    /// Rewind to the very first batch and clear all counters.
    pub fn reset(&mut self) {
        self.cursor = self.loader.open();
        self.epoch = 0;
        self.position = 0;
        self.is_new_epoch = false;
        self.previous_epoch_detail = None;
    }

    pub fn state(&self) -> IteratorState {
        IteratorState {
            epoch: self.epoch,
            position: self.position,
            is_new_epoch: self.is_new_epoch,
            previous_epoch_detail: self.previous_epoch_detail,
            repeat: self.repeat,
        }
    }

    /// Restore counters and fast-forward a fresh pass by `position` batches.
    pub fn load_state(&mut self, state: IteratorState) -> Result<()> {
        if state.position >= self.loader.len() {
            return Err(KarasError::snapshot(format!(
                "iterator position {} out of range for {} batches",
                state.position,
                self.loader.len()
            )));
        }
        let mut cursor = self.loader.open();
        for _ in 0..state.position {
            if cursor.next().is_none() {
                return Err(KarasError::snapshot(
                    "data loader ended while fast-forwarding to the saved position",
                ));
            }
        }
        self.cursor = cursor;
        self.epoch = state.epoch;
        self.position = state.position;
        self.is_new_epoch = state.is_new_epoch;
        self.previous_epoch_detail = state.previous_epoch_detail;
        self.repeat = state.repeat;
        Ok(())
    }

    fn start_epoch(&mut self) {
        self.cursor = self.loader.open();
        self.epoch += 1;
        self.position = 0;
    }
}

impl<B> fmt::Debug for DataIterator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataIterator")
            .field("len", &self.loader.len())
            .field("repeat", &self.repeat)
            .field("epoch", &self.epoch)
            .field("position", &self.position)
            .field("is_new_epoch", &self.is_new_epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iter_over(n: usize, repeat: bool) -> DataIterator<usize> {
        let loader: Arc<dyn DataLoader<Batch = usize>> =
            Arc::new(VecLoader::new((0..n).collect::<Vec<_>>()));
        DataIterator::new(loader, repeat).unwrap()
    }

    #[test]
    fn test_empty_loader_rejected() {
        let loader: Arc<dyn DataLoader<Batch = u8>> = Arc::new(VecLoader::new(Vec::new()));
        assert!(DataIterator::new(loader, true).unwrap_err().is_config());
    }

    #[test]
    fn test_non_repeating_exhaustion() {
        let mut it = iter_over(5, false);
        for i in 0..4 {
            assert_eq!(it.advance().unwrap(), i);
            assert_eq!(it.position(), i + 1);
            assert_eq!(it.epoch(), 0);
            assert!(!it.is_new_epoch());
            assert!(it.has_next());
        }

        assert_eq!(it.advance().unwrap(), 4);
        assert!(it.is_new_epoch());
        assert_eq!(it.epoch(), 1);
        assert_eq!(it.position(), 0);
        assert!(!it.has_next());

        // A sixth draw still restarts from the beginning.
        assert_eq!(it.advance().unwrap(), 0);
        assert_eq!(it.epoch(), 1);
        assert_eq!(it.position(), 1);
        assert!(!it.is_new_epoch());
    }

    /// Declares `len` batches but yields only `actual`.
    struct ShortLoader {
        len: usize,
        actual: usize,
    }

    impl DataLoader for ShortLoader {
        type Batch = usize;

        fn len(&self) -> usize {
            self.len
        }

        fn open(&self) -> Box<dyn Iterator<Item = usize>> {
            Box::new(0..self.actual)
        }
    }

    #[test]
    fn test_short_source_starts_new_epoch() {
        let loader: Arc<dyn DataLoader<Batch = usize>> =
            Arc::new(ShortLoader { len: 4, actual: 2 });
        let mut it = DataIterator::new(loader, true).unwrap();
        assert_eq!(it.advance().unwrap(), 0);
        assert_eq!(it.advance().unwrap(), 1);
        assert!(!it.is_new_epoch());

        // Third draw finds the source exhausted and wraps.
        assert_eq!(it.advance().unwrap(), 0);
        assert!(it.is_new_epoch());
        assert_eq!(it.epoch(), 1);
        assert_eq!(it.position(), 1);

        assert_eq!(it.advance().unwrap(), 1);
        assert!(!it.is_new_epoch());
    }

    #[test]
    fn test_iteration_invariant() {
        let mut it = iter_over(3, true);
        for step in 1..=10u64 {
            it.advance().unwrap();
            assert_eq!(it.iteration(), step);
            assert_eq!(it.iteration(), it.epoch() * 3 + it.position() as u64);
        }
    }

    #[test]
    fn test_epoch_detail_tracking() {
        let mut it = iter_over(4, true);
        assert_eq!(it.previous_epoch_detail(), None);
        it.advance().unwrap();
        assert_eq!(it.previous_epoch_detail(), Some(0.0));
        assert!((it.epoch_detail() - 0.25).abs() < 1e-12);
        for _ in 0..3 {
            it.advance().unwrap();
        }
        assert!((it.previous_epoch_detail().unwrap() - 0.75).abs() < 1e-12);
        assert!((it.epoch_detail() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_state_roundtrip_fast_forwards() {
        let mut it = iter_over(5, true);
        for _ in 0..7 {
            it.advance().unwrap();
        }
        let state = it.state();
        assert_eq!((state.epoch, state.position), (1, 2));

        let mut resumed = iter_over(5, true);
        resumed.load_state(state).unwrap();
        assert_eq!(resumed.iteration(), 7);
        assert_eq!(resumed.advance().unwrap(), it.advance().unwrap());
    }

    #[test]
    fn test_load_state_out_of_range() {
        let mut it = iter_over(3, true);
        let state = IteratorState {
            epoch: 0,
            position: 3,
            is_new_epoch: false,
            previous_epoch_detail: None,
            repeat: true,
        };
        assert!(matches!(
            it.load_state(state),
            Err(KarasError::Snapshot(_))
        ));
    }

    #[test]
    fn test_reset() {
        let mut it = iter_over(2, false);
        it.advance().unwrap();
        it.advance().unwrap();
        assert!(!it.has_next());
        it.reset();
        assert!(it.has_next());
        assert_eq!(it.iteration(), 0);
        assert_eq!(it.previous_epoch_detail(), None);
    }

    #[test]
    fn test_from_samples_batches() {
        let loader = VecLoader::from_samples((0..7).collect::<Vec<i32>>(), 3).unwrap();
        assert_eq!(loader.len(), 3);
        let batches: Vec<_> = loader.open().collect();
        assert_eq!(batches[2], vec![6]);
        assert!(VecLoader::from_samples(vec![1], 0).is_err());
    }
}
