use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::data::augment::Augment;
use crate::data::dataset::ImageRecord;
use crate::error::{Error, Result};
use crate::math::init::stream_seed;
use crate::math::Tensor3;

/// A mini-batch of images and their labels, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: Vec<Tensor3>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Iterator adapter that shuffles through a bounded buffer.
///
/// The buffer is filled with up to `capacity` items; each `next` yields a
/// uniformly chosen buffered item and refills from the inner iterator. Once
/// the inner iterator is exhausted the buffer drains in random order. With a
/// capacity of one the input order is kept.
pub struct ShuffleBuffer<I: Iterator> {
    inner: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: StdRng,
}

impl<I: Iterator> ShuffleBuffer<I> {
    pub fn new(inner: I, capacity: usize, rng: StdRng) -> Self {
        let capacity = capacity.max(1);
        ShuffleBuffer {
            inner,
            buffer: Vec::with_capacity(capacity),
            capacity,
            rng,
        }
    }
}

impl<I: Iterator> Iterator for ShuffleBuffer<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        while self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }
        match self.buffer.len() {
            0 => None,
            1 => self.buffer.pop(),
            n => {
                let i = self.rng.gen_range(0..n);
                Some(self.buffer.swap_remove(i))
            }
        }
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
    }
    Ok(())
}

/// Turns a set of records into per-epoch batch streams.
///
/// The training variant augments every sample, groups samples into batches
/// in record order and then shuffles the order of the batches; the
/// validation variant only batches.
pub struct Pipeline<'a> {
    records: &'a [ImageRecord],
    augment: Option<&'a dyn Augment>,
    batch_size: usize,
    shuffle_buffer: usize,
}

impl<'a> Pipeline<'a> {
    pub fn training(
        records: &'a [ImageRecord],
        augment: &'a dyn Augment,
        batch_size: usize,
        shuffle_buffer: usize,
    ) -> Result<Pipeline<'a>> {
        check_batch_size(batch_size)?;
        Ok(Pipeline {
            records,
            augment: Some(augment),
            batch_size,
            shuffle_buffer,
        })
    }

    pub fn validation(records: &'a [ImageRecord], batch_size: usize) -> Result<Pipeline<'a>> {
        check_batch_size(batch_size)?;
        Ok(Pipeline {
            records,
            augment: None,
            batch_size,
            shuffle_buffer: 1,
        })
    }

    /// Number of samples per epoch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        (self.records.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn is_augmented(&self) -> bool {
        self.augment.is_some()
    }

    /// The batches of one epoch, produced lazily.
    ///
    /// A batch is materialised (and augmented, in parallel over its samples)
    /// only when it is yielded. With a `seed`, both the batch order and every
    /// sample's augmentation are a pure function of `(seed, epoch, index)`.
    pub fn epoch(&self, epoch: usize, seed: Option<u64>) -> impl Iterator<Item = Batch> + 'a {
        let epoch_seed = match seed {
            Some(seed) => stream_seed(seed, epoch as u64),
            None => rand::random(),
        };
        let records = self.records;
        let augment = self.augment;
        let batch_size = self.batch_size;

        let order = ShuffleBuffer::new(
            0..self.num_batches(),
            self.shuffle_buffer,
            StdRng::seed_from_u64(stream_seed(epoch_seed, 0)),
        );

        order.map(move |b| {
            let start = b * batch_size;
            let end = (start + batch_size).min(records.len());
            let images: Vec<Tensor3> = (start..end)
                .into_par_iter()
                .map(|i| {
                    let tensor = records[i].tensor();
                    match augment {
                        Some(augment) => {
                            let mut rng = StdRng::seed_from_u64(stream_seed(epoch_seed, i as u64 + 1));
                            augment.augment(&tensor, &mut rng)
                        }
                        None => tensor,
                    }
                })
                .collect();
            let labels = records[start..end].iter().map(|r| r.label).collect();
            Batch { images, labels }
        })
    }
}
