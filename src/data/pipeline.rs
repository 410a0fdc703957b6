use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::UNetConfig;
use crate::data::augment::Augmenter;
use crate::data::dataset::{samples, DatasetSource};
use crate::data::preprocess::preprocess_sample;
use crate::data::sample::{Batch, Sample};
use crate::data::weights::ClassWeights;
use crate::error::{Error, Result};

/// A stream of batches that can be moved onto a worker thread.
pub type BatchStream = Box<dyn Iterator<Item = Result<Batch>> + Send>;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Preprocessed samples, materialised once and replayed on every pass.
#[derive(Clone)]
pub struct Cache {
    samples: Arc<Vec<Sample>>,
}

impl Cache {
    /// Drains `source` through `preprocess_sample`. The first failing sample
    /// aborts the whole cache.
    pub fn build(source: Arc<dyn DatasetSource>, config: &UNetConfig) -> Result<Cache> {
        let cached = samples(source)
            .map(|raw| raw.and_then(|raw| preprocess_sample(raw, config)))
            .collect::<Result<Vec<Sample>>>()?;
        debug!(samples = cached.len(), "cached preprocessed split");
        Ok(Cache { samples: Arc::new(cached) })
    }

    pub fn from_samples(samples: Vec<Sample>) -> Cache {
        Cache { samples: Arc::new(samples) }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One pass over the cached samples, in stored order.
    pub fn pass(&self) -> impl Iterator<Item = Sample> + Send {
        let samples = Arc::clone(&self.samples);
        (0..samples.len()).map(move |i| samples[i].clone())
    }
}

/// Reservoir shuffle: keeps up to `capacity` items buffered and yields a
/// uniformly chosen one, refilling from the inner iterator after each pick.
///
/// With `capacity >= len` this is a full shuffle; with `capacity == 1` it is
/// the identity.
pub struct Shuffle<I: Iterator, R> {
    inner: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: R,
}

impl<I: Iterator, R: Rng> Shuffle<I, R> {
    pub fn new(inner: I, capacity: usize, rng: R) -> Self {
        let capacity = capacity.max(1);
        Shuffle { inner, buffer: Vec::with_capacity(capacity), capacity, rng }
    }
}

impl<I: Iterator, R: Rng> Iterator for Shuffle<I, R> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        while self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(pick))
    }
}

/// Groups consecutive items into vectors of `size`; a shorter final group is
/// kept.
pub struct Batched<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Batched<I> {
    pub fn new(inner: I, size: usize) -> Self {
        Batched { inner, size: size.max(1) }
    }
}

impl<I: Iterator> Iterator for Batched<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let group: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if group.is_empty() {
            None
        } else {
            Some(group)
        }
    }
}

/// Restarts a finite iterator forever. `factory(pass)` builds pass number
/// `pass`, which lets each pass reshuffle with fresh randomness.
///
/// Stops if a pass yields nothing, so an empty source cannot spin.
pub struct Repeat<F, I> {
    factory: F,
    current: I,
    pass: usize,
    yielded_this_pass: bool,
}

impl<F, I> Repeat<F, I>
where
    F: FnMut(usize) -> I,
    I: Iterator,
{
    pub fn new(mut factory: F) -> Self {
        let current = factory(0);
        Repeat { factory, current, pass: 0, yielded_this_pass: false }
    }

    /// Index of the pass currently being drained.
    pub fn pass(&self) -> usize {
        self.pass
    }
}

impl<F, I> Iterator for Repeat<F, I>
where
    F: FnMut(usize) -> I,
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        loop {
            if let Some(item) = self.current.next() {
                self.yielded_this_pass = true;
                return Some(item);
            }
            if !self.yielded_this_pass {
                return None;
            }
            self.pass += 1;
            self.yielded_this_pass = false;
            self.current = (self.factory)(self.pass);
        }
    }
}

/// Produce-ahead buffer. A background thread drains the inner iterator into
/// a bounded channel; items arrive in FIFO order.
///
/// The producer stops when the inner iterator ends or when this handle is
/// dropped.
pub struct Prefetch<T> {
    rx: Option<Receiver<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Prefetch<T> {
    pub fn new<I>(inner: I, depth: usize) -> Result<Self>
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        let (tx, rx) = sync_channel(depth.max(1));
        let worker = thread::Builder::new()
            .name("unet-prefetch".into())
            .spawn(move || {
                for item in inner {
                    if tx.send(item).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Prefetch { rx: Some(rx), worker: Some(worker) })
    }
}

impl<T> Iterator for Prefetch<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl<T> Drop for Prefetch<T> {
    fn drop(&mut self) {
        // Closing the receiver makes the producer's next send fail.
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Assembled variants
// ---------------------------------------------------------------------------

fn collect_batch(group: Vec<Result<Sample>>) -> Result<Batch> {
    group.into_iter().collect::<Result<Vec<_>>>().map(Batch::from_samples)
}

/// Builds the three stream variants from one configuration.
pub struct DataPipeline;

impl DataPipeline {
    /// preprocess → cache → shuffle → batch → repeat → augment → weights →
    /// prefetch. Infinite; callers bound it with a step count.
    pub fn training(source: Arc<dyn DatasetSource>, config: &UNetConfig) -> Result<BatchStream> {
        let cache = Cache::build(source, config)?;
        info!(samples = cache.len(), "training pipeline ready");
        Self::repeating(cache, config, config.shuffle_seed, config.augment_seed)
    }

    /// Same stages as `training`, with independent shuffle and augmentation
    /// streams.
    pub fn validation(source: Arc<dyn DatasetSource>, config: &UNetConfig) -> Result<BatchStream> {
        let cache = Cache::build(source, config)?;
        info!(samples = cache.len(), "validation pipeline ready");
        Self::repeating(
            cache,
            config,
            config.shuffle_seed.wrapping_add(1),
            config.augment_seed.wrapping_add(1),
        )
    }

    /// preprocess → batch. Lazy, finite, unshuffled and unweighted.
    pub fn test(source: Arc<dyn DatasetSource>, config: &UNetConfig) -> BatchStream {
        let batch_size = config.batch_size;
        let config = config.clone();
        let preprocessed =
            samples(source).map(move |raw| raw.and_then(|raw| preprocess_sample(raw, &config)));
        Box::new(Batched::new(preprocessed, batch_size).map(collect_batch))
    }

    /// The cache-onward stages shared by training and validation.
    pub fn repeating(
        cache: Cache,
        config: &UNetConfig,
        shuffle_seed: u64,
        augment_seed: u64,
    ) -> Result<BatchStream> {
        if cache.is_empty() {
            return Err(Error::data("cannot build a repeating pipeline over an empty split"));
        }
        let weights = ClassWeights::new(config.class_weights.clone())?;
        let buffer = config.shuffle_buffer;
        let batch_size = config.batch_size;

        let repeated = Repeat::new(move |pass: usize| {
            let rng = StdRng::seed_from_u64(shuffle_seed.wrapping_add(pass as u64));
            Batched::new(Shuffle::new(cache.pass(), buffer, rng), batch_size)
        });
        let mut augmenter = Augmenter::new(augment_seed);
        let weighted = repeated.map(move |group| {
            let batch = augmenter.augment_batch(Batch::from_samples(group));
            weights.weigh_batch(batch)
        });
        Ok(Box::new(Prefetch::new(weighted, config.prefetch_buffer)?))
    }
}
