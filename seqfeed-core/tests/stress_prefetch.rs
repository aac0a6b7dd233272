//! Stress tests for the prefetch pipeline
//!
//! Run with: cargo test --release --test stress_prefetch -- --nocapture

use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::{Array2, Array3};
use seqfeed_core::config::LoaderConfig;
use seqfeed_core::data::{
    Corpus, DataLoader, IndexOptions, Manifest, ManifestCorpus, ManifestRow, MemoryFeatureSource,
    PrefetchLoader, UtteranceIndex, UtteranceRecord,
};
use seqfeed_core::metrics::LoaderMetrics;
use seqfeed_core::observe::MetricsObserver;
use seqfeed_core::runtime::{LoaderRuntime, RuntimeConfig};
use seqfeed_core::{Result, SeqfeedError};

/// Corpus of `n` utterances with varied lengths
fn corpus(n: usize) -> ManifestCorpus<MemoryFeatureSource> {
    let features = MemoryFeatureSource::new();
    let rows = (0..n)
        .map(|i| {
            let frames = 40 + (i * 37) % 400;
            let path = format!("/stress/utt{i:05}.npy");
            features.insert(&path, Array2::from_elem((frames, 40), 1.0));
            ManifestRow::new(frames as u32, path, "1 2 3 4")
        })
        .collect();
    ManifestCorpus::new(Manifest::from_rows("stress.csv", rows), features)
}

fn config(batch_size: usize, max_epoch: u32) -> LoaderConfig {
    LoaderConfig {
        batch_size,
        max_epoch: Some(max_epoch),
        shuffle: true,
        seed: Some(42),
        ..LoaderConfig::default()
    }
}

/// Reference sequence of batch ids from the synchronous loader
fn reference_names(n: usize, batch_size: usize, max_epoch: u32) -> Vec<Vec<String>> {
    DataLoader::new(Arc::new(corpus(n)), config(batch_size, max_epoch))
        .unwrap()
        .map(|step| {
            step.unwrap()
                .batch
                .names()
                .into_iter()
                .map(String::from)
                .collect()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stress_prefetch_matches_synchronous_order() {
    let expected = reference_names(500, 16, 3);

    let loader = DataLoader::new(Arc::new(corpus(500)), config(16, 3)).unwrap();
    let mut prefetch = PrefetchLoader::start(loader);

    let start = Instant::now();
    let mut received = Vec::new();
    while let Some(step) = prefetch.next_step().await {
        let step = step.unwrap();
        received.push(step.batch.names().into_iter().map(String::from).collect::<Vec<_>>());
    }
    let elapsed = start.elapsed();

    assert_eq!(received, expected);
    assert_eq!(prefetch.epoch_detail(), 3.0);
    prefetch.shutdown().await.unwrap();

    println!(
        "Prefetched {} batches in {:?} ({:.0} batches/s)",
        received.len(),
        elapsed,
        received.len() as f64 / elapsed.as_secs_f64()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stress_slow_consumer_bounded_queue() {
    let metrics = Arc::new(LoaderMetrics::new());
    let mut config = config(8, 1);
    config.prefetch.queue_size = 2;
    let loader = DataLoader::with_observer(
        Arc::new(corpus(64)),
        config,
        Box::new(MetricsObserver::new(metrics.clone())),
    )
    .unwrap();
    let mut prefetch = PrefetchLoader::start(loader);

    // Let the producer fill the queue, then check it stopped ahead of us.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let produced = metrics.batches_emitted.get();
    assert!(produced <= 4, "producer ran {produced} batches ahead");

    let mut consumed = 0;
    while let Some(step) = prefetch.next_step().await {
        step.unwrap();
        consumed += 1;
    }
    assert_eq!(consumed, 8);
    prefetch.shutdown().await.unwrap();
    assert_eq!(metrics.batches_emitted.get(), 8);
    assert_eq!(metrics.epochs_completed.get(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stress_shutdown_while_producer_blocked() {
    let mut config = config(1, 50);
    config.prefetch.queue_size = 1;
    let loader = DataLoader::new(Arc::new(corpus(200)), config).unwrap();
    let mut prefetch = PrefetchLoader::start(loader);

    for _ in 0..3 {
        prefetch.next_step().await.unwrap().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = tokio::time::timeout(Duration::from_secs(10), prefetch.shutdown()).await;
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stress_external_shutdown_signal() {
    let loader = DataLoader::new(Arc::new(corpus(200)), config(1, 50)).unwrap();
    let mut prefetch = PrefetchLoader::start(loader);
    prefetch.next_step().await.unwrap().unwrap();

    prefetch.shutdown_signal().shutdown();

    let mut interrupted = false;
    while let Some(step) = prefetch.next_step().await {
        if let Err(err) = step {
            assert!(matches!(err, SeqfeedError::ShutdownInProgress));
            interrupted = true;
        }
    }
    assert!(interrupted);
    prefetch.shutdown().await.unwrap();
}

/// Corpus whose feature loading fails for one utterance
struct FailingCorpus {
    inner: ManifestCorpus<MemoryFeatureSource>,
    poisoned: String,
}

impl Corpus for FailingCorpus {
    fn build_utterance_index(&self, options: &IndexOptions) -> Result<UtteranceIndex> {
        self.inner.build_utterance_index(options)
    }

    fn load_raw_features(&self, record: &UtteranceRecord) -> Result<Array2<f32>> {
        if record.id == self.poisoned {
            return Err(SeqfeedError::FeatureLoad {
                input_path: record.input_path.clone(),
                reason: "corrupt file".into(),
            });
        }
        self.inner.load_raw_features(record)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stress_producer_error_is_delivered_in_order() {
    let corpus = FailingCorpus {
        inner: corpus(40),
        poisoned: "utt00010".into(),
    };
    let loader = DataLoader::new(
        Arc::new(corpus),
        LoaderConfig {
            batch_size: 4,
            max_epoch: Some(1),
            ..LoaderConfig::default()
        },
    )
    .unwrap();
    let mut prefetch = PrefetchLoader::start(loader);

    let mut ok = 0;
    let mut errors = Vec::new();
    while let Some(step) = prefetch.next_step().await {
        match step {
            Ok(_) => ok += 1,
            Err(e) => errors.push(e),
        }
    }

    // Path order puts utt00010 in the third batch.
    assert_eq!(ok, 2);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], SeqfeedError::FeatureLoad { .. }));
    prefetch.shutdown().await.unwrap();
}

#[test]
fn stress_blocking_consumer_on_loader_runtime() {
    let runtime = LoaderRuntime::new(RuntimeConfig {
        worker_threads: 2,
        ..RuntimeConfig::default()
    })
    .unwrap();

    let loader = DataLoader::new(Arc::new(corpus(300)), config(32, 2)).unwrap();
    let mut prefetch = runtime.prefetch(loader);

    let mut utterances = 0;
    let mut epochs = 0;
    while let Some(step) = prefetch.blocking_next() {
        let step = step.unwrap();
        let batch = step.batch.as_single().unwrap();
        let padded: &Array3<f32> = &batch.inputs;
        assert_eq!(padded.dim().0, batch.len());
        utterances += batch.len();
        if step.is_new_epoch {
            epochs += 1;
        }
    }

    assert_eq!(utterances, 600);
    assert_eq!(epochs, 2);
    prefetch.blocking_shutdown().unwrap();
    runtime.shutdown();
}
