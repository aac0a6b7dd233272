//! Loader inspection binary
//!
//! Iterates a manifest through the prefetch pipeline and prints one JSON
//! summary per epoch.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use seqfeed_core::data::{Corpus, HierarchicalCorpus, Manifest, ManifestCorpus, NpyFeatureSource};
use seqfeed_core::metrics::LoaderMetrics;
use seqfeed_core::observe::MetricsObserver;
use seqfeed_core::{DataLoader, LoaderConfig, PrefetchLoader};

#[derive(Debug, Default, Serialize)]
struct EpochReport {
    epoch: u32,
    batches: usize,
    utterances: usize,
    dropped: usize,
    min_batch: usize,
    max_batch: usize,
    max_frames: usize,
}

impl EpochReport {
    fn new(epoch: u32) -> Self {
        Self {
            epoch,
            min_batch: usize::MAX,
            ..Self::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match std::env::var("SEQFEED_CONFIG") {
        Ok(path) => LoaderConfig::from_toml_file(path)?,
        Err(_) => LoaderConfig::default(),
    };
    if config.max_epoch.is_none() {
        config.max_epoch = Some(1);
    }

    let manifest_path = std::env::var("SEQFEED_MANIFEST")
        .map_err(|_| "SEQFEED_MANIFEST must point at a manifest CSV")?;
    let features = match std::env::var("SEQFEED_FEATURE_ROOT") {
        Ok(root) => NpyFeatureSource::with_root(root),
        Err(_) => NpyFeatureSource::new(),
    };

    info!("Loading manifest {}", manifest_path);
    let main = Manifest::from_path(&manifest_path)?;
    let corpus: Arc<dyn Corpus> = match std::env::var("SEQFEED_MANIFEST_SUB") {
        Ok(sub_path) => {
            info!("Loading sub-label manifest {}", sub_path);
            Arc::new(HierarchicalCorpus::new(main, Manifest::from_path(&sub_path)?, features))
        }
        Err(_) => Arc::new(ManifestCorpus::new(main, features)),
    };

    let metrics = Arc::new(LoaderMetrics::new());
    let observer = Box::new(MetricsObserver::new(metrics.clone()));
    let loader = DataLoader::with_observer(corpus, config, observer)?;
    info!(
        "{} utterances, nominal batch size {}",
        loader.num_utterances(),
        loader.nominal_batch_size()
    );

    let mut prefetch = PrefetchLoader::start(loader);
    let mut report = EpochReport::new(0);
    while let Some(step) = prefetch.next_step().await {
        let step = match step {
            Ok(step) => step,
            Err(e) => {
                error!("Loading failed: {}", e);
                prefetch.shutdown().await?;
                return Err(e.into());
            }
        };

        let size = step.batch.num_utterances();
        report.batches += 1;
        report.utterances += size;
        report.dropped += step.batch.dropped().len();
        report.min_batch = report.min_batch.min(size);
        report.max_batch = report.max_batch.max(size);
        if let Some(batch) = step.batch.as_single() {
            report.max_frames = report.max_frames.max(batch.max_input_len());
        } else if let Some(devices) = step.batch.as_devices() {
            let frames = devices.batches.iter().map(|b| b.max_input_len()).max().unwrap_or(0);
            report.max_frames = report.max_frames.max(frames);
        }

        if step.is_new_epoch {
            println!("{}", serde_json::to_string(&report)?);
            report = EpochReport::new(report.epoch + 1);
        }
    }

    prefetch.shutdown().await?;
    info!("Final metrics:\n{}", metrics.export());
    Ok(())
}
