//! Corpus abstraction
//!
//! A corpus knows how to list its utterances and how to fetch the raw
//! feature matrix of one of them. Ordering, batching and epoch accounting
//! are written once against this trait.

use ndarray::{Array2, ShapeBuilder};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use super::index::{IndexOptions, UtteranceIndex, UtteranceRecord};
use super::manifest::Manifest;
use crate::error::{Result, SeqfeedError};

/// Source of per-utterance `[T, F]` feature matrices
pub trait FeatureSource: Send + Sync {
    /// Load the features referenced by `input_path`
    fn load(&self, input_path: &str) -> Result<Array2<f32>>;
}

/// Corpus-specific loading capabilities
pub trait Corpus: Send + Sync {
    /// List the utterances of this corpus, filtered per `options`
    fn build_utterance_index(&self, options: &IndexOptions) -> Result<UtteranceIndex>;

    /// Load the untransformed features of one utterance
    fn load_raw_features(&self, record: &UtteranceRecord) -> Result<Array2<f32>>;
}

/// Reads 2-D `f32` arrays from `.npy` files
#[derive(Debug, Clone, Default)]
pub struct NpyFeatureSource {
    root: Option<PathBuf>,
}

impl NpyFeatureSource {
    /// Resolve input paths as given
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative input paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, input_path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(input_path),
            None => PathBuf::from(input_path),
        }
    }
}

impl FeatureSource for NpyFeatureSource {
    fn load(&self, input_path: &str) -> Result<Array2<f32>> {
        let load_err = |reason: String| SeqfeedError::FeatureLoad {
            input_path: input_path.to_string(),
            reason,
        };

        let path = self.resolve(input_path);
        let file = File::open(&path).map_err(|e| load_err(format!("{}: {e}", path.display())))?;
        let npy = npyz::NpyFile::new(BufReader::new(file)).map_err(|e| load_err(e.to_string()))?;

        let shape = npy.shape().to_vec();
        if shape.len() != 2 {
            return Err(load_err(format!("expected a 2-D array, found shape {shape:?}")));
        }
        let (frames, dim) = (shape[0] as usize, shape[1] as usize);
        let fortran = matches!(npy.order(), npyz::Order::Fortran);
        let data: Vec<f32> = npy.into_vec().map_err(|e| load_err(e.to_string()))?;

        let array = if fortran {
            Array2::from_shape_vec((frames, dim).f(), data)
        } else {
            Array2::from_shape_vec((frames, dim), data)
        };
        array.map_err(|e| load_err(e.to_string()))
    }
}

/// Feature matrices held in memory, keyed by input path
#[derive(Debug, Default)]
pub struct MemoryFeatureSource {
    features: RwLock<HashMap<String, Array2<f32>>>,
}

impl MemoryFeatureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the features for `input_path`
    pub fn insert(&self, input_path: impl Into<String>, features: Array2<f32>) {
        self.features.write().insert(input_path.into(), features);
    }

    /// Number of stored matrices
    pub fn len(&self) -> usize {
        self.features.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.read().is_empty()
    }
}

impl FeatureSource for MemoryFeatureSource {
    fn load(&self, input_path: &str) -> Result<Array2<f32>> {
        self.features
            .read()
            .get(input_path)
            .cloned()
            .ok_or_else(|| SeqfeedError::FeatureLoad {
                input_path: input_path.to_string(),
                reason: "no features registered".into(),
            })
    }
}

/// Single-label corpus described by one manifest
pub struct ManifestCorpus<S> {
    manifest: Manifest,
    features: S,
}

impl<S: FeatureSource> ManifestCorpus<S> {
    pub fn new(manifest: Manifest, features: S) -> Self {
        Self { manifest, features }
    }

    /// Feature source backing this corpus
    pub fn features(&self) -> &S {
        &self.features
    }
}

impl<S: FeatureSource> Corpus for ManifestCorpus<S> {
    fn build_utterance_index(&self, options: &IndexOptions) -> Result<UtteranceIndex> {
        UtteranceIndex::from_manifest(&self.manifest, options)
    }

    fn load_raw_features(&self, record: &UtteranceRecord) -> Result<Array2<f32>> {
        self.features.load(&record.input_path)
    }
}

/// Dual-label corpus: a main manifest and a sub-label manifest over the
/// same utterances
pub struct HierarchicalCorpus<S> {
    main: Manifest,
    sub: Manifest,
    features: S,
}

impl<S: FeatureSource> HierarchicalCorpus<S> {
    pub fn new(main: Manifest, sub: Manifest, features: S) -> Self {
        Self { main, sub, features }
    }

    pub fn features(&self) -> &S {
        &self.features
    }
}

impl<S: FeatureSource> Corpus for HierarchicalCorpus<S> {
    fn build_utterance_index(&self, options: &IndexOptions) -> Result<UtteranceIndex> {
        UtteranceIndex::from_hierarchical(&self.main, &self.sub, options)
    }

    fn load_raw_features(&self, record: &UtteranceRecord) -> Result<Array2<f32>> {
        self.features.load(&record.input_path)
    }
}
