//! Learned appearance embeddings.
//!
//! [`EmbeddingModel::initialize`] loads the network once per process; the returned
//! handle is cheap to clone and is shared by every [`FeatureEmbedder`] built from it.

use std::{path::Path, sync::Arc};

use candle_core::{DType, Device, Tensor};
use candle_nn::{Func, Module, VarBuilder};
use candle_transformers::models::resnet;
use image::RgbImage;
use log::{debug, info, warn};
use ndarray::{Array3, s};
use parking_lot::Mutex;

use crate::{
    config::EmbedderConfig,
    error::EmbeddingError,
    image_utils::{center_crop, resize_shorter_side, rgb_to_normalized_chw},
};

/// Output width of ResNet-50 with its classification head removed.
pub const RESNET50_EMBEDDING_DIM: usize = 2048;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Added to the norm product so zero vectors still produce a similarity.
pub const COSINE_EPS: f64 = 1e-6;

const STUB_GRID: usize = 8;

enum ModelBackend {
    ResNet50 {
        network: Mutex<Func<'static>>,
        device: Device,
    },
    Stub,
}

/// Shared handle to the embedding network.
#[derive(Clone)]
pub struct EmbeddingModel {
    backend: Arc<ModelBackend>,
}

impl std::fmt::Debug for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend.as_ref() {
            ModelBackend::ResNet50 { device, .. } => format!("ResNet50({:?})", device),
            ModelBackend::Stub => "Stub".to_string(),
        };
        f.debug_struct("EmbeddingModel")
            .field("backend", &backend)
            .field("embedding_dim", &self.embedding_dim())
            .finish()
    }
}

impl EmbeddingModel {
    pub fn initialize(config: &EmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.stub {
            warn!("Embedding model running in STUB mode (testing only)");
            return Ok(Self::stub());
        }

        let path = config
            .weights_path
            .as_deref()
            .ok_or_else(|| EmbeddingError::ModelLoadFailed {
                reason: "weights_path is required unless the stub embedder is enabled".into(),
            })?;

        if !path.exists() {
            return Err(EmbeddingError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let device = select_device();
        let network = Self::load_resnet50(path, &device)?;

        info!("ResNet-50 embedding model loaded from {} on {:?}", path.display(), device);

        Ok(Self {
            backend: Arc::new(ModelBackend::ResNet50 {
                network: Mutex::new(network),
                device,
            }),
        })
    }

    pub fn stub() -> Self {
        Self {
            backend: Arc::new(ModelBackend::Stub),
        }
    }

    fn load_resnet50(path: &Path, device: &Device) -> Result<Func<'static>, EmbeddingError> {
        // SAFETY: the weights file is mapped read-only and not modified while loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                reason: format!("failed to map safetensors: {}", e),
            })?;

        resnet::resnet50_no_final_layer(vb).map_err(|e| EmbeddingError::ModelLoadFailed {
            reason: format!("failed to build ResNet-50: {}", e),
        })
    }

    pub fn embedding_dim(&self) -> usize {
        match self.backend.as_ref() {
            ModelBackend::ResNet50 { .. } => RESNET50_EMBEDDING_DIM,
            ModelBackend::Stub => 3 * STUB_GRID * STUB_GRID,
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self.backend.as_ref(), ModelBackend::Stub)
    }

    /// Runs one inference pass over a normalized `(3, H, W)` input.
    fn forward(&self, input: &Array3<f32>) -> Result<Vec<f32>, EmbeddingError> {
        match self.backend.as_ref() {
            ModelBackend::ResNet50 { network, device } => {
                let (channels, height, width) = input.dim();
                let data = input.iter().copied().collect::<Vec<f32>>();
                let tensor = Tensor::from_vec(data, (1, channels, height, width), device)?;

                let features = network.lock().forward(&tensor)?;
                Ok(features.flatten_all()?.to_vec1::<f32>()?)
            }
            ModelBackend::Stub => Ok(grid_means(input, STUB_GRID)),
        }
    }
}

/// Per-channel means over a `cells`x`cells` grid.
fn grid_means(input: &Array3<f32>, cells: usize) -> Vec<f32> {
    let (channels, height, width) = input.dim();
    let mut out = Vec::with_capacity(channels * cells * cells);

    for c in 0..channels {
        for gy in 0..cells {
            for gx in 0..cells {
                let (y0, y1) = (gy * height / cells, (gy + 1) * height / cells);
                let (x0, x1) = (gx * width / cells, (gx + 1) * width / cells);
                let mean = input.slice(s![c, y0..y1, x0..x1]).mean().unwrap_or(0.0);
                out.push(mean);
            }
        }
    }

    out
}

fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => warn!("CUDA device unavailable: {}", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return device,
            Err(e) => warn!("Metal device unavailable: {}", e),
        }
    }

    debug!("Using CPU device for embeddings");
    Device::Cpu
}

/// Turns region crops into fixed-length embedding vectors.
#[derive(Debug, Clone)]
pub struct FeatureEmbedder {
    model: EmbeddingModel,
    resize_shorter: u32,
    input_size: u32,
}

impl FeatureEmbedder {
    pub fn new(model: EmbeddingModel, config: &EmbedderConfig) -> Self {
        Self {
            model,
            resize_shorter: config.resize_shorter,
            input_size: config.input_size,
        }
    }

    pub fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, EmbeddingError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EmbeddingError::DegenerateInput { width, height });
        }

        let input = self.preprocess(image);
        let embedding = self.model.forward(&input)?;

        debug!(
            "Embedded {}x{} crop into {} dimensions",
            width,
            height,
            embedding.len()
        );

        Ok(embedding)
    }

    /// Shorter-side resize, center crop, then ImageNet normalization.
    pub fn preprocess(&self, image: &RgbImage) -> Array3<f32> {
        let resized = resize_shorter_side(image, self.resize_shorter);
        let cropped = center_crop(&resized, self.input_size);
        rgb_to_normalized_chw(&cropped, IMAGENET_MEAN, IMAGENET_STD)
    }

    pub fn embedding_dim(&self) -> usize {
        self.model.embedding_dim()
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

/// `dot(a, b) / (|a| * |b| + eps)`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    Ok(dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn stub_embedder() -> FeatureEmbedder {
        FeatureEmbedder::new(EmbeddingModel::stub(), &EmbedderConfig::stub())
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        })
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let similarity = cosine_similarity(&v, &v).unwrap();
        assert!((similarity - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        let opposite = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((opposite + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_zero_vector_is_a_value() {
        let similarity = cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(similarity, 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = [0.3, -1.2, 4.0, 0.01];
        let b = [2.5, 0.7, -0.4, 9.0];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { left: 2, right: 3 }));
    }

    #[test]
    fn test_preprocess_shape() {
        let input = stub_embedder().preprocess(&gradient(300, 120));
        assert_eq!(input.dim(), (3, 224, 224));
    }

    #[test]
    fn test_stub_embedding_is_deterministic_with_constant_length() {
        let embedder = stub_embedder();
        let a = embedder.embed(&gradient(64, 48)).unwrap();
        let b = embedder.embed(&gradient(64, 48)).unwrap();
        let c = embedder.embed(&gradient(500, 20)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), embedder.embedding_dim());
        assert_eq!(c.len(), embedder.embedding_dim());
    }

    #[test]
    fn test_self_similarity_is_one() {
        let embedder = stub_embedder();
        let image = gradient(90, 90);
        let a = embedder.embed(&image).unwrap();
        let b = embedder.embed(&image).unwrap();
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_different_content_scores_lower() {
        let embedder = stub_embedder();
        let a = embedder.embed(&gradient(90, 90)).unwrap();
        let flipped = image::imageops::flip_horizontal(&gradient(90, 90));
        let b = embedder.embed(&flipped).unwrap();
        assert!(cosine_similarity(&a, &b).unwrap() < 0.95);
    }

    #[test]
    fn test_degenerate_crop_is_error() {
        let err = stub_embedder().embed(&RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, EmbeddingError::DegenerateInput { width: 0, height: 10 }));
    }

    #[test]
    fn test_initialize_requires_weights() {
        let err = EmbeddingModel::initialize(&EmbedderConfig::default()).unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelLoadFailed { .. }));
    }

    #[test]
    fn test_initialize_missing_weights_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbedderConfig {
            weights_path: Some(dir.path().join("resnet50.safetensors")),
            ..Default::default()
        };
        let err = EmbeddingModel::initialize(&config).unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelNotFound { .. }));
    }

    #[test]
    fn test_initialize_stub() {
        let model = EmbeddingModel::initialize(&EmbedderConfig::stub()).unwrap();
        assert!(model.is_stub());
        assert_eq!(model.embedding_dim(), 192);
    }
}
