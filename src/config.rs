use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{detection::{RegionLabel, template::TemplateRegion}, error::ConfigError};

/// Minimum scores for a region's two metrics to count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub embedding: f64,
    pub keypoint: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            embedding: 0.95,
            keypoint: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointConfig {
    /// Lowe ratio: a match is kept only if `best < ratio * second_best`.
    pub ratio: f32,
    pub max_features: usize,
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
}

impl Default for KeypointConfig {
    fn default() -> Self {
        Self {
            ratio: 0.75,
            max_features: 500,
            fast_threshold: 20,
            pyramid_levels: 4,
            scale_factor: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// ResNet-50 safetensors weights. Required unless `stub` is set.
    pub weights_path: Option<PathBuf>,
    pub resize_shorter: u32,
    pub input_size: u32,
    /// Deterministic content-derived embeddings, no model files. Testing only.
    pub stub: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            weights_path: None,
            resize_shorter: 256,
            input_size: 224,
            stub: false,
        }
    }
}

impl EmbedderConfig {
    pub fn stub() -> Self {
        Self {
            stub: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Regions every document is expected to contain.
    pub labels: Vec<RegionLabel>,
    pub thresholds: Thresholds,
    pub keypoints: KeypointConfig,
    pub embedder: EmbedderConfig,
    /// Relative boxes used by the layout-template detector.
    pub layout: Vec<TemplateRegion>,
    pub parallel: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            labels: vec![RegionLabel::Profile, RegionLabel::Signature],
            thresholds: Thresholds::default(),
            keypoints: KeypointConfig::default(),
            embedder: EmbedderConfig::default(),
            layout: TemplateRegion::certificate_layout(),
            parallel: true,
        }
    }
}

impl VerificationConfig {
    pub const ENV_EMBED_THRESHOLD: &'static str = "DOCFORENSICS_EMBED_THRESHOLD";
    pub const ENV_KEYPOINT_THRESHOLD: &'static str = "DOCFORENSICS_KEYPOINT_THRESHOLD";
    pub const ENV_WEIGHTS: &'static str = "DOCFORENSICS_WEIGHTS";

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Applies `DOCFORENSICS_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = read_env(Self::ENV_EMBED_THRESHOLD) {
            self.thresholds.embedding = parse_threshold("thresholds.embedding", &value)?;
        }

        if let Some(value) = read_env(Self::ENV_KEYPOINT_THRESHOLD) {
            self.thresholds.keypoint = parse_threshold("thresholds.keypoint", &value)?;
        }

        if let Some(value) = read_env(Self::ENV_WEIGHTS) {
            self.embedder.weights_path = Some(PathBuf::from(value));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.labels.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "labels",
                reason: "at least one region label is required".into(),
            });
        }

        for (i, label) in self.labels.iter().enumerate() {
            if self.labels[..i].contains(label) {
                return Err(ConfigError::InvalidValue {
                    field: "labels",
                    reason: format!("'{}' is listed more than once", label),
                });
            }

            if label.as_str() == RESERVED_REPORT_KEY {
                return Err(ConfigError::InvalidValue {
                    field: "labels",
                    reason: format!("'{}' is reserved by the report format", label),
                });
            }
        }

        if !(-1.0..=1.0).contains(&self.thresholds.embedding) {
            return Err(ConfigError::InvalidValue {
                field: "thresholds.embedding",
                reason: format!("{} is outside [-1, 1]", self.thresholds.embedding),
            });
        }

        if !(0.0..=1.0).contains(&self.thresholds.keypoint) {
            return Err(ConfigError::InvalidValue {
                field: "thresholds.keypoint",
                reason: format!("{} is outside [0, 1]", self.thresholds.keypoint),
            });
        }

        let kp = &self.keypoints;
        if !(kp.ratio > 0.0 && kp.ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "keypoints.ratio",
                reason: format!("{} is outside (0, 1]", kp.ratio),
            });
        }

        if kp.pyramid_levels == 0 || kp.max_features == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keypoints",
                reason: "pyramid_levels and max_features must be positive".into(),
            });
        }

        if kp.scale_factor <= 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "keypoints.scale_factor",
                reason: format!("{} must be greater than 1", kp.scale_factor),
            });
        }

        let emb = &self.embedder;
        if emb.input_size == 0 || emb.resize_shorter < emb.input_size {
            return Err(ConfigError::InvalidValue {
                field: "embedder",
                reason: format!(
                    "resize_shorter ({}) must be at least input_size ({}) and both positive",
                    emb.resize_shorter, emb.input_size
                ),
            });
        }

        Ok(())
    }
}

/// Sits next to the region entries in a JSON report.
const RESERVED_REPORT_KEY: &str = "tampering_suspected";

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_threshold(field: &'static str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|e| ConfigError::InvalidValue {
        field,
        reason: format!("'{}' is not a number: {}", value, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = VerificationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.embedding, 0.95);
        assert_eq!(config.thresholds.keypoint, 0.75);
        assert_eq!(config.keypoints.ratio, 0.75);
        assert_eq!(config.labels, vec![RegionLabel::Profile, RegionLabel::Signature]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            VerificationConfig::from_json_str(r#"{"thresholds": {"embedding": 0.9}}"#).unwrap();
        assert_eq!(config.thresholds.embedding, 0.9);
        assert_eq!(config.thresholds.keypoint, 0.75);
        assert_eq!(config.keypoints.max_features, 500);
    }

    #[test]
    fn test_labels_resolve_from_aliases() {
        let config =
            VerificationConfig::from_json_str(r#"{"labels": ["Sign", "photo", "seal"]}"#).unwrap();
        assert_eq!(
            config.labels,
            vec![
                RegionLabel::Signature,
                RegionLabel::Profile,
                RegionLabel::Unknown("seal".into())
            ]
        );
    }

    #[test]
    fn test_rejects_empty_labels() {
        let err = VerificationConfig::from_json_str(r#"{"labels": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "labels", .. }));
    }

    #[test]
    fn test_rejects_labels_repeated_through_aliases() {
        let err = VerificationConfig::from_json_str(r#"{"labels": ["sign", "Signature"]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "labels", .. }));

        let err =
            VerificationConfig::from_json_str(r#"{"labels": ["Seal", "seal"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "labels", .. }));
    }

    #[test]
    fn test_rejects_label_clashing_with_report_field() {
        let err = VerificationConfig::from_json_str(r#"{"labels": ["Tampering_Suspected"]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "labels", .. }));
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let mut config = VerificationConfig::default();
        config.keypoints.ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_input_larger_than_resize() {
        let mut config = VerificationConfig::default();
        config.embedder.input_size = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"parallel": false, "keypoints": {{"ratio": 0.8}}}}"#).unwrap();

        let config = VerificationConfig::from_json_file(file.path()).unwrap();
        assert!(!config.parallel);
        assert_eq!(config.keypoints.ratio, 0.8);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = VerificationConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
