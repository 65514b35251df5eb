use std::fs;
use std::path::Path;
use serde::Deserialize;

use crate::error::InferenceError;
use crate::inference::types::{FeatureVector, Gender, Prediction, RiskLabel};

pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, InferenceError>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureWeights {
    pub gestational_age_weeks: f32,
    pub birth_weight_kg: f32,
    pub birth_length_cm: f32,
    pub age_days: f32,
    pub weight_kg: f32,
    pub length_cm: f32,
    pub temperature_c: f32,
    pub heart_rate_bpm: f32,
}

impl FeatureWeights {
    fn as_array(&self) -> [f32; 8] {
        [
            self.gestational_age_weeks,
            self.birth_weight_kg,
            self.birth_length_cm,
            self.age_days,
            self.weight_kg,
            self.length_cm,
            self.temperature_c,
            self.heart_rate_bpm,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenderOffsets {
    #[serde(default)]
    pub male: f32,
    #[serde(default)]
    pub female: f32,
}

/// Binary logistic regression over [`FeatureVector`], read from a JSON model file:
///
/// ```json
/// {
///   "bias": -4.2,
///   "weights": { "gestational_age_weeks": -0.1, "birth_weight_kg": -0.3, "...": 0.0 },
///   "genderOffsets": { "male": 0.05, "female": 0.0 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogisticClassifier {
    pub bias: f32,
    pub weights: FeatureWeights,
    #[serde(default)]
    pub gender_offsets: GenderOffsets,
}

impl LogisticClassifier {
    pub fn from_json(content: &str) -> Result<Self, InferenceError> {
        serde_json::from_str(content).map_err(|err| InferenceError::AssetLoad {
            detail: format!("Invalid model: {}", err),
        })
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let content = fs::read_to_string(path).map_err(|err| InferenceError::AssetLoad {
            detail: format!("Failed to open model file {}: {}", path.to_string_lossy(), err),
        })?;

        Self::from_json(&content)
    }

    fn gender_offset(&self, gender: Gender) -> f32 {
        match gender {
            Gender::Male => self.gender_offsets.male,
            Gender::Female => self.gender_offsets.female,
        }
    }
}

impl Classifier for LogisticClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, InferenceError> {
        let inputs = features.numeric();

        if let Some((name, _)) = inputs.iter().find(|(_, value)| !value.is_finite()) {
            return Err(InferenceError::Runtime { detail: format!("{} is not a finite number", name) });
        }

        let logit = inputs.iter()
            .zip(self.weights.as_array())
            .fold(self.bias + self.gender_offset(features.gender), |sum, ((_, value), weight)| sum + value * weight);

        if !logit.is_finite() {
            return Err(InferenceError::Runtime { detail: "model produced a non-finite score".to_string() });
        }

        let at_risk = 1.0 / (1.0 + (-logit).exp());
        let label = if at_risk >= 0.5 { RiskLabel::AtRisk } else { RiskLabel::NotAtRisk };

        Ok(Prediction {
            label,
            scores: vec![1.0 - at_risk, at_risk],
        })
    }
}

/// Stands in for a model that could not be loaded; every prediction reports the load failure.
#[derive(Debug, Clone)]
pub struct UnavailableClassifier {
    error: InferenceError,
}

impl UnavailableClassifier {
    pub fn new(error: InferenceError) -> Self {
        UnavailableClassifier { error }
    }
}

impl Classifier for UnavailableClassifier {
    fn predict(&self, _features: &FeatureVector) -> Result<Prediction, InferenceError> {
        Err(self.error.clone())
    }
}

/// Loads the configured model. Not having one is reported like an unreadable model file.
pub fn load_classifier(path: Option<&Path>) -> Result<LogisticClassifier, InferenceError> {
    match path {
        Some(path) => LogisticClassifier::load(path),
        None => Err(InferenceError::AssetLoad { detail: "No model file configured".to_string() }),
    }
}
