use log::{info, warn};

use crate::error::InferenceError;
use crate::inference::classifier::Classifier;
use crate::inference::types::{FeatureVector, Prediction, RiskLabel};
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Safe,
    Warning,
    Error,
}

/// What the prediction card shows, and what is forwarded to the notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionView {
    pub headline: String,
    pub details: Option<String>,
    pub tone: Tone,
    pub notification: Option<String>,
}

impl PredictionView {
    pub fn not_run() -> Self {
        PredictionView {
            headline: "Prediction: Not Run".to_string(),
            details: None,
            tone: Tone::Neutral,
            notification: None,
        }
    }

    pub fn from_result(result: &Result<Prediction, InferenceError>) -> Self {
        match result {
            Ok(Prediction { label: RiskLabel::AtRisk, .. }) => PredictionView {
                headline: "STATUS: AT RISK".to_string(),
                details: None,
                tone: Tone::Warning,
                notification: Some("Warning: Baby predicted to be AT RISK (Label 1).".to_string()),
            },
            Ok(Prediction { label: RiskLabel::NotAtRisk, .. }) => PredictionView {
                headline: "STATUS: NOT AT RISK".to_string(),
                details: None,
                tone: Tone::Safe,
                notification: Some("Status normal: Baby predicted NOT AT RISK (Label 0).".to_string()),
            },
            Err(err) => PredictionView {
                headline: "Prediction Failed".to_string(),
                details: Some(format!("Details: {}", err)),
                tone: Tone::Error,
                notification: Some("Prediction failed: Check debug logs.".to_string()),
            },
        }
    }
}

fn describe(prediction: &Prediction, features: &FeatureVector) -> String {
    let scores = prediction.scores.iter()
        .enumerate()
        .map(|(class, score)| format!("Class {}: {:.4}", class, score))
        .collect::<Vec<_>>()
        .join(" | ");

    format!(
        "label {} | {} | Temp: {:.1}, HR: {:.0}",
        prediction.label.index(),
        scores,
        features.temperature_c,
        features.heart_rate_bpm,
    )
}

/// Runs the classifier once, logs the outcome and forwards the resulting notification.
pub fn run_prediction(classifier: &dyn Classifier, features: &FeatureVector, notifier: &dyn Notifier) -> PredictionView {
    let result = classifier.predict(features);

    match &result {
        Ok(prediction) => info!("Prediction result: {}", describe(prediction, features)),
        Err(err) => warn!("Prediction failed: {}", err),
    }

    let view = PredictionView::from_result(&result);
    if let Some(notification) = &view.notification {
        notifier.notify(notification);
    }
    view
}
