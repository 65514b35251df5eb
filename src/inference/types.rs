use std::fmt;
use serde::{Deserialize, Serialize};

use crate::device::types::VitalsReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Gender::Male => "male",
            Gender::Female => "female",
        };

        write!(f, "{}", result)
    }
}

/// What the patient form collects.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientData {
    pub gender: Gender,
    pub gestational_age_weeks: f32,
    pub birth_weight_kg: f32,
    pub birth_length_cm: f32,
    pub age_days: f32,
    pub weight_kg: f32,
    pub length_cm: f32,
}

/// Classifier input: the form data combined with the latest live vitals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub gender: Gender,
    pub gestational_age_weeks: f32,
    pub birth_weight_kg: f32,
    pub birth_length_cm: f32,
    pub age_days: f32,
    pub weight_kg: f32,
    pub length_cm: f32,
    pub temperature_c: f32,
    pub heart_rate_bpm: f32,
}

impl FeatureVector {
    /// Before the first reading arrives the live vitals are zero.
    pub fn new(patient: &PatientData, reading: Option<VitalsReading>) -> Self {
        let (temperature_c, heart_rate_bpm) = match reading {
            Some(reading) => (reading.temperature as f32, reading.heart_rate as f32),
            None => (0.0, 0.0),
        };

        FeatureVector {
            gender: patient.gender,
            gestational_age_weeks: patient.gestational_age_weeks,
            birth_weight_kg: patient.birth_weight_kg,
            birth_length_cm: patient.birth_length_cm,
            age_days: patient.age_days,
            weight_kg: patient.weight_kg,
            length_cm: patient.length_cm,
            temperature_c,
            heart_rate_bpm,
        }
    }

    /// The numeric inputs by model input name, in model order.
    pub fn numeric(&self) -> [(&'static str, f32); 8] {
        [
            ("gestational_age_weeks", self.gestational_age_weeks),
            ("birth_weight_kg", self.birth_weight_kg),
            ("birth_length_cm", self.birth_length_cm),
            ("age_days", self.age_days),
            ("weight_kg", self.weight_kg),
            ("length_cm", self.length_cm),
            ("temperature_c", self.temperature_c),
            ("heart_rate_bpm", self.heart_rate_bpm),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLabel {
    NotAtRisk,
    AtRisk,
}

impl RiskLabel {
    pub fn index(self) -> usize {
        match self {
            RiskLabel::NotAtRisk => 0,
            RiskLabel::AtRisk => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: RiskLabel,
    /// Per-class probabilities, indexed by [`RiskLabel::index`].
    pub scores: Vec<f32>,
}
