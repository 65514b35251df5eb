use std::ops::RangeInclusive;

use crate::error::FormError;
use crate::inference::types::{Gender, PatientData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    GestationalAge,
    BirthWeight,
    BirthLength,
    AgeDays,
    Weight,
    Length,
}

impl FormField {
    /// In form order.
    pub const ALL: [FormField; 6] = [
        FormField::GestationalAge,
        FormField::BirthWeight,
        FormField::BirthLength,
        FormField::AgeDays,
        FormField::Weight,
        FormField::Length,
    ];

    fn index(self) -> usize {
        match self {
            FormField::GestationalAge => 0,
            FormField::BirthWeight => 1,
            FormField::BirthLength => 2,
            FormField::AgeDays => 3,
            FormField::Weight => 4,
            FormField::Length => 5,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            FormField::GestationalAge => "Gestational Age",
            FormField::BirthWeight => "Birth Weight",
            FormField::BirthLength => "Birth Length",
            FormField::AgeDays => "Age",
            FormField::Weight => "Current Weight",
            FormField::Length => "Current Length",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FormField::GestationalAge => "GA (Weeks):",
            FormField::BirthWeight => "Birth Weight (kg):",
            FormField::BirthLength => "Birth Length (cm):",
            FormField::AgeDays => "Age (days):",
            FormField::Weight => "Current Weight (kg):",
            FormField::Length => "Current Length (cm):",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            FormField::GestationalAge => "e.g., 38.5",
            FormField::BirthWeight => "e.g., 3.2",
            FormField::BirthLength => "e.g., 50.0",
            FormField::AgeDays => "e.g., 15",
            FormField::Weight => "e.g., 3.5",
            FormField::Length => "e.g., 52.0",
        }
    }

    pub fn range(self) -> RangeInclusive<f32> {
        match self {
            FormField::GestationalAge => 0.0..=50.0,
            FormField::BirthWeight | FormField::Weight => 0.0..=10.0,
            FormField::BirthLength | FormField::Length => 0.0..=100.0,
            FormField::AgeDays => 0.0..=1000.0,
        }
    }
}

/// The raw, unvalidated contents of the patient form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientForm {
    pub gender: Gender,
    values: [String; 6],
}

impl PatientForm {
    pub fn from_patient(patient: &PatientData) -> Self {
        let values = [
            patient.gestational_age_weeks,
            patient.birth_weight_kg,
            patient.birth_length_cm,
            patient.age_days,
            patient.weight_kg,
            patient.length_cm,
        ];

        PatientForm {
            gender: patient.gender,
            values: values.map(|value| value.to_string()),
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        &self.values[field.index()]
    }

    pub fn set_value(&mut self, field: FormField, value: String) {
        self.values[field.index()] = value;
    }

    fn parse(&self, field: FormField) -> Result<f32, FormError> {
        let value = self.value(field).trim()
            .parse::<f32>()
            .map_err(|_| FormError::Invalid { field })?;

        if !value.is_finite() || !field.range().contains(&value) {
            return Err(FormError::Invalid { field });
        }

        Ok(value)
    }

    pub fn validate(&self) -> Result<PatientData, FormError> {
        if self.values.iter().any(|value| value.trim().is_empty()) {
            return Err(FormError::MissingFields);
        }

        Ok(PatientData {
            gender: self.gender,
            gestational_age_weeks: self.parse(FormField::GestationalAge)?,
            birth_weight_kg: self.parse(FormField::BirthWeight)?,
            birth_length_cm: self.parse(FormField::BirthLength)?,
            age_days: self.parse(FormField::AgeDays)?,
            weight_kg: self.parse(FormField::Weight)?,
            length_cm: self.parse(FormField::Length)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> PatientForm {
        let mut form = PatientForm::default();
        for (field, value) in FormField::ALL.into_iter().zip(["38.5", "3.2", "50", "15", "3.5", "52.0"]) {
            form.set_value(field, value.to_string());
        }
        form
    }

    #[test]
    fn valid_form_produces_patient_data() {
        let mut form = filled();
        form.gender = Gender::Female;

        let patient = form.validate().unwrap();
        assert_eq!(patient, PatientData {
            gender: Gender::Female,
            gestational_age_weeks: 38.5,
            birth_weight_kg: 3.2,
            birth_length_cm: 50.0,
            age_days: 15.0,
            weight_kg: 3.5,
            length_cm: 52.0,
        });
    }

    #[test]
    fn empty_field_is_reported_first() {
        let mut form = filled();
        form.set_value(FormField::GestationalAge, "abc".to_string());
        form.set_value(FormField::Length, "  ".to_string());

        assert_eq!(form.validate(), Err(FormError::MissingFields));
        assert_eq!(FormError::MissingFields.to_string(), "All fields must be filled out before submission.");
    }

    #[test]
    fn first_invalid_field_is_reported() {
        let mut form = filled();
        form.set_value(FormField::BirthWeight, "heavy".to_string());
        form.set_value(FormField::Weight, "-1".to_string());

        let err = form.validate().unwrap_err();
        assert_eq!(err, FormError::Invalid { field: FormField::BirthWeight });
        assert_eq!(err.to_string(), "Invalid Birth Weight.");
    }

    #[test]
    fn out_of_range_is_invalid() {
        let mut form = filled();
        form.set_value(FormField::AgeDays, "1001".to_string());
        assert_eq!(form.validate(), Err(FormError::Invalid { field: FormField::AgeDays }));

        let mut form = filled();
        form.set_value(FormField::GestationalAge, "NaN".to_string());
        assert_eq!(form.validate(), Err(FormError::Invalid { field: FormField::GestationalAge }));
    }

    #[test]
    fn prefills_from_patient_data() {
        let patient = filled().validate().unwrap();
        let form = PatientForm::from_patient(&patient);

        assert_eq!(form.value(FormField::GestationalAge), "38.5");
        assert_eq!(form.value(FormField::BirthLength), "50");
        assert_eq!(form.validate(), Ok(patient));
    }
}
