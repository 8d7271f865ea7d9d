//! User-facing prediction results.

use std::fmt;
use std::path::Path;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::{LungError, Result};

/// Categorical confidence bucket over the top-class probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "Very Low Confidence")]
    VeryLow,
    #[serde(rename = "Low Confidence")]
    Low,
    #[serde(rename = "Moderate Confidence")]
    Moderate,
    #[serde(rename = "High Confidence")]
    High,
    #[serde(rename = "Very High Confidence")]
    VeryHigh,
}

impl ConfidenceLevel {
    /// Lower bounds are inclusive: 0.9, 0.8, 0.7, 0.6.
    #[must_use]
    pub fn from_probability(p: f32) -> Self {
        if p >= 0.9 {
            Self::VeryHigh
        } else if p >= 0.8 {
            Self::High
        } else if p >= 0.7 {
            Self::Moderate
        } else if p >= 0.6 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High Confidence",
            Self::High => "High Confidence",
            Self::Moderate => "Moderate Confidence",
            Self::Low => "Low Confidence",
            Self::VeryLow => "Very Low Confidence",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn confidence_level(p: f32) -> ConfidenceLevel {
    ConfidenceLevel::from_probability(p)
}

/// Class name to probability, kept in class-registry order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassProbabilities(Vec<(String, f32)>);

impl ClassProbabilities {
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(n, p)| (n.as_str(), *p))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, p) in &self.0 {
            map.serialize_entry(name, p)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_condition: String,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
    pub is_reliable: bool,
    pub probabilities: ClassProbabilities,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models_used: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models_unavailable: Vec<String>,
}

/// Build the structured result for a label and its class distribution.
///
/// `probabilities[i]` is paired with `class_names[i]`; the lengths must agree.
pub fn format_prediction(
    label: &str,
    probabilities: &[f32],
    class_names: &[String],
    confidence_threshold: f32,
) -> Result<PredictionResult> {
    if class_names.len() != probabilities.len() || probabilities.is_empty() {
        return Err(LungError::LabelMismatch {
            expected: class_names.len(),
            got: probabilities.len(),
        });
    }

    let confidence = probabilities
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);

    Ok(PredictionResult {
        predicted_condition: label.to_string(),
        confidence,
        confidence_level: ConfidenceLevel::from_probability(confidence),
        is_reliable: confidence >= confidence_threshold,
        probabilities: ClassProbabilities(
            class_names
                .iter()
                .cloned()
                .zip(probabilities.iter().copied())
                .collect(),
        ),
        models_used: Vec::new(),
        models_unavailable: Vec::new(),
    })
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Predicted condition: {}", self.predicted_condition)?;
        writeln!(
            f,
            "Confidence: {:.1}% ({})",
            self.confidence * 100.0,
            self.confidence_level
        )?;
        if !self.is_reliable {
            writeln!(f, "Warning: confidence is below the reliability threshold")?;
        }
        writeln!(f, "Probabilities:")?;
        for (name, p) in self.probabilities.iter() {
            writeln!(f, "  {name:<16} {:>6.2}%", p * 100.0)?;
        }
        if !self.models_used.is_empty() {
            writeln!(f, "Models used: {}", self.models_used.join(", "))?;
        }
        if !self.models_unavailable.is_empty() {
            writeln!(f, "Models unavailable: {}", self.models_unavailable.join(", "))?;
        }
        Ok(())
    }
}

/// Response body of the HTTP prediction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiPrediction {
    pub prediction: String,
    pub confidence: f32,
    pub probabilities: ClassProbabilities,
}

impl From<&PredictionResult> for ApiPrediction {
    fn from(r: &PredictionResult) -> Self {
        Self {
            prediction: r.predicted_condition.clone(),
            confidence: r.confidence,
            probabilities: r.probabilities.clone(),
        }
    }
}

/// Patient id encoded as the leading `_`-separated field of a recording name,
/// e.g. `101_1b1_Al_sc_Meditron.wav` -> 101.
#[must_use]
pub fn patient_id_from_filename(path: impl AsRef<Path>) -> Option<u32> {
    let name = path.as_ref().file_name()?.to_str()?;
    name.split('_').next()?.parse().ok()
}
