//! The four standard analysis stages.
//!
//! All of them are keyword scans over the extracted report text. The wording
//! is intentionally boring; the disclaimers are not optional.

use async_trait::async_trait;

use super::{AnalysisStage, StageInput};
use crate::error::HemoqError;

/// Marker table: display name plus the spellings it appears under in lab
/// reports.
const MARKERS: &[(&str, &[&str])] = &[
    ("hemoglobin", &["hemoglobin", "hgb"]),
    ("glucose", &["glucose"]),
    ("cholesterol", &["cholesterol", "ldl", "hdl"]),
    ("vitamin d", &["vitamin d", "25(oh)d"]),
    ("vitamin b12", &["b12", "cobalamin"]),
    ("iron", &["iron", "ferritin"]),
    ("blood pressure", &["blood pressure", "bp "]),
    ("thyroid (tsh)", &["tsh", "thyroid"]),
];

/// Known blood markers mentioned in the report text.
pub fn find_markers(report: &str) -> Vec<&'static str> {
    let haystack = report.to_lowercase();
    MARKERS
        .iter()
        .filter(|(_, aliases)| aliases.iter().any(|alias| haystack.contains(alias)))
        .map(|(name, _)| *name)
        .collect()
}

fn mentions(report: &str, needles: &[&str]) -> bool {
    let haystack = report.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Checks that the document looks like a blood test report at all.
pub struct VerificationStage;

#[async_trait]
impl AnalysisStage for VerificationStage {
    fn name(&self) -> &'static str {
        "verification"
    }

    fn title(&self) -> &'static str {
        "Document Verification"
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<String, HemoqError> {
        let markers = find_markers(input.report);
        let has_values = input.report.chars().any(|c| c.is_ascii_digit());

        let mut lines = Vec::new();
        if markers.is_empty() {
            lines.push(
                "Document type: no recognizable blood markers found; this does not appear \
                 to be a blood test report."
                    .to_string(),
            );
        } else {
            lines.push("Document type: blood test report.".to_string());
            lines.push(format!("Markers found: {}.", markers.join(", ")));
        }
        lines.push(if has_values {
            "Data integrity: numeric values present.".to_string()
        } else {
            "Data integrity: no numeric values detected; results may be incomplete.".to_string()
        });
        lines.push(format!(
            "Recommendation: document is {} for analysis.",
            if markers.is_empty() { "not suitable" } else { "suitable" }
        ));
        Ok(lines.join("\n"))
    }
}

/// Plain-language interpretation of the markers present.
pub struct MedicalStage;

#[async_trait]
impl AnalysisStage for MedicalStage {
    fn name(&self) -> &'static str {
        "medical"
    }

    fn title(&self) -> &'static str {
        "Medical Interpretation"
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<String, HemoqError> {
        let markers = find_markers(input.report);
        let mut lines = Vec::new();
        lines.push(format!("Query: {}", input.query));
        if markers.is_empty() {
            lines.push("No standard blood markers were identified in the report.".to_string());
        } else {
            lines.push(format!(
                "Reviewed {} marker group(s): {}.",
                markers.len(),
                markers.join(", ")
            ));
        }
        if mentions(input.report, &["high", "elevated", "low", "abnormal"]) {
            lines.push(
                "The report flags values outside reference ranges; these findings deserve \
                 attention."
                    .to_string(),
            );
        }
        lines.push(
            "This analysis is informational only; consult a qualified healthcare provider."
                .to_string(),
        );
        Ok(lines.join("\n"))
    }
}

/// Nutrition guidance keyed off nutritional markers.
pub struct NutritionStage;

#[async_trait]
impl AnalysisStage for NutritionStage {
    fn name(&self) -> &'static str {
        "nutrition"
    }

    fn title(&self) -> &'static str {
        "Nutrition Guidance"
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<String, HemoqError> {
        let mut findings = Vec::new();
        if mentions(input.report, &["hemoglobin", "hgb"]) {
            findings.push("Hemoglobin levels analyzed for iron status.");
        }
        if mentions(input.report, &["vitamin d", "25(oh)d"]) {
            findings.push("Vitamin D levels reviewed.");
        }
        if mentions(input.report, &["b12", "cobalamin"]) {
            findings.push("Vitamin B12 status evaluated.");
        }
        if mentions(input.report, &["glucose"]) {
            findings.push("Blood glucose levels assessed for metabolic health.");
        }
        if findings.is_empty() {
            findings.push("Blood report processed for nutritional markers.");
        }
        Ok(format!("Nutritional analysis completed: {}", findings.join("; ")))
    }
}

/// Exercise guidance keyed off cardiovascular and metabolic markers.
pub struct ExerciseStage;

#[async_trait]
impl AnalysisStage for ExerciseStage {
    fn name(&self) -> &'static str {
        "exercise"
    }

    fn title(&self) -> &'static str {
        "Exercise Guidance"
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<String, HemoqError> {
        let mut recommendations = Vec::new();
        if mentions(input.report, &["glucose"]) {
            recommendations.push("Cardiovascular exercise recommended for glucose management.");
        }
        if mentions(input.report, &["cholesterol", "ldl"]) {
            recommendations.push("Aerobic exercise beneficial for cholesterol management.");
        }
        if mentions(input.report, &["blood pressure", "bp "]) {
            recommendations.push("Moderate exercise recommended for blood pressure control.");
        }
        if recommendations.is_empty() {
            recommendations
                .push("General fitness assessment completed based on blood markers.");
        }
        Ok(format!(
            "Exercise planning analysis: {}",
            recommendations.join("; ")
        ))
    }
}
