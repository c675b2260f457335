//! Analysis pipeline: the external work the queue orchestrates.
//!
//! Deliberately thin glue. Stages are keyword heuristics over extracted
//! report text; the interesting contract is the stage seam and the sequencing
//! per analysis type, not the generated wording.

mod stages;

pub use stages::{
    ExerciseStage, MedicalStage, NutritionStage, VerificationStage, find_markers,
};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HemoqError;

/// Input to one analysis stage: pre-extracted report text plus the user's
/// question. PDF extraction happens upstream.
pub struct StageInput<'a> {
    pub report: &'a str,
    pub query: &'a str,
}

/// A single analysis stage.
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    /// Registry key and sequence name.
    fn name(&self) -> &'static str;

    /// Section heading in the assembled report.
    fn title(&self) -> &'static str;

    async fn run(&self, input: &StageInput<'_>) -> Result<String, HemoqError>;
}

/// Registry of stages (name -> stage).
///
/// Built during initialization, immutable afterwards; no locks needed at run
/// time.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<&'static str, Arc<dyn AnalysisStage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    pub fn register(&mut self, stage: Arc<dyn AnalysisStage>) -> Result<(), HemoqError> {
        let name = stage.name();
        if self.stages.contains_key(name) {
            return Err(HemoqError::DuplicateStage(name.to_string()));
        }
        self.stages.insert(name, stage);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AnalysisStage>> {
        self.stages.get(name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Runs the stage sequence for an analysis type and assembles the sectioned
/// report.
pub struct AnalysisPipeline {
    registry: Arc<StageRegistry>,
}

impl AnalysisPipeline {
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self { registry }
    }

    /// Registry with all four standard stages.
    pub fn with_default_stages() -> Self {
        let mut registry = StageRegistry::new();
        for stage in [
            Arc::new(VerificationStage) as Arc<dyn AnalysisStage>,
            Arc::new(MedicalStage),
            Arc::new(NutritionStage),
            Arc::new(ExerciseStage),
        ] {
            registry
                .register(stage)
                .expect("default stage names are distinct");
        }
        Self::new(Arc::new(registry))
    }

    /// Stage sequence per analysis type. Unknown types get the comprehensive
    /// treatment.
    pub fn stage_sequence(analysis_type: &str) -> &'static [&'static str] {
        match analysis_type {
            "verification" => &["verification"],
            "nutrition" => &["medical", "nutrition"],
            "exercise" => &["medical", "exercise"],
            _ => &["verification", "medical", "nutrition", "exercise"],
        }
    }

    pub async fn run(
        &self,
        analysis_type: &str,
        report: &str,
        query: &str,
    ) -> Result<String, HemoqError> {
        let input = StageInput { report, query };
        let mut sections = Vec::new();
        for name in Self::stage_sequence(analysis_type) {
            let stage = self
                .registry
                .get(name)
                .ok_or_else(|| HemoqError::StageNotFound(name.to_string()))?;
            let body = stage.run(&input).await?;
            sections.push(format!("## {}\n\n{}", stage.title(), body));
        }
        Ok(sections.join("\n\n"))
    }
}

/// Resolve the report text a task payload points at: inline `report_text`
/// wins, otherwise the `file` path is read from disk.
pub async fn load_report(payload: &serde_json::Value) -> Result<String, HemoqError> {
    if let Some(text) = payload.get("report_text").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    let Some(path) = payload.get("file").and_then(|v| v.as_str()) else {
        return Err(HemoqError::Report(
            "payload carries neither `report_text` nor `file`".to_string(),
        ));
    };
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HemoqError::Report(format!("{path}: {e}")))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SAMPLE_REPORT: &str = "\
        Complete Blood Count\n\
        Hemoglobin: 13.5 g/dL\n\
        Glucose (fasting): 104 mg/dL\n\
        LDL Cholesterol: 131 mg/dL\n\
        Vitamin D 25(OH)D: 21 ng/mL\n";

    #[test]
    fn duplicate_stage_registration_is_an_error() {
        let mut registry = StageRegistry::new();
        registry.register(Arc::new(VerificationStage)).unwrap();
        let err = registry
            .register(Arc::new(VerificationStage))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate stage"));
    }

    #[rstest]
    #[case("verification", &["verification"])]
    #[case("nutrition", &["medical", "nutrition"])]
    #[case("exercise", &["medical", "exercise"])]
    #[case("comprehensive", &["verification", "medical", "nutrition", "exercise"])]
    #[case("anything-else", &["verification", "medical", "nutrition", "exercise"])]
    fn sequence_per_analysis_type(#[case] analysis_type: &str, #[case] expected: &[&str]) {
        assert_eq!(AnalysisPipeline::stage_sequence(analysis_type), expected);
    }

    #[tokio::test]
    async fn comprehensive_run_assembles_all_sections() {
        let pipeline = AnalysisPipeline::with_default_stages();
        let report = pipeline
            .run("comprehensive", SAMPLE_REPORT, "how is my iron?")
            .await
            .unwrap();
        assert!(report.contains("## Document Verification"));
        assert!(report.contains("## Medical Interpretation"));
        assert!(report.contains("## Nutrition Guidance"));
        assert!(report.contains("## Exercise Guidance"));
    }

    #[tokio::test]
    async fn missing_stage_is_reported_by_name() {
        let pipeline = AnalysisPipeline::new(Arc::new(StageRegistry::new()));
        let err = pipeline
            .run("verification", SAMPLE_REPORT, "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("verification"));
    }

    #[tokio::test]
    async fn load_report_prefers_inline_text() {
        let payload = serde_json::json!({"report_text": "Glucose: 90", "file": "/nope.pdf"});
        assert_eq!(load_report(&payload).await.unwrap(), "Glucose: 90");
    }

    #[tokio::test]
    async fn load_report_surfaces_unreadable_files() {
        let payload = serde_json::json!({"file": "/does/not/exist.txt"});
        let err = load_report(&payload).await.unwrap_err();
        assert!(matches!(err, HemoqError::Report(_)));

        let empty = serde_json::json!({});
        assert!(load_report(&empty).await.is_err());
    }
}
