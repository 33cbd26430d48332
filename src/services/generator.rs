use crate::services::{AnswerGenerator, ServiceError};

const OFFLINE_NOTICE: &str = "No language model is configured. The relevant legal material is listed below.";

/// Answer generator that returns the structured context as-is
///
/// Used when the pipeline runs without a language model; the caller still
/// sees which statutes and cases the question was matched against.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAnswerGenerator;

impl AnswerGenerator for OfflineAnswerGenerator {
    fn generate(&self, context: &str, question: &str) -> Result<String, ServiceError> {
        Ok(format!("Question: {}\n\n{}\n\n{}", question.trim(), OFFLINE_NOTICE, context))
    }
}
