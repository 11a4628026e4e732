//! AI text generation capability.
//!
//! The transport to the model is out of scope: callers hand in any
//! [`Generator`]. Both free text and schema-constrained JSON output are
//! supported; every failure collapses into [`GenerationError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use thiserror::Error;

use crate::job::{BudgetType, Job, JobCategory, JobStatus};

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The service could not be reached or refused the prompt.
    #[error("generation request failed: {0}")]
    Request(String),
    /// Structured output did not parse against the expected shape.
    #[error("structured response did not parse: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The generator has no output for this kind of request.
    #[error("unsupported output schema")]
    UnsupportedSchema,
}

/// Output-shape constraint passed alongside a structured prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema(Value);

impl OutputSchema {
    pub fn new(schema: Value) -> Self {
        Self(schema)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Whether the schema declares a top-level property with this name.
    pub fn has_property(&self, name: &str) -> bool {
        self.0
            .get("properties")
            .and_then(|p| p.get(name))
            .is_some()
    }
}

/// External AI text service.
pub trait Generator: Send + Sync {
    /// Free-text completion.
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;

    /// Completion constrained to `schema`; returns the raw JSON text.
    fn generate_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Run a structured generation and parse the response into `T`.
pub async fn generate_typed<G, T>(
    generator: &G,
    prompt: &str,
    schema: &OutputSchema,
) -> Result<T, GenerationError>
where
    G: Generator + ?Sized,
    T: DeserializeOwned,
{
    let raw = generator.generate_structured(prompt, schema).await?;
    parse_structured(&raw)
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
    Ok(serde_json::from_str(raw.trim())?)
}

/// Prompt asking for a description of a job with the given title and category.
pub fn job_description_prompt(title: &str, category: &str) -> String {
    format!(
        "Create a detailed job description for a {category} job titled \"{title}\". \
         Include typical requirements, scope of work, and appropriate details a client might want to specify. \
         Keep it under 200 words and make it professional but approachable."
    )
}

pub fn demo_jobs_prompt(count: usize) -> String {
    format!(
        "Generate {count} local job listings in JSON format. Each job should have:\n\
         - title: creative but realistic local job title\n\
         - category: one of these categories [{}]\n\
         - description: detailed 2-3 sentence job description\n\
         - location: a realistic city and neighborhood\n\
         - budget: a reasonable dollar amount as a number\n\
         - budgetType: either \"fixed\" or \"hourly\"\n\
         - date: a future date in YYYY-MM-DD format\n\
         - time: a time range like \"2:00 PM - 5:00 PM\"\n\
         - status: \"Open\"",
        JobCategory::joined()
    )
}

pub fn demo_jobs_schema() -> OutputSchema {
    let string = json!({ "type": "string" });
    OutputSchema::new(json!({
        "properties": {
            "jobs": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": string,
                        "category": string,
                        "description": string,
                        "location": string,
                        "budget": string,
                        "budgetType": string,
                        "date": string,
                        "time": string,
                        "status": string
                    }
                }
            }
        }
    }))
}

/// Response shape of [`demo_jobs_schema`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoJobs {
    pub jobs: Vec<Job>,
}

/// Offline generator producing deterministic text from built-in templates.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    demo_count: usize,
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self { demo_count: 5 }
    }
}

impl TemplateGenerator {
    pub fn new(demo_count: usize) -> Self {
        Self { demo_count }
    }

    fn describe(prompt: &str) -> String {
        let title = prompt.split('"').nth(1).unwrap_or("this job");
        format!(
            "We are looking for a reliable local professional to help with \"{title}\". \
             The work should be completed carefully and on schedule, and you should bring \
             any tools the job requires. Please share relevant experience, your availability, \
             and a rough estimate when you respond. Questions about scope are welcome before starting."
        )
    }

    fn demo_jobs(&self) -> DemoJobs {
        const PLACES: [&str; 5] = [
            "Capitol Hill, Seattle",
            "Mission District, San Francisco",
            "Pearl District, Portland",
            "Williamsburg, Brooklyn",
            "South Congress, Austin",
        ];
        let jobs = (0..self.demo_count)
            .map(|i| {
                let category = JobCategory::ALL[i % JobCategory::ALL.len()];
                let mut job = Job::new(format!("{category} help needed #{}", i + 1), category);
                job.description = format!(
                    "Looking for someone experienced in {} work. Expect roughly half a day on site.",
                    category.as_str().to_lowercase()
                );
                job.location = PLACES[i % PLACES.len()].to_string();
                job.budget = (40 + 15 * i).to_string();
                job.budget_type = if i % 2 == 0 {
                    BudgetType::Fixed
                } else {
                    BudgetType::Hourly
                };
                job.date = format!("2030-06-{:02}", 1 + i % 28);
                job.time = "2:00 PM - 5:00 PM".to_string();
                job.status = JobStatus::Open;
                job.created_at = 0;
                job
            })
            .collect();
        DemoJobs { jobs }
    }
}

impl Generator for TemplateGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        log::debug!("Template generation for {} byte prompt", prompt.len());
        Ok(Self::describe(prompt))
    }

    async fn generate_structured(
        &self,
        _prompt: &str,
        schema: &OutputSchema,
    ) -> Result<String, GenerationError> {
        if !schema.has_property("jobs") {
            return Err(GenerationError::UnsupportedSchema);
        }
        serde_json::to_string(&self.demo_jobs()).map_err(GenerationError::from)
    }
}
