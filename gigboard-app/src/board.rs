//! The job board: form, AI helpers, dashboard and notes over two databases.

use gigboard_core::{
    demo_jobs_prompt, demo_jobs_schema, generate_typed, is_filled, job_description_prompt,
    now_millis, DemoJobs, DocumentKind, Generator, Job, JobStatus, Note,
};
use gigboard_store::{
    BusyFlag, Database, Draft, DraftController, DraftPatch, GigError, IndexSpec, LiveQueryHandle,
    PutResult, QueryOptions, QueryResult,
};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Dashboard ordering: newest job first.
fn dashboard_query() -> (IndexSpec, QueryOptions) {
    (IndexSpec::new(Job::CREATED_AT), QueryOptions::new().descending())
}

/// Saved notes, newest first.
fn notes_query() -> (IndexSpec, QueryOptions) {
    (
        IndexSpec::new("type").sorted_by("createdAt"),
        QueryOptions::new().key(Note::TYPE).descending(),
    )
}

pub struct JobBoard<G> {
    jobs: Arc<Database>,
    notes: Arc<Database>,
    generator: G,
    form: Mutex<DraftController>,
    describing: BusyFlag,
    seeding: BusyFlag,
    demo_jobs: usize,
}

impl<G: Generator> JobBoard<G> {
    pub fn new(
        jobs: Arc<Database>,
        notes: Arc<Database>,
        generator: G,
        demo_jobs: usize,
    ) -> Result<Self, GigError> {
        jobs.register_index(dashboard_query().0)?;
        notes.register_index(notes_query().0)?;
        Ok(Self {
            jobs,
            notes,
            generator,
            form: Mutex::new(DraftController::for_jobs()),
            describing: BusyFlag::new("description generation"),
            seeding: BusyFlag::new("demo data generation"),
            demo_jobs,
        })
    }

    // ─── Job form ─────────────────────────────────────────────────────

    /// Current form contents.
    pub fn draft(&self) -> Draft {
        self.form().draft().clone()
    }

    pub fn edit(&self, patch: impl Into<DraftPatch>) {
        self.form().merge(patch);
    }

    pub fn reset_form(&self) {
        self.form().reset();
    }

    /// Submit the form as a new job.
    pub fn post_job(&self) -> Result<PutResult, GigError> {
        let result = self.form().submit(&self.jobs)?;
        log::info!("Posted job {}", result.id);
        Ok(result)
    }

    /// Ask the generator for a description and put it into the form.
    ///
    /// Needs a title and category. If the form was submitted or reset while
    /// the request was out, the text is discarded with `StaleDraft`.
    pub async fn generate_description(&self) -> Result<String, GigError> {
        let _busy = self.describing.try_acquire()?;

        let (binding, prompt) = {
            let form = self.form();
            let fields = form.draft().fields();
            let missing: Vec<String> = ["title", "category"]
                .into_iter()
                .filter(|name| !is_filled(fields, name))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(GigError::ValidationFailed { missing });
            }
            let title = form.draft().get_str("title").unwrap_or_default();
            let category = form.draft().get_str("category").unwrap_or_default();
            (form.binding(), job_description_prompt(title, category))
        };

        let description = self.generator.generate(&prompt).await?;

        self.form().merge_bound(
            binding,
            DraftPatch::new().set("description", description.clone()),
        )?;
        Ok(description)
    }

    // ─── Demo data ────────────────────────────────────────────────────

    /// Generate sample jobs and store each one, spread over the last day.
    pub async fn generate_demo_data(&self) -> Result<Vec<PutResult>, GigError> {
        let _busy = self.seeding.try_acquire()?;

        let demo: DemoJobs = generate_typed(
            &self.generator,
            &demo_jobs_prompt(self.demo_jobs),
            &demo_jobs_schema(),
        )
        .await?;

        let jobs = backdate(demo.jobs.into_iter().take(self.demo_jobs).collect(), now_millis());
        let mut stored = Vec::with_capacity(jobs.len());
        for job in &jobs {
            stored.push(self.jobs.put_kind(None, job)?);
        }
        log::info!("Stored {} demo jobs", stored.len());
        Ok(stored)
    }

    // ─── Dashboard ────────────────────────────────────────────────────

    /// Change a job's status, keeping every other field and its image.
    pub fn update_status(&self, id: &str, status: JobStatus) -> Result<PutResult, GigError> {
        let mut update = self.jobs.get(id)?.to_update();
        update.fields.insert("status".into(), status.as_str().into());
        self.jobs.put(update)
    }

    pub fn delete_job(&self, id: &str) -> Result<PutResult, GigError> {
        self.jobs.del(id)
    }

    pub fn job(&self, id: &str) -> Result<Job, GigError> {
        self.jobs.get_kind(id)
    }

    /// Jobs newest first, redelivered on every change.
    pub fn dashboard<F>(&self, callback: F) -> Result<LiveQueryHandle, GigError>
    where
        F: FnMut(&QueryResult) + Send + 'static,
    {
        let (spec, options) = dashboard_query();
        self.jobs.subscribe(spec, options, callback)
    }

    pub fn watch_dashboard(
        &self,
    ) -> Result<(LiveQueryHandle, watch::Receiver<QueryResult>), GigError> {
        let (spec, options) = dashboard_query();
        self.jobs.watch(spec, options)
    }

    // ─── Notes ────────────────────────────────────────────────────────

    pub fn save_note(&self, content: impl Into<String>) -> Result<PutResult, GigError> {
        self.notes.put_kind(None, &Note::new(content))
    }

    /// Send `prompt` to the generator and keep the answer as a note.
    pub async fn ask(&self, prompt: &str) -> Result<PutResult, GigError> {
        let answer = self.generator.generate(prompt).await?;
        self.save_note(answer)
    }

    /// Saved notes, newest first. Documents that fail validation are skipped.
    pub fn notes(&self) -> Result<Vec<Note>, GigError> {
        let (spec, options) = notes_query();
        let result = self.notes.query(spec, &options)?;
        Ok(result
            .docs()
            .filter_map(|doc| match Note::from_fields(&doc.fields) {
                Ok(note) => Some(note),
                Err(e) => {
                    log::warn!("Skipping malformed note {}: {e}", doc.id);
                    None
                }
            })
            .collect())
    }

    fn form(&self) -> MutexGuard<'_, DraftController> {
        self.form.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stamp each job with a random time within the day before `now`.
fn backdate(mut jobs: Vec<Job>, now: i64) -> Vec<Job> {
    let mut rng = rand::rng();
    for job in &mut jobs {
        job.created_at = now - rng.random_range(0..DAY_MS);
    }
    jobs
}
