//! Draft documents: one in-flight, uncommitted record per form.
//!
//! ```text
//!            merge / merge_bound
//!              ┌──────┐
//!              ▼      │
//!   seed ──► Editing ─┘ ── submit ok ──► Submitted ──► (fresh) Editing
//!              ▲  │
//!              │  └─ submit fails: ValidationFailed / store error,
//!              │     draft unchanged
//!              └── reset
//! ```
//!
//! The draft is never persisted. Submit turns all of its fields and pending
//! attachments into one `put`; either the whole document lands or nothing does.

use gigboard_core::{is_filled, now_millis, Fields, Job};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::database::Database;
use crate::document::{Attachment, FileEntry, PutRequest, PutResult};
use crate::error::GigError;

/// What a fresh draft starts from.
#[derive(Debug, Clone, Default)]
pub struct DraftDefaults {
    fields: Fields,
    /// Field stamped with the current time on seed and again on submit
    creation_stamp: Option<String>,
}

impl DraftDefaults {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            creation_stamp: None,
        }
    }

    pub fn with_creation_stamp(mut self, field: impl Into<String>) -> Self {
        self.creation_stamp = Some(field.into());
        self
    }

    /// Blank job form, stamped with `createdAt`.
    pub fn for_jobs() -> Self {
        Self::new(Job::form_defaults()).with_creation_stamp(Job::CREATED_AT)
    }

    fn draft(&self, instance: u64) -> Draft {
        let mut fields = self.fields.clone();
        let seeded_stamp = self.creation_stamp.as_ref().map(|field| {
            let stamp = Value::from(now_millis());
            fields.insert(field.clone(), stamp.clone());
            stamp
        });
        Draft {
            instance,
            fields,
            files: BTreeMap::new(),
            seeded_stamp,
        }
    }
}

/// Required-field policy checked on submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields(Vec<String>);

impl RequiredFields {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn for_jobs() -> Self {
        Self::new(Job::REQUIRED)
    }

    /// Names of required fields that are missing, null or blank, in policy order.
    pub fn missing(&self, fields: &Fields) -> Vec<String> {
        self.0
            .iter()
            .filter(|name| !is_filled(fields, name))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Editing,
    Submitted,
}

/// The in-memory draft.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    instance: u64,
    fields: Fields,
    files: BTreeMap<String, Attachment>,
    /// Creation stamp written by the seed, if any
    seeded_stamp: Option<Value>,
}

impl Draft {
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn files(&self) -> &BTreeMap<String, Attachment> {
        &self.files
    }
}

/// A partial edit: fields to overwrite and attachments to set by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftPatch {
    pub fields: Fields,
    pub files: BTreeMap<String, Attachment>,
}

impl DraftPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn attach(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.files.insert(name.into(), attachment);
        self
    }
}

impl From<Fields> for DraftPatch {
    fn from(fields: Fields) -> Self {
        Self {
            fields,
            files: BTreeMap::new(),
        }
    }
}

/// Names the draft an asynchronous edit was started against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftBinding {
    instance: u64,
}

impl DraftBinding {
    pub fn instance(&self) -> u64 {
        self.instance
    }
}

/// Owns the single draft of one logical form.
#[derive(Debug)]
pub struct DraftController {
    defaults: DraftDefaults,
    required: RequiredFields,
    state: DraftState,
    draft: Draft,
    last_submitted: Option<PutResult>,
    /// Creation stamp of the last submit; later stamps are strictly greater
    last_stamp: i64,
}

impl DraftController {
    pub fn new(defaults: DraftDefaults, required: RequiredFields) -> Self {
        let draft = defaults.draft(1);
        Self {
            defaults,
            required,
            state: DraftState::Editing,
            draft,
            last_submitted: None,
            last_stamp: 0,
        }
    }

    /// Controller for the "post a job" form.
    pub fn for_jobs() -> Self {
        Self::new(DraftDefaults::for_jobs(), RequiredFields::for_jobs())
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    /// Result of the most recent successful submit.
    pub fn last_submitted(&self) -> Option<&PutResult> {
        self.last_submitted.as_ref()
    }

    pub fn binding(&self) -> DraftBinding {
        DraftBinding {
            instance: self.draft.instance,
        }
    }

    /// Shallow-merge fields; attachments overwrite by name.
    pub fn merge(&mut self, patch: impl Into<DraftPatch>) {
        let patch = patch.into();
        self.draft.fields.extend(patch.fields);
        self.draft.files.extend(patch.files);
    }

    /// Merge only if `binding` still names the current draft.
    pub fn merge_bound(
        &mut self,
        binding: DraftBinding,
        patch: impl Into<DraftPatch>,
    ) -> Result<(), GigError> {
        if binding.instance != self.draft.instance || self.state != DraftState::Editing {
            log::debug!(
                "Dropping edit for draft #{} (current #{})",
                binding.instance,
                self.draft.instance
            );
            return Err(GigError::StaleDraft(binding.instance));
        }
        self.merge(patch);
        Ok(())
    }

    /// Discard edits and start over from the defaults.
    pub fn reset(&mut self) {
        self.reseed();
    }

    pub fn validate(&self) -> Result<(), GigError> {
        let missing = self.required.missing(&self.draft.fields);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GigError::ValidationFailed { missing })
        }
    }

    /// Commit the draft as one new document and start a fresh draft.
    ///
    /// On any error the draft is left exactly as it was.
    pub fn submit(&mut self, db: &Database) -> Result<PutResult, GigError> {
        self.validate()?;

        let (fields, stamp) = self.fields_to_commit();
        let request = PutRequest {
            id: None,
            fields,
            files: self
                .draft
                .files
                .iter()
                .map(|(name, attachment)| (name.clone(), FileEntry::Pending(attachment.clone())))
                .collect(),
        };
        let result = db.put(request)?;

        self.state = DraftState::Submitted;
        log::info!(
            "Submitted draft #{} as {}@{}",
            self.draft.instance,
            result.id,
            result.rev
        );
        self.last_submitted = Some(result.clone());
        if let Some(stamp) = stamp {
            self.last_stamp = stamp;
        }
        self.reseed();
        Ok(result)
    }

    /// The draft's fields, with a creation stamp still at its seeded value
    /// moved to submit time. Returns the new stamp when one was written.
    fn fields_to_commit(&self) -> (Fields, Option<i64>) {
        let mut fields = self.draft.fields.clone();
        let Some(field) = &self.defaults.creation_stamp else {
            return (fields, None);
        };
        let seeded = self.draft.seeded_stamp.as_ref();
        if seeded.is_none() || fields.get(field) != seeded {
            return (fields, None);
        }
        let stamp = now_millis().max(self.last_stamp + 1);
        fields.insert(field.clone(), Value::from(stamp));
        (fields, Some(stamp))
    }

    fn reseed(&mut self) {
        self.draft = self.defaults.draft(self.draft.instance + 1);
        self.state = DraftState::Editing;
    }
}

/// Rejects re-entrant starts of one named action.
#[derive(Debug)]
pub struct BusyFlag {
    name: &'static str,
    busy: AtomicBool,
}

impl BusyFlag {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: AtomicBool::new(false),
        }
    }

    /// Claim the flag until the returned guard drops, or fail with `Busy`.
    pub fn try_acquire(&self) -> Result<BusyGuard<'_>, GigError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(GigError::Busy(self.name));
        }
        Ok(BusyGuard { flag: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}
