//! Secondary indexes over live documents.
//!
//! Each index projects a document onto `(key, sort)`: the value of the
//! indexed field and the value of the sort field. Entries are kept in a
//! `BTreeSet` ordered by `(key, sort, id)`, so a key lookup is a range scan
//! and ties on the sort value always break by ascending document id.
//!
//! Indexes are updated synchronously inside the commit that changed the
//! document; a query never sees an entry older than the latest commit.

use gigboard_core::Fields;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::document::DocId;

/// Totally ordered projection of a JSON value.
///
/// Null < Bool < Number < String < Array < Object.
#[derive(Debug, Clone)]
pub enum IndexValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<IndexValue>),
    Object(Vec<(String, IndexValue)>),
}

impl IndexValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => IndexValue::Null,
            Value::Bool(b) => IndexValue::Bool(*b),
            Value::Number(n) => IndexValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => IndexValue::String(s.clone()),
            Value::Array(items) => IndexValue::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => IndexValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IndexValue::Null => 0,
            IndexValue::Bool(_) => 1,
            IndexValue::Number(_) => 2,
            IndexValue::String(_) => 3,
            IndexValue::Array(_) => 4,
            IndexValue::Object(_) => 5,
        }
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexValue::Null, IndexValue::Null) => Ordering::Equal,
            (IndexValue::Bool(a), IndexValue::Bool(b)) => a.cmp(b),
            (IndexValue::Number(a), IndexValue::Number(b)) => a.total_cmp(b),
            (IndexValue::String(a), IndexValue::String(b)) => a.cmp(b),
            (IndexValue::Array(a), IndexValue::Array(b)) => a.cmp(b),
            (IndexValue::Object(a), IndexValue::Object(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

/// Definition of an index: which field to key on and which to sort by.
///
/// Field names may be dotted paths into nested objects (`"address.city"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    field: String,
    sort: String,
}

impl IndexSpec {
    /// Index keyed and sorted on `field`.
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            sort: field.clone(),
            field,
        }
    }

    pub fn sorted_by(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn sort(&self) -> &str {
        &self.sort
    }

    /// Display label for logs and listings. Not unique: `"a|b"` also names
    /// the index on a field literally called `a|b`.
    pub fn name(&self) -> String {
        if self.field == self.sort {
            self.field.clone()
        } else {
            format!("{}|{}", self.field, self.sort)
        }
    }

    /// The raw value of the keyed field.
    pub fn key_of<'a>(&self, fields: &'a Fields) -> Option<&'a Value> {
        lookup(fields, &self.field)
    }

    /// Project a document onto `(key, sort)`; `None` when the keyed field is absent.
    pub fn project(&self, fields: &Fields) -> Option<(IndexValue, IndexValue)> {
        let key = lookup(fields, &self.field)?;
        let sort = lookup(fields, &self.sort).map_or(IndexValue::Null, IndexValue::from_json);
        Some((IndexValue::from_json(key), sort))
    }
}

impl From<&str> for IndexSpec {
    fn from(field: &str) -> Self {
        Self::new(field)
    }
}

impl From<String> for IndexSpec {
    fn from(field: String) -> Self {
        Self::new(field)
    }
}

impl From<&IndexSpec> for IndexSpec {
    fn from(spec: &IndexSpec) -> Self {
        spec.clone()
    }
}

fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

/// Query shape: optional exact key, direction and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub key: Option<Value>,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One `(key, sort, id)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub key: IndexValue,
    pub sort: IndexValue,
    pub id: DocId,
}

/// A single maintained index.
#[derive(Debug)]
pub struct Index {
    spec: IndexSpec,
    entries: BTreeSet<IndexEntry>,
    by_doc: HashMap<DocId, IndexEntry>,
}

impl Index {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeSet::new(),
            by_doc: HashMap::new(),
        }
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the entry for one document; `None` fields means deleted.
    ///
    /// Returns whether the index held or now holds an entry for `id`.
    pub fn apply(&mut self, id: &DocId, fields: Option<&Fields>) -> bool {
        let old = self.by_doc.remove(id);
        if let Some(old) = &old {
            self.entries.remove(old);
        }

        let new = fields.and_then(|f| self.spec.project(f)).map(|(key, sort)| IndexEntry {
            key,
            sort,
            id: id.clone(),
        });
        let touched = old.is_some() || new.is_some();
        if let Some(entry) = new {
            self.entries.insert(entry.clone());
            self.by_doc.insert(id.clone(), entry);
        }
        touched
    }

    /// Matching entries in query order.
    pub fn query(&self, options: &QueryOptions) -> Vec<&IndexEntry> {
        let mut matched: Vec<&IndexEntry> = match &options.key {
            Some(key) => {
                let key = IndexValue::from_json(key);
                let start = IndexEntry {
                    key: key.clone(),
                    sort: IndexValue::Null,
                    id: DocId::min(),
                };
                self.entries
                    .range(start..)
                    .take_while(|e| e.key == key)
                    .collect()
            }
            None => self.entries.iter().collect(),
        };

        if options.descending {
            // Reverse the key and sort order but keep ids ascending within ties.
            matched.sort_by(|a, b| {
                b.key
                    .cmp(&a.key)
                    .then_with(|| b.sort.cmp(&a.sort))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// All registered indexes, keyed by their spec.
#[derive(Debug, Default)]
pub struct IndexEngine {
    indexes: HashMap<IndexSpec, Index>,
}

impl IndexEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index and back-fill it from `docs`.
    ///
    /// Re-registering an existing spec is a no-op; returns whether the index is new.
    pub fn register<'a, I>(&mut self, spec: IndexSpec, docs: I) -> bool
    where
        I: IntoIterator<Item = (&'a DocId, &'a Fields)>,
    {
        if self.indexes.contains_key(&spec) {
            return false;
        }

        let mut index = Index::new(spec.clone());
        for (id, fields) in docs {
            index.apply(id, Some(fields));
        }
        log::debug!("Registered index {} with {} entries", spec.name(), index.len());
        self.indexes.insert(spec, index);
        true
    }

    pub fn contains(&self, spec: &IndexSpec) -> bool {
        self.indexes.contains_key(spec)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.values().map(|i| i.spec().name()).collect();
        names.sort();
        names
    }

    /// Apply one committed document to every index.
    ///
    /// Returns the specs of indexes whose contents may have changed.
    pub fn apply(&mut self, id: &DocId, fields: Option<&Fields>) -> Vec<IndexSpec> {
        self.indexes
            .iter_mut()
            .filter_map(|(spec, index)| index.apply(id, fields).then(|| spec.clone()))
            .collect()
    }

    pub fn query(&self, spec: &IndexSpec, options: &QueryOptions) -> Option<Vec<&IndexEntry>> {
        self.indexes.get(spec).map(|index| index.query(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> DocId {
        DocId::parse(s).unwrap()
    }

    fn fields(value: Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn ids(entries: &[&IndexEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.to_string()).collect()
    }

    #[test]
    fn test_value_order_across_types() {
        let mut values = vec![
            IndexValue::from_json(&json!("b")),
            IndexValue::from_json(&json!(10)),
            IndexValue::from_json(&json!(null)),
            IndexValue::from_json(&json!(true)),
            IndexValue::from_json(&json!({ "a": 1 })),
            IndexValue::from_json(&json!([1])),
            IndexValue::from_json(&json!(2.5)),
        ];
        values.sort();
        let expected = vec![
            IndexValue::Null,
            IndexValue::Bool(true),
            IndexValue::Number(2.5),
            IndexValue::Number(10.0),
            IndexValue::String("b".into()),
            IndexValue::Array(vec![IndexValue::Number(1.0)]),
            IndexValue::Object(vec![("a".into(), IndexValue::Number(1.0))]),
        ];
        assert_eq!(values, expected);
    }

    #[test]
    fn test_descending_by_timestamp() {
        let mut index = Index::new(IndexSpec::new("createdAt"));
        index.apply(&id("a"), Some(&fields(json!({ "createdAt": 100 }))));
        index.apply(&id("b"), Some(&fields(json!({ "createdAt": 300 }))));
        index.apply(&id("c"), Some(&fields(json!({ "createdAt": 200 }))));

        let desc = index.query(&QueryOptions::new().descending());
        assert_eq!(ids(&desc), vec!["b", "c", "a"]);

        let asc = index.query(&QueryOptions::new());
        assert_eq!(ids(&asc), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let mut index = Index::new(IndexSpec::new("createdAt"));
        for name in ["m", "z", "a", "k"] {
            index.apply(&id(name), Some(&fields(json!({ "createdAt": 5 }))));
        }
        index.apply(&id("b"), Some(&fields(json!({ "createdAt": 9 }))));

        let asc = index.query(&QueryOptions::new());
        assert_eq!(ids(&asc), vec!["a", "k", "m", "z", "b"]);

        let desc = index.query(&QueryOptions::new().descending());
        assert_eq!(ids(&desc), vec!["b", "a", "k", "m", "z"]);
    }

    #[test]
    fn test_key_filter_with_sort_field() {
        let spec = IndexSpec::new("type").sorted_by("createdAt");
        let mut index = Index::new(spec);
        index.apply(&id("n1"), Some(&fields(json!({ "type": "note", "createdAt": 2 }))));
        index.apply(&id("j1"), Some(&fields(json!({ "type": "job", "createdAt": 1 }))));
        index.apply(&id("n2"), Some(&fields(json!({ "type": "note", "createdAt": 1 }))));
        index.apply(&id("x"), Some(&fields(json!({ "title": "untyped" }))));

        let notes = index.query(&QueryOptions::new().key("note"));
        assert_eq!(ids(&notes), vec!["n2", "n1"]);

        let notes = index.query(&QueryOptions::new().key("note").descending());
        assert_eq!(ids(&notes), vec!["n1", "n2"]);

        assert!(index.query(&QueryOptions::new().key("memo")).is_empty());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_apply_moves_and_removes_entries() {
        let mut index = Index::new(IndexSpec::new("createdAt"));
        let a = id("a");
        assert!(index.apply(&a, Some(&fields(json!({ "createdAt": 1 })))));
        assert!(index.apply(&a, Some(&fields(json!({ "createdAt": 7 })))));
        assert_eq!(index.len(), 1);
        assert_eq!(index.query(&QueryOptions::new())[0].sort, IndexValue::Number(7.0));

        // Dropping the field removes the entry.
        assert!(index.apply(&a, Some(&fields(json!({ "title": "x" })))));
        assert!(index.is_empty());

        // Untouched documents report no change.
        assert!(!index.apply(&id("b"), Some(&fields(json!({ "title": "y" })))));

        index.apply(&a, Some(&fields(json!({ "createdAt": 1 }))));
        assert!(index.apply(&a, None));
        assert!(index.is_empty());
    }

    #[test]
    fn test_missing_sort_field_sorts_first() {
        let spec = IndexSpec::new("type").sorted_by("createdAt");
        let mut index = Index::new(spec);
        index.apply(&id("b"), Some(&fields(json!({ "type": "note", "createdAt": 1 }))));
        index.apply(&id("a"), Some(&fields(json!({ "type": "note" }))));
        assert_eq!(ids(&index.query(&QueryOptions::new())), vec!["a", "b"]);
    }

    #[test]
    fn test_limit() {
        let mut index = Index::new(IndexSpec::new("n"));
        for i in 0..10 {
            index.apply(&id(&format!("d{i}")), Some(&fields(json!({ "n": i }))));
        }
        let top = index.query(&QueryOptions::new().descending().limit(3));
        assert_eq!(ids(&top), vec!["d9", "d8", "d7"]);
    }

    #[test]
    fn test_dotted_path() {
        let spec = IndexSpec::new("address.city");
        let doc = fields(json!({ "address": { "city": "Seattle" } }));
        let (key, sort) = spec.project(&doc).unwrap();
        assert_eq!(key, IndexValue::String("Seattle".into()));
        assert_eq!(sort, key);
        assert!(spec.project(&fields(json!({ "address": "none" }))).is_none());
    }

    #[test]
    fn test_engine_register_idempotent_and_backfills() {
        let docs = vec![
            (id("a"), fields(json!({ "createdAt": 2 }))),
            (id("b"), fields(json!({ "createdAt": 1 }))),
        ];
        let mut engine = IndexEngine::new();

        let new = engine.register(IndexSpec::new("createdAt"), docs.iter().map(|(i, f)| (i, f)));
        assert!(new);
        let again = engine.register(IndexSpec::new("createdAt"), docs.iter().map(|(i, f)| (i, f)));
        assert!(!again);

        let all = engine
            .query(&IndexSpec::new("createdAt"), &QueryOptions::new())
            .unwrap();
        assert_eq!(ids(&all), vec!["b", "a"]);
        assert!(engine
            .query(&IndexSpec::new("missing"), &QueryOptions::new())
            .is_none());
    }

    #[test]
    fn test_engine_apply_reports_affected() {
        let mut engine = IndexEngine::new();
        engine.register(IndexSpec::new("createdAt"), std::iter::empty());
        engine.register(IndexSpec::new("type").sorted_by("createdAt"), std::iter::empty());

        let affected = engine.apply(&id("j"), Some(&fields(json!({ "createdAt": 1 }))));
        assert_eq!(affected, vec![IndexSpec::new("createdAt")]);

        let mut affected = engine.apply(
            &id("n"),
            Some(&fields(json!({ "type": "note", "createdAt": 2 }))),
        );
        affected.sort_by_key(IndexSpec::name);
        assert_eq!(
            affected,
            vec![
                IndexSpec::new("createdAt"),
                IndexSpec::new("type").sorted_by("createdAt"),
            ]
        );

        assert_eq!(engine.names(), vec!["createdAt", "type|createdAt"]);
    }

    #[test]
    fn test_engine_keeps_specs_with_equal_labels_apart() {
        let docs = vec![
            (id("a"), fields(json!({ "a|b": "literal" }))),
            (id("b"), fields(json!({ "a": "x", "b": 1 }))),
        ];
        let literal = IndexSpec::new("a|b");
        let sorted = IndexSpec::new("a").sorted_by("b");
        assert_eq!(literal.name(), sorted.name());

        let mut engine = IndexEngine::new();
        assert!(engine.register(literal.clone(), docs.iter().map(|(i, f)| (i, f))));
        assert!(engine.register(sorted.clone(), docs.iter().map(|(i, f)| (i, f))));

        let by_literal = engine.query(&literal, &QueryOptions::new()).unwrap();
        assert_eq!(ids(&by_literal), vec!["a"]);
        let by_sorted = engine.query(&sorted, &QueryOptions::new()).unwrap();
        assert_eq!(ids(&by_sorted), vec!["b"]);
    }
}
