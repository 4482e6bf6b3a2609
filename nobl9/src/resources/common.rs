//! Helpers shared by every resource: state access, schema fragments,
//! metadata marshalling, reference-order sorting and the concurrency retry.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::schema::{Attribute, AttributeBuilder, AttributeType, BlockBuilder, NestedBlock};
use tfplug::validator::{StringLengthValidator, StringPatternValidator};
use tfplug::Dynamic;

use crate::api::ApiError;
use crate::manifest::{Labels, Metadata};

/// Default deadline for one create/update/delete including concurrency retries
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

const INITIAL_CONCURRENCY_BACKOFF: Duration = Duration::from_millis(200);
const MAX_CONCURRENCY_BACKOFF: Duration = Duration::from_secs(5);

/// Read-only view of an object value from a Terraform config, plan or state.
///
/// Null and unknown values read as absent.
#[derive(Clone, Copy)]
pub struct Attrs<'a>(pub &'a Dynamic);

impl<'a> Attrs<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Dynamic> {
        self.0.get(name).filter(|v| !v.is_null() && !v.is_unknown())
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(Dynamic::as_string)
            .map(str::to_string)
    }

    /// Like `string`, but empty strings read as absent
    pub fn non_empty(&self, name: &str) -> Option<String> {
        self.string(name).filter(|s| !s.is_empty())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Dynamic::as_number)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.number(name).map(|n| n as i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Dynamic::as_bool)
    }

    pub fn strings(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(Dynamic::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Dynamic::as_string)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn string_map(&self, name: &str) -> BTreeMap<String, String> {
        self.get(name)
            .and_then(Dynamic::as_map)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(k, v)| v.as_string().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Items of a list or set nested block
    pub fn blocks(&self, name: &str) -> Vec<Attrs<'a>> {
        self.get(name)
            .and_then(Dynamic::as_list)
            .map(|items| items.iter().map(Attrs).collect())
            .unwrap_or_default()
    }

    /// First item of a nested block limited to one item
    pub fn block(&self, name: &str) -> Option<Attrs<'a>> {
        self.blocks(name).into_iter().next()
    }
}

fn is_zero(value: &Dynamic) -> bool {
    match value {
        Dynamic::String(s) => s.is_empty(),
        Dynamic::Bool(b) => !b,
        Dynamic::List(items) => items.is_empty(),
        Dynamic::Map(entries) => entries.is_empty(),
        _ => false,
    }
}

/// Builds an object value for state.
///
/// The API omits or zeroes optional fields the user never set. A zero value
/// from the API is written the way the prior value spelled it: an explicit
/// `""`, `false` or `[]` stays, anything else becomes null.
pub struct StateBuilder<'a> {
    prior: Attrs<'a>,
    values: HashMap<String, Dynamic>,
}

impl<'a> StateBuilder<'a> {
    pub fn new(prior: &'a Dynamic) -> Self {
        Self {
            prior: Attrs(prior),
            values: HashMap::new(),
        }
    }

    pub fn prior(&self) -> Attrs<'a> {
        self.prior
    }

    pub fn set(mut self, name: &str, value: Dynamic) -> Self {
        let value = if value.is_null() || is_zero(&value) {
            match self.prior.get(name) {
                Some(prior) if is_zero(prior) => prior.clone(),
                _ => Dynamic::Null,
            }
        } else {
            value
        };
        self.values.insert(name.to_string(), value);
        self
    }

    /// Sets a value as is, without zero normalization
    pub fn set_raw(mut self, name: &str, value: Dynamic) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn string(self, name: &str, value: Option<impl Into<String>>) -> Self {
        let value = value.map(|v| Dynamic::String(v.into())).unwrap_or(Dynamic::Null);
        self.set(name, value)
    }

    pub fn number(self, name: &str, value: Option<f64>) -> Self {
        self.set_raw(name, value.map(Dynamic::Number).unwrap_or(Dynamic::Null))
    }

    pub fn bool(self, name: &str, value: Option<bool>) -> Self {
        let value = value.map(Dynamic::Bool).unwrap_or(Dynamic::Null);
        self.set(name, value)
    }

    pub fn strings(self, name: &str, values: impl IntoIterator<Item = String>) -> Self {
        let items: Vec<Dynamic> = values.into_iter().map(Dynamic::String).collect();
        self.set(name, Dynamic::List(items))
    }

    pub fn string_map(self, name: &str, values: &BTreeMap<String, String>) -> Self {
        let entries: HashMap<String, Dynamic> = values
            .iter()
            .map(|(k, v)| (k.clone(), Dynamic::String(v.clone())))
            .collect();
        self.set(name, Dynamic::Map(entries))
    }

    /// Nested blocks are always lists, empty when absent
    pub fn blocks(self, name: &str, items: Vec<Dynamic>) -> Self {
        self.set_raw(name, Dynamic::List(items))
    }

    pub fn block(self, name: &str, item: Option<Dynamic>) -> Self {
        self.blocks(name, item.into_iter().collect())
    }

    /// Sensitive values the API never returns are carried over from the prior value
    pub fn secret(self, name: &str) -> Self {
        let value = self.prior.get(name).cloned().unwrap_or(Dynamic::Null);
        self.set_raw(name, value)
    }

    pub fn build(self) -> Dynamic {
        Dynamic::Map(self.values)
    }
}

/// Reorders `list` so that elements found in `reference` follow the reference
/// order; the others keep their relative order after them.
pub fn sort_list_based_on_reference_list<T, K, F>(mut list: Vec<T>, reference: &[K], key: F) -> Vec<T>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    list.sort_by_key(|item| {
        let k = key(item);
        match reference.iter().position(|r| *r == k) {
            Some(index) => (0, index),
            None => (1, 0),
        }
    });
    list
}

/// Repeats `op` while the backend reports a concurrency issue, until `timeout` elapses
pub async fn retry_on_concurrency_issue<T, F, Fut>(timeout: Duration, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut backoff = INITIAL_CONCURRENCY_BACKOFF;

    loop {
        match op().await {
            Err(e) if e.is_concurrency_issue() => {
                if tokio::time::Instant::now() + backoff >= deadline {
                    tracing::error!("giving up after concurrency issues: {}", e);
                    return Err(e);
                }
                tracing::warn!("concurrency issue, retrying in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, MAX_CONCURRENCY_BACKOFF);
            }
            other => return other,
        }
    }
}

/// Time left for an operation: the request deadline when set, the default otherwise
pub fn operation_timeout(ctx: &Context) -> Duration {
    ctx.remaining().unwrap_or(DEFAULT_OPERATION_TIMEOUT)
}

// Schema fragments

fn name_pattern() -> Option<Regex> {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok()
}

fn with_name_rules(mut builder: AttributeBuilder) -> AttributeBuilder {
    builder = builder.validator(StringLengthValidator {
        min: Some(1),
        max: Some(63),
    });
    if let Some(pattern) = name_pattern() {
        builder = builder.validator(StringPatternValidator::new(
            pattern,
            "lowercase alphanumeric characters or '-', starting and ending with an alphanumeric character",
        ));
    }
    builder
}

pub fn name_attribute(description: &str) -> Attribute {
    with_name_rules(AttributeBuilder::new("name", AttributeType::String))
        .description(description)
        .required()
        .plan_modifier(RequiresReplace)
        .build()
}

pub fn project_attribute(description: &str) -> Attribute {
    with_name_rules(AttributeBuilder::new("project", AttributeType::String))
        .description(description)
        .required()
        .plan_modifier(RequiresReplace)
        .build()
}

pub fn display_name_attribute(description: &str) -> Attribute {
    AttributeBuilder::new("display_name", AttributeType::String)
        .description(description)
        .optional()
        .validator(StringLengthValidator {
            min: None,
            max: Some(63),
        })
        .build()
}

pub fn description_attribute(description: &str) -> Attribute {
    AttributeBuilder::new("description", AttributeType::String)
        .description(description)
        .optional()
        .validator(StringLengthValidator {
            min: None,
            max: Some(1050),
        })
        .build()
}

pub fn annotations_attribute() -> Attribute {
    AttributeBuilder::new("annotations", AttributeType::Map(Box::new(AttributeType::String)))
        .description("Metadata annotations attached to the object.")
        .optional()
        .build()
}

pub fn id_attribute() -> Attribute {
    AttributeBuilder::new("id", AttributeType::String)
        .description("Identifier of the object, equal to its name.")
        .computed()
        .plan_modifier(UseStateForUnknown)
        .build()
}

pub fn label_block() -> NestedBlock {
    BlockBuilder::new("label")
        .description("Labels attached to the object.")
        .attribute(
            AttributeBuilder::new("key", AttributeType::String)
                .description("A key for the label, unique within the object.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("values", AttributeType::List(Box::new(AttributeType::String)))
                .description("A list of unique values for a single key.")
                .required()
                .build(),
        )
        .list()
        .build()
}

/// Reference to another object: `name` and optional `project`
pub fn object_ref_block(type_name: &str, description: &str) -> BlockBuilder {
    BlockBuilder::new(type_name)
        .description(description)
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("Name of the referenced object.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("project", AttributeType::String)
                .description("Project of the referenced object; the referring object's project when unset.")
                .optional()
                .computed()
                .build(),
        )
}

// Metadata marshalling

pub fn marshal_labels(state: Attrs<'_>) -> Labels {
    let mut labels = Labels::new();
    for block in state.blocks("label") {
        if let Some(key) = block.string("key") {
            labels.entry(key).or_default().extend(block.strings("values"));
        }
    }
    labels
}

/// Label blocks in the prior order, values in the prior order within each key
pub fn unmarshal_labels(labels: &Labels, prior: Attrs<'_>) -> Vec<Dynamic> {
    let prior_blocks = prior.blocks("label");
    let prior_keys: Vec<String> = prior_blocks.iter().filter_map(|b| b.string("key")).collect();

    let entries: Vec<(&String, &Vec<String>)> = labels.iter().collect();
    let entries = sort_list_based_on_reference_list(entries, &prior_keys, |(k, _)| (*k).clone());

    entries
        .into_iter()
        .map(|(key, values)| {
            let reference = prior_blocks
                .iter()
                .find(|b| b.string("key").as_deref() == Some(key.as_str()))
                .map(|b| b.strings("values"))
                .unwrap_or_default();
            let values = sort_list_based_on_reference_list(values.clone(), &reference, |v| v.clone());
            Dynamic::Map(HashMap::from([
                ("key".to_string(), Dynamic::String(key.clone())),
                (
                    "values".to_string(),
                    Dynamic::List(values.into_iter().map(Dynamic::String).collect()),
                ),
            ]))
        })
        .collect()
}

/// Metadata from the common attributes; only reads those present in the schema
pub fn marshal_metadata(state: Attrs<'_>, project_scoped: bool) -> Metadata {
    Metadata {
        name: state.string("name").unwrap_or_default(),
        display_name: state.non_empty("display_name"),
        project: if project_scoped {
            state.string("project")
        } else {
            None
        },
        labels: marshal_labels(state),
        annotations: state.string_map("annotations"),
    }
}

/// Writes the common attributes; callers pick which ones their schema has
pub struct MetadataFields {
    pub display_name: bool,
    pub project: bool,
    pub labels: bool,
    pub annotations: bool,
}

impl MetadataFields {
    pub const ALL: MetadataFields = MetadataFields {
        display_name: true,
        project: true,
        labels: true,
        annotations: true,
    };

    pub const GLOBAL: MetadataFields = MetadataFields {
        display_name: true,
        project: false,
        labels: true,
        annotations: true,
    };
}

pub fn unmarshal_metadata<'a>(
    mut builder: StateBuilder<'a>,
    metadata: &Metadata,
    fields: &MetadataFields,
) -> StateBuilder<'a> {
    let prior = builder.prior();
    builder = builder.string("name", Some(metadata.name.clone()));
    if fields.display_name {
        builder = builder.string("display_name", metadata.display_name.clone());
    }
    if fields.project {
        builder = builder.string("project", metadata.project.clone());
    }
    if fields.labels {
        builder = builder.blocks("label", unmarshal_labels(&metadata.labels, prior));
    }
    if fields.annotations {
        builder = builder.string_map("annotations", &metadata.annotations);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn map(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
        Dynamic::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn label(key: &str, values: &[&str]) -> Dynamic {
        map(vec![
            ("key", Dynamic::String(key.to_string())),
            (
                "values",
                Dynamic::List(values.iter().map(|v| Dynamic::String(v.to_string())).collect()),
            ),
        ])
    }

    #[test]
    fn sort_follows_reference_and_keeps_the_rest() {
        let sorted = sort_list_based_on_reference_list(
            vec!["d", "b", "x", "a", "y"],
            &["a", "b", "d"],
            |s| *s,
        );
        assert_eq!(sorted, vec!["a", "b", "d", "x", "y"]);
    }

    #[test]
    fn sort_with_empty_reference_is_identity() {
        let sorted = sort_list_based_on_reference_list(vec![3, 1, 2], &[], |n| *n);
        assert_eq!(sorted, vec![3, 1, 2]);
    }

    #[test]
    fn attrs_ignore_unknown_and_null() {
        let value = map(vec![
            ("a", Dynamic::Unknown),
            ("b", Dynamic::Null),
            ("c", Dynamic::String("x".into())),
            ("d", Dynamic::String(String::new())),
        ]);
        let attrs = Attrs(&value);
        assert_eq!(attrs.string("a"), None);
        assert_eq!(attrs.string("b"), None);
        assert_eq!(attrs.string("c").as_deref(), Some("x"));
        assert_eq!(attrs.string("d").as_deref(), Some(""));
        assert_eq!(attrs.non_empty("d"), None);
    }

    #[test]
    fn builder_keeps_explicit_zero_values() {
        let prior = map(vec![
            ("description", Dynamic::String(String::new())),
            ("shared", Dynamic::Null),
            ("tags", Dynamic::List(vec![])),
        ]);
        let state = StateBuilder::new(&prior)
            .string("description", None::<String>)
            .bool("shared", Some(false))
            .strings("tags", Vec::new())
            .string("name", Some("svc"))
            .build();

        assert_eq!(state.get("description"), Some(&Dynamic::String(String::new())));
        assert_eq!(state.get("shared"), Some(&Dynamic::Null));
        assert_eq!(state.get("tags"), Some(&Dynamic::List(vec![])));
        assert_eq!(state.get("name"), Some(&Dynamic::String("svc".into())));
    }

    #[test]
    fn builder_carries_secrets_from_prior() {
        let prior = map(vec![("api_key", Dynamic::String("s3cr3t".into()))]);
        let state = StateBuilder::new(&prior).secret("api_key").secret("other").build();
        assert_eq!(state.get("api_key"), Some(&Dynamic::String("s3cr3t".into())));
        assert_eq!(state.get("other"), Some(&Dynamic::Null));
    }

    #[test]
    fn labels_round_trip_in_prior_order() {
        let prior = map(vec![(
            "label",
            Dynamic::List(vec![label("team", &["sre", "green"]), label("env", &["prod"])]),
        )]);

        let labels = marshal_labels(Attrs(&prior));
        assert_eq!(labels["team"], vec!["sre".to_string(), "green".to_string()]);

        let mut from_api = Labels::new();
        from_api.insert("env".to_string(), vec!["prod".to_string()]);
        from_api.insert("team".to_string(), vec!["green".to_string(), "sre".to_string()]);

        let blocks = unmarshal_labels(&from_api, Attrs(&prior));
        assert_eq!(blocks, vec![label("team", &["sre", "green"]), label("env", &["prod"])]);
    }

    #[test]
    fn metadata_marshal_skips_project_for_global_kinds() {
        let state = map(vec![
            ("name", Dynamic::String("p".into())),
            ("project", Dynamic::String("ignored".into())),
            ("display_name", Dynamic::String(String::new())),
        ]);
        let metadata = marshal_metadata(Attrs(&state), false);
        assert_eq!(metadata.name, "p");
        assert_eq!(metadata.project, None);
        assert_eq!(metadata.display_name, None);
    }

    #[tokio::test]
    async fn retry_stops_after_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_on_concurrency_issue(Duration::from_secs(5), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::ApiError {
                        status: 500,
                        message: crate::api::error::CONCURRENCY_ISSUE_MESSAGE.to_string(),
                        details: None,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_passes_other_errors_through() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), ApiError> = retry_on_concurrency_issue(Duration::from_secs(5), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::RateLimited) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_at_timeout() {
        let result: Result<(), ApiError> =
            retry_on_concurrency_issue(Duration::from_millis(100), || async {
                Err(ApiError::ApiError {
                    status: 500,
                    message: crate::api::error::CONCURRENCY_ISSUE_MESSAGE.to_string(),
                    details: None,
                })
            })
            .await;
        assert!(result.unwrap_err().is_concurrency_issue());
    }
}
