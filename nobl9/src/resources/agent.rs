//! nobl9_agent
//!
//! An agent runs next to a metric source and pushes data to Nobl9. The
//! `agent_type` picks the source; its settings go in the matching
//! `<source>_config` block.

use serde_json::Value;
use tfplug::plan_modifier::RequiresReplace;
use tfplug::schema::{AttributeBuilder, AttributeType, BlockBuilder, NestedBlock, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};
use tfplug::validator::OneOfValidator;

use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, label_block,
    marshal_metadata, name_attribute, project_attribute, unmarshal_metadata, Attrs,
    MetadataFields, StateBuilder,
};
use super::fields::{marshal_fields, or_null, unmarshal_fields, with_fields};
use super::sources::{self, Source};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{AgentSpec, HistoricalDataRetrieval, Kind, ManifestDuration, Object};

const DURATION_UNITS: [&str; 3] = ["Minute", "Hour", "Day"];

#[derive(Clone)]
pub struct AgentMapping;

pub fn config_block_name(source: &Source) -> String {
    format!("{}_config", source.name)
}

fn duration_block(name: &str, description: &str, units: &[&str]) -> NestedBlock {
    BlockBuilder::new(name)
        .description(description)
        .attribute(
            AttributeBuilder::new("value", AttributeType::Number)
                .description("Duration length.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("unit", AttributeType::String)
                .description("Duration unit.")
                .required()
                .validator(OneOfValidator::new(units.iter().copied()))
                .build(),
        )
        .min_items(1)
        .max_items(1)
        .build()
}

/// `query_delay` and `historical_data_retrieval`, shared with direct resources
pub fn data_settings_blocks() -> Vec<NestedBlock> {
    let query_delay = BlockBuilder::new("query_delay")
        .description("Delay applied to every query; the server default when omitted.")
        .attribute(
            AttributeBuilder::new("value", AttributeType::Number)
                .description("Delay length.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("unit", AttributeType::String)
                .description("Delay unit.")
                .required()
                .validator(OneOfValidator::new(["Second", "Minute"]))
                .build(),
        )
        .max_items(1)
        .build();

    let historical = BlockBuilder::new("historical_data_retrieval")
        .description("How far back historical data can be replayed.")
        .block(duration_block("default_duration", "Duration used by default.", &DURATION_UNITS))
        .block(duration_block("max_duration", "Longest duration allowed.", &DURATION_UNITS))
        .max_items(1)
        .build();

    vec![query_delay, historical]
}

fn marshal_duration(block: Attrs<'_>) -> ManifestDuration {
    ManifestDuration {
        value: block.int("value").unwrap_or_default(),
        unit: block.string("unit").unwrap_or_default(),
    }
}

fn duration_value(duration: &ManifestDuration) -> Dynamic {
    StateBuilder::new(&Dynamic::Null)
        .number("value", Some(duration.value as f64))
        .string("unit", Some(duration.unit.clone()))
        .build()
}

pub fn marshal_query_delay(state: Attrs<'_>) -> Option<ManifestDuration> {
    state.block("query_delay").map(marshal_duration)
}

pub fn marshal_historical(state: Attrs<'_>) -> Option<HistoricalDataRetrieval> {
    state.block("historical_data_retrieval").map(|h| HistoricalDataRetrieval {
        default_duration: h.block("default_duration").map(marshal_duration).unwrap_or_default(),
        max_duration: h.block("max_duration").map(marshal_duration).unwrap_or_default(),
    })
}

/// The server fills in both settings when they are omitted; they are only
/// written back when the prior value configured them
pub fn unmarshal_data_settings<'a>(
    builder: StateBuilder<'a>,
    query_delay: Option<&ManifestDuration>,
    historical: Option<&HistoricalDataRetrieval>,
) -> StateBuilder<'a> {
    let prior = builder.prior();
    let query_delay = query_delay
        .filter(|_| prior.block("query_delay").is_some())
        .map(duration_value);
    let historical = historical
        .filter(|_| prior.block("historical_data_retrieval").is_some())
        .map(|h| {
            StateBuilder::new(&Dynamic::Null)
                .block("default_duration", Some(duration_value(&h.default_duration)))
                .block("max_duration", Some(duration_value(&h.max_duration)))
                .build()
        });
    builder
        .block("query_delay", query_delay)
        .block("historical_data_retrieval", historical)
}

impl ObjectMapping for AgentMapping {
    fn type_name(&self) -> String {
        "nobl9_agent".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::Agent
    }

    fn schema(&self) -> Schema {
        let agent_types: Vec<&str> = sources::agent_sources().map(|s| s.name).collect();

        let config_blocks = sources::agent_sources()
            .filter_map(|source| {
                let fields = source.agent.filter(|f| !f.is_empty())?;
                Some(
                    with_fields(BlockBuilder::new(&config_block_name(source)), fields)
                        .description(&format!("{} agent settings.", source.title))
                        .max_items(1)
                        .build(),
                )
            })
            .collect::<Vec<_>>();

        SchemaBuilder::new()
            .version(0)
            .description("Agent that collects metrics from a source and sends them to Nobl9.")
            .attribute(name_attribute("Unique name of the agent."))
            .attribute(project_attribute("Name of the project the agent belongs to."))
            .attribute(display_name_attribute("User-friendly name of the agent."))
            .attribute(description_attribute("Optional description of the agent."))
            .attribute(annotations_attribute())
            .attribute(
                AttributeBuilder::new("agent_type", AttributeType::String)
                    .description("Metric source the agent reads from.")
                    .required()
                    .validator(OneOfValidator::new(agent_types))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("release_channel", AttributeType::String)
                    .description("Release channel of the agent.")
                    .optional()
                    .computed()
                    .validator(OneOfValidator::new(["stable", "beta"]))
                    .build(),
            )
            .block(label_block())
            .blocks(data_settings_blocks())
            .blocks(config_blocks)
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let agent_type = state.string("agent_type").unwrap_or_default();
        let source = sources::find(&agent_type)
            .filter(|s| s.has_agent())
            .ok_or_else(|| {
                Diagnostic::error(
                    "Unsupported agent type",
                    format!("'{}' is not a supported agent type", agent_type),
                )
            })?;

        let config = state
            .block(&config_block_name(source))
            .map(|block| marshal_fields(source.agent.unwrap_or_default(), block))
            .unwrap_or_default();

        let spec = AgentSpec {
            description: state.string("description").unwrap_or_default(),
            release_channel: state.string("release_channel"),
            query_delay: marshal_query_delay(state),
            historical_data_retrieval: marshal_historical(state),
            source: [(source.json.to_string(), Value::Object(config))].into_iter().collect(),
        };
        to_object(Kind::Agent, marshal_metadata(state, true), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: AgentSpec = spec_of(object)?;
        let prior_attrs = Attrs(prior);

        let (source, config) = spec
            .source
            .iter()
            .find_map(|(key, value)| sources::find_by_json(key).map(|s| (s, value)))
            .ok_or_else(|| {
                Diagnostic::error(
                    "Unexpected Agent returned by the API",
                    format!("Agent '{}' has no supported source", object.name()),
                )
            })?;

        let mut builder = unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &MetadataFields::ALL)
            .string("description", Some(spec.description.clone()))
            .string("agent_type", Some(source.name))
            .string("release_channel", spec.release_channel.clone());
        builder = unmarshal_data_settings(
            builder,
            spec.query_delay.as_ref(),
            spec.historical_data_retrieval.as_ref(),
        );

        for candidate in sources::agent_sources() {
            let Some(fields) = candidate.agent.filter(|f| !f.is_empty()) else {
                continue;
            };
            let block_name = config_block_name(candidate);
            let item = (candidate.name == source.name)
                .then(|| config.as_object())
                .flatten()
                .map(|json| {
                    unmarshal_fields(fields, json, StateBuilder::new(or_null(prior_attrs.block(&block_name))))
                        .build()
                });
            builder = builder.block(&block_name, item);
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::validate;
    use crate::resources::fields::object;
    use serde_json::json;

    fn s(value: &str) -> Dynamic {
        Dynamic::String(value.to_string())
    }

    #[test]
    fn marshal_prometheus_agent() {
        let state = object(vec![
            ("name", s("prom")),
            ("project", s("payments")),
            ("agent_type", s("prometheus")),
            ("release_channel", Dynamic::Unknown),
            (
                "prometheus_config",
                Dynamic::List(vec![object(vec![("url", s("http://prometheus:9090"))])]),
            ),
            (
                "query_delay",
                Dynamic::List(vec![object(vec![
                    ("value", Dynamic::Number(2.0)),
                    ("unit", s("Minute")),
                ])]),
            ),
        ]);

        let object = AgentMapping.marshal(Attrs(&state)).unwrap();
        assert_eq!(
            object.spec,
            json!({
                "description": "",
                "prometheus": {"url": "http://prometheus:9090"},
                "queryDelay": {"value": 2, "unit": "Minute"}
            })
        );
        assert!(validate(&object).is_ok());
    }

    #[test]
    fn agent_without_settings_sends_an_empty_source() {
        let state = object(vec![
            ("name", s("bq")),
            ("project", s("payments")),
            ("agent_type", s("bigquery")),
        ]);
        let object = AgentMapping.marshal(Attrs(&state)).unwrap();
        assert_eq!(object.spec["bigQuery"], json!({}));
    }

    #[test]
    fn unknown_agent_type_is_rejected() {
        let state = object(vec![("name", s("x")), ("agent_type", s("honeycomb"))]);
        assert!(AgentMapping.marshal(Attrs(&state)).is_err());
    }

    #[test]
    fn unmarshal_drops_server_defaults_not_configured() {
        let prior = object(vec![
            ("name", s("prom")),
            (
                "prometheus_config",
                Dynamic::List(vec![object(vec![("url", s("http://prometheus:9090"))])]),
            ),
        ]);
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Agent",
            "metadata": {"name": "prom", "project": "payments"},
            "spec": {
                "description": "",
                "releaseChannel": "stable",
                "prometheus": {"url": "http://prometheus:9090"},
                "queryDelay": {"value": 1, "unit": "Minute"},
                "historicalDataRetrieval": {
                    "maxDuration": {"value": 30, "unit": "Day"},
                    "defaultDuration": {"value": 7, "unit": "Day"}
                }
            }
        }))
        .unwrap();

        let state = AgentMapping.unmarshal(&object, &prior).unwrap();
        let attrs = Attrs(&state);
        assert_eq!(attrs.string("agent_type").as_deref(), Some("prometheus"));
        assert_eq!(attrs.string("release_channel").as_deref(), Some("stable"));
        assert!(attrs.block("query_delay").is_none());
        assert!(attrs.block("historical_data_retrieval").is_none());
        assert_eq!(
            attrs.block("prometheus_config").and_then(|c| c.string("url")).as_deref(),
            Some("http://prometheus:9090")
        );
        assert_eq!(state.get("datadog_config"), Some(&Dynamic::List(vec![])));
    }
}
