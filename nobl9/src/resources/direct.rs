//! nobl9_direct_<source>
//!
//! One resource type per source Nobl9 can query directly. The source's
//! settings are top-level attributes; credentials are sensitive and never
//! returned by the API, so state keeps the configured values.

use serde_json::Value;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};
use tfplug::validator::OneOfValidator;

use super::agent::{marshal_historical, marshal_query_delay, unmarshal_data_settings, data_settings_blocks};
use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, label_block,
    marshal_metadata, name_attribute, project_attribute, unmarshal_metadata, Attrs,
    MetadataFields, StateBuilder,
};
use super::fields::{field_schema, marshal_fields, unmarshal_fields};
use super::sources::Source;
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{DirectSpec, Kind, Object};

#[derive(Clone, Copy)]
pub struct DirectMapping {
    source: &'static Source,
}

impl DirectMapping {
    pub fn new(source: &'static Source) -> Self {
        Self { source }
    }

    fn fields(&self) -> &'static [super::fields::Field] {
        self.source.direct.unwrap_or_default()
    }
}

impl ObjectMapping for DirectMapping {
    fn type_name(&self) -> String {
        format!("nobl9_direct_{}", self.source.name)
    }

    fn kind(&self) -> Kind {
        Kind::Direct
    }

    fn schema(&self) -> Schema {
        let (attributes, blocks) = field_schema(self.fields());
        SchemaBuilder::new()
            .version(0)
            .description(&format!("{} direct integration.", self.source.title))
            .attribute(name_attribute("Unique name of the direct."))
            .attribute(project_attribute("Name of the project the direct belongs to."))
            .attribute(display_name_attribute("User-friendly name of the direct."))
            .attribute(description_attribute("Optional description of the direct."))
            .attribute(annotations_attribute())
            .attribute(
                AttributeBuilder::new("release_channel", AttributeType::String)
                    .description("Release channel of the direct.")
                    .optional()
                    .computed()
                    .validator(OneOfValidator::new(["stable", "beta"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("log_collection_enabled", AttributeType::Bool)
                    .description("Collect logs of the direct's queries.")
                    .optional()
                    .build(),
            )
            .attributes(attributes)
            .block(label_block())
            .blocks(data_settings_blocks())
            .blocks(blocks)
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let settings = marshal_fields(self.fields(), state);
        let spec = DirectSpec {
            description: state.string("description").unwrap_or_default(),
            release_channel: state.string("release_channel"),
            query_delay: marshal_query_delay(state),
            historical_data_retrieval: marshal_historical(state),
            log_collection_enabled: state.bool("log_collection_enabled"),
            source: [(self.source.json.to_string(), Value::Object(settings))]
                .into_iter()
                .collect(),
        };
        to_object(Kind::Direct, marshal_metadata(state, true), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: DirectSpec = spec_of(object)?;
        let settings = spec
            .source
            .get(self.source.json)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Diagnostic::error(
                    "Unexpected Direct returned by the API",
                    format!(
                        "Direct '{}' is not a {} direct",
                        object.name(),
                        self.source.title
                    ),
                )
            })?;

        let mut builder =
            unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &MetadataFields::ALL)
                .string("description", Some(spec.description.clone()))
                .string("release_channel", spec.release_channel.clone())
                .bool("log_collection_enabled", spec.log_collection_enabled);
        builder = unmarshal_data_settings(
            builder,
            spec.query_delay.as_ref(),
            spec.historical_data_retrieval.as_ref(),
        );
        Ok(unmarshal_fields(self.fields(), settings, builder).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fields::object;
    use crate::resources::sources;
    use serde_json::json;

    fn s(value: &str) -> Dynamic {
        Dynamic::String(value.to_string())
    }

    fn datadog() -> DirectMapping {
        DirectMapping::new(sources::find("datadog").unwrap())
    }

    #[test]
    fn type_name_carries_the_source() {
        assert_eq!(datadog().type_name(), "nobl9_direct_datadog");
    }

    #[test]
    fn schema_marks_credentials_sensitive() {
        let schema = datadog().schema();
        let api_key = schema.block.attribute("api_key").unwrap();
        assert!(api_key.sensitive);
        assert!(api_key.optional);
        assert!(schema.block.attribute("site").unwrap().required);
    }

    #[test]
    fn marshal_datadog_direct() {
        let state = object(vec![
            ("name", s("dd")),
            ("project", s("payments")),
            ("site", s("eu")),
            ("api_key", s("key")),
            ("application_key", s("app")),
            ("log_collection_enabled", Dynamic::Bool(true)),
        ]);

        let object = datadog().marshal(Attrs(&state)).unwrap();
        assert_eq!(
            object.spec,
            json!({
                "description": "",
                "logCollectionEnabled": true,
                "datadog": {"site": "eu", "apiKey": "key", "applicationKey": "app"}
            })
        );
    }

    #[test]
    fn unmarshal_keeps_credentials_from_state() {
        let prior = object(vec![
            ("api_key", s("key")),
            ("application_key", s("app")),
        ]);
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Direct",
            "metadata": {"name": "dd", "project": "payments"},
            "spec": {
                "description": "",
                "releaseChannel": "stable",
                "logCollectionEnabled": false,
                "datadog": {"site": "eu", "apiKey": "[hidden]", "applicationKey": "[hidden]"}
            }
        }))
        .unwrap();

        let state = datadog().unmarshal(&object, &prior).unwrap();
        assert_eq!(state.get("api_key"), Some(&s("key")));
        assert_eq!(state.get("application_key"), Some(&s("app")));
        assert_eq!(state.get("site"), Some(&s("eu")));
        assert_eq!(state.get("log_collection_enabled"), Some(&Dynamic::Null));
    }

    #[test]
    fn unmarshal_rejects_another_source() {
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Direct",
            "metadata": {"name": "dd", "project": "payments"},
            "spec": {"splunk": {"url": "https://splunk"}}
        }))
        .unwrap();
        assert!(datadog().unmarshal(&object, &Dynamic::Null).is_err());
    }
}
