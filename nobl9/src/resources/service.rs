//! nobl9_service

use std::collections::HashMap;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, label_block,
    marshal_metadata, name_attribute, project_attribute, unmarshal_metadata, Attrs,
    MetadataFields, StateBuilder,
};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{Kind, Object, ServiceSpec, ServiceStatus};

#[derive(Clone)]
pub struct ServiceMapping;

/// Computed `status` value of a service
pub fn status_value(object: &Object) -> Dynamic {
    let status: ServiceStatus = object.status_as().unwrap_or_default();
    Dynamic::Map(HashMap::from([(
        "slo_count".to_string(),
        Dynamic::Number(status.slo_count as f64),
    )]))
}

pub fn status_attribute() -> tfplug::schema::Attribute {
    AttributeBuilder::new("status", AttributeType::Map(Box::new(AttributeType::Number)))
        .description("Status of the service; `slo_count` is the number of SLOs it contains.")
        .computed()
        .build()
}

impl ObjectMapping for ServiceMapping {
    fn type_name(&self) -> String {
        "nobl9_service".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::Service
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("A service is a high-level grouping of SLOs.")
            .attribute(name_attribute("Unique name of the service."))
            .attribute(project_attribute("Name of the project the service belongs to."))
            .attribute(display_name_attribute("User-friendly name of the service."))
            .attribute(description_attribute("Optional description of the service."))
            .attribute(annotations_attribute())
            .attribute(status_attribute())
            .block(label_block())
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let spec = ServiceSpec {
            description: state.string("description").unwrap_or_default(),
        };
        to_object(Kind::Service, marshal_metadata(state, true), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: ServiceSpec = spec_of(object)?;
        Ok(
            unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &MetadataFields::ALL)
                .string("description", Some(spec.description))
                .set_raw("status", status_value(object))
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fields::object;
    use serde_json::json;

    fn label(key: &str, values: &[&str]) -> Dynamic {
        object(vec![
            ("key", Dynamic::String(key.into())),
            (
                "values",
                Dynamic::List(values.iter().map(|v| Dynamic::String(v.to_string())).collect()),
            ),
        ])
    }

    #[test]
    fn marshal_service_with_labels() {
        let state = object(vec![
            ("name", Dynamic::String("checkout".into())),
            ("project", Dynamic::String("payments".into())),
            ("description", Dynamic::Null),
            ("label", Dynamic::List(vec![label("team", &["green", "sre"])])),
            (
                "annotations",
                object(vec![("owner", Dynamic::String("ops".into()))]),
            ),
        ]);

        let object = ServiceMapping.marshal(Attrs(&state)).unwrap();
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({
                "apiVersion": "n9/v1alpha",
                "kind": "Service",
                "metadata": {
                    "name": "checkout",
                    "project": "payments",
                    "labels": {"team": ["green", "sre"]},
                    "annotations": {"owner": "ops"}
                },
                "spec": {"description": ""}
            })
        );
    }

    #[test]
    fn unmarshal_reads_status() {
        let prior = object(vec![("label", Dynamic::List(vec![label("team", &["sre", "green"])]))]);
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Service",
            "metadata": {
                "name": "checkout",
                "project": "payments",
                "labels": {"team": ["green", "sre"]}
            },
            "spec": {"description": "Checkout flow"},
            "status": {"sloCount": 3}
        }))
        .unwrap();

        let state = ServiceMapping.unmarshal(&object, &prior).unwrap();
        assert_eq!(state.get("project"), Some(&Dynamic::String("payments".into())));
        assert_eq!(
            state.get("status").and_then(|s| s.get("slo_count")),
            Some(&Dynamic::Number(3.0))
        );
        assert_eq!(
            state.get("label"),
            Some(&Dynamic::List(vec![label("team", &["sre", "green"])]))
        );
    }
}
