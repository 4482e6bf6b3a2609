//! nobl9_service data source

use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::Diagnostic;

use super::{labels_attribute, labels_value, Lookup};
use crate::manifest::{Kind, Object, ServiceSpec};
use crate::resources::common::StateBuilder;
use crate::resources::service::{status_attribute, status_value};
use crate::resources::spec_of;

#[derive(Clone)]
pub struct ServiceLookup;

fn required(name: &str, description: &str) -> tfplug::schema::Attribute {
    AttributeBuilder::new(name, AttributeType::String)
        .description(description)
        .required()
        .build()
}

fn computed(name: &str, description: &str) -> tfplug::schema::Attribute {
    AttributeBuilder::new(name, AttributeType::String)
        .description(description)
        .computed()
        .build()
}

impl Lookup for ServiceLookup {
    fn type_name(&self) -> &'static str {
        "nobl9_service"
    }

    fn kind(&self) -> Kind {
        Kind::Service
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up an existing service by name and project.")
            .attribute(required("name", "Name of the service."))
            .attribute(required("project", "Project the service belongs to."))
            .attribute(computed("display_name", "User-friendly name of the service."))
            .attribute(computed("description", "Description of the service."))
            .attribute(labels_attribute())
            .attribute(status_attribute())
            .build()
    }

    fn state<'a>(&self, object: &Object, builder: StateBuilder<'a>) -> Result<StateBuilder<'a>, Diagnostic> {
        let spec: ServiceSpec = spec_of(object)?;
        Ok(builder
            .string("display_name", object.metadata.display_name.clone())
            .string("description", Some(spec.description))
            .set_raw("labels", labels_value(&object.metadata.labels))
            .set_raw("status", status_value(object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fields::object;
    use serde_json::json;
    use tfplug::types::Dynamic;

    #[test]
    fn schema_requires_name_and_project() {
        let schema = ServiceLookup.schema();
        assert!(schema.block.attribute("name").unwrap().required);
        assert!(schema.block.attribute("project").unwrap().required);
        assert!(schema.block.attribute("status").unwrap().computed);
    }

    #[test]
    fn state_keeps_lookup_keys_and_adds_status() {
        let service: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Service",
            "metadata": {"name": "checkout", "project": "payments"},
            "spec": {"description": ""},
            "status": {"sloCount": 3}
        }))
        .unwrap();
        let config = object(vec![
            ("name", Dynamic::String("checkout".to_string())),
            ("project", Dynamic::String("payments".to_string())),
        ]);

        let state = ServiceLookup
            .state(&service, StateBuilder::new(&config))
            .unwrap()
            .build();
        assert_eq!(state.get("project"), Some(&Dynamic::String("payments".to_string())));
        assert_eq!(state.get("description"), Some(&Dynamic::Null));
        assert_eq!(
            state.get("status").and_then(|s| s.get("slo_count")),
            Some(&Dynamic::Number(3.0))
        );
    }
}
