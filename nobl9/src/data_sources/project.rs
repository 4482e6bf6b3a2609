//! nobl9_project data source

use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::Diagnostic;

use super::{labels_attribute, labels_value, Lookup};
use crate::manifest::{Kind, Object, ProjectSpec};
use crate::resources::common::StateBuilder;
use crate::resources::spec_of;

#[derive(Clone)]
pub struct ProjectLookup;

impl Lookup for ProjectLookup {
    fn type_name(&self) -> &'static str {
        "nobl9_project"
    }

    fn kind(&self) -> Kind {
        Kind::Project
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up an existing project by name.")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the project.")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("display_name", AttributeType::String)
                    .description("User-friendly name of the project.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .description("Description of the project.")
                    .computed()
                    .build(),
            )
            .attribute(labels_attribute())
            .build()
    }

    fn state<'a>(&self, object: &Object, builder: StateBuilder<'a>) -> Result<StateBuilder<'a>, Diagnostic> {
        let spec: ProjectSpec = spec_of(object)?;
        Ok(builder
            .string("display_name", object.metadata.display_name.clone())
            .string("description", Some(spec.description))
            .set_raw("labels", labels_value(&object.metadata.labels)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fields::object;
    use serde_json::json;
    use tfplug::types::Dynamic;

    #[test]
    fn state_exposes_metadata_and_description() {
        let project: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Project",
            "metadata": {
                "name": "payments",
                "displayName": "Payments",
                "labels": {"team": ["sre"]}
            },
            "spec": {"description": "Card processing"}
        }))
        .unwrap();
        let config = object(vec![("name", Dynamic::String("payments".to_string()))]);

        let state = ProjectLookup
            .state(&project, StateBuilder::new(&config))
            .unwrap()
            .build();
        assert_eq!(state.get("display_name"), Some(&Dynamic::String("Payments".to_string())));
        assert_eq!(
            state.get("description"),
            Some(&Dynamic::String("Card processing".to_string()))
        );
        assert_eq!(
            state.get("labels").and_then(|l| l.get("team")),
            Some(&Dynamic::List(vec![Dynamic::String("sre".to_string())]))
        );
    }
}
