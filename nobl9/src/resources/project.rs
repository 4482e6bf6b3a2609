//! nobl9_project

use tfplug::schema::{Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, label_block,
    marshal_metadata, name_attribute, unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{Kind, Object, ProjectSpec};

#[derive(Clone)]
pub struct ProjectMapping;

impl ObjectMapping for ProjectMapping {
    fn type_name(&self) -> String {
        "nobl9_project".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::Project
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Projects are the primary grouping of resources in Nobl9.")
            .attribute(name_attribute("Unique name of the project."))
            .attribute(display_name_attribute("User-friendly name of the project."))
            .attribute(description_attribute("Optional description of the project."))
            .attribute(annotations_attribute())
            .block(label_block())
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let spec = ProjectSpec {
            description: state.string("description").unwrap_or_default(),
        };
        to_object(Kind::Project, marshal_metadata(state, false), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: ProjectSpec = spec_of(object)?;
        Ok(
            unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &MetadataFields::GLOBAL)
                .string("description", Some(spec.description))
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fields::object;
    use serde_json::json;

    #[test]
    fn marshal_project() {
        let state = object(vec![
            ("name", Dynamic::String("payments".into())),
            ("display_name", Dynamic::String("Payments".into())),
            ("description", Dynamic::String("Team payments".into())),
            ("annotations", Dynamic::Null),
            ("label", Dynamic::List(vec![])),
        ]);

        let object = ProjectMapping.marshal(Attrs(&state)).unwrap();
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({
                "apiVersion": "n9/v1alpha",
                "kind": "Project",
                "metadata": {"name": "payments", "displayName": "Payments"},
                "spec": {"description": "Team payments"}
            })
        );
    }

    #[test]
    fn unmarshal_keeps_unset_description_null() {
        let prior = object(vec![("name", Dynamic::String("payments".into()))]);
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Project",
            "metadata": {"name": "payments"},
            "spec": {"description": ""}
        }))
        .unwrap();

        let state = ProjectMapping.unmarshal(&object, &prior).unwrap();
        assert_eq!(state.get("name"), Some(&Dynamic::String("payments".into())));
        assert_eq!(state.get("description"), Some(&Dynamic::Null));
        assert_eq!(state.get("display_name"), Some(&Dynamic::Null));
        assert_eq!(state.get("label"), Some(&Dynamic::List(vec![])));
    }
}
