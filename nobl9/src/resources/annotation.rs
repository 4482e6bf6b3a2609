//! nobl9_annotation

use tfplug::plan_modifier::RequiresReplace;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};
use tfplug::validator::StringLengthValidator;

use super::common::{
    marshal_metadata, name_attribute, project_attribute, unmarshal_metadata, Attrs,
    MetadataFields, StateBuilder,
};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{AnnotationSpec, Kind, Object};

const METADATA: MetadataFields = MetadataFields {
    display_name: false,
    project: true,
    labels: false,
    annotations: false,
};

#[derive(Clone)]
pub struct AnnotationMapping;

impl ObjectMapping for AnnotationMapping {
    fn type_name(&self) -> String {
        "nobl9_annotation".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::Annotation
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Annotation: a note on an SLO's timeline.")
            .attribute(name_attribute("Unique name of the annotation."))
            .attribute(project_attribute("Name of the project the annotation belongs to."))
            .attribute(
                AttributeBuilder::new("slo", AttributeType::String)
                    .description("Name of the annotated SLO.")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("objective_name", AttributeType::String)
                    .description("Objective of the SLO; the whole SLO when unset.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .description("Text of the annotation.")
                    .required()
                    .validator(StringLengthValidator {
                        min: Some(1),
                        max: Some(1000),
                    })
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("start_time", AttributeType::String)
                    .description("RFC3339 start of the annotated period.")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("end_time", AttributeType::String)
                    .description("RFC3339 end of the annotated period.")
                    .required()
                    .build(),
            )
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let spec = AnnotationSpec {
            slo: state.string("slo").unwrap_or_default(),
            objective_name: state.non_empty("objective_name"),
            description: state.string("description").unwrap_or_default(),
            start_time: state.string("start_time").unwrap_or_default(),
            end_time: state.string("end_time").unwrap_or_default(),
        };
        to_object(Kind::Annotation, marshal_metadata(state, true), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: AnnotationSpec = spec_of(object)?;
        let prior_attrs = Attrs(prior);

        // The API normalizes timestamps to UTC; keep the configured spelling of the same instant
        let time = |name: &str, returned: String| {
            match (prior_attrs.string(name), chrono::DateTime::parse_from_rfc3339(&returned)) {
                (Some(configured), Ok(returned_at))
                    if chrono::DateTime::parse_from_rfc3339(&configured).ok() == Some(returned_at) =>
                {
                    configured
                }
                _ => returned,
            }
        };

        Ok(unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &METADATA)
            .string("slo", Some(spec.slo.clone()))
            .string("objective_name", spec.objective_name.clone())
            .string("description", Some(spec.description.clone()))
            .string("start_time", Some(time("start_time", spec.start_time.clone())))
            .string("end_time", Some(time("end_time", spec.end_time.clone())))
            .build())
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

    fn state() -> Dynamic {
        object(vec![
            ("name", s("deploy-42")),
            ("project", s("payments")),
            ("slo", s("latency")),
            ("description", s("Rolled out v42")),
            ("start_time", s("2026-10-16T12:00:00+02:00")),
            ("end_time", s("2026-10-16T13:00:00+02:00")),
        ])
    }

    #[test]
    fn marshal_annotation() {
        let object = AnnotationMapping.marshal(Attrs(&state())).unwrap();
        assert_eq!(object.metadata.project.as_deref(), Some("payments"));
        assert_eq!(
            object.spec,
            json!({
                "slo": "latency",
                "description": "Rolled out v42",
                "startTime": "2026-10-16T12:00:00+02:00",
                "endTime": "2026-10-16T13:00:00+02:00"
            })
        );
        assert!(validate(&object).is_ok());
    }

    #[test]
    fn unmarshal_keeps_equivalent_timestamps() {
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Annotation",
            "metadata": {"name": "deploy-42", "project": "payments"},
            "spec": {
                "slo": "latency",
                "description": "Rolled out v42",
                "startTime": "2026-10-16T10:00:00Z",
                "endTime": "2026-10-16T11:30:00Z"
            }
        }))
        .unwrap();

        let state = AnnotationMapping.unmarshal(&object, &state()).unwrap();
        assert_eq!(state.get("start_time"), Some(&s("2026-10-16T12:00:00+02:00")));
        assert_eq!(state.get("end_time"), Some(&s("2026-10-16T11:30:00Z")));
        assert_eq!(state.get("objective_name"), Some(&Dynamic::Null));
    }
}
