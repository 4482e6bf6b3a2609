//! nobl9_alert_silence

use tfplug::schema::{AttributeBuilder, AttributeType, BlockBuilder, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    description_attribute, marshal_metadata, name_attribute, object_ref_block, project_attribute,
    unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::fields::or_null;
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{AlertSilenceSpec, Kind, Object, ObjectRef, SilencePeriod};

const METADATA: MetadataFields = MetadataFields {
    display_name: false,
    project: true,
    labels: false,
    annotations: false,
};

#[derive(Clone)]
pub struct AlertSilenceMapping;

impl ObjectMapping for AlertSilenceMapping {
    fn type_name(&self) -> String {
        "nobl9_alert_silence".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::AlertSilence
    }

    fn schema(&self) -> Schema {
        let period = BlockBuilder::new("period")
            .description("When the silence applies; set end_time or duration.")
            .attribute(
                AttributeBuilder::new("start_time", AttributeType::String)
                    .description("RFC3339 start; the time of creation when unset.")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("end_time", AttributeType::String)
                    .description("RFC3339 end of the silence.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("duration", AttributeType::String)
                    .description("Length of the silence, e.g. 2h.")
                    .optional()
                    .build(),
            )
            .min_items(1)
            .max_items(1)
            .build();

        SchemaBuilder::new()
            .version(0)
            .description("Silences the alerts of one alert policy on one SLO for a period.")
            .attribute(name_attribute("Unique name of the alert silence."))
            .attribute(project_attribute("Name of the project the alert silence belongs to."))
            .attribute(description_attribute("Optional description of the alert silence."))
            .attribute(
                AttributeBuilder::new("slo", AttributeType::String)
                    .description("Name of the silenced SLO, in the same project.")
                    .required()
                    .build(),
            )
            .block(
                object_ref_block("alert_policy", "Alert policy to silence.")
                    .min_items(1)
                    .max_items(1)
                    .build(),
            )
            .block(period)
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let policy = state.block("alert_policy");
        let period = state.block("period");
        let spec = AlertSilenceSpec {
            description: state.string("description").unwrap_or_default(),
            slo: state.string("slo").unwrap_or_default(),
            alert_policy: ObjectRef {
                name: policy.and_then(|p| p.string("name")).unwrap_or_default(),
                project: policy.and_then(|p| p.string("project")),
            },
            period: SilencePeriod {
                start_time: period.and_then(|p| p.string("start_time")),
                end_time: period.and_then(|p| p.string("end_time")),
                duration: period.and_then(|p| p.string("duration")),
            },
        };
        to_object(Kind::AlertSilence, marshal_metadata(state, true), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: AlertSilenceSpec = spec_of(object)?;
        let prior_attrs = Attrs(prior);

        let policy = StateBuilder::new(or_null(prior_attrs.block("alert_policy")))
            .string("name", Some(spec.alert_policy.name.clone()))
            .string("project", spec.alert_policy.project.clone())
            .build();

        let prior_period = or_null(prior_attrs.block("period"));
        // The API echoes a computed end time; keep it out of state when duration was configured
        let end_time = spec
            .period
            .end_time
            .clone()
            .filter(|_| Attrs(prior_period).string("duration").is_none());
        let period = StateBuilder::new(prior_period)
            .string("start_time", spec.period.start_time.clone())
            .string("end_time", end_time)
            .string("duration", spec.period.duration.clone())
            .build();

        Ok(unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &METADATA)
            .string("description", Some(spec.description.clone()))
            .string("slo", Some(spec.slo.clone()))
            .block("alert_policy", Some(policy))
            .block("period", Some(period))
            .build())
    }
}
