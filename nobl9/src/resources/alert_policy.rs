//! nobl9_alert_policy

use serde_json::{Number, Value};
use tfplug::schema::{AttributeBuilder, AttributeType, BlockBuilder, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};
use tfplug::validator::OneOfValidator;

use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, label_block,
    marshal_metadata, name_attribute, object_ref_block, project_attribute,
    sort_list_based_on_reference_list, unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::fields::or_null;
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{AlertCondition, AlertMethodEntry, AlertPolicySpec, Kind, Object, ObjectRef};

const MEASUREMENTS: [&str; 6] = [
    "timeToBurnBudget",
    "timeToBurnEntireBudget",
    "burnRate",
    "averageBurnRate",
    "burnedBudget",
    "budgetDrop",
];

#[derive(Clone)]
pub struct AlertPolicyMapping;

fn condition_value(condition: Attrs<'_>) -> Option<Value> {
    condition
        .number("value")
        .and_then(Number::from_f64)
        .map(Value::Number)
        .or_else(|| condition.string("value_string").map(Value::String))
}

fn marshal_spec(state: Attrs<'_>) -> AlertPolicySpec {
    AlertPolicySpec {
        description: state.string("description").unwrap_or_default(),
        severity: state.string("severity").unwrap_or_default(),
        cooldown: state.string("cooldown"),
        conditions: state
            .blocks("condition")
            .into_iter()
            .map(|c| AlertCondition {
                measurement: c.string("measurement").unwrap_or_default(),
                value: condition_value(c),
                alerting_window: c.string("alerting_window"),
                lasts_for: c.string("lasts_for"),
                op: c.string("op"),
            })
            .collect(),
        alert_methods: state
            .blocks("alert_method")
            .into_iter()
            .map(|m| AlertMethodEntry {
                metadata: ObjectRef {
                    name: m.string("name").unwrap_or_default(),
                    project: m.string("project"),
                },
            })
            .collect(),
    }
}

impl ObjectMapping for AlertPolicyMapping {
    fn type_name(&self) -> String {
        "nobl9_alert_policy".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::AlertPolicy
    }

    fn schema(&self) -> Schema {
        let condition = BlockBuilder::new("condition")
            .description("Conditions that must all hold for the alert to fire.")
            .attribute(
                AttributeBuilder::new("measurement", AttributeType::String)
                    .description("What the condition measures.")
                    .required()
                    .validator(OneOfValidator::new(MEASUREMENTS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("value", AttributeType::Number)
                    .description("Threshold for burn rate and budget drop measurements.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("value_string", AttributeType::String)
                    .description("Duration threshold for time-to-burn measurements, e.g. 72h.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("alerting_window", AttributeType::String)
                    .description("Window over which the measurement is evaluated.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("lasts_for", AttributeType::String)
                    .description("How long the condition must hold.")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("op", AttributeType::String)
                    .description("Comparison with the threshold.")
                    .optional()
                    .computed()
                    .validator(OneOfValidator::new(["lt", "lte", "gt", "gte"]))
                    .build(),
            )
            .min_items(1)
            .build();

        SchemaBuilder::new()
            .version(0)
            .description("Alert policy: when to notify about an SLO burning its error budget.")
            .attribute(name_attribute("Unique name of the alert policy."))
            .attribute(project_attribute("Name of the project the alert policy belongs to."))
            .attribute(display_name_attribute("User-friendly name of the alert policy."))
            .attribute(description_attribute("Optional description of the alert policy."))
            .attribute(annotations_attribute())
            .attribute(
                AttributeBuilder::new("severity", AttributeType::String)
                    .description("Alert severity.")
                    .required()
                    .validator(OneOfValidator::new(["Low", "Medium", "High"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("cooldown", AttributeType::String)
                    .description("Time without matching conditions before the alert resolves.")
                    .optional()
                    .computed()
                    .build(),
            )
            .block(label_block())
            .block(condition)
            .block(object_ref_block("alert_method", "Alert methods notified by the policy.").build())
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        to_object(Kind::AlertPolicy, marshal_metadata(state, true), &marshal_spec(state))
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: AlertPolicySpec = spec_of(object)?;
        let prior_attrs = Attrs(prior);
        let prior_conditions = prior_attrs.blocks("condition");

        let conditions = spec
            .conditions
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let (number, string) = match &c.value {
                    Some(Value::Number(n)) => (n.as_f64(), None),
                    Some(Value::String(s)) => (None, Some(s.clone())),
                    _ => (None, None),
                };
                StateBuilder::new(or_null(prior_conditions.get(i).copied()))
                    .string("measurement", Some(c.measurement.clone()))
                    .number("value", number)
                    .string("value_string", string)
                    .string("alerting_window", c.alerting_window.clone())
                    .string("lasts_for", c.lasts_for.clone())
                    .string("op", c.op.clone())
                    .build()
            })
            .collect();

        let reference: Vec<String> = prior_attrs
            .blocks("alert_method")
            .iter()
            .filter_map(|m| m.string("name"))
            .collect();
        let methods = sort_list_based_on_reference_list(spec.alert_methods.clone(), &reference, |m| {
            m.metadata.name.clone()
        })
        .into_iter()
        .map(|m| {
            StateBuilder::new(&Dynamic::Null)
                .string("name", Some(m.metadata.name))
                .string("project", m.metadata.project)
                .build()
        })
        .collect();

        Ok(
            unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &MetadataFields::ALL)
                .string("description", Some(spec.description.clone()))
                .string("severity", Some(spec.severity.clone()))
                .string("cooldown", spec.cooldown.clone())
                .blocks("condition", conditions)
                .blocks("alert_method", methods)
                .build(),
        )
    }
}
