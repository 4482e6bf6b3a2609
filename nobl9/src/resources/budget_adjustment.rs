//! nobl9_budget_adjustment

use tfplug::schema::{AttributeBuilder, AttributeType, BlockBuilder, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    description_attribute, display_name_attribute, marshal_metadata, name_attribute,
    sort_list_based_on_reference_list, unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{BudgetAdjustmentFilters, BudgetAdjustmentSpec, Kind, Object, ObjectRef};

const METADATA: MetadataFields = MetadataFields {
    display_name: true,
    project: false,
    labels: false,
    annotations: false,
};

#[derive(Clone)]
pub struct BudgetAdjustmentMapping;

fn slo_key(slo: &ObjectRef) -> (String, String) {
    (slo.name.clone(), slo.project.clone().unwrap_or_default())
}

impl ObjectMapping for BudgetAdjustmentMapping {
    fn type_name(&self) -> String {
        "nobl9_budget_adjustment".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::BudgetAdjustment
    }

    fn schema(&self) -> Schema {
        let slos = BlockBuilder::new("slos")
            .description("SLO affected by the adjustment.")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the SLO.")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("project", AttributeType::String)
                    .description("Project of the SLO.")
                    .required()
                    .build(),
            )
            .min_items(1)
            .build();

        let filters = BlockBuilder::new("filters")
            .description("Objects the adjustment applies to.")
            .block(slos)
            .min_items(1)
            .max_items(1)
            .build();

        SchemaBuilder::new()
            .version(0)
            .description("Budget adjustment: excludes planned events from the error budget.")
            .attribute(name_attribute("Unique name of the budget adjustment."))
            .attribute(display_name_attribute("User-friendly name of the budget adjustment."))
            .attribute(description_attribute("Optional description of the budget adjustment."))
            .attribute(
                AttributeBuilder::new("first_event_start", AttributeType::String)
                    .description("RFC3339 start of the first event.")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("duration", AttributeType::String)
                    .description("Length of each event, at least 1m.")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("rrule", AttributeType::String)
                    .description("iCalendar recurrence rule, e.g. FREQ=WEEKLY;INTERVAL=1.")
                    .optional()
                    .build(),
            )
            .block(filters)
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let slos = state
            .block("filters")
            .map(|f| f.blocks("slos"))
            .unwrap_or_default()
            .into_iter()
            .map(|slo| ObjectRef {
                name: slo.string("name").unwrap_or_default(),
                project: slo.string("project"),
            })
            .collect();

        let spec = BudgetAdjustmentSpec {
            description: state.string("description").unwrap_or_default(),
            first_event_start: state.string("first_event_start").unwrap_or_default(),
            duration: state.string("duration").unwrap_or_default(),
            rrule: state.non_empty("rrule"),
            filters: BudgetAdjustmentFilters { slos },
        };
        to_object(Kind::BudgetAdjustment, marshal_metadata(state, false), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: BudgetAdjustmentSpec = spec_of(object)?;

        let reference: Vec<(String, String)> = Attrs(prior)
            .block("filters")
            .map(|f| f.blocks("slos"))
            .unwrap_or_default()
            .iter()
            .map(|slo| {
                (
                    slo.string("name").unwrap_or_default(),
                    slo.string("project").unwrap_or_default(),
                )
            })
            .collect();
        let slos = sort_list_based_on_reference_list(spec.filters.slos.clone(), &reference, slo_key)
            .into_iter()
            .map(|slo| {
                StateBuilder::new(&Dynamic::Null)
                    .string("name", Some(slo.name))
                    .string("project", slo.project)
                    .build()
            })
            .collect();
        let filters = StateBuilder::new(&Dynamic::Null).blocks("slos", slos).build();

        Ok(unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &METADATA)
            .string("description", Some(spec.description.clone()))
            .string("first_event_start", Some(spec.first_event_start.clone()))
            .string("duration", Some(spec.duration.clone()))
            .string("rrule", spec.rrule.clone())
            .block("filters", Some(filters))
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

    fn slo(name: &str, project: &str) -> Dynamic {
        object(vec![("name", s(name)), ("project", s(project))])
    }

    fn state() -> Dynamic {
        object(vec![
            ("name", s("weekly-maintenance")),
            ("first_event_start", s("2026-11-01T02:00:00Z")),
            ("duration", s("1h")),
            ("rrule", s("FREQ=WEEKLY;INTERVAL=1")),
            (
                "filters",
                Dynamic::List(vec![object(vec![(
                    "slos",
                    Dynamic::List(vec![slo("latency", "payments"), slo("errors", "checkout")]),
                )])]),
            ),
        ])
    }

    #[test]
    fn marshal_recurring_adjustment() {
        let object = BudgetAdjustmentMapping.marshal(Attrs(&state())).unwrap();
        assert_eq!(object.metadata.project, None);
        assert_eq!(
            object.spec,
            json!({
                "description": "",
                "firstEventStart": "2026-11-01T02:00:00Z",
                "duration": "1h",
                "rrule": "FREQ=WEEKLY;INTERVAL=1",
                "filters": {"slos": [
                    {"name": "latency", "project": "payments"},
                    {"name": "errors", "project": "checkout"}
                ]}
            })
        );
        assert!(validate(&object).is_ok());
    }

    #[test]
    fn unmarshal_keeps_configured_slo_order() {
        let prior = state();
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "BudgetAdjustment",
            "metadata": {"name": "weekly-maintenance"},
            "spec": {
                "firstEventStart": "2026-11-01T02:00:00Z",
                "duration": "1h",
                "rrule": "FREQ=WEEKLY;INTERVAL=1",
                "filters": {"slos": [
                    {"name": "errors", "project": "checkout"},
                    {"name": "latency", "project": "payments"}
                ]}
            }
        }))
        .unwrap();

        let state = BudgetAdjustmentMapping.unmarshal(&object, &prior).unwrap();
        let names: Vec<String> = Attrs(&state)
            .block("filters")
            .unwrap()
            .blocks("slos")
            .iter()
            .filter_map(|slo| slo.string("name"))
            .collect();
        assert_eq!(names, vec!["latency", "errors"]);
        assert_eq!(state.get("description"), Some(&Dynamic::Null));
    }
}
