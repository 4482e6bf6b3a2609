//! nobl9_report
//!
//! A report carries exactly one of the report type blocks. Their contents are
//! described by field tables and travel to the API as plain JSON.

use serde_json::{Map, Value};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    display_name_attribute, marshal_metadata, name_attribute, unmarshal_metadata, Attrs,
    MetadataFields, StateBuilder,
};
use super::fields::{field_schema, marshal_fields, unmarshal_fields, Field, FieldKind};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{Kind, Object, ReportFilters, ReportSpec};

const METADATA: MetadataFields = MetadataFields {
    display_name: true,
    project: false,
    labels: false,
    annotations: false,
};

const fn s(name: &'static str, json: &'static str) -> Field {
    Field::string(name, json)
}

const fn block(name: &'static str, json: &'static str, fields: &'static [Field]) -> Field {
    Field::new(name, json, FieldKind::Block(fields))
}

const REF: &[Field] = &[s("name", "name").required(), s("project", "project").required()];

const FILTERS: &[Field] = &[block(
    "filters",
    "filters",
    &[
        Field::new("projects", "projects", FieldKind::StringList).describe("Project names."),
        Field::new("service", "services", FieldKind::BlockList(REF)),
        Field::new("slo", "slos", FieldKind::BlockList(REF)),
        Field::new("label", "labels", FieldKind::Labels),
    ],
)
.describe("Objects included in the report.")];

const SNAPSHOT: &[Field] = &[
    s("point", "point").required().describe("latest or past."),
    s("date_time", "dateTime").describe("RFC3339 time of a past snapshot."),
    s("rrule", "rrule").describe("Recurrence of a past snapshot."),
];

const CALENDAR: &[Field] = &[
    s("from", "from"),
    s("to", "to"),
    Field::new("count", "count", FieldKind::Int),
    s("unit", "unit"),
];

const COLUMN: &[Field] = &[
    s("display_name", "displayName").required(),
    Field::new("label", "labels", FieldKind::Labels),
];

const THRESHOLDS: &[Field] = &[
    Field::new("red_lte", "redLessThanEqual", FieldKind::Number).required(),
    Field::new("green_gt", "greenGreaterThan", FieldKind::Number).required(),
    Field::new("show_no_data", "showNoData", FieldKind::Bool),
];

const REPORT_TYPES: &[Field] = &[
    block(
        "system_health_review",
        "systemHealthReview",
        &[
            block(
                "time_frame",
                "timeFrame",
                &[
                    s("time_zone", "timeZone").required(),
                    block("snapshot", "snapshot", SNAPSHOT).required(),
                ],
            )
            .required(),
            s("row_group_by", "rowGroupBy")
                .required()
                .describe("project or service."),
            Field::new("column", "columns", FieldKind::BlockList(COLUMN)).required(),
            block("thresholds", "thresholds", THRESHOLDS).required(),
        ],
    )
    .describe("Health of SLOs grouped by project or service."),
    block(
        "sla",
        "sla",
        &[block(
            "time_frame",
            "timeFrame",
            &[
                s("time_zone", "timeZone").required(),
                block("calendar", "calendar", CALENDAR),
                block(
                    "rolling",
                    "rolling",
                    &[Field::new("count", "count", FieldKind::Int), s("unit", "unit")],
                ),
            ],
        )
        .required()],
    )
    .describe("Service level agreement attainment."),
    block("error_budget_status", "errorBudgetStatus", &[])
        .describe("Current error budget of the filtered SLOs."),
];

#[derive(Clone)]
pub struct ReportMapping;

fn decode_filters(value: Option<Value>) -> Result<Option<ReportFilters>, Diagnostic> {
    value
        .map(serde_json::from_value::<ReportFilters>)
        .transpose()
        .map_err(|e| Diagnostic::error("Invalid report filters", e.to_string()))
}

impl ObjectMapping for ReportMapping {
    fn type_name(&self) -> String {
        "nobl9_report".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::Report
    }

    fn schema(&self) -> Schema {
        let (_, filters) = field_schema(FILTERS);
        let (_, report_types) = field_schema(REPORT_TYPES);
        SchemaBuilder::new()
            .version(0)
            .description("Report over the SLOs selected by its filters.")
            .attribute(name_attribute("Unique name of the report."))
            .attribute(display_name_attribute("User-friendly name of the report."))
            .attribute(
                AttributeBuilder::new("shared", AttributeType::Bool)
                    .description("Whether the report is visible to every user.")
                    .optional()
                    .build(),
            )
            .blocks(filters)
            .blocks(report_types)
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let mut types = marshal_fields(REPORT_TYPES, state);
        let spec = ReportSpec {
            shared: state.bool("shared").unwrap_or(false),
            filters: decode_filters(marshal_fields(FILTERS, state).remove("filters"))?,
            system_health_review: types.remove("systemHealthReview"),
            sla: types.remove("sla"),
            error_budget_status: types.remove("errorBudgetStatus"),
        };
        to_object(Kind::Report, marshal_metadata(state, false), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: ReportSpec = spec_of(object)?;

        let mut json = Map::new();
        if let Some(filters) = &spec.filters {
            let filters = serde_json::to_value(filters)
                .map_err(|e| Diagnostic::error("Invalid report filters", e.to_string()))?;
            json.insert("filters".to_string(), filters);
        }
        for (key, value) in [
            ("systemHealthReview", &spec.system_health_review),
            ("sla", &spec.sla),
            ("errorBudgetStatus", &spec.error_budget_status),
        ] {
            if let Some(value) = value {
                json.insert(key.to_string(), value.clone());
            }
        }

        let builder = unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &METADATA)
            .bool("shared", Some(spec.shared));
        let builder = unmarshal_fields(FILTERS, &json, builder);
        Ok(unmarshal_fields(REPORT_TYPES, &json, builder).build())
    }
}
