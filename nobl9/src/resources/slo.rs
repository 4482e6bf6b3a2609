//! nobl9_slo

use serde_json::Value;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::schema::{AttributeBuilder, AttributeType, BlockBuilder, NestedBlock, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};
use tfplug::validator::{NumberRangeValidator, OneOfValidator};

use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, label_block,
    marshal_metadata, name_attribute, object_ref_block, project_attribute,
    sort_list_based_on_reference_list, unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::fields::{marshal_fields, or_null, unmarshal_fields, with_fields};
use super::sources::SOURCES;
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{
    AnomalyConfig, AnomalyConfigNoData, Attachment, BurnRateCondition, Calendar,
    CompositeComponent, CompositeComponents, CompositeObjective, CompositeSpec, CountMetrics,
    Indicator, Kind, MetricSourceRef, MetricSpec, Object, ObjectRef, Objective, RawMetric,
    SloSpec, TimeWindow,
};

const OPERATORS: [&str; 4] = ["lt", "lte", "gt", "gte"];
const TIME_UNITS: [&str; 7] = ["Minute", "Hour", "Day", "Week", "Month", "Quarter", "Year"];

#[derive(Clone)]
pub struct SloMapping;

fn string_attr(name: &str, description: &str) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::String).description(description)
}

fn number_attr(name: &str, description: &str) -> AttributeBuilder {
    AttributeBuilder::new(name, AttributeType::Number).description(description)
}

/// A metric holder: one optional block per source
fn metric_block(name: &str, description: &str) -> NestedBlock {
    SOURCES
        .iter()
        .fold(BlockBuilder::new(name).description(description), |builder, source| {
            builder.block(
                with_fields(BlockBuilder::new(source.name), source.metric)
                    .description(&format!("{} query.", source.title))
                    .max_items(1)
                    .build(),
            )
        })
        .max_items(1)
        .build()
}

fn indicator_block() -> NestedBlock {
    BlockBuilder::new("indicator")
        .description("Agent or direct the SLO reads its metrics from.")
        .attribute(string_attr("name", "Name of the metric source.").required().build())
        .attribute(
            string_attr("project", "Project of the metric source; the SLO's project when unset.")
                .optional()
                .computed()
                .build(),
        )
        .attribute(
            string_attr("kind", "Kind of the metric source.")
                .optional()
                .computed()
                .validator(OneOfValidator::new(["Agent", "Direct"]))
                .build(),
        )
        .max_items(1)
        .build()
}

fn time_window_block() -> NestedBlock {
    BlockBuilder::new("time_window")
        .description("Time window over which the error budget is computed.")
        .attribute(
            string_attr("unit", "Unit of the window length.")
                .required()
                .validator(OneOfValidator::new(TIME_UNITS))
                .build(),
        )
        .attribute(number_attr("count", "Number of units in the window.").required().build())
        .attribute(
            AttributeBuilder::new("is_rolling", AttributeType::Bool)
                .description("Whether the window is rolling; calendar-aligned otherwise.")
                .optional()
                .build(),
        )
        .block(
            BlockBuilder::new("calendar")
                .description("Start of a calendar-aligned window.")
                .attribute(string_attr("start_time", "Date and time the window starts.").required().build())
                .attribute(string_attr("time_zone", "IANA time zone of the start time.").required().build())
                .max_items(1)
                .build(),
        )
        .min_items(1)
        .max_items(1)
        .build()
}

fn composite_objective_block() -> NestedBlock {
    let component = BlockBuilder::new("composite_objective")
        .description("An objective of another SLO contributing to this composite.")
        .attribute(string_attr("project", "Project of the component SLO.").required().build())
        .attribute(string_attr("slo", "Name of the component SLO.").required().build())
        .attribute(string_attr("objective", "Name of the component objective.").required().build())
        .attribute(number_attr("weight", "Weight of the component.").required().build())
        .attribute(
            string_attr("when_delayed", "Treatment of delayed data.")
                .required()
                .validator(OneOfValidator::new(["CountAsGood", "CountAsBad", "Ignore"]))
                .build(),
        )
        .build();

    BlockBuilder::new("composite")
        .description("Composite objective built from objectives of other SLOs.")
        .attribute(string_attr("max_delay", "Maximum delay of component data.").required().build())
        .block(
            BlockBuilder::new("components")
                .block(
                    BlockBuilder::new("objectives")
                        .block(component)
                        .min_items(1)
                        .max_items(1)
                        .build(),
                )
                .min_items(1)
                .max_items(1)
                .build(),
        )
        .max_items(1)
        .build()
}

fn objective_block() -> NestedBlock {
    BlockBuilder::new("objective")
        .description("Thresholds for the SLO; at least one is required.")
        .attribute(display_name_attribute("Name shown for the objective."))
        .attribute(
            string_attr("name", "Objective identifier; generated when not set.")
                .optional()
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            number_attr("target", "Fraction of good events or time slices required.")
                .required()
                .validator(NumberRangeValidator {
                    min: Some(0.0),
                    max: Some(1.0),
                })
                .build(),
        )
        .attribute(
            number_attr("value", "Threshold value; unique among the objectives.")
                .optional()
                .computed()
                .build(),
        )
        .attribute(
            number_attr("time_slice_target", "Fraction of good events in a good time slice.")
                .optional()
                .build(),
        )
        .attribute(
            string_attr("op", "Comparison of a raw metric with the value.")
                .optional()
                .validator(OneOfValidator::new(OPERATORS))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("primary", AttributeType::Bool)
                .description("Marks the objective as the SLO's primary one.")
                .optional()
                .build(),
        )
        .block(
            BlockBuilder::new("raw_metric")
                .description("Raw data metric: each data point is compared with the value.")
                .block(metric_block("query", "Metric query."))
                .max_items(1)
                .build(),
        )
        .block(
            BlockBuilder::new("count_metrics")
                .description("Ratio metric of good or bad events over total events.")
                .attribute(
                    AttributeBuilder::new("incremental", AttributeType::Bool)
                        .description("Whether the counts grow monotonically.")
                        .required()
                        .build(),
                )
                .block(metric_block("good", "Good events query."))
                .block(metric_block("bad", "Bad events query."))
                .block(metric_block("total", "Total events query."))
                .max_items(1)
                .build(),
        )
        .block(composite_objective_block())
        .min_items(1)
        .build()
}

fn marshal_metric(block: Attrs<'_>) -> MetricSpec {
    SOURCES
        .iter()
        .filter_map(|source| {
            block
                .block(source.name)
                .map(|query| (source.json.to_string(), Value::Object(marshal_fields(source.metric, query))))
        })
        .collect()
}

fn unmarshal_metric(spec: &MetricSpec, prior: Option<Attrs<'_>>) -> Dynamic {
    let prior = or_null(prior);
    let prior_attrs = Attrs(prior);
    SOURCES
        .iter()
        .fold(StateBuilder::new(prior), |builder, source| {
            let item = spec.get(source.json).and_then(Value::as_object).map(|query| {
                unmarshal_fields(
                    source.metric,
                    query,
                    StateBuilder::new(or_null(prior_attrs.block(source.name))),
                )
                .build()
            });
            builder.block(source.name, item)
        })
        .build()
}

fn marshal_objective(o: Attrs<'_>) -> Objective {
    Objective {
        display_name: o.string("display_name").unwrap_or_default(),
        value: o.number("value"),
        name: o.string("name").unwrap_or_default(),
        target: o.number("target"),
        time_slice_target: o.number("time_slice_target"),
        op: o.string("op"),
        raw_metric: o.block("raw_metric").map(|raw| RawMetric {
            query: raw.block("query").map(marshal_metric).unwrap_or_default(),
        }),
        count_metrics: o.block("count_metrics").map(|count| CountMetrics {
            incremental: count.bool("incremental").unwrap_or(false),
            good: count.block("good").map(marshal_metric),
            bad: count.block("bad").map(marshal_metric),
            total: count.block("total").map(marshal_metric),
        }),
        primary: o.bool("primary"),
        composite: o.block("composite").map(|composite| CompositeObjective {
            max_delay: composite.string("max_delay").unwrap_or_default(),
            components: CompositeComponents {
                objectives: composite
                    .block("components")
                    .and_then(|c| c.block("objectives"))
                    .map(|o| o.blocks("composite_objective"))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| CompositeComponent {
                        project: c.string("project").unwrap_or_default(),
                        slo: c.string("slo").unwrap_or_default(),
                        objective: c.string("objective").unwrap_or_default(),
                        weight: c.number("weight").unwrap_or_default(),
                        when_delayed: c.string("when_delayed").unwrap_or_default(),
                    })
                    .collect(),
            },
        }),
    }
}

fn unmarshal_objective(objective: &Objective, prior: &Dynamic) -> Dynamic {
    let prior_attrs = Attrs(prior);
    let mut builder = StateBuilder::new(prior)
        .string("display_name", Some(objective.display_name.clone()))
        .string("name", Some(objective.name.clone()))
        .number("target", objective.target)
        .number("value", objective.value)
        .number("time_slice_target", objective.time_slice_target)
        .string("op", objective.op.clone())
        .bool("primary", objective.primary);

    let raw = objective.raw_metric.as_ref().map(|raw| {
        let prior_raw = or_null(prior_attrs.block("raw_metric"));
        StateBuilder::new(prior_raw)
            .block(
                "query",
                Some(unmarshal_metric(&raw.query, Attrs(prior_raw).block("query"))),
            )
            .build()
    });
    builder = builder.block("raw_metric", raw);

    let count = objective.count_metrics.as_ref().map(|count| {
        let prior_count = Attrs(or_null(prior_attrs.block("count_metrics")));
        let metric = |spec: &Option<MetricSpec>, name: &str| {
            spec.as_ref().map(|m| unmarshal_metric(m, prior_count.block(name)))
        };
        StateBuilder::new(prior_count.0)
            .set_raw("incremental", Dynamic::Bool(count.incremental))
            .block("good", metric(&count.good, "good"))
            .block("bad", metric(&count.bad, "bad"))
            .block("total", metric(&count.total, "total"))
            .build()
    });
    builder = builder.block("count_metrics", count);

    let composite = objective.composite.as_ref().map(|composite| {
        let components: Vec<Dynamic> = composite
            .components
            .objectives
            .iter()
            .map(|c| {
                StateBuilder::new(&Dynamic::Null)
                    .string("project", Some(c.project.clone()))
                    .string("slo", Some(c.slo.clone()))
                    .string("objective", Some(c.objective.clone()))
                    .number("weight", Some(c.weight))
                    .string("when_delayed", Some(c.when_delayed.clone()))
                    .build()
            })
            .collect();
        let objectives = StateBuilder::new(&Dynamic::Null)
            .blocks("composite_objective", components)
            .build();
        let wrapper = StateBuilder::new(&Dynamic::Null)
            .block("objectives", Some(objectives))
            .build();
        StateBuilder::new(&Dynamic::Null)
            .string("max_delay", Some(composite.max_delay.clone()))
            .block("components", Some(wrapper))
            .build()
    });
    builder.block("composite", composite).build()
}

/// Objectives in the configured order of their values, each written over the
/// prior objective with the same value
fn unmarshal_objectives(objectives: &[Objective], prior: Attrs<'_>) -> Vec<Dynamic> {
    let prior_objectives = prior.blocks("objective");
    let reference: Vec<Option<f64>> = prior_objectives.iter().map(|o| o.number("value")).collect();
    let sorted = sort_list_based_on_reference_list(objectives.to_vec(), &reference, |o| o.value);

    sorted
        .iter()
        .enumerate()
        .map(|(i, objective)| {
            let prior_objective = prior_objectives
                .iter()
                .find(|p| objective.value.is_some() && p.number("value") == objective.value)
                .or_else(|| prior_objectives.get(i))
                .copied();
            unmarshal_objective(objective, or_null(prior_objective))
        })
        .collect()
}

fn marshal_spec(state: Attrs<'_>) -> SloSpec {
    SloSpec {
        description: state.string("description").unwrap_or_default(),
        indicator: state.block("indicator").map(|i| Indicator {
            metric_source: MetricSourceRef {
                name: i.string("name").unwrap_or_default(),
                project: i.string("project"),
                kind: i.string("kind"),
            },
        }),
        budgeting_method: state.string("budgeting_method").unwrap_or_default(),
        objectives: state.blocks("objective").into_iter().map(marshal_objective).collect(),
        service: state.string("service").unwrap_or_default(),
        time_windows: state
            .blocks("time_window")
            .into_iter()
            .map(|w| TimeWindow {
                unit: w.string("unit").unwrap_or_default(),
                count: w.int("count").unwrap_or_default(),
                is_rolling: w.bool("is_rolling").unwrap_or(false),
                calendar: w.block("calendar").map(|c| Calendar {
                    start_time: c.string("start_time").unwrap_or_default(),
                    time_zone: c.string("time_zone").unwrap_or_default(),
                }),
            })
            .collect(),
        alert_policies: state.strings("alert_policies"),
        attachments: state
            .blocks("attachment")
            .into_iter()
            .map(|a| Attachment {
                url: a.string("url").unwrap_or_default(),
                display_name: a.non_empty("display_name"),
            })
            .collect(),
        anomaly_config: state.block("anomaly_config").map(|a| AnomalyConfig {
            no_data: a.block("no_data").map(|n| AnomalyConfigNoData {
                alert_methods: n
                    .blocks("alert_method")
                    .into_iter()
                    .map(|m| ObjectRef {
                        name: m.string("name").unwrap_or_default(),
                        project: m.string("project"),
                    })
                    .collect(),
                alert_after: n.string("alert_after"),
            }),
        }),
        composite: state.block("composite").map(|c| CompositeSpec {
            target: c.number("target").unwrap_or_default(),
            burn_rate_condition: c.block("burn_rate_condition").map(|b| BurnRateCondition {
                value: b.number("value").unwrap_or_default(),
                op: b.string("op").unwrap_or_default(),
            }),
        }),
    }
}

impl ObjectMapping for SloMapping {
    fn type_name(&self) -> String {
        "nobl9_slo".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::Slo
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Service level objective: a target for the reliability of a service.")
            .attribute(name_attribute("Unique name of the SLO."))
            .attribute(project_attribute("Name of the project the SLO belongs to."))
            .attribute(display_name_attribute("User-friendly name of the SLO."))
            .attribute(description_attribute("Optional description of the SLO."))
            .attribute(annotations_attribute())
            .attribute(string_attr("service", "Name of the service the SLO belongs to.").required().build())
            .attribute(
                string_attr("budgeting_method", "Method used to compute the error budget.")
                    .required()
                    .validator(OneOfValidator::new(["Occurrences", "Timeslices"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("alert_policies", AttributeType::List(Box::new(AttributeType::String)))
                    .description("Names of the alert policies attached to the SLO.")
                    .optional()
                    .build(),
            )
            .block(label_block())
            .block(indicator_block())
            .block(time_window_block())
            .block(objective_block())
            .block(
                BlockBuilder::new("attachment")
                    .description("Links shown with the SLO.")
                    .attribute(string_attr("url", "Link URL.").required().build())
                    .attribute(string_attr("display_name", "Link text.").optional().build())
                    .max_items(20)
                    .build(),
            )
            .block(
                BlockBuilder::new("anomaly_config")
                    .description("Anomaly detection settings.")
                    .block(
                        BlockBuilder::new("no_data")
                            .description("Alerts when the SLO stops receiving data.")
                            .attribute(
                                string_attr("alert_after", "How long without data before alerting.")
                                    .optional()
                                    .computed()
                                    .build(),
                            )
                            .block(
                                object_ref_block("alert_method", "Alert method notified about missing data.")
                                    .min_items(1)
                                    .build(),
                            )
                            .min_items(1)
                            .max_items(1)
                            .build(),
                    )
                    .max_items(1)
                    .build(),
            )
            .block(
                BlockBuilder::new("composite")
                    .description("Legacy composite SLO settings.")
                    .attribute(number_attr("target", "Composite target.").required().build())
                    .block(
                        BlockBuilder::new("burn_rate_condition")
                            .attribute(number_attr("value", "Burn rate threshold.").required().build())
                            .attribute(
                                string_attr("op", "Comparison with the threshold.")
                                    .required()
                                    .validator(OneOfValidator::new(["gt"]))
                                    .build(),
                            )
                            .max_items(1)
                            .build(),
                    )
                    .max_items(1)
                    .build(),
            )
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        to_object(Kind::Slo, marshal_metadata(state, true), &marshal_spec(state))
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: SloSpec = spec_of(object)?;
        let prior_attrs = Attrs(prior);

        let indicator = spec.indicator.as_ref().map(|i| {
            StateBuilder::new(or_null(prior_attrs.block("indicator")))
                .string("name", Some(i.metric_source.name.clone()))
                .string("project", i.metric_source.project.clone())
                .string("kind", i.metric_source.kind.clone())
                .build()
        });

        let windows = spec
            .time_windows
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let prior_window = or_null(prior_attrs.blocks("time_window").get(i).copied());
                let calendar = w.calendar.as_ref().map(|c| {
                    StateBuilder::new(or_null(Attrs(prior_window).block("calendar")))
                        .string("start_time", Some(c.start_time.clone()))
                        .string("time_zone", Some(c.time_zone.clone()))
                        .build()
                });
                StateBuilder::new(prior_window)
                    .string("unit", Some(w.unit.clone()))
                    .number("count", Some(w.count as f64))
                    .bool("is_rolling", Some(w.is_rolling))
                    .block("calendar", calendar)
                    .build()
            })
            .collect();

        let attachments = spec
            .attachments
            .iter()
            .enumerate()
            .map(|(i, a)| {
                StateBuilder::new(or_null(prior_attrs.blocks("attachment").get(i).copied()))
                    .string("url", Some(a.url.clone()))
                    .string("display_name", a.display_name.clone())
                    .build()
            })
            .collect();

        let anomaly = spec.anomaly_config.as_ref().map(|a| {
            let prior_anomaly = or_null(prior_attrs.block("anomaly_config"));
            let no_data = a.no_data.as_ref().map(|n| {
                let methods = n
                    .alert_methods
                    .iter()
                    .map(|m| {
                        StateBuilder::new(&Dynamic::Null)
                            .string("name", Some(m.name.clone()))
                            .string("project", m.project.clone())
                            .build()
                    })
                    .collect();
                StateBuilder::new(or_null(Attrs(prior_anomaly).block("no_data")))
                    .string("alert_after", n.alert_after.clone())
                    .blocks("alert_method", methods)
                    .build()
            });
            StateBuilder::new(prior_anomaly).block("no_data", no_data).build()
        });

        let composite = spec.composite.as_ref().map(|c| {
            let burn_rate = c.burn_rate_condition.as_ref().map(|b| {
                StateBuilder::new(&Dynamic::Null)
                    .number("value", Some(b.value))
                    .string("op", Some(b.op.clone()))
                    .build()
            });
            StateBuilder::new(&Dynamic::Null)
                .number("target", Some(c.target))
                .block("burn_rate_condition", burn_rate)
                .build()
        });

        let alert_policies = sort_list_based_on_reference_list(
            spec.alert_policies.clone(),
            &prior_attrs.strings("alert_policies"),
            |p| p.clone(),
        );

        Ok(
            unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &MetadataFields::ALL)
                .string("description", Some(spec.description.clone()))
                .string("service", Some(spec.service.clone()))
                .string("budgeting_method", Some(spec.budgeting_method.clone()))
                .strings("alert_policies", alert_policies)
                .block("indicator", indicator)
                .blocks("time_window", windows)
                .blocks("objective", unmarshal_objectives(&spec.objectives, prior_attrs))
                .blocks("attachment", attachments)
                .block("anomaly_config", anomaly)
                .block("composite", composite)
                .build(),
        )
    }
}
