//! Typed specs, one per object kind
//!
//! Integration-specific parts (agent and direct source configs, metric
//! queries, alert method settings, report types) are kept as JSON maps keyed
//! by the integration's JSON name; the provider's source tables know their
//! shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Labels;

/// Source JSON name to its settings, e.g. `{"prometheus": {"promql": "..."}}`
pub type MetricSpec = BTreeMap<String, Value>;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(default)]
    pub slo_count: i64,
}

/// Reference to an object by name, optionally in another project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

// SLO

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<Indicator>,
    #[serde(default)]
    pub budgeting_method: String,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_config: Option<AnomalyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub metric_source: MetricSourceRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slice_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_metric: Option<RawMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_metrics: Option<CountMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeObjective>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetric {
    #[serde(default)]
    pub query: MetricSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountMetrics {
    #[serde(default)]
    pub incremental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<MetricSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad: Option<MetricSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<MetricSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeObjective {
    pub max_delay: String,
    #[serde(default)]
    pub components: CompositeComponents,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeComponents {
    #[serde(default)]
    pub objectives: Vec<CompositeComponent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeComponent {
    pub project: String,
    pub slo: String,
    pub objective: String,
    pub weight: f64,
    pub when_delayed: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub unit: String,
    pub count: i64,
    #[serde(default)]
    pub is_rolling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<Calendar>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub start_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data: Option<AnomalyConfigNoData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyConfigNoData {
    #[serde(default)]
    pub alert_methods: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_after: Option<String>,
}

/// Legacy SLO-level composite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSpec {
    pub target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_rate_condition: Option<BurnRateCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurnRateCondition {
    pub value: f64,
    pub op: String,
}

// Agent and Direct

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestDuration {
    pub value: i64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalDataRetrieval {
    pub max_duration: ManifestDuration,
    pub default_duration: ManifestDuration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_delay: Option<ManifestDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data_retrieval: Option<HistoricalDataRetrieval>,
    /// Exactly one entry: the source JSON name and its settings
    #[serde(flatten)]
    pub source: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_delay: Option<ManifestDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data_retrieval: Option<HistoricalDataRetrieval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_collection_enabled: Option<bool>,
    #[serde(flatten)]
    pub source: BTreeMap<String, Value>,
}

// Alerting

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMethodSpec {
    #[serde(default)]
    pub description: String,
    /// Exactly one entry: the method type and its settings
    #[serde(flatten)]
    pub method: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPolicySpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,
    #[serde(default)]
    pub conditions: Vec<AlertCondition>,
    #[serde(default)]
    pub alert_methods: Vec<AlertMethodEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCondition {
    pub measurement: String,
    /// Number for rate measurements, duration string for time-to-burn ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lasts_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMethodEntry {
    pub metadata: ObjectRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSilenceSpec {
    #[serde(default)]
    pub description: String,
    pub slo: String,
    pub alert_policy: ObjectRef,
    pub period: SilencePeriod,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilencePeriod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

// Organization-wide kinds

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBindingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<String>,
    pub role_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAdjustmentSpec {
    #[serde(default)]
    pub description: String,
    pub first_event_start: String,
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(default)]
    pub filters: BudgetAdjustmentFilters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetAdjustmentFilters {
    #[serde(default)]
    pub slos: Vec<ObjectRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSpec {
    #[serde(default, skip_serializing_if = "is_false")]
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ReportFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_health_review: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_budget_status: Option<Value>,
}

impl ReportSpec {
    /// Names of the report type blocks present, in JSON naming
    pub fn report_types(&self) -> Vec<&'static str> {
        let mut types = Vec::new();
        if self.system_health_review.is_some() {
            types.push("systemHealthReview");
        }
        if self.sla.is_some() {
            types.push("sla");
        }
        if self.error_budget_status.is_some() {
            types.push("errorBudgetStatus");
        }
        types
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slos: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSpec {
    pub slo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub start_time: String,
    pub end_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_source_is_flattened() {
        let mut spec = AgentSpec {
            description: "agent".to_string(),
            ..Default::default()
        };
        spec.source.insert(
            "prometheus".to_string(),
            json!({"url": "http://prometheus:9090"}),
        );

        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"description": "agent", "prometheus": {"url": "http://prometheus:9090"}})
        );
    }

    #[test]
    fn slo_objective_uses_api_field_names() {
        let objective: Objective = serde_json::from_value(json!({
            "displayName": "ok",
            "value": 200.0,
            "name": "tier-1",
            "target": 0.99,
            "op": "lte",
            "rawMetric": {"query": {"prometheus": {"promql": "up"}}}
        }))
        .unwrap();

        assert_eq!(objective.target, Some(0.99));
        assert_eq!(objective.op.as_deref(), Some("lte"));
        assert_eq!(
            objective.raw_metric.unwrap().query["prometheus"],
            json!({"promql": "up"})
        );
    }

    #[test]
    fn report_types_lists_present_blocks() {
        let spec = ReportSpec {
            sla: Some(json!({})),
            ..Default::default()
        };
        assert_eq!(spec.report_types(), vec!["sla"]);
    }
}
