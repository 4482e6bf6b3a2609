//! Client-side validation of manifest objects
//!
//! Covers the rules that can be checked without talking to the API. The
//! server stays authoritative; this pass only surfaces obvious mistakes at
//! plan time.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use super::specs::*;
use super::{Kind, Labels, Metadata, Object};

const MAX_NAME_LENGTH: usize = 63;
const MAX_DISPLAY_NAME_LENGTH: usize = 63;
const MAX_DESCRIPTION_LENGTH: usize = 1050;
const MAX_LABEL_VALUE_LENGTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&lines.join("\n"))
    }
}

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn rfc1123_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
}

fn label_key_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"^\p{Ll}([_\-0-9\p{Ll}]*[0-9\p{Ll}])?$")
}

fn duration_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
}

/// Parses durations written as `1h30m`, `15m` or `90s`
pub fn parse_duration(value: &str) -> Option<Duration> {
    if value.is_empty() {
        return None;
    }
    let caps = duration_regex()?.captures(value)?;
    let part = |i: usize, unit: u64| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<u64>().ok()?.checked_mul(unit),
            None => Some(0),
        }
    };
    let secs = part(1, 3600)?.checked_add(part(2, 60)?)?.checked_add(part(3, 1)?)?;
    Some(Duration::from_secs(secs))
}

fn is_rfc3339(value: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(value).is_ok()
}

#[derive(Default)]
struct Collector {
    errors: Vec<ValidationError>,
}

impl Collector {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn name(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.push(field, "cannot be empty");
        } else if value.len() > MAX_NAME_LENGTH {
            self.push(
                field,
                format!("length must be between 1 and {}", MAX_NAME_LENGTH),
            );
        } else if !rfc1123_regex().is_some_and(|re| re.is_match(value)) {
            self.push(
                field,
                "must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character",
            );
        }
    }

    fn max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.push(field, format!("length must be at most {}", max));
        }
    }

    fn description(&mut self, field: &str, value: &str) {
        self.max_length(field, value, MAX_DESCRIPTION_LENGTH);
    }

    fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) {
        if !allowed.contains(&value) {
            self.push(
                field,
                format!("must be one of: {}", allowed.join(", ")),
            );
        }
    }

    fn timestamp(&mut self, field: &str, value: &str) {
        if !is_rfc3339(value) {
            self.push(field, "must be an RFC3339 timestamp");
        }
    }

    fn labels(&mut self, field: &str, labels: &Labels) {
        for (key, values) in labels {
            let key_field = format!("{}.{}", field, key);
            if key.len() > MAX_NAME_LENGTH || !label_key_regex().is_some_and(|re| re.is_match(key)) {
                self.push(
                    key_field.clone(),
                    "label key must start with a lowercase letter, contain only lowercase letters, digits, '_' or '-', and be at most 63 characters",
                );
            }
            let mut seen = HashSet::new();
            for value in values {
                if value.chars().count() > MAX_LABEL_VALUE_LENGTH {
                    self.push(
                        key_field.clone(),
                        format!("label value length must be at most {}", MAX_LABEL_VALUE_LENGTH),
                    );
                }
                if !seen.insert(value) {
                    self.push(key_field.clone(), format!("duplicate label value '{}'", value));
                }
            }
        }
    }

    fn metadata(&mut self, kind: Kind, metadata: &Metadata) {
        self.name("metadata.name", &metadata.name);
        if let Some(display_name) = &metadata.display_name {
            self.max_length("metadata.displayName", display_name, MAX_DISPLAY_NAME_LENGTH);
        }
        match (&metadata.project, kind.is_project_scoped()) {
            (Some(project), true) => self.name("metadata.project", project),
            (None, true) => self.push("metadata.project", "is required"),
            (Some(_), false) => self.push("metadata.project", "is not allowed for this kind"),
            (None, false) => {}
        }
        self.labels("metadata.labels", &metadata.labels);
    }

    fn spec<S: serde::de::DeserializeOwned>(&mut self, object: &Object) -> Option<S> {
        match object.spec_as::<S>() {
            Ok(spec) => Some(spec),
            Err(e) => {
                self.push("spec", e.to_string());
                None
            }
        }
    }
}

/// Runs every local rule that applies to the object's kind
pub fn validate(object: &Object) -> Result<(), ValidationErrors> {
    let mut c = Collector::default();
    c.metadata(object.kind, &object.metadata);

    match object.kind {
        Kind::Project => {
            if let Some(spec) = c.spec::<ProjectSpec>(object) {
                c.description("spec.description", &spec.description);
            }
        }
        Kind::Service => {
            if let Some(spec) = c.spec::<ServiceSpec>(object) {
                c.description("spec.description", &spec.description);
            }
        }
        Kind::Slo => {
            if let Some(spec) = c.spec::<SloSpec>(object) {
                validate_slo(&mut c, &spec);
            }
        }
        Kind::Agent => {
            if let Some(spec) = c.spec::<AgentSpec>(object) {
                c.description("spec.description", &spec.description);
                validate_source(&mut c, &spec.source, spec.query_delay.as_ref());
            }
        }
        Kind::Direct => {
            if let Some(spec) = c.spec::<DirectSpec>(object) {
                c.description("spec.description", &spec.description);
                validate_source(&mut c, &spec.source, spec.query_delay.as_ref());
            }
        }
        Kind::AlertMethod => {
            if let Some(spec) = c.spec::<AlertMethodSpec>(object) {
                c.description("spec.description", &spec.description);
                if spec.method.len() != 1 {
                    c.push("spec", "exactly one alert method type must be configured");
                }
            }
        }
        Kind::AlertPolicy => {
            if let Some(spec) = c.spec::<AlertPolicySpec>(object) {
                validate_alert_policy(&mut c, &spec);
            }
        }
        Kind::AlertSilence => {
            if let Some(spec) = c.spec::<AlertSilenceSpec>(object) {
                validate_alert_silence(&mut c, &spec);
            }
        }
        Kind::RoleBinding => {
            if let Some(spec) = c.spec::<RoleBindingSpec>(object) {
                if spec.user.is_some() == spec.group_ref.is_some() {
                    c.push("spec", "exactly one of user or groupRef must be set");
                }
                if spec.role_ref.is_empty() {
                    c.push("spec.roleRef", "cannot be empty");
                }
            }
        }
        Kind::BudgetAdjustment => {
            if let Some(spec) = c.spec::<BudgetAdjustmentSpec>(object) {
                c.description("spec.description", &spec.description);
                c.timestamp("spec.firstEventStart", &spec.first_event_start);
                match parse_duration(&spec.duration) {
                    Some(d) if d >= Duration::from_secs(60) => {}
                    Some(_) => c.push("spec.duration", "must be at least 1 minute"),
                    None => c.push("spec.duration", "must be a duration such as 1h30m"),
                }
                if spec.filters.slos.is_empty() {
                    c.push("spec.filters.slos", "at least one SLO is required");
                }
                for (i, slo) in spec.filters.slos.iter().enumerate() {
                    c.name(&format!("spec.filters.slos[{}].name", i), &slo.name);
                }
            }
        }
        Kind::Report => {
            if let Some(spec) = c.spec::<ReportSpec>(object) {
                if spec.report_types().len() != 1 {
                    c.push(
                        "spec",
                        "exactly one of systemHealthReview, sla or errorBudgetStatus must be configured",
                    );
                }
            }
        }
        Kind::Annotation => {
            if let Some(spec) = c.spec::<AnnotationSpec>(object) {
                c.name("spec.slo", &spec.slo);
                if spec.description.is_empty() {
                    c.push("spec.description", "cannot be empty");
                }
                c.max_length("spec.description", &spec.description, 1000);
                c.timestamp("spec.startTime", &spec.start_time);
                c.timestamp("spec.endTime", &spec.end_time);
                if let (Ok(start), Ok(end)) = (
                    chrono::DateTime::parse_from_rfc3339(&spec.start_time),
                    chrono::DateTime::parse_from_rfc3339(&spec.end_time),
                ) {
                    if end < start {
                        c.push("spec.endTime", "must not be before startTime");
                    }
                }
            }
        }
    }

    if c.errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(c.errors))
    }
}

fn validate_slo(c: &mut Collector, spec: &SloSpec) {
    c.description("spec.description", &spec.description);
    c.name("spec.service", &spec.service);
    c.one_of(
        "spec.budgetingMethod",
        &spec.budgeting_method,
        &["Occurrences", "Timeslices"],
    );

    if spec.time_windows.len() != 1 {
        c.push("spec.timeWindows", "exactly one time window is required");
    }
    for (i, window) in spec.time_windows.iter().enumerate() {
        let field = format!("spec.timeWindows[{}]", i);
        if window.count <= 0 {
            c.push(format!("{}.count", field), "must be greater than 0");
        }
        if window.is_rolling {
            c.one_of(&format!("{}.unit", field), &window.unit, &["Minute", "Hour", "Day"]);
            if window.calendar.is_some() {
                c.push(format!("{}.calendar", field), "must not be set for a rolling window");
            }
        } else {
            c.one_of(
                &format!("{}.unit", field),
                &window.unit,
                &["Day", "Week", "Month", "Quarter", "Year"],
            );
            if window.calendar.is_none() {
                c.push(format!("{}.calendar", field), "is required for a calendar window");
            }
        }
    }

    if spec.objectives.is_empty() {
        c.push("spec.objectives", "at least one objective is required");
    }

    let all_composite = !spec.objectives.is_empty()
        && spec.objectives.iter().all(|o| o.composite.is_some());
    if spec.indicator.is_none() && !all_composite {
        c.push("spec.indicator", "is required");
    }

    let timeslices = spec.budgeting_method == "Timeslices";
    let mut values = HashSet::new();
    let mut names = HashSet::new();
    let mut primaries = 0;

    for (i, objective) in spec.objectives.iter().enumerate() {
        let field = format!("spec.objectives[{}]", i);

        if let Some(value) = objective.value {
            if !values.insert(value.to_bits()) {
                c.push(format!("{}.value", field), "objective values must be unique");
            }
        }
        if !objective.name.is_empty() {
            c.name(&format!("{}.name", field), &objective.name);
            if !names.insert(objective.name.as_str()) {
                c.push(format!("{}.name", field), "objective names must be unique");
            }
        }
        c.max_length(
            &format!("{}.displayName", field),
            &objective.display_name,
            MAX_DISPLAY_NAME_LENGTH,
        );

        match objective.target {
            Some(t) if t > 0.0 && t < 1.0 => {}
            Some(_) => c.push(format!("{}.target", field), "must be greater than 0 and less than 1"),
            None => c.push(format!("{}.target", field), "is required"),
        }

        match (timeslices, objective.time_slice_target) {
            (true, None) => c.push(
                format!("{}.timeSliceTarget", field),
                "is required for the Timeslices budgeting method",
            ),
            (true, Some(t)) if !(t > 0.0 && t <= 1.0) => c.push(
                format!("{}.timeSliceTarget", field),
                "must be greater than 0 and at most 1",
            ),
            (false, Some(_)) => c.push(
                format!("{}.timeSliceTarget", field),
                "is only allowed for the Timeslices budgeting method",
            ),
            _ => {}
        }

        if objective.primary == Some(true) {
            primaries += 1;
        }

        let kinds = [
            objective.raw_metric.is_some(),
            objective.count_metrics.is_some(),
            objective.composite.is_some(),
        ];
        if kinds.iter().filter(|present| **present).count() != 1 {
            c.push(
                field.clone(),
                "exactly one of rawMetric, countMetrics or composite must be set",
            );
        }

        if let Some(raw) = &objective.raw_metric {
            match objective.op.as_deref() {
                Some(op) => c.one_of(&format!("{}.op", field), op, &["lt", "lte", "gt", "gte"]),
                None => c.push(format!("{}.op", field), "is required for raw metrics"),
            }
            if objective.value.is_none() {
                c.push(format!("{}.value", field), "is required for raw metrics");
            }
            metric_spec(c, &format!("{}.rawMetric.query", field), &raw.query);
        }

        if let Some(count) = &objective.count_metrics {
            let field = format!("{}.countMetrics", field);
            match &count.total {
                Some(total) => metric_spec(c, &format!("{}.total", field), total),
                None => c.push(format!("{}.total", field), "is required"),
            }
            match (&count.good, &count.bad) {
                (Some(good), None) => metric_spec(c, &format!("{}.good", field), good),
                (None, Some(bad)) => metric_spec(c, &format!("{}.bad", field), bad),
                _ => c.push(field, "exactly one of good or bad must be set"),
            }
        }

        if let Some(composite) = &objective.composite {
            if parse_duration(&composite.max_delay).is_none() {
                c.push(
                    format!("{}.composite.maxDelay", field),
                    "must be a duration such as 15m",
                );
            }
            for (j, component) in composite.components.objectives.iter().enumerate() {
                let component_field = format!("{}.composite.components.objectives[{}]", field, j);
                if component.weight <= 0.0 {
                    c.push(format!("{}.weight", component_field), "must be greater than 0");
                }
                c.one_of(
                    &format!("{}.whenDelayed", component_field),
                    &component.when_delayed,
                    &["CountAsGood", "CountAsBad", "Ignore"],
                );
            }
        }
    }

    if primaries > 1 {
        c.push("spec.objectives", "at most one objective can be marked primary");
    }

    for (i, policy) in spec.alert_policies.iter().enumerate() {
        c.name(&format!("spec.alertPolicies[{}]", i), policy);
    }
    for (i, attachment) in spec.attachments.iter().enumerate() {
        if url::Url::parse(&attachment.url).is_err() {
            c.push(format!("spec.attachments[{}].url", i), "must be a valid URL");
        }
    }
    if let Some(composite) = &spec.composite {
        if !(composite.target > 0.0 && composite.target < 1.0) {
            c.push("spec.composite.target", "must be greater than 0 and less than 1");
        }
    }
}

fn metric_spec(c: &mut Collector, field: &str, spec: &MetricSpec) {
    if spec.len() != 1 {
        c.push(field, "exactly one data source query must be configured");
    }
}

fn validate_source(
    c: &mut Collector,
    source: &std::collections::BTreeMap<String, serde_json::Value>,
    query_delay: Option<&ManifestDuration>,
) {
    if source.len() != 1 {
        c.push("spec", "exactly one data source must be configured");
    }
    if let Some(delay) = query_delay {
        c.one_of("spec.queryDelay.unit", &delay.unit, &["Second", "Minute"]);
        if delay.value < 0 {
            c.push("spec.queryDelay.value", "must not be negative");
        }
    }
}

fn validate_alert_policy(c: &mut Collector, spec: &AlertPolicySpec) {
    c.description("spec.description", &spec.description);
    c.one_of("spec.severity", &spec.severity, &["Low", "Medium", "High"]);
    if let Some(cooldown) = &spec.cooldown {
        if parse_duration(cooldown).is_none() {
            c.push("spec.cooldown", "must be a duration such as 5m");
        }
    }
    if spec.conditions.is_empty() {
        c.push("spec.conditions", "at least one condition is required");
    }
    for (i, condition) in spec.conditions.iter().enumerate() {
        let field = format!("spec.conditions[{}]", i);
        c.one_of(
            &format!("{}.measurement", field),
            &condition.measurement,
            &[
                "timeToBurnBudget",
                "timeToBurnEntireBudget",
                "burnRate",
                "averageBurnRate",
                "burnedBudget",
                "budgetDrop",
            ],
        );
        if condition.alerting_window.is_some() && condition.lasts_for.is_some() {
            c.push(field.clone(), "alertingWindow and lastsFor are mutually exclusive");
        }
        if let Some(op) = &condition.op {
            c.one_of(&format!("{}.op", field), op, &["lt", "lte", "gt", "gte"]);
        }
    }
    for (i, method) in spec.alert_methods.iter().enumerate() {
        c.name(&format!("spec.alertMethods[{}].metadata.name", i), &method.metadata.name);
    }
}

fn validate_alert_silence(c: &mut Collector, spec: &AlertSilenceSpec) {
    c.description("spec.description", &spec.description);
    c.name("spec.slo", &spec.slo);
    c.name("spec.alertPolicy.name", &spec.alert_policy.name);
    let period = &spec.period;
    if period.end_time.is_some() == period.duration.is_some() {
        c.push("spec.period", "exactly one of endTime or duration must be set");
    }
    if let Some(start) = &period.start_time {
        c.timestamp("spec.period.startTime", start);
    }
    if let Some(end) = &period.end_time {
        c.timestamp("spec.period.endTime", end);
    }
    if let Some(duration) = &period.duration {
        if parse_duration(duration).is_none() {
            c.push("spec.period.duration", "must be a duration such as 1h");
        }
    }
}
