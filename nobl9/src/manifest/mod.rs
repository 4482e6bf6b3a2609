//! Nobl9 manifest objects
//!
//! Every object exchanged with the API shares the same envelope:
//! `apiVersion`, `kind`, `metadata`, `spec` and, on reads, `status`. The spec
//! is stored as raw JSON on the envelope and converted to the typed spec of
//! its kind with [`Object::spec_as`].

pub mod specs;
pub mod validation;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub use specs::*;
pub use validation::{validate, ValidationError, ValidationErrors};

pub const API_VERSION: &str = "n9/v1alpha";

/// Label key to its values
pub type Labels = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Project,
    Service,
    #[serde(rename = "SLO")]
    Slo,
    Agent,
    Direct,
    AlertMethod,
    AlertPolicy,
    AlertSilence,
    RoleBinding,
    BudgetAdjustment,
    Report,
    Annotation,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Project => "Project",
            Kind::Service => "Service",
            Kind::Slo => "SLO",
            Kind::Agent => "Agent",
            Kind::Direct => "Direct",
            Kind::AlertMethod => "AlertMethod",
            Kind::AlertPolicy => "AlertPolicy",
            Kind::AlertSilence => "AlertSilence",
            Kind::RoleBinding => "RoleBinding",
            Kind::BudgetAdjustment => "BudgetAdjustment",
            Kind::Report => "Report",
            Kind::Annotation => "Annotation",
        }
    }

    /// Endpoint segment, e.g. `alertmethod` in `/get/alertmethod`
    pub fn as_path(&self) -> String {
        self.as_str().to_lowercase()
    }

    /// Project-scoped objects carry `metadata.project`; the others are organization-wide
    pub fn is_project_scoped(&self) -> bool {
        !matches!(
            self,
            Kind::Project | Kind::RoleBinding | Kind::BudgetAdjustment | Kind::Report
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    pub api_version: String,
    pub kind: Kind,
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl Object {
    pub fn new<S: Serialize>(kind: Kind, metadata: Metadata, spec: &S) -> serde_json::Result<Self> {
        Ok(Self {
            api_version: API_VERSION.to_string(),
            kind,
            metadata,
            spec: serde_json::to_value(spec)?,
            status: None,
        })
    }

    pub fn spec_as<S: DeserializeOwned>(&self) -> serde_json::Result<S> {
        serde_json::from_value(self.spec.clone())
    }

    pub fn status_as<S: DeserializeOwned>(&self) -> Option<S> {
        self.status
            .as_ref()
            .and_then(|s| serde_json::from_value(s.clone()).ok())
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn project(&self) -> Option<&str> {
        self.metadata.project.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_paths_are_lowercase() {
        assert_eq!(Kind::Slo.as_path(), "slo");
        assert_eq!(Kind::AlertMethod.as_path(), "alertmethod");
        assert_eq!(Kind::BudgetAdjustment.as_path(), "budgetadjustment");
    }

    #[test]
    fn kind_scope() {
        assert!(Kind::Service.is_project_scoped());
        assert!(Kind::Annotation.is_project_scoped());
        assert!(!Kind::Project.is_project_scoped());
        assert!(!Kind::RoleBinding.is_project_scoped());
    }

    #[test]
    fn slo_kind_uses_uppercase_name() {
        assert_eq!(serde_json::to_value(Kind::Slo).unwrap(), json!("SLO"));
        let kind: Kind = serde_json::from_value(json!("AlertPolicy")).unwrap();
        assert_eq!(kind, Kind::AlertPolicy);
    }

    #[test]
    fn object_serializes_envelope() {
        let object = Object::new(
            Kind::Project,
            Metadata {
                name: "default".to_string(),
                display_name: Some("Default".to_string()),
                ..Default::default()
            },
            &ProjectSpec {
                description: "main".to_string(),
            },
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({
                "apiVersion": "n9/v1alpha",
                "kind": "Project",
                "metadata": {"name": "default", "displayName": "Default"},
                "spec": {"description": "main"}
            })
        );
    }

    #[test]
    fn object_reads_status() {
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "Service",
            "metadata": {"name": "api", "project": "default", "labels": {"team": ["a"]}},
            "spec": {"description": ""},
            "status": {"sloCount": 3}
        }))
        .unwrap();

        assert_eq!(object.project(), Some("default"));
        assert_eq!(object.metadata.labels["team"], vec!["a".to_string()]);
        let status: ServiceStatus = object.status_as().unwrap();
        assert_eq!(status.slo_count, 3);
    }
}
