//! nobl9_role_binding
//!
//! Grants an organization role, or a project role when `project_ref` is set,
//! to a user or a group.

use tfplug::plan_modifier::RequiresReplace;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    marshal_metadata, name_attribute, unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{Kind, Object, RoleBindingSpec};

const METADATA: MetadataFields = MetadataFields {
    display_name: false,
    project: false,
    labels: false,
    annotations: false,
};

#[derive(Clone)]
pub struct RoleBindingMapping;

fn immutable(name: &str, description: &str) -> tfplug::schema::Attribute {
    AttributeBuilder::new(name, AttributeType::String)
        .description(description)
        .optional()
        .plan_modifier(RequiresReplace)
        .build()
}

impl ObjectMapping for RoleBindingMapping {
    fn type_name(&self) -> String {
        "nobl9_role_binding".to_string()
    }

    fn kind(&self) -> Kind {
        Kind::RoleBinding
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Role binding: assigns a role to a user or a group.")
            .attribute(name_attribute("Unique name of the role binding."))
            .attribute(immutable("user", "Okta user ID; conflicts with group_ref."))
            .attribute(immutable("group_ref", "Group ID; conflicts with user."))
            .attribute(
                AttributeBuilder::new("role_ref", AttributeType::String)
                    .description("Role to grant, e.g. project-owner or organization-admin.")
                    .required()
                    .build(),
            )
            .attribute(immutable(
                "project_ref",
                "Project the role applies to; an organization role when unset.",
            ))
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let spec = RoleBindingSpec {
            user: state.non_empty("user"),
            group_ref: state.non_empty("group_ref"),
            role_ref: state.string("role_ref").unwrap_or_default(),
            project_ref: state.non_empty("project_ref"),
        };
        to_object(Kind::RoleBinding, marshal_metadata(state, false), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: RoleBindingSpec = spec_of(object)?;
        Ok(unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &METADATA)
            .string("user", spec.user)
            .string("group_ref", spec.group_ref)
            .string("role_ref", Some(spec.role_ref))
            .string("project_ref", spec.project_ref)
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

    #[test]
    fn project_role_for_a_user() {
        let state = object(vec![
            ("name", s("alice-payments")),
            ("user", s("00u2y4e4atkzaYkXP4x8")),
            ("role_ref", s("project-owner")),
            ("project_ref", s("payments")),
        ]);
        let object = RoleBindingMapping.marshal(Attrs(&state)).unwrap();
        assert_eq!(object.metadata.project, None);
        assert_eq!(
            object.spec,
            json!({"user": "00u2y4e4atkzaYkXP4x8", "roleRef": "project-owner", "projectRef": "payments"})
        );
        assert!(validate(&object).is_ok());
    }

    #[test]
    fn user_and_group_together_fail_validation() {
        let state = object(vec![
            ("name", s("both")),
            ("user", s("u")),
            ("group_ref", s("g")),
            ("role_ref", s("organization-viewer")),
        ]);
        let object = RoleBindingMapping.marshal(Attrs(&state)).unwrap();
        assert!(validate(&object).is_err());
    }

    #[test]
    fn unmarshal_group_binding() {
        let object: Object = serde_json::from_value(json!({
            "apiVersion": "n9/v1alpha",
            "kind": "RoleBinding",
            "metadata": {"name": "sre-admins"},
            "spec": {"groupRef": "grp-1", "roleRef": "organization-admin"}
        }))
        .unwrap();
        let state = RoleBindingMapping.unmarshal(&object, &Dynamic::Null).unwrap();
        assert_eq!(state.get("group_ref"), Some(&s("grp-1")));
        assert_eq!(state.get("user"), Some(&Dynamic::Null));
        assert_eq!(state.get("project_ref"), Some(&Dynamic::Null));
    }
}
