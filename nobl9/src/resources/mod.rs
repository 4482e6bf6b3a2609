//! Terraform resources
//!
//! Every resource follows the same lifecycle against the object API: apply
//! a manifest object, read it back, delete it by name. [`ManifestResource`]
//! implements that lifecycle once; each object kind contributes an
//! [`ObjectMapping`] that knows its schema and converts between Terraform
//! values and manifest objects.

pub mod agent;
pub mod alert_method;
pub mod alert_policy;
pub mod alert_silence;
pub mod annotation;
pub mod budget_adjustment;
pub mod common;
pub mod direct;
pub mod fields;
pub mod project;
pub mod report;
pub mod role_binding;
pub mod service;
pub mod slo;
pub mod sources;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::import::import_state_split_id;
use tfplug::provider::ResourceFactory;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ModifyPlanRequest,
    ModifyPlanResponse, ReadResourceRequest, ReadResourceResponse, Resource,
    ResourceMetadataRequest, ResourceMetadataResponse, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    ResourceWithModifyPlan, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::Schema;
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::api::Client;
use crate::manifest::{self, Kind, Metadata, Object};
use crate::provider_data::Nobl9ProviderData;
use common::{id_attribute, operation_timeout, retry_on_concurrency_issue, Attrs};

/// Conversion between one resource type's Terraform values and its manifest object
pub trait ObjectMapping: Clone + Send + Sync + 'static {
    fn type_name(&self) -> String;

    fn kind(&self) -> Kind;

    /// Resource schema without the computed `id`
    fn schema(&self) -> Schema;

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic>;

    /// `prior` is the planned or stored value the object is written over
    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic>;
}

/// Builds a manifest object, reporting serialization failures as diagnostics
pub fn to_object<S: Serialize>(kind: Kind, metadata: Metadata, spec: &S) -> Result<Object, Diagnostic> {
    Object::new(kind, metadata, spec).map_err(|e| {
        Diagnostic::error(
            format!("Failed to build {} object", kind),
            e.to_string(),
        )
    })
}

/// Typed spec of an object returned by the API
pub fn spec_of<S: DeserializeOwned>(object: &Object) -> Result<S, Diagnostic> {
    object.spec_as().map_err(|e| {
        Diagnostic::error(
            format!("Unexpected {} returned by the API", object.kind),
            format!("Failed to decode spec of '{}': {}", object.name(), e),
        )
    })
}

pub struct ManifestResource<M: ObjectMapping> {
    type_name: String,
    mapping: M,
    provider_data: Option<Nobl9ProviderData>,
}

impl<M: ObjectMapping> ManifestResource<M> {
    pub fn new(mapping: M) -> Self {
        Self {
            type_name: mapping.type_name(),
            mapping,
            provider_data: None,
        }
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(|| {
                Diagnostic::error(
                    "Provider not configured",
                    "Provider data was not properly configured",
                )
            })
    }

    fn project_of(&self, state: Attrs<'_>) -> Option<String> {
        if self.mapping.kind().is_project_scoped() {
            state.string("project")
        } else {
            None
        }
    }

    /// Applies the object and reads it back into state
    async fn apply(&self, ctx: &Context, planned: &DynamicValue) -> Result<Dynamic, Diagnostic> {
        let client = self.client()?;
        let kind = self.mapping.kind();
        let object = self.mapping.marshal(Attrs(&planned.value))?;
        let name = object.name().to_string();
        let project = object.project().map(str::to_string);

        tracing::debug!(kind = %kind, name = %name, "applying object");
        let objects = [object];
        retry_on_concurrency_issue(operation_timeout(ctx), || client.apply(&objects))
            .await
            .map_err(|e| {
                tracing::error!("failed to apply {} '{}': {}", kind, name, e);
                Diagnostic::error(format!("Failed to apply {}", kind), e.to_string())
            })?;

        match self.fetch(client, project.as_deref(), &name).await? {
            Some(object) => self.to_state(&object, &planned.value),
            None => Err(Diagnostic::error(
                format!("Failed to read {} after apply", kind),
                format!("'{}' was not returned by the API", name),
            )),
        }
    }

    async fn fetch(
        &self,
        client: &Client,
        project: Option<&str>,
        name: &str,
    ) -> Result<Option<Object>, Diagnostic> {
        let kind = self.mapping.kind();
        match client.get(kind, project, &[name]).await {
            Ok(objects) => Ok(objects.into_iter().find(|o| o.name() == name)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(Diagnostic::error(format!("Failed to read {}", kind), e.to_string())),
        }
    }

    fn to_state(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let state = self.mapping.unmarshal(object, prior)?;
        Ok(with_id(state, object.name()))
    }
}

fn with_id(state: Dynamic, id: &str) -> Dynamic {
    match state {
        Dynamic::Map(mut entries) => {
            entries.insert("id".to_string(), Dynamic::String(id.to_string()));
            Dynamic::Map(entries)
        }
        other => other,
    }
}

#[async_trait]
impl<M: ObjectMapping> Resource for ManifestResource<M> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name.clone(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let mut schema = self.mapping.schema();
        schema.block.attributes.push(id_attribute());
        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        // Attribute validators run in the framework; object rules run at plan time
        ValidateResourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        match self.apply(&ctx, &request.planned_state).await {
            Ok(state) => CreateResourceResponse {
                new_state: DynamicValue::new(state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(diagnostic) => CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics: vec![diagnostic],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut response = ReadResourceResponse {
            new_state: None,
            diagnostics: vec![],
            private: request.private.clone(),
            deferred: None,
        };

        let client = match self.client() {
            Ok(client) => client,
            Err(diagnostic) => {
                response.new_state = Some(request.current_state);
                response.diagnostics.push(diagnostic);
                return response;
            }
        };

        let current = Attrs(&request.current_state.value);
        let Some(name) = current.string("name") else {
            response.diagnostics.push(Diagnostic::error(
                "Missing name in state",
                "The resource state has no name to read the object by",
            ));
            return response;
        };
        let project = self.project_of(current);

        match self.fetch(client, project.as_deref(), &name).await {
            Ok(Some(object)) => match self.to_state(&object, &request.current_state.value) {
                Ok(state) => response.new_state = Some(DynamicValue::new(state)),
                Err(diagnostic) => {
                    response.new_state = Some(request.current_state);
                    response.diagnostics.push(diagnostic);
                }
            },
            Ok(None) => {
                tracing::debug!("{} '{}' no longer exists", self.mapping.kind(), name);
            }
            Err(diagnostic) => {
                response.new_state = Some(request.current_state);
                response.diagnostics.push(diagnostic);
            }
        }

        response
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        match self.apply(&ctx, &request.planned_state).await {
            Ok(state) => UpdateResourceResponse {
                new_state: DynamicValue::new(state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(diagnostic) => UpdateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics: vec![diagnostic],
            },
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let mut diagnostics = vec![];

        let client = match self.client() {
            Ok(client) => client,
            Err(diagnostic) => {
                diagnostics.push(diagnostic);
                return DeleteResourceResponse { diagnostics };
            }
        };

        let prior = Attrs(&request.prior_state.value);
        let Some(name) = prior.string("name") else {
            return DeleteResourceResponse { diagnostics };
        };
        let project = self.project_of(prior);
        let kind = self.mapping.kind();
        let names = [name.as_str()];

        let result = retry_on_concurrency_issue(operation_timeout(&ctx), || {
            client.delete_by_name(kind, project.as_deref(), &names)
        })
        .await;

        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} '{}' already deleted", kind, name);
            }
            Err(e) => {
                tracing::error!("failed to delete {} '{}': {}", kind, name, e);
                diagnostics.push(Diagnostic::error(
                    format!("Failed to delete {}", kind),
                    e.to_string(),
                ));
            }
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_modify_plan(&self) -> Option<&dyn ResourceWithModifyPlan> {
        Some(self)
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl<M: ObjectMapping> ResourceWithConfigure for ManifestResource<M> {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];

        match request.provider_data {
            Some(data) => match data.downcast::<Nobl9ProviderData>() {
                Ok(provider_data) => self.provider_data = Some((*provider_data).clone()),
                Err(_) => diagnostics.push(Diagnostic::error(
                    "Invalid provider data",
                    "Failed to downcast provider data to Nobl9ProviderData",
                )),
            },
            None => diagnostics.push(Diagnostic::error(
                "No provider data",
                "Provider data is required but was not provided",
            )),
        }

        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl<M: ObjectMapping> ResourceWithModifyPlan for ManifestResource<M> {
    /// Validates the object the plan would apply, once every value is known
    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        let mut response = ModifyPlanResponse {
            planned_state: request.proposed_new_state,
            requires_replace: vec![],
            planned_private: request.prior_private,
            diagnostics: vec![],
        };

        if request.config.value.is_null() || !request.config.value.is_known() {
            return response;
        }

        let kind = self.mapping.kind();
        match self.mapping.marshal(Attrs(&response.planned_state.value)) {
            Ok(object) => {
                if let Err(errors) = manifest::validate(&object) {
                    response.diagnostics.push(Diagnostic::error(
                        format!("Invalid {} configuration", kind),
                        errors.to_string(),
                    ));
                }
            }
            Err(diagnostic) => response.diagnostics.push(diagnostic),
        }

        response
    }
}

#[async_trait]
impl<M: ObjectMapping> ResourceWithImportState for ManifestResource<M> {
    /// `name` for organization-wide kinds; `project/name` or `name` in the
    /// provider's default project for project-scoped ones
    async fn import_state(
        &self,
        _ctx: Context,
        mut request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        };

        let (paths, form) = if self.mapping.kind().is_project_scoped() {
            if !request.id.contains('/') {
                let project = self
                    .provider_data
                    .as_ref()
                    .map(|data| data.client.default_project())
                    .unwrap_or(crate::api::client::DEFAULT_PROJECT);
                request.id = format!("{}/{}", project, request.id);
            }
            (
                vec![AttributePath::new("project"), AttributePath::new("name")],
                "'project/name' or 'name'",
            )
        } else {
            (vec![AttributePath::new("name")], "'name'")
        };

        if request.id.split('/').count() != paths.len() {
            response.diagnostics.push(Diagnostic::error(
                "Invalid import ID",
                format!("Expected an ID of the form {}, got '{}'", form, request.id),
            ));
            return response;
        }

        import_state_split_id(&paths, '/', &request, &mut response);
        response
    }
}

fn factory<M: ObjectMapping>(mapping: M) -> (String, ResourceFactory) {
    let type_name = mapping.type_name();
    let factory: ResourceFactory = Box::new(move || Box::new(ManifestResource::new(mapping.clone())));
    (type_name, factory)
}

/// Every resource type the provider serves, keyed by type name
pub fn resource_factories() -> HashMap<String, ResourceFactory> {
    let mut factories: HashMap<String, ResourceFactory> = [
        factory(project::ProjectMapping),
        factory(service::ServiceMapping),
        factory(slo::SloMapping),
        factory(agent::AgentMapping),
        factory(alert_policy::AlertPolicyMapping),
        factory(alert_silence::AlertSilenceMapping),
        factory(role_binding::RoleBindingMapping),
        factory(budget_adjustment::BudgetAdjustmentMapping),
        factory(report::ReportMapping),
        factory(annotation::AnnotationMapping),
    ]
    .into_iter()
    .collect();

    factories.extend(sources::direct_sources().map(|source| factory(direct::DirectMapping::new(source))));
    factories.extend(
        alert_method::METHODS
            .iter()
            .map(|method| factory(alert_method::AlertMethodMapping::new(method))),
    );

    factories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_keys_match_type_names() {
        for (name, factory) in resource_factories() {
            let resource = factory();
            assert_eq!(resource.type_name(), name);
        }
    }

    #[test]
    fn serves_every_resource_family() {
        let factories = resource_factories();
        for name in [
            "nobl9_project",
            "nobl9_service",
            "nobl9_slo",
            "nobl9_agent",
            "nobl9_direct_datadog",
            "nobl9_direct_honeycomb",
            "nobl9_alert_method_slack",
            "nobl9_alert_method_email",
            "nobl9_alert_policy",
            "nobl9_alert_silence",
            "nobl9_role_binding",
            "nobl9_budget_adjustment",
            "nobl9_report",
            "nobl9_annotation",
        ] {
            assert!(factories.contains_key(name), "missing {}", name);
        }
        assert!(!factories.contains_key("nobl9_direct_prometheus"));
    }

    async fn import(resource: &dyn ResourceWithImportState, id: &str) -> ImportResourceStateResponse {
        resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "nobl9_test".to_string(),
                    id: id.to_string(),
                    client_capabilities: Default::default(),
                },
            )
            .await
    }

    #[tokio::test]
    async fn import_splits_project_and_name() {
        let resource = ManifestResource::new(service::ServiceMapping);
        let response = import(&resource, "payments/checkout").await;
        assert!(response.diagnostics.is_empty());
        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("project")).unwrap(), "payments");
        assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "checkout");
    }

    #[tokio::test]
    async fn import_of_bare_name_without_provider_uses_default_project() {
        let resource = ManifestResource::new(service::ServiceMapping);
        let response = import(&resource, "checkout").await;
        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("project")).unwrap(), "default");
    }

    #[tokio::test]
    async fn import_rejects_malformed_ids() {
        let service = ManifestResource::new(service::ServiceMapping);
        let project = ManifestResource::new(project::ProjectMapping);
        for response in [
            import(&service, "a/b/c").await,
            import(&service, "payments/").await,
            import(&project, "payments/checkout").await,
            import(&project, "").await,
        ] {
            assert!(response.imported_resources.is_empty());
            assert_eq!(response.diagnostics[0].summary, "Invalid import ID");
        }
    }

    #[test]
    fn id_is_added_to_state() {
        let state = with_id(Dynamic::Map(HashMap::new()), "svc");
        assert_eq!(state.get("id"), Some(&Dynamic::String("svc".into())));
    }
}
