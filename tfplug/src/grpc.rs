//! gRPC service implementation of the Terraform Plugin Protocol v6
//!
//! Resources and data sources are created on demand through the provider's
//! factories, so no resource instance outlives a single request. The data
//! returned by `ConfigureProvider` is kept here and handed to every instance.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::error::TfplugError;
use crate::plan::plan_resource_change;
use crate::proto;
use crate::proto::provider_server::Provider as ProtoProvider;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderSchemaRequest,
    ResourceFactory, StopProviderRequest, ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ModifyPlanRequest, ReadResourceRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{Attribute, Block, NestedBlock, NestingMode, Schema, StringKind};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, ClientCapabilities, Deferred, DeferredReason,
    Diagnostic, DiagnosticSeverity, Dynamic, DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

pub struct GrpcProviderServer<P: Provider> {
    provider: Arc<RwLock<P>>,
    provider_data: Arc<RwLock<ProviderData>>,
    resources: Arc<HashMap<String, ResourceFactory>>,
    data_sources: Arc<HashMap<String, DataSourceFactory>>,
    resource_schemas: Arc<OnceCell<HashMap<String, Schema>>>,
    data_source_schemas: Arc<OnceCell<HashMap<String, Schema>>>,
    /// Parent of every request context; cancelled by StopProvider
    root_ctx: Context,
}

impl<P: Provider + 'static> GrpcProviderServer<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();

        Self {
            provider: Arc::new(RwLock::new(provider)),
            provider_data: Arc::new(RwLock::new(None)),
            resources: Arc::new(resources),
            data_sources: Arc::new(data_sources),
            resource_schemas: Arc::new(OnceCell::new()),
            data_source_schemas: Arc::new(OnceCell::new()),
            root_ctx: Context::new(),
        }
    }

    fn ctx(&self) -> Context {
        self.root_ctx.clone()
    }

    fn new_resource(&self, type_name: &str) -> Result<Box<dyn ResourceWithConfigure>, Status> {
        self.resources
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| TfplugError::ResourceNotFound(type_name.to_string()).into())
    }

    fn new_data_source(&self, type_name: &str) -> Result<Box<dyn DataSourceWithConfigure>, Status> {
        self.data_sources
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| TfplugError::DataSourceNotFound(type_name.to_string()).into())
    }

    async fn configured_resource(
        &self,
        type_name: &str,
    ) -> Result<(Box<dyn ResourceWithConfigure>, Vec<Diagnostic>), Status> {
        let mut resource = self.new_resource(type_name)?;
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(self.ctx(), ConfigureResourceRequest { provider_data })
            .await;
        Ok((resource, response.diagnostics))
    }

    async fn configured_data_source(
        &self,
        type_name: &str,
    ) -> Result<(Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>), Status> {
        let mut data_source = self.new_data_source(type_name)?;
        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(self.ctx(), ConfigureDataSourceRequest { provider_data })
            .await;
        Ok((data_source, response.diagnostics))
    }

    async fn resource_schemas(&self) -> &HashMap<String, Schema> {
        self.resource_schemas
            .get_or_init(|| async move {
                let mut schemas = HashMap::new();
                for (name, factory) in self.resources.iter() {
                    let response = factory().schema(self.ctx(), ResourceSchemaRequest).await;
                    schemas.insert(name.clone(), response.schema);
                }
                schemas
            })
            .await
    }

    async fn data_source_schemas(&self) -> &HashMap<String, Schema> {
        self.data_source_schemas
            .get_or_init(|| async move {
                let mut schemas = HashMap::new();
                for (name, factory) in self.data_sources.iter() {
                    let response = factory().schema(self.ctx(), DataSourceSchemaRequest).await;
                    schemas.insert(name.clone(), response.schema);
                }
                schemas
            })
            .await
    }

    async fn resource_schema(&self, type_name: &str) -> Result<&Schema, Status> {
        self.resource_schemas()
            .await
            .get(type_name)
            .ok_or_else(|| TfplugError::ResourceNotFound(type_name.to_string()).into())
    }

    async fn provider_schema(&self) -> Schema {
        let provider = self.provider.read().await;
        provider.schema(self.ctx(), ProviderSchemaRequest).await.schema
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> ProtoProvider for GrpcProviderServer<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> Result<Response<proto::get_metadata::Response>, Status> {
        let mut resources: Vec<_> = self.resources.keys().cloned().collect();
        let mut data_sources: Vec<_> = self.data_sources.keys().cloned().collect();
        resources.sort();
        data_sources.sort();

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: vec![],
            data_sources: data_sources
                .into_iter()
                .map(|type_name| proto::get_metadata::DataSourceMetadata { type_name })
                .collect(),
            resources: resources
                .into_iter()
                .map(|type_name| proto::get_metadata::ResourceMetadata { type_name })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> Result<Response<proto::get_provider_schema::Response>, Status> {
        let provider_schema = self.provider_schema().await;

        let resource_schemas = self
            .resource_schemas()
            .await
            .iter()
            .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
            .collect();
        let data_source_schemas = self
            .data_source_schemas()
            .await
            .iter()
            .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
            .collect();

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&provider_schema)),
            resource_schemas,
            data_source_schemas,
            diagnostics: vec![],
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> Result<Response<proto::validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;

        let schema = self.provider_schema().await;
        let mut diagnostics = Vec::new();
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        let provider = self.provider.read().await;
        let response = provider
            .validate(self.ctx(), ValidateProviderConfigRequest { config })
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;
        let schema = self.resource_schema(&req.type_name).await?;

        let mut diagnostics = Vec::new();
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        let resource = self.new_resource(&req.type_name)?;
        let response = resource
            .validate(
                self.ctx(),
                ValidateResourceConfigRequest {
                    type_name: req.type_name,
                    config,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> Result<Response<proto::validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;
        let schema = self
            .data_source_schemas()
            .await
            .get(&req.type_name)
            .ok_or_else(|| Status::from(TfplugError::DataSourceNotFound(req.type_name.clone())))?;

        let mut diagnostics = Vec::new();
        validate_block(&schema.block, &config.value, &AttributePath::root(), &mut diagnostics);

        let data_source = self.new_data_source(&req.type_name)?;
        let response = data_source
            .validate(
                self.ctx(),
                ValidateDataSourceConfigRequest {
                    type_name: req.type_name,
                    config,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        let schema = self.resource_schema(&req.type_name).await?;

        let raw_json = req.raw_state.map(|raw| raw.json).unwrap_or_default();
        if raw_json.is_empty() {
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(vec![Diagnostic::error(
                    "Unsupported state format",
                    "Only JSON encoded state can be upgraded",
                )]),
            }));
        }

        if req.version > schema.version {
            warn!(
                type_name = %req.type_name,
                stored = req.version,
                current = schema.version,
                "state was written by a newer provider version"
            );
        }

        let stored = DynamicValue::decode_json(&raw_json)?;
        let upgraded = DynamicValue::new(schema.block.conform(&stored.value));

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_dynamic_value(&upgraded)?),
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;
        debug!(terraform_version = %req.terraform_version, "configuring provider");

        let mut provider = self.provider.write().await;
        let response = provider
            .configure(
                self.ctx(),
                ConfigureProviderRequest {
                    terraform_version: req.terraform_version,
                    config,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        let current_state = decode_dynamic_value(req.current_state.clone())?;

        let (resource, diagnostics) = self.configured_resource(&req.type_name).await?;
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::read_resource::Response {
                new_state: req.current_state,
                diagnostics: diagnostics_to_proto(diagnostics),
                private: req.private,
                deferred: None,
            }));
        }

        let schema = self.resource_schema(&req.type_name).await?;
        let response = resource
            .read(
                self.ctx(),
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state,
                    private: req.private,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;

        let new_state = match response.new_state {
            Some(state) => DynamicValue::new(schema.block.conform(&state.value)),
            None => {
                debug!(type_name = %req.type_name, "resource no longer exists");
                DynamicValue::null()
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            diagnostics: diagnostics_to_proto(diagnostics.into_iter().chain(response.diagnostics).collect()),
            private: response.private,
            deferred: response.deferred.map(deferred_to_proto),
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic_value(req.prior_state)?;
        let proposed_new_state = decode_dynamic_value(req.proposed_new_state)?;
        let config = decode_dynamic_value(req.config)?;

        let schema = self.resource_schema(&req.type_name).await?;
        let mut planned =
            plan_resource_change(schema, &prior_state, &proposed_new_state, &config);
        let mut planned_private = req.prior_private.clone();

        if !planned.planned_state.is_null() && !has_errors(&planned.diagnostics) {
            let (resource, _) = self.configured_resource(&req.type_name).await?;
            if let Some(modifier) = resource.as_modify_plan() {
                let response = modifier
                    .modify_plan(
                        self.ctx(),
                        ModifyPlanRequest {
                            type_name: req.type_name.clone(),
                            config,
                            prior_state,
                            proposed_new_state: planned.planned_state.clone(),
                            prior_private: req.prior_private,
                        },
                    )
                    .await;

                planned.planned_state = response.planned_state;
                planned.diagnostics.extend(response.diagnostics);
                planned_private = response.planned_private;
                for path in response.requires_replace {
                    if !planned.requires_replace.contains(&path) {
                        planned.requires_replace.push(path);
                    }
                }
            }
        }

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_dynamic_value(&planned.planned_state)?),
            requires_replace: planned
                .requires_replace
                .iter()
                .map(attribute_path_to_proto)
                .collect(),
            planned_private,
            diagnostics: diagnostics_to_proto(planned.diagnostics),
            legacy_type_system: false,
            deferred: None,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic_value(req.prior_state)?;
        let planned_state = decode_dynamic_value(req.planned_state)?;
        let config = decode_dynamic_value(req.config)?;

        let (resource, mut diagnostics) = self.configured_resource(&req.type_name).await?;
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::apply_resource_change::Response {
                new_state: Some(encode_dynamic_value(&prior_state)?),
                private: req.planned_private,
                diagnostics: diagnostics_to_proto(diagnostics),
                legacy_type_system: false,
            }));
        }

        let schema = self.resource_schema(&req.type_name).await?;
        let ctx = self.ctx();
        let type_name = req.type_name.clone();

        let (new_state, private) = if planned_state.is_null() {
            debug!(type_name = %type_name, "deleting resource");
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name,
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private,
                    },
                )
                .await;
            let failed = has_errors(&response.diagnostics);
            diagnostics.extend(response.diagnostics);
            if failed {
                (prior_state, Vec::new())
            } else {
                (DynamicValue::null(), Vec::new())
            }
        } else if prior_state.is_null() {
            debug!(type_name = %type_name, "creating resource");
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name,
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            if response.new_state.value.is_known() {
                (response.new_state, response.private)
            } else {
                // Nothing usable came back, the object is not tracked
                (DynamicValue::null(), Vec::new())
            }
        } else {
            debug!(type_name = %type_name, "updating resource");
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name,
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            if response.new_state.value.is_known() {
                (response.new_state, response.private)
            } else {
                (prior_state, response.private)
            }
        };

        let new_state = DynamicValue::new(schema.block.conform(&new_state.value));

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();
        let (resource, mut diagnostics) = self.configured_resource(&req.type_name).await?;

        let Some(importer) = resource.as_import_state() else {
            diagnostics.push(Diagnostic::error(
                "Resource Import Not Implemented",
                format!("{} does not support import", req.type_name),
            ));
            return Ok(Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(diagnostics),
                deferred: None,
            }));
        };

        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(diagnostics),
                deferred: None,
            }));
        }

        let schema = self.resource_schema(&req.type_name).await?;
        let response = importer
            .import_state(
                self.ctx(),
                ImportResourceStateRequest {
                    type_name: req.type_name,
                    id: req.id,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            let state = DynamicValue::new(schema.block.conform(&imported.state.value));
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_dynamic_value(&state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(diagnostics),
            deferred: response.deferred.map(deferred_to_proto),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> Result<Response<proto::read_data_source::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config)?;

        let (data_source, mut diagnostics) = self.configured_data_source(&req.type_name).await?;
        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::read_data_source::Response {
                state: None,
                diagnostics: diagnostics_to_proto(diagnostics),
                deferred: None,
            }));
        }

        let schema = self
            .data_source_schemas()
            .await
            .get(&req.type_name)
            .ok_or_else(|| Status::from(TfplugError::DataSourceNotFound(req.type_name.clone())))?;

        let response = data_source
            .read(
                self.ctx(),
                ReadDataSourceRequest {
                    type_name: req.type_name,
                    config,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let state = DynamicValue::new(schema.block.conform(&response.state.value));
        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode_dynamic_value(&state)?),
            diagnostics: diagnostics_to_proto(diagnostics),
            deferred: response.deferred.map(deferred_to_proto),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> Result<Response<proto::stop_provider::Response>, Status> {
        self.root_ctx.cancel();
        let provider = self.provider.read().await;
        let response = provider.stop(Context::new(), StopProviderRequest).await;

        Ok(Response::new(proto::stop_provider::Response {
            error: response.error.unwrap_or_default(),
        }))
    }
}

/// Checks a configuration object against a block: unexpected and missing
/// arguments, type agreement, nested block counts and attribute validators.
pub fn validate_block(
    block: &Block,
    value: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let entries = match value {
        Dynamic::Map(entries) => entries,
        Dynamic::Null | Dynamic::Unknown => return,
        other => {
            diagnostics.push(Diagnostic::error(
                "Invalid configuration block",
                format!("Expected an object, got {}", other.type_name()),
            ));
            return;
        }
    };

    for key in entries.keys() {
        if block.attribute(key).is_none() && block.nested_block(key).is_none() {
            diagnostics.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named \"{}\" is not expected here", key),
                )
                .with_attribute(child_path(path, key)),
            );
        }
    }

    for attr in &block.attributes {
        let attr_path = child_path(path, &attr.name);
        let attr_value = entries.get(&attr.name).unwrap_or(&Dynamic::Null);
        validate_attribute(attr, attr_value, &attr_path, diagnostics);
    }

    for nested in &block.block_types {
        let nested_path = child_path(path, &nested.type_name);
        let nested_value = entries.get(&nested.type_name).unwrap_or(&Dynamic::Null);
        validate_nested_block(nested, nested_value, &nested_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.required && value.is_null() {
        diagnostics.push(
            Diagnostic::error(
                "Missing required argument",
                format!("The argument \"{}\" is required, but no definition was found.", path),
            )
            .with_attribute(path.clone()),
        );
        return;
    }

    if attr.computed && !attr.optional && !attr.required && !value.is_null() {
        diagnostics.push(
            Diagnostic::error(
                "Value for unconfigurable attribute",
                format!("Can't configure a value for \"{}\": its value will be decided automatically.", path),
            )
            .with_attribute(path.clone()),
        );
        return;
    }

    if !attr.r#type.accepts(value) {
        diagnostics.push(
            Diagnostic::error(
                "Incorrect attribute value type",
                format!("Inappropriate value for attribute \"{}\": got {}", path, value.type_name()),
            )
            .with_attribute(path.clone()),
        );
        return;
    }

    if attr.deprecated && !value.is_null() {
        diagnostics.push(
            Diagnostic::warning("Deprecated attribute", format!("\"{}\" is deprecated", path))
                .with_attribute(path.clone()),
        );
    }

    for validator in &attr.validators {
        validator.validate(value, path, diagnostics);
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: &Dynamic,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, nested.nesting) {
        (Dynamic::List(items), NestingMode::List | NestingMode::Set) => {
            let count = items.len() as i64;
            // Dynamic blocks can make the count unknown
            let count_known = items.iter().all(|i| !i.is_unknown());
            if count_known && nested.min_items > 0 && count < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(
                        "Insufficient blocks",
                        format!("At least {} \"{}\" blocks are required.", nested.min_items, nested.type_name),
                    )
                    .with_attribute(path.clone()),
                );
            }
            if count_known && nested.max_items > 0 && count > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(
                        "Too many blocks",
                        format!("No more than {} \"{}\" blocks are allowed.", nested.max_items, nested.type_name),
                    )
                    .with_attribute(path.clone()),
                );
            }
            for (i, item) in items.iter().enumerate() {
                validate_block(&nested.block, item, &path.clone().index(i as i64), diagnostics);
            }
        }
        (Dynamic::Map(items), NestingMode::Map) => {
            for (key, item) in items {
                validate_block(&nested.block, item, &path.clone().key(key), diagnostics);
            }
        }
        (v @ Dynamic::Map(_), NestingMode::Single | NestingMode::Group) => {
            validate_block(&nested.block, v, path, diagnostics);
        }
        (Dynamic::Null, _) if nested.min_items > 0 => {
            diagnostics.push(
                Diagnostic::error(
                    "Missing required block",
                    format!("At least {} \"{}\" blocks are required.", nested.min_items, nested.type_name),
                )
                .with_attribute(path.clone()),
            );
        }
        _ => {}
    }
}

fn child_path(parent: &AttributePath, name: &str) -> AttributePath {
    parent.clone().attribute(name)
}

fn server_capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

fn client_capabilities(caps: Option<proto::ClientCapabilities>) -> ClientCapabilities {
    caps.map(|c| ClientCapabilities {
        deferral_allowed: c.deferral_allowed,
        write_only_attributes_allowed: c.write_only_attributes_allowed,
    })
    .unwrap_or_default()
}

fn decode_dynamic_value(value: Option<proto::DynamicValue>) -> Result<DynamicValue, Status> {
    let Some(value) = value else {
        return Ok(DynamicValue::null());
    };

    let decoded = if !value.msgpack.is_empty() {
        DynamicValue::decode_msgpack(&value.msgpack)?
    } else if !value.json.is_empty() {
        DynamicValue::decode_json(&value.json)?
    } else {
        DynamicValue::null()
    };
    Ok(decoded)
}

fn encode_dynamic_value(value: &DynamicValue) -> Result<proto::DynamicValue, Status> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack()?,
        json: vec![],
    })
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> proto::schema::Block {
    proto::schema::Block {
        version: block.version,
        attributes: block.attributes.iter().map(attribute_to_proto).collect(),
        block_types: block.block_types.iter().map(nested_block_to_proto).collect(),
        description: block.description.clone(),
        description_kind: string_kind_to_proto(block.description_kind),
        deprecated: block.deprecated,
    }
}

fn attribute_to_proto(attr: &Attribute) -> proto::schema::Attribute {
    proto::schema::Attribute {
        name: attr.name.clone(),
        r#type: attr.r#type.to_bytes(),
        nested_type: None,
        description: attr.description.clone(),
        required: attr.required,
        optional: attr.optional,
        computed: attr.computed,
        sensitive: attr.sensitive,
        description_kind: string_kind_to_proto(StringKind::Plain),
        deprecated: attr.deprecated,
        write_only: false,
    }
}

fn nested_block_to_proto(nested: &NestedBlock) -> proto::schema::NestedBlock {
    use proto::schema::nested_block::NestingMode as ProtoNesting;

    let nesting = match nested.nesting {
        NestingMode::Single => ProtoNesting::Single,
        NestingMode::List => ProtoNesting::List,
        NestingMode::Set => ProtoNesting::Set,
        NestingMode::Map => ProtoNesting::Map,
        NestingMode::Group => ProtoNesting::Group,
    };

    proto::schema::NestedBlock {
        type_name: nested.type_name.clone(),
        block: Some(block_to_proto(&nested.block)),
        nesting: nesting as i32,
        min_items: nested.min_items,
        max_items: nested.max_items,
    }
}

fn string_kind_to_proto(kind: StringKind) -> i32 {
    match kind {
        StringKind::Plain => proto::StringKind::Plain as i32,
        StringKind::Markdown => proto::StringKind::Markdown as i32,
    }
}

fn attribute_path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| {
            let severity = match d.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            };
            proto::Diagnostic {
                severity: severity as i32,
                summary: d.summary,
                detail: d.detail,
                attribute: d.attribute.as_ref().map(attribute_path_to_proto),
            }
        })
        .collect()
}

fn deferred_to_proto(deferred: Deferred) -> proto::Deferred {
    use proto::deferred::Reason;

    let reason = match deferred.reason {
        DeferredReason::Unknown => Reason::Unknown,
        DeferredReason::ResourceConfigUnknown => Reason::ResourceConfigUnknown,
        DeferredReason::ProviderConfigUnknown => Reason::ProviderConfigUnknown,
        DeferredReason::AbsentPrereq => Reason::AbsentPrereq,
    };
    proto::Deferred {
        reason: reason as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeBuilder, AttributeType, BlockBuilder, SchemaBuilder};
    use crate::validator::OneOfValidator;

    fn block() -> Block {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("severity", AttributeType::String)
                    .optional()
                    .validator(OneOfValidator::new(["Low", "High"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .computed()
                    .build(),
            )
            .block(
                BlockBuilder::new("time_window")
                    .min_items(1)
                    .max_items(1)
                    .attribute(
                        AttributeBuilder::new("unit", AttributeType::String)
                            .required()
                            .build(),
                    )
                    .build(),
            )
            .build()
            .block
    }

    fn config(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
        Dynamic::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn window() -> Dynamic {
        Dynamic::List(vec![config(vec![("unit", Dynamic::String("Day".into()))])])
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let mut diags = Vec::new();
        let value = config(vec![
            ("name", Dynamic::String("slo".into())),
            ("severity", Dynamic::String("Low".into())),
            ("time_window", window()),
        ]);
        validate_block(&block(), &value, &AttributePath::root(), &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn reports_missing_unexpected_and_invalid_values() {
        let mut diags = Vec::new();
        let value = config(vec![
            ("severity", Dynamic::String("Critical".into())),
            ("status", Dynamic::String("x".into())),
            ("bogus", Dynamic::Bool(true)),
            ("time_window", Dynamic::List(vec![])),
        ]);
        validate_block(&block(), &value, &AttributePath::root(), &mut diags);

        let summaries: Vec<&str> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Missing required argument"));
        assert!(summaries.contains(&"Unsupported argument"));
        assert!(summaries.contains(&"Value for unconfigurable attribute"));
        assert!(summaries.contains(&"Insufficient blocks"));
        assert!(summaries.iter().any(|s| s.contains("must be one of")));
    }

    #[test]
    fn unknown_values_skip_validation() {
        let mut diags = Vec::new();
        let value = config(vec![
            ("name", Dynamic::Unknown),
            ("severity", Dynamic::Unknown),
            ("time_window", Dynamic::Unknown),
        ]);
        validate_block(&block(), &value, &AttributePath::root(), &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn nested_paths_are_converted() {
        let path = AttributePath::new("objective").index(0).attribute("value");
        let proto_path = attribute_path_to_proto(&path);
        assert_eq!(proto_path.steps.len(), 3);
    }
}
