//! Terraform data sources
//!
//! Data sources look up one existing object by name and expose a few of its
//! fields. [`LookupDataSource`] does the lookup; each object kind supplies a
//! [`Lookup`] with its schema and the fields it exposes.

pub mod project;
pub mod service;

use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
    ValidateDataSourceConfigRequest, ValidateDataSourceConfigResponse,
};
use tfplug::provider::DataSourceFactory;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema};
use tfplug::types::{Diagnostic, Dynamic, DynamicValue};

use crate::manifest::{Kind, Labels, Object};
use crate::provider_data::Nobl9ProviderData;
use crate::resources::common::{Attrs, StateBuilder};

pub trait Lookup: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    fn kind(&self) -> Kind;

    fn schema(&self) -> Schema;

    /// Fields of the found object, written over the config
    fn state<'a>(&self, object: &Object, builder: StateBuilder<'a>) -> Result<StateBuilder<'a>, Diagnostic>;
}

/// Computed `labels` attribute: label key to values
pub fn labels_attribute() -> tfplug::schema::Attribute {
    AttributeBuilder::new(
        "labels",
        AttributeType::Map(Box::new(AttributeType::List(Box::new(AttributeType::String)))),
    )
    .description("Labels of the object, keyed by label key.")
    .computed()
    .build()
}

pub fn labels_value(labels: &Labels) -> Dynamic {
    Dynamic::Map(
        labels
            .iter()
            .map(|(key, values)| {
                (
                    key.clone(),
                    Dynamic::List(values.iter().cloned().map(Dynamic::String).collect()),
                )
            })
            .collect(),
    )
}

pub struct LookupDataSource<L: Lookup> {
    lookup: L,
    provider_data: Option<Nobl9ProviderData>,
}

impl<L: Lookup> LookupDataSource<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            provider_data: None,
        }
    }

    async fn find(&self, config: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let client = self
            .provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(|| {
                Diagnostic::error(
                    "Provider not configured",
                    "Provider data was not properly configured",
                )
            })?;

        let kind = self.lookup.kind();
        let attrs = Attrs(config);
        let name = attrs.string("name").ok_or_else(|| {
            Diagnostic::error("Missing name", format!("A {} name is required", kind))
        })?;
        let project = if kind.is_project_scoped() {
            attrs.string("project")
        } else {
            None
        };

        tracing::debug!(kind = %kind, name = %name, "looking up object");
        let objects = client
            .get(kind, project.as_deref(), &[name.as_str()])
            .await
            .map_err(|e| Diagnostic::error(format!("Failed to read {}", kind), e.to_string()))?;

        let object = objects.into_iter().find(|o| o.name() == name).ok_or_else(|| {
            let location = project
                .as_deref()
                .map(|p| format!(" in project '{}'", p))
                .unwrap_or_default();
            Diagnostic::error(
                format!("{} not found", kind),
                format!("No {} named '{}'{}", kind, name, location),
            )
        })?;

        let mut builder = StateBuilder::new(config)
            .set_raw("id", Dynamic::String(name.clone()))
            .string("name", Some(name));
        if let Some(project) = project {
            builder = builder.string("project", Some(project));
        }
        Ok(self.lookup.state(&object, builder)?.build())
    }
}

#[async_trait]
impl<L: Lookup> DataSource for LookupDataSource<L> {
    fn type_name(&self) -> &str {
        self.lookup.type_name()
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: self.lookup.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let mut schema = self.lookup.schema();
        schema.block.attributes.push(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Name of the found object.")
                .computed()
                .build(),
        );
        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        ValidateDataSourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        match self.find(&request.config.value).await {
            Ok(state) => ReadDataSourceResponse {
                state: DynamicValue::new(state),
                diagnostics: vec![],
                deferred: None,
            },
            Err(diagnostic) => ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![diagnostic],
                deferred: None,
            },
        }
    }
}

#[async_trait]
impl<L: Lookup> DataSourceWithConfigure for LookupDataSource<L> {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];

        match request.provider_data {
            Some(data) => match data.downcast_ref::<Nobl9ProviderData>() {
                Some(provider_data) => self.provider_data = Some(provider_data.clone()),
                None => {
                    tracing::error!("provider data is not Nobl9ProviderData");
                    diagnostics.push(Diagnostic::error(
                        "Invalid provider data",
                        "Failed to downcast provider data to Nobl9ProviderData",
                    ));
                }
            },
            None => diagnostics.push(Diagnostic::error(
                "No provider data",
                "No provider data was provided to the data source",
            )),
        }

        ConfigureDataSourceResponse { diagnostics }
    }
}

fn factory<L: Lookup + Clone>(lookup: L) -> (String, DataSourceFactory) {
    let type_name = lookup.type_name().to_string();
    let factory: DataSourceFactory = Box::new(move || Box::new(LookupDataSource::new(lookup.clone())));
    (type_name, factory)
}

/// Every data source the provider serves, keyed by type name
pub fn data_source_factories() -> HashMap<String, DataSourceFactory> {
    [
        factory(project::ProjectLookup),
        factory(service::ServiceLookup),
    ]
    .into_iter()
    .collect()
}
