//! Drives the gRPC service the way Terraform does, against an in-memory provider

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataSourceConfigRequest,
    ValidateDataSourceConfigResponse,
};
use tfplug::grpc::GrpcProviderServer;
use tfplug::proto;
use tfplug::proto::provider_server::Provider as _;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, ProviderMetadataRequest,
    ProviderMetadataResponse, ProviderSchemaRequest, ProviderSchemaResponse,
    ValidateProviderConfigRequest, ValidateProviderConfigResponse,
};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::*;
use tonic::Request;

type Store = Arc<Mutex<HashMap<String, String>>>;

struct MemoryProvider {
    store: Store,
}

#[async_trait]
impl Provider for MemoryProvider {
    fn type_name(&self) -> &str {
        "memory"
    }

    async fn metadata(&self, _ctx: Context, _req: ProviderMetadataRequest) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "memory".to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _req: ProviderSchemaRequest) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("prefix", AttributeType::String)
                        .optional()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _req: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        ValidateProviderConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        _req: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(Arc::new(self.store.clone())),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(
            "memory_item".to_string(),
            Box::new(|| Box::new(ItemResource { store: None })),
        );
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert(
            "memory_item".to_string(),
            Box::new(|| Box::new(ItemDataSource { store: None })),
        );
        data_sources
    }
}

fn item_schema() -> Schema {
    SchemaBuilder::new()
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .required()
                .plan_modifier(tfplug::plan_modifier::RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("value", AttributeType::String)
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .computed()
                .build(),
        )
        .build()
}

fn store_from(data: Option<Arc<dyn std::any::Any + Send + Sync>>) -> Option<Store> {
    data.and_then(|d| d.downcast_ref::<Store>().cloned())
}

struct ItemResource {
    store: Option<Store>,
}

impl ItemResource {
    fn state(name: &str, value: Option<&String>) -> DynamicValue {
        let mut state = DynamicValue::null();
        state
            .set_string(&AttributePath::new("name"), name.to_string())
            .unwrap();
        state
            .set_string(&AttributePath::new("id"), format!("item-{}", name))
            .unwrap();
        if let Some(value) = value {
            state
                .set_string(&AttributePath::new("value"), value.clone())
                .unwrap();
        }
        state
    }

    fn write(&self, planned: &DynamicValue) -> DynamicValue {
        let name = planned.get_string(&AttributePath::new("name")).unwrap();
        let value = planned.get_string(&AttributePath::new("value")).unwrap_or_default();
        self.store
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .insert(name.clone(), value.clone());
        Self::state(&name, Some(&value))
    }
}

#[async_trait]
impl Resource for ItemResource {
    fn type_name(&self) -> &str {
        "memory_item"
    }

    async fn metadata(&self, _ctx: Context, _req: ResourceMetadataRequest) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _req: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: item_schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _req: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, req: CreateResourceRequest) -> CreateResourceResponse {
        CreateResourceResponse {
            new_state: self.write(&req.planned_state),
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, req: ReadResourceRequest) -> ReadResourceResponse {
        let name = req.current_state.get_string(&AttributePath::new("name")).unwrap();
        let store = self.store.as_ref().unwrap().lock().unwrap();
        ReadResourceResponse {
            new_state: store.get(&name).map(|v| Self::state(&name, Some(v))),
            diagnostics: vec![],
            private: vec![],
            deferred: None,
        }
    }

    async fn update(&self, _ctx: Context, req: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: self.write(&req.planned_state),
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, req: DeleteResourceRequest) -> DeleteResourceResponse {
        let name = req.prior_state.get_string(&AttributePath::new("name")).unwrap();
        self.store.as_ref().unwrap().lock().unwrap().remove(&name);
        DeleteResourceResponse {
            diagnostics: vec![],
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for ItemResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        req: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        self.store = store_from(req.provider_data);
        let diagnostics = if self.store.is_none() {
            vec![Diagnostic::error("Provider not configured", "no store")]
        } else {
            vec![]
        };
        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithImportState for ItemResource {
    async fn import_state(
        &self,
        _ctx: Context,
        req: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        };
        import_state_passthrough_id(AttributePath::new("name"), &req, &mut response);
        response
    }
}

struct ItemDataSource {
    store: Option<Store>,
}

#[async_trait]
impl DataSource for ItemDataSource {
    fn type_name(&self) -> &str {
        "memory_item"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _req: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _req: DataSourceSchemaRequest) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: item_schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _req: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        ValidateDataSourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, req: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let name = req.config.get_string(&AttributePath::new("name")).unwrap();
        let store = self.store.as_ref().unwrap().lock().unwrap();
        ReadDataSourceResponse {
            state: ItemResource::state(&name, store.get(&name)),
            diagnostics: vec![],
            deferred: None,
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for ItemDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        req: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        self.store = store_from(req.provider_data);
        ConfigureDataSourceResponse {
            diagnostics: vec![],
        }
    }
}

fn encode(pairs: Vec<(&str, Dynamic)>) -> Option<proto::DynamicValue> {
    let value = DynamicValue::new(Dynamic::Map(
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    ));
    Some(proto::DynamicValue {
        msgpack: value.encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn decode(value: Option<proto::DynamicValue>) -> DynamicValue {
    DynamicValue::decode_msgpack(&value.unwrap().msgpack).unwrap()
}

fn null_value() -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: DynamicValue::null().encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn s(v: &str) -> Dynamic {
    Dynamic::String(v.to_string())
}

async fn configured_server() -> (GrpcProviderServer<MemoryProvider>, Store) {
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    let server = GrpcProviderServer::new(MemoryProvider {
        store: store.clone(),
    });
    let response = server
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: encode(vec![("prefix", Dynamic::Null)]),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.diagnostics.is_empty());
    (server, store)
}

#[tokio::test]
async fn metadata_and_schema_list_registered_types() {
    let (server, _) = configured_server().await;

    let metadata = server
        .get_metadata(Request::new(proto::get_metadata::Request {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(metadata.resources[0].type_name, "memory_item");
    assert_eq!(metadata.data_sources[0].type_name, "memory_item");

    let schema = server
        .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
        .await
        .unwrap()
        .into_inner();
    let block = schema.resource_schemas["memory_item"].block.as_ref().unwrap();
    let id = block.attributes.iter().find(|a| a.name == "id").unwrap();
    assert!(id.computed);
    assert_eq!(id.r#type, b"\"string\"".to_vec());
}

#[tokio::test]
async fn validate_reports_missing_required_argument() {
    let (server, _) = configured_server().await;

    let response = server
        .validate_resource_config(Request::new(proto::validate_resource_config::Request {
            type_name: "memory_item".to_string(),
            config: encode(vec![("value", s("x")), ("id", Dynamic::Null)]),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].summary, "Missing required argument");
}

#[tokio::test]
async fn create_read_update_delete_lifecycle() {
    let (server, store) = configured_server().await;
    let config = vec![("name", s("a")), ("value", s("1")), ("id", Dynamic::Null)];

    let plan = server
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "memory_item".to_string(),
            prior_state: null_value(),
            proposed_new_state: encode(config.clone()),
            config: encode(config.clone()),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    let planned = decode(plan.planned_state.clone());
    assert!(planned.value.get("id").unwrap().is_unknown());

    let applied = server
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "memory_item".to_string(),
            prior_state: null_value(),
            planned_state: plan.planned_state,
            config: encode(config.clone()),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(applied.diagnostics.is_empty());
    let state = decode(applied.new_state.clone());
    assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "item-a");
    assert_eq!(store.lock().unwrap().get("a"), Some(&"1".to_string()));

    // Renaming forces replacement
    let renamed = vec![("name", s("b")), ("value", s("1")), ("id", s("item-a"))];
    let replan = server
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "memory_item".to_string(),
            prior_state: applied.new_state.clone(),
            proposed_new_state: encode(renamed.clone()),
            config: encode(renamed),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(replan.requires_replace.len(), 1);

    let deleted = server
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "memory_item".to_string(),
            prior_state: applied.new_state.clone(),
            planned_state: null_value(),
            config: null_value(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(decode(deleted.new_state).is_null());
    assert!(store.lock().unwrap().is_empty());

    // Reading a deleted item drops it from state
    let read = server
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "memory_item".to_string(),
            current_state: applied.new_state,
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(decode(read.new_state).is_null());
}

#[tokio::test]
async fn import_fills_state_shape() {
    let (server, _) = configured_server().await;

    let response = server
        .import_resource_state(Request::new(proto::import_resource_state::Request {
            type_name: "memory_item".to_string(),
            id: "imported".to_string(),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    let state = decode(response.imported_resources[0].state.clone());
    assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "imported");
    assert_eq!(state.value.get("value"), Some(&Dynamic::Null));
    assert_eq!(state.value.get("id"), Some(&Dynamic::Null));
}

#[tokio::test]
async fn data_source_reads_through_provider_data() {
    let (server, store) = configured_server().await;
    store.lock().unwrap().insert("x".to_string(), "42".to_string());

    let response = server
        .read_data_source(Request::new(proto::read_data_source::Request {
            type_name: "memory_item".to_string(),
            config: encode(vec![("name", s("x"))]),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    let state = decode(response.state);
    assert_eq!(state.get_string(&AttributePath::new("value")).unwrap(), "42");
}

#[tokio::test]
async fn unknown_resource_type_is_not_found() {
    let (server, _) = configured_server().await;

    let status = server
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "memory_missing".to_string(),
            current_state: null_value(),
            ..Default::default()
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn upgrade_state_conforms_stored_json() {
    let (server, _) = configured_server().await;

    let response = server
        .upgrade_resource_state(Request::new(proto::upgrade_resource_state::Request {
            type_name: "memory_item".to_string(),
            version: 0,
            raw_state: Some(proto::RawState {
                json: br#"{"name":"a","legacy":true}"#.to_vec(),
                flatmap: HashMap::new(),
            }),
        }))
        .await
        .unwrap()
        .into_inner();

    let state = decode(response.upgraded_state);
    assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "a");
    assert!(state.value.get("legacy").is_none());
}
