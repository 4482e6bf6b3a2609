pub mod api;
pub mod data_sources;
pub mod manifest;
pub mod provider_data;
pub mod resources;

pub use provider_data::Nobl9ProviderData;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderMetadataRequest, ProviderMetadataResponse, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory, ValidateProviderConfigRequest,
    ValidateProviderConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic};

use api::{Client, ClientConfig};
use resources::common::Attrs;

/// Provider attribute and the environment variable it falls back to
struct Setting {
    name: &'static str,
    env: &'static str,
    sensitive: bool,
    description: &'static str,
}

const SETTINGS: &[Setting] = &[
    Setting {
        name: "client_id",
        env: "NOBL9_CLIENT_ID",
        sensitive: false,
        description: "Client ID of the Nobl9 access key.",
    },
    Setting {
        name: "client_secret",
        env: "NOBL9_CLIENT_SECRET",
        sensitive: true,
        description: "Client secret of the Nobl9 access key.",
    },
    Setting {
        name: "organization",
        env: "NOBL9_ORG",
        sensitive: false,
        description: "Nobl9 organization; read from the access token when unset.",
    },
    Setting {
        name: "project",
        env: "NOBL9_PROJECT",
        sensitive: false,
        description: "Default project for requests and imports.",
    },
    Setting {
        name: "ingest_url",
        env: "NOBL9_URL",
        sensitive: false,
        description: "Nobl9 API URL.",
    },
    Setting {
        name: "okta_org_url",
        env: "NOBL9_OKTA_URL",
        sensitive: false,
        description: "Authorization service URL.",
    },
    Setting {
        name: "okta_auth_server",
        env: "NOBL9_OKTA_AUTH",
        sensitive: false,
        description: "Authorization server ID.",
    },
];

#[derive(Default)]
pub struct Nobl9Provider;

impl Nobl9Provider {
    pub fn new() -> Self {
        Self
    }

    /// Attribute value, then environment variable; empty values count as unset
    fn setting(config: Attrs<'_>, name: &str) -> Option<String> {
        let setting = SETTINGS.iter().find(|s| s.name == name)?;
        config
            .non_empty(name)
            .or_else(|| std::env::var(setting.env).ok().filter(|v| !v.is_empty()))
    }

    fn client_config(config: Attrs<'_>) -> Result<ClientConfig, Vec<Diagnostic>> {
        let mut diagnostics = vec![];
        let mut required = |name: &str| {
            let value = Self::setting(config, name);
            if value.is_none() {
                let env = SETTINGS
                    .iter()
                    .find(|s| s.name == name)
                    .map(|s| s.env)
                    .unwrap_or_default();
                diagnostics.push(Diagnostic::error(
                    format!("{} is required", name),
                    format!("Set {} in the provider block or the {} environment variable", name, env),
                ).with_attribute(AttributePath::new(name)));
            }
            value.unwrap_or_default()
        };
        let client_id = required("client_id");
        let client_secret = required("client_secret");
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let defaults = ClientConfig::default();
        Ok(ClientConfig {
            url: Self::setting(config, "ingest_url").unwrap_or(defaults.url),
            client_id,
            client_secret,
            organization: Self::setting(config, "organization"),
            project: Self::setting(config, "project").unwrap_or(defaults.project),
            okta_org_url: Self::setting(config, "okta_org_url").unwrap_or(defaults.okta_org_url),
            okta_auth_server: Self::setting(config, "okta_auth_server")
                .unwrap_or(defaults.okta_auth_server),
            ..defaults
        })
    }
}

#[async_trait]
impl Provider for Nobl9Provider {
    fn type_name(&self) -> &str {
        "nobl9"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "nobl9".to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let attributes = SETTINGS.iter().map(|setting| {
            let builder = AttributeBuilder::new(setting.name, AttributeType::String)
                .description(&format!("{} Falls back to {}.", setting.description, setting.env))
                .optional();
            if setting.sensitive {
                builder.sensitive().build()
            } else {
                builder.build()
            }
        });

        ProviderSchemaResponse {
            schema: SchemaBuilder::new()
                .version(0)
                .description("Manages Nobl9 objects through the Nobl9 API.")
                .attributes(attributes)
                .build(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        // Values may come from the environment; they are checked in configure
        ValidateProviderConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let config = match Self::client_config(Attrs(&request.config.value)) {
            Ok(config) => config,
            Err(diagnostics) => {
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                }
            }
        };

        tracing::debug!(url = %config.url, project = %config.project, "configuring Nobl9 client");
        match Client::new(config) {
            Ok(client) => ConfigureProviderResponse {
                diagnostics: vec![],
                provider_data: Some(Arc::new(Nobl9ProviderData::new(client))),
            },
            Err(e) => {
                tracing::error!("failed to create API client: {}", e);
                ConfigureProviderResponse {
                    diagnostics: vec![Diagnostic::error(
                        "Failed to create API client",
                        e.to_string(),
                    )],
                    provider_data: None,
                }
            }
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        resources::resource_factories()
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        data_sources::data_source_factories()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tfplug::types::{ClientCapabilities, Dynamic, DynamicValue};

    const ENV: [&str; 7] = [
        "NOBL9_CLIENT_ID",
        "NOBL9_CLIENT_SECRET",
        "NOBL9_ORG",
        "NOBL9_PROJECT",
        "NOBL9_URL",
        "NOBL9_OKTA_URL",
        "NOBL9_OKTA_AUTH",
    ];

    fn clear_env() {
        for name in ENV {
            std::env::remove_var(name);
        }
    }

    fn request(pairs: Vec<(&str, &str)>) -> ConfigureProviderRequest {
        let config = resources::fields::object(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Dynamic::String(v.to_string())))
                .collect(),
        );
        ConfigureProviderRequest {
            terraform_version: "1.9.0".to_string(),
            config: DynamicValue::new(config),
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[tokio::test]
    #[serial]
    async fn configures_from_environment() {
        clear_env();
        std::env::set_var("NOBL9_CLIENT_ID", "id");
        std::env::set_var("NOBL9_CLIENT_SECRET", "secret");
        std::env::set_var("NOBL9_PROJECT", "payments");

        let mut provider = Nobl9Provider::new();
        let response = provider.configure(Context::new(), request(vec![])).await;
        assert!(response.diagnostics.is_empty());
        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<Nobl9ProviderData>().unwrap();
        assert_eq!(data.client.default_project(), "payments");

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn provider_block_wins_over_environment() {
        clear_env();
        std::env::set_var("NOBL9_CLIENT_ID", "env-id");
        std::env::set_var("NOBL9_CLIENT_SECRET", "env-secret");
        std::env::set_var("NOBL9_PROJECT", "from-env");

        let config = Nobl9Provider::client_config(Attrs(
            &request(vec![("project", "from-config"), ("organization", "acme")])
                .config
                .value,
        ))
        .unwrap();
        assert_eq!(config.project, "from-config");
        assert_eq!(config.organization.as_deref(), Some("acme"));
        assert_eq!(config.client_id, "env-id");
        assert_eq!(config.url, api::client::DEFAULT_URL);

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn credentials_are_required() {
        clear_env();

        let mut provider = Nobl9Provider::new();
        let response = provider
            .configure(Context::new(), request(vec![("client_id", "id")]))
            .await;
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].summary.contains("client_secret is required"));
        assert!(response.provider_data.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn project_defaults_to_default() {
        clear_env();
        let config = Nobl9Provider::client_config(Attrs(
            &request(vec![("client_id", "id"), ("client_secret", "secret")])
                .config
                .value,
        ))
        .unwrap();
        assert_eq!(config.project, "default");
        assert_eq!(config.organization, None);
    }

    #[tokio::test]
    async fn schema_marks_secret_sensitive() {
        let provider = Nobl9Provider::new();
        let response = provider.schema(Context::new(), ProviderSchemaRequest).await;
        let secret = response.schema.block.attribute("client_secret").unwrap();
        assert!(secret.sensitive);
        assert!(secret.optional);
        assert_eq!(response.schema.block.attributes.len(), SETTINGS.len());
    }

    #[test]
    fn serves_resources_and_data_sources() {
        let provider = Nobl9Provider::new();
        assert!(provider.resources().contains_key("nobl9_slo"));
        assert!(provider.data_sources().contains_key("nobl9_service"));
    }
}
