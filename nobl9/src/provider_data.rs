//! Data the provider hands to resources and data sources after configuration

use crate::api::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct Nobl9ProviderData {
    pub client: Arc<Client>,
}

impl Nobl9ProviderData {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}
