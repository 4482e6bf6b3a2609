//! Generated protobuf types for Terraform Plugin Protocol v6
//!
//! Messages are compiled from `proto/tfplugin6.proto` by tonic-build. Several
//! names overlap with framework types (`DynamicValue`, `Diagnostic`,
//! `Schema`, `AttributePath`), so always refer to these through `proto::`.
//!
//! RPC request/response pairs live in snake_case modules, e.g.
//! `proto::read_resource::Request`.

#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

pub use provider_server::{Provider as ProviderService, ProviderServer};
