//! nobl9_alert_method_<type>

use serde_json::Value;
use tfplug::schema::{Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic};

use super::common::{
    annotations_attribute, description_attribute, display_name_attribute, marshal_metadata,
    name_attribute, project_attribute, unmarshal_metadata, Attrs, MetadataFields, StateBuilder,
};
use super::fields::{field_schema, marshal_fields, unmarshal_fields, Field, FieldKind};
use super::{spec_of, to_object, ObjectMapping};
use crate::manifest::{AlertMethodSpec, Kind, Object};

pub struct Method {
    pub name: &'static str,
    pub json: &'static str,
    pub title: &'static str,
    pub fields: &'static [Field],
}

const fn s(name: &'static str, json: &'static str) -> Field {
    Field::string(name, json)
}

const fn list(name: &'static str, json: &'static str) -> Field {
    Field::new(name, json, FieldKind::StringList)
}

const WEBHOOK_HEADER: &[Field] = &[
    s("name", "name").required(),
    s("value", "value").required(),
    Field::new("is_secret", "isSecret", FieldKind::Bool),
];

const PAGERDUTY_RESOLUTION: &[Field] = &[s("message", "message")];

const SECRET_URL: &[Field] = &[s("url", "url").secret().describe("Incoming webhook URL.")];

pub static METHODS: &[Method] = &[
    Method {
        name: "webhook",
        json: "webhook",
        title: "Webhook",
        fields: &[
            s("url", "url").secret(),
            s("template", "template").describe("Message template; conflicts with template_fields."),
            list("template_fields", "templateFields"),
            Field::new("header", "headers", FieldKind::BlockList(WEBHOOK_HEADER)),
        ],
    },
    Method {
        name: "pagerduty",
        json: "pagerduty",
        title: "PagerDuty",
        fields: &[
            s("integration_key", "integrationKey").secret(),
            Field::new(
                "send_resolution",
                "sendResolution",
                FieldKind::Block(PAGERDUTY_RESOLUTION),
            ),
        ],
    },
    Method {
        name: "slack",
        json: "slack",
        title: "Slack",
        fields: SECRET_URL,
    },
    Method {
        name: "discord",
        json: "discord",
        title: "Discord",
        fields: SECRET_URL,
    },
    Method {
        name: "opsgenie",
        json: "opsgenie",
        title: "Opsgenie",
        fields: &[s("auth", "auth").secret(), s("url", "url").required()],
    },
    Method {
        name: "servicenow",
        json: "servicenow",
        title: "ServiceNow",
        fields: &[
            s("username", "username").required(),
            s("password", "password").secret(),
            s("instance_name", "instanceName").required(),
        ],
    },
    Method {
        name: "jira",
        json: "jira",
        title: "Jira",
        fields: &[
            s("url", "url").required(),
            s("username", "username").required(),
            s("apitoken", "apiToken").secret(),
            s("project_key", "projectKey").required(),
        ],
    },
    Method {
        name: "msteams",
        json: "msteams",
        title: "Microsoft Teams",
        fields: SECRET_URL,
    },
    Method {
        name: "email",
        json: "email",
        title: "Email",
        fields: &[list("to", "to"), list("cc", "cc"), list("bcc", "bcc")],
    },
];

#[derive(Clone, Copy)]
pub struct AlertMethodMapping {
    method: &'static Method,
}

impl AlertMethodMapping {
    pub fn new(method: &'static Method) -> Self {
        Self { method }
    }
}

impl ObjectMapping for AlertMethodMapping {
    fn type_name(&self) -> String {
        format!("nobl9_alert_method_{}", self.method.name)
    }

    fn kind(&self) -> Kind {
        Kind::AlertMethod
    }

    fn schema(&self) -> Schema {
        let (attributes, blocks) = field_schema(self.method.fields);
        SchemaBuilder::new()
            .version(0)
            .description(&format!("{} alert method.", self.method.title))
            .attribute(name_attribute("Unique name of the alert method."))
            .attribute(project_attribute("Name of the project the alert method belongs to."))
            .attribute(display_name_attribute("User-friendly name of the alert method."))
            .attribute(description_attribute("Optional description of the alert method."))
            .attribute(annotations_attribute())
            .attributes(attributes)
            .blocks(blocks)
            .build()
    }

    fn marshal(&self, state: Attrs<'_>) -> Result<Object, Diagnostic> {
        let settings = marshal_fields(self.method.fields, state);
        let spec = AlertMethodSpec {
            description: state.string("description").unwrap_or_default(),
            method: [(self.method.json.to_string(), Value::Object(settings))]
                .into_iter()
                .collect(),
        };
        to_object(Kind::AlertMethod, marshal_metadata(state, true), &spec)
    }

    fn unmarshal(&self, object: &Object, prior: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let spec: AlertMethodSpec = spec_of(object)?;
        let settings = spec
            .method
            .get(self.method.json)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Diagnostic::error(
                    "Unexpected AlertMethod returned by the API",
                    format!("'{}' is not a {} alert method", object.name(), self.method.title),
                )
            })?;

        let fields = MetadataFields {
            labels: false,
            ..MetadataFields::ALL
        };
        let builder = unmarshal_metadata(StateBuilder::new(prior), &object.metadata, &fields)
            .string("description", Some(spec.description.clone()));
        Ok(unmarshal_fields(self.method.fields, settings, builder).build())
    }
}
