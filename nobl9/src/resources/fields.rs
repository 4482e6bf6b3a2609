//! Static field tables for integration-specific settings
//!
//! A [`Field`] names one setting on both sides: the Terraform attribute or
//! block name and the JSON key in the manifest. Tables of fields generate
//! schema fragments and convert between Terraform values and JSON maps.

use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tfplug::schema::{Attribute, AttributeBuilder, AttributeType, BlockBuilder, NestedBlock};
use tfplug::Dynamic;

use super::common::{label_block, Attrs, StateBuilder};

pub static NULL_VALUE: Dynamic = Dynamic::Null;

/// The value behind an optional block, null when the block is absent
pub fn or_null<'a>(attrs: Option<Attrs<'a>>) -> &'a Dynamic {
    attrs.map(|a| a.0).unwrap_or(&NULL_VALUE)
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    Int,
    Number,
    Bool,
    StringList,
    /// Nested block holding at most one item, a JSON object
    Block(&'static [Field]),
    /// Repeated nested block, a JSON array of objects
    BlockList(&'static [Field]),
    /// `label { key, values }` blocks, a JSON object of key to values
    Labels,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub json: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub secret: bool,
    pub description: &'static str,
}

impl Field {
    pub const fn new(name: &'static str, json: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            json,
            kind,
            required: false,
            secret: false,
            description: "",
        }
    }

    pub const fn string(name: &'static str, json: &'static str) -> Self {
        Self::new(name, json, FieldKind::String)
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    /// Sensitive; the API does not return it, so state keeps the configured value
    pub const fn secret(self) -> Self {
        Self {
            secret: true,
            ..self
        }
    }

    pub const fn describe(self, description: &'static str) -> Self {
        Self {
            description,
            ..self
        }
    }

    fn attribute_type(&self) -> Option<AttributeType> {
        match self.kind {
            FieldKind::String => Some(AttributeType::String),
            FieldKind::Int | FieldKind::Number => Some(AttributeType::Number),
            FieldKind::Bool => Some(AttributeType::Bool),
            FieldKind::StringList => Some(AttributeType::List(Box::new(AttributeType::String))),
            FieldKind::Block(_) | FieldKind::BlockList(_) | FieldKind::Labels => None,
        }
    }
}

/// Attributes and nested blocks for a field table
pub fn field_schema(fields: &[Field]) -> (Vec<Attribute>, Vec<NestedBlock>) {
    let mut attributes = Vec::new();
    let mut blocks = Vec::new();

    for field in fields {
        if let Some(attr_type) = field.attribute_type() {
            let mut builder = AttributeBuilder::new(field.name, attr_type).description(field.description);
            builder = if field.required {
                builder.required()
            } else {
                builder.optional()
            };
            if field.secret {
                builder = builder.sensitive();
            }
            attributes.push(builder.build());
            continue;
        }

        match field.kind {
            FieldKind::Block(nested) => {
                let mut builder = with_fields(BlockBuilder::new(field.name), nested)
                    .description(field.description)
                    .max_items(1);
                if field.required {
                    builder = builder.min_items(1);
                }
                blocks.push(builder.build());
            }
            FieldKind::BlockList(nested) => {
                let mut builder =
                    with_fields(BlockBuilder::new(field.name), nested).description(field.description);
                if field.required {
                    builder = builder.min_items(1);
                }
                blocks.push(builder.build());
            }
            FieldKind::Labels => blocks.push(label_block()),
            _ => {}
        }
    }

    (attributes, blocks)
}

/// Adds a field table to a nested block
pub fn with_fields(builder: BlockBuilder, fields: &[Field]) -> BlockBuilder {
    let (attributes, blocks) = field_schema(fields);
    blocks
        .into_iter()
        .fold(builder.attributes(attributes), |b, nested| b.block(nested))
}

/// JSON object from the Terraform values of a field table; absent values are skipped
pub fn marshal_fields(fields: &[Field], attrs: Attrs<'_>) -> Map<String, Value> {
    let mut out = Map::new();

    for field in fields {
        let value = match field.kind {
            FieldKind::String => attrs.string(field.name).map(Value::String),
            FieldKind::Int => attrs.int(field.name).map(|n| Value::Number(n.into())),
            FieldKind::Number => attrs
                .number(field.name)
                .and_then(Number::from_f64)
                .map(Value::Number),
            FieldKind::Bool => attrs.bool(field.name).map(Value::Bool),
            FieldKind::StringList => {
                let items = attrs.strings(field.name);
                (!items.is_empty())
                    .then(|| Value::Array(items.into_iter().map(Value::String).collect()))
            }
            FieldKind::Block(nested) => attrs
                .block(field.name)
                .map(|block| Value::Object(marshal_fields(nested, block))),
            FieldKind::BlockList(nested) => {
                let items = attrs.blocks(field.name);
                (!items.is_empty()).then(|| {
                    Value::Array(
                        items
                            .into_iter()
                            .map(|block| Value::Object(marshal_fields(nested, block)))
                            .collect(),
                    )
                })
            }
            FieldKind::Labels => {
                let labels = super::common::marshal_labels(attrs);
                (!labels.is_empty()).then(|| serde_json::json!(labels))
            }
        };

        if let Some(value) = value {
            out.insert(field.json.to_string(), value);
        }
    }

    out
}

/// Writes a JSON object back into Terraform values, keeping secrets from the prior value
pub fn unmarshal_fields<'a>(
    fields: &[Field],
    json: &Map<String, Value>,
    mut builder: StateBuilder<'a>,
) -> StateBuilder<'a> {
    let prior = builder.prior();

    for field in fields {
        if field.secret {
            builder = builder.secret(field.name);
            continue;
        }

        let value = json.get(field.json);
        builder = match field.kind {
            FieldKind::String => builder.string(field.name, value.and_then(json_string)),
            FieldKind::Int | FieldKind::Number => {
                builder.number(field.name, value.and_then(Value::as_f64))
            }
            FieldKind::Bool => builder.bool(field.name, value.and_then(Value::as_bool)),
            FieldKind::StringList => builder.strings(
                field.name,
                value
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(json_string).collect::<Vec<_>>())
                    .unwrap_or_default(),
            ),
            FieldKind::Block(nested) => {
                let item = value.and_then(Value::as_object).map(|object| {
                    unmarshal_fields(nested, object, StateBuilder::new(or_null(prior.block(field.name))))
                        .build()
                });
                builder.block(field.name, item)
            }
            FieldKind::BlockList(nested) => {
                let prior_items = prior.blocks(field.name);
                let items = value
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .enumerate()
                            .filter_map(|(i, item)| {
                                let object = item.as_object()?;
                                let prior_item = or_null(prior_items.get(i).copied());
                                Some(
                                    unmarshal_fields(nested, object, StateBuilder::new(prior_item))
                                        .build(),
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                builder.blocks(field.name, items)
            }
            FieldKind::Labels => {
                let labels: crate::manifest::Labels = value
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                builder.blocks(field.name, super::common::unmarshal_labels(&labels, prior))
            }
        };
    }

    builder
}

/// Strings pass through; numbers and booleans the API echoes back are stringified
fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Builds a Terraform object value from name/value pairs
pub fn object(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
    Dynamic::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<HashMap<_, _>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DIMENSION: &[Field] = &[
        Field::string("name", "name").required(),
        Field::string("value", "value").required(),
    ];

    const FIELDS: &[Field] = &[
        Field::string("url", "url").required(),
        Field::string("api_key", "apiKey").secret(),
        Field::new("account_id", "accountId", FieldKind::Int),
        Field::new("templates", "templateFields", FieldKind::StringList),
        Field::new("workspace", "workspace", FieldKind::Block(DIMENSION)),
        Field::new("dimensions", "dimensions", FieldKind::BlockList(DIMENSION)),
    ];

    #[test]
    fn schema_splits_attributes_and_blocks() {
        let (attributes, blocks) = field_schema(FIELDS);
        let names: Vec<&str> = attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["url", "api_key", "account_id", "templates"]);
        assert!(attributes[0].required);
        assert!(attributes[1].sensitive);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].max_items, 1);
    }

    #[test]
    fn marshal_uses_json_names() {
        let state = object(vec![
            ("url", Dynamic::String("https://x".into())),
            ("api_key", Dynamic::String("k".into())),
            ("account_id", Dynamic::Number(42.0)),
            ("templates", Dynamic::List(vec![])),
            ("workspace", Dynamic::List(vec![])),
            (
                "dimensions",
                Dynamic::List(vec![object(vec![
                    ("name", Dynamic::String("env".into())),
                    ("value", Dynamic::String("prod".into())),
                ])]),
            ),
        ]);

        let json = Value::Object(marshal_fields(FIELDS, Attrs(&state)));
        assert_eq!(
            json,
            json!({
                "url": "https://x",
                "apiKey": "k",
                "accountId": 42,
                "dimensions": [{"name": "env", "value": "prod"}]
            })
        );
    }

    #[test]
    fn unmarshal_keeps_secret_and_normalizes_absent_values() {
        let prior = object(vec![
            ("api_key", Dynamic::String("k".into())),
            ("templates", Dynamic::Null),
        ]);
        let json = json!({"url": "https://x", "apiKey": "[hidden]", "accountId": 7});

        let state = unmarshal_fields(
            FIELDS,
            json.as_object().unwrap(),
            StateBuilder::new(&prior),
        )
        .build();

        assert_eq!(state.get("url"), Some(&Dynamic::String("https://x".into())));
        assert_eq!(state.get("api_key"), Some(&Dynamic::String("k".into())));
        assert_eq!(state.get("account_id"), Some(&Dynamic::Number(7.0)));
        assert_eq!(state.get("templates"), Some(&Dynamic::Null));
        assert_eq!(state.get("workspace"), Some(&Dynamic::List(vec![])));
    }
}
