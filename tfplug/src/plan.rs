//! Framework-side planning, run before a resource's own modify_plan.

use crate::plan_modifier::PlanModifyRequest;
use crate::schema::{Block, NestingMode, Schema};
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub struct PlannedChange {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Computes the framework's plan for a change.
///
/// Destroy plans (null proposed state) pass through. Computed attributes left
/// null by Terraform become unknown on create, and on update when anything
/// changed. Attribute plan modifiers then run at every nesting level, with
/// list items matched to the prior item at the same index.
pub fn plan_resource_change(
    schema: &Schema,
    prior_state: &DynamicValue,
    proposed_new_state: &DynamicValue,
    config: &DynamicValue,
) -> PlannedChange {
    let mut planned = PlannedChange {
        planned_state: proposed_new_state.clone(),
        requires_replace: Vec::new(),
        diagnostics: Vec::new(),
    };

    if proposed_new_state.is_null() {
        return planned;
    }

    if prior_state.is_null() {
        planned.planned_state.value = mark_computed_unknown(&schema.block, &proposed_new_state.value);
        return planned;
    }

    if proposed_new_state.value != prior_state.value {
        planned.planned_state.value = mark_computed_unknown(&schema.block, &proposed_new_state.value);
    }

    let mut plan = std::mem::replace(&mut planned.planned_state.value, Dynamic::Null);
    modify_block(
        &schema.block,
        &prior_state.value,
        &config.value,
        &mut plan,
        &AttributePath::root(),
        &mut planned,
    );
    planned.planned_state.value = plan;

    planned
}

fn modify_block(
    block: &Block,
    state: &Dynamic,
    config: &Dynamic,
    plan: &mut Dynamic,
    path: &AttributePath,
    planned: &mut PlannedChange,
) {
    let Dynamic::Map(entries) = plan else {
        return;
    };
    let field = |value: &Dynamic, name: &str| value.get(name).cloned().unwrap_or(Dynamic::Null);

    for attr in block.attributes.iter().filter(|a| !a.plan_modifiers.is_empty()) {
        let attr_path = path.clone().attribute(&attr.name);
        let state_value = field(state, &attr.name);
        let config_value = field(config, &attr.name);
        let mut plan_value = entries.get(&attr.name).cloned().unwrap_or(Dynamic::Null);

        for modifier in &attr.plan_modifiers {
            let response = modifier.modify_plan(PlanModifyRequest {
                state: state_value.clone(),
                plan: plan_value,
                config: config_value.clone(),
                path: attr_path.clone(),
            });
            plan_value = response.plan_value;
            planned.diagnostics.extend(response.diagnostics);
            if response.requires_replace && !planned.requires_replace.contains(&attr_path) {
                planned.requires_replace.push(attr_path.clone());
            }
        }

        entries.insert(attr.name.clone(), plan_value);
    }

    for nested in &block.block_types {
        let Some(current) = entries.get_mut(&nested.type_name) else {
            continue;
        };
        let block_path = path.clone().attribute(&nested.type_name);
        let state_value = field(state, &nested.type_name);
        let config_value = field(config, &nested.type_name);

        match (current, nested.nesting) {
            (Dynamic::List(items), NestingMode::List) => {
                for (i, item) in items.iter_mut().enumerate() {
                    let at = |value: &Dynamic| {
                        value
                            .as_list()
                            .and_then(|list| list.get(i))
                            .cloned()
                            .unwrap_or(Dynamic::Null)
                    };
                    modify_block(
                        &nested.block,
                        &at(&state_value),
                        &at(&config_value),
                        item,
                        &block_path.clone().index(i as i64),
                        planned,
                    );
                }
            }
            // Set elements have no stable position to match against prior items
            (Dynamic::List(items), NestingMode::Set) => {
                for item in items.iter_mut() {
                    modify_block(
                        &nested.block,
                        &Dynamic::Null,
                        &Dynamic::Null,
                        item,
                        &block_path,
                        planned,
                    );
                }
            }
            (Dynamic::Map(items), NestingMode::Map) => {
                for (key, item) in items.iter_mut() {
                    modify_block(
                        &nested.block,
                        &field(&state_value, key),
                        &field(&config_value, key),
                        item,
                        &block_path.clone().key(key),
                        planned,
                    );
                }
            }
            (item @ Dynamic::Map(_), NestingMode::Single | NestingMode::Group) => {
                modify_block(&nested.block, &state_value, &config_value, item, &block_path, planned);
            }
            _ => {}
        }
    }
}

/// Replaces null computed attributes with unknown, descending into nested blocks
pub fn mark_computed_unknown(block: &Block, value: &Dynamic) -> Dynamic {
    let Dynamic::Map(entries) = value else {
        return value.clone();
    };

    let mut marked = entries.clone();
    for attr in block.attributes.iter().filter(|a| a.computed) {
        let is_null = marked.get(&attr.name).map(Dynamic::is_null).unwrap_or(true);
        if is_null {
            marked.insert(attr.name.clone(), Dynamic::Unknown);
        }
    }

    for nested in &block.block_types {
        let Some(current) = marked.get(&nested.type_name) else {
            continue;
        };
        let updated = match (current, nested.nesting) {
            (Dynamic::List(items), NestingMode::List | NestingMode::Set) => Dynamic::List(
                items
                    .iter()
                    .map(|item| mark_computed_unknown(&nested.block, item))
                    .collect(),
            ),
            (Dynamic::Map(items), NestingMode::Map) => Dynamic::Map(
                items
                    .iter()
                    .map(|(k, item)| (k.clone(), mark_computed_unknown(&nested.block, item)))
                    .collect(),
            ),
            (v @ Dynamic::Map(_), NestingMode::Single | NestingMode::Group) => {
                mark_computed_unknown(&nested.block, v)
            }
            (other, _) => other.clone(),
        };
        marked.insert(nested.type_name.clone(), updated);
    }

    Dynamic::Map(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_modifier::{RequiresReplace, UseStateForUnknown};
    use crate::schema::{AttributeBuilder, AttributeType, BlockBuilder, SchemaBuilder};
    use std::collections::HashMap;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .block(
                BlockBuilder::new("objective")
                    .attribute(
                        AttributeBuilder::new("name", AttributeType::String)
                            .optional()
                            .computed()
                            .plan_modifier(UseStateForUnknown)
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    fn object(pairs: Vec<(&str, Dynamic)>) -> DynamicValue {
        DynamicValue::new(Dynamic::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<HashMap<_, _>>(),
        ))
    }

    #[test]
    fn create_marks_computed_attributes_unknown() {
        let proposed = object(vec![
            ("name", Dynamic::String("svc".into())),
            ("status", Dynamic::Null),
            (
                "objective",
                Dynamic::List(vec![Dynamic::Map(HashMap::from([(
                    "name".to_string(),
                    Dynamic::Null,
                )]))]),
            ),
        ]);

        let planned = plan_resource_change(&schema(), &DynamicValue::null(), &proposed, &proposed);

        let state = planned.planned_state.value;
        assert!(state.get("status").unwrap().is_unknown());
        let objective = &state.get("objective").unwrap().as_list().unwrap()[0];
        assert!(objective.get("name").unwrap().is_unknown());
    }

    #[test]
    fn update_runs_plan_modifiers() {
        let prior = object(vec![
            ("name", Dynamic::String("old".into())),
            ("status", Dynamic::String("ok".into())),
        ]);
        let proposed = object(vec![
            ("name", Dynamic::String("new".into())),
            ("status", Dynamic::Unknown),
        ]);

        let planned = plan_resource_change(&schema(), &prior, &proposed, &proposed);

        assert_eq!(planned.requires_replace, vec![AttributePath::new("name")]);
        assert_eq!(
            planned
                .planned_state
                .get_string(&AttributePath::new("status"))
                .unwrap(),
            "ok"
        );
    }

    fn objectives(names: Vec<Dynamic>) -> Dynamic {
        Dynamic::List(
            names
                .into_iter()
                .map(|name| Dynamic::Map(HashMap::from([("name".to_string(), name)])))
                .collect(),
        )
    }

    #[test]
    fn update_marks_added_nested_computed_attributes_unknown() {
        let prior = object(vec![
            ("name", Dynamic::String("svc".into())),
            ("status", Dynamic::String("ok".into())),
            ("objective", objectives(vec![Dynamic::String("objective-1".into())])),
        ]);
        let proposed = object(vec![
            ("name", Dynamic::String("svc".into())),
            ("status", Dynamic::String("ok".into())),
            (
                "objective",
                objectives(vec![Dynamic::String("objective-1".into()), Dynamic::Null]),
            ),
        ]);

        let planned = plan_resource_change(&schema(), &prior, &proposed, &proposed);

        assert!(planned.requires_replace.is_empty());
        let state = planned.planned_state.value;
        assert_eq!(state.get("status"), Some(&Dynamic::String("ok".into())));
        let items = state.get("objective").unwrap().as_list().unwrap();
        assert_eq!(items[0].get("name"), Some(&Dynamic::String("objective-1".into())));
        assert!(items[1].get("name").unwrap().is_unknown());
    }

    #[test]
    fn update_runs_nested_plan_modifiers_against_matching_prior_item() {
        let prior = object(vec![
            ("name", Dynamic::String("svc".into())),
            ("objective", objectives(vec![Dynamic::String("objective-1".into())])),
        ]);
        let proposed = object(vec![
            ("name", Dynamic::String("svc".into())),
            ("objective", objectives(vec![Dynamic::Unknown])),
        ]);

        let planned = plan_resource_change(&schema(), &prior, &proposed, &proposed);

        let state = planned.planned_state.value;
        let items = state.get("objective").unwrap().as_list().unwrap();
        assert_eq!(items[0].get("name"), Some(&Dynamic::String("objective-1".into())));
    }

    #[test]
    fn unchanged_update_keeps_nulls() {
        let prior = object(vec![
            ("name", Dynamic::String("svc".into())),
            ("status", Dynamic::Null),
        ]);

        let planned = plan_resource_change(&schema(), &prior, &prior, &prior);

        assert_eq!(planned.planned_state.value, prior.value);
    }

    #[test]
    fn destroy_passes_through() {
        let prior = object(vec![("name", Dynamic::String("old".into()))]);
        let planned =
            plan_resource_change(&schema(), &prior, &DynamicValue::null(), &DynamicValue::null());
        assert!(planned.planned_state.is_null());
        assert!(planned.requires_replace.is_empty());
    }
}
