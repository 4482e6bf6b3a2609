use crate::types::{AttributePath, Diagnostic, Dynamic};

#[derive(Debug, Clone)]
pub struct PlanModifyRequest {
    pub state: Dynamic,
    pub plan: Dynamic,
    pub config: Dynamic,
    pub path: AttributePath,
}

#[derive(Debug, Clone)]
pub struct PlanModifyResponse {
    pub plan_value: Dynamic,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifyResponse {
    fn unchanged(plan: Dynamic) -> Self {
        Self {
            plan_value: plan,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Plan modifiers run for updates after Terraform proposed a new state and
/// can rewrite the planned value or force replacement of the resource.
pub trait PlanModifier: Send + Sync {
    fn description(&self) -> String;

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse;
}

/// Marks the resource for replacement when a known value changes
pub struct RequiresReplace;

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "changing this value forces a new resource".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let requires_replace = request.state.is_known()
            && request.plan.is_known()
            && !request.state.is_null()
            && request.state != request.plan;

        PlanModifyResponse {
            plan_value: request.plan,
            requires_replace,
            diagnostics: Vec::new(),
        }
    }
}

/// Keeps the prior state value for a computed attribute instead of showing
/// it as "known after apply" on every update
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "uses the prior state value while the planned value is unknown".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        if request.plan.is_unknown() && !request.state.is_null() {
            return PlanModifyResponse::unchanged(request.state);
        }
        PlanModifyResponse::unchanged(request.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifyRequest {
        PlanModifyRequest {
            config: plan.clone(),
            state,
            plan,
            path: AttributePath::new("name"),
        }
    }

    #[test]
    fn requires_replace_triggers_on_changed_value() {
        let response = RequiresReplace.modify_plan(request(
            Dynamic::String("old".to_string()),
            Dynamic::String("new".to_string()),
        ));
        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_ignores_same_and_unknown_values() {
        let same = RequiresReplace.modify_plan(request(
            Dynamic::String("p".to_string()),
            Dynamic::String("p".to_string()),
        ));
        assert!(!same.requires_replace);

        let unknown =
            RequiresReplace.modify_plan(request(Dynamic::String("p".to_string()), Dynamic::Unknown));
        assert!(!unknown.requires_replace);

        let created = RequiresReplace.modify_plan(request(Dynamic::Null, Dynamic::String("p".into())));
        assert!(!created.requires_replace);
    }

    #[test]
    fn use_state_for_unknown_preserves_state() {
        let response = UseStateForUnknown.modify_plan(request(
            Dynamic::String("existing".to_string()),
            Dynamic::Unknown,
        ));
        assert_eq!(response.plan_value, Dynamic::String("existing".to_string()));
    }

    #[test]
    fn use_state_for_unknown_keeps_known_plan() {
        let response = UseStateForUnknown.modify_plan(request(
            Dynamic::String("existing".to_string()),
            Dynamic::String("new".to_string()),
        ));
        assert_eq!(response.plan_value, Dynamic::String("new".to_string()));
    }
}
