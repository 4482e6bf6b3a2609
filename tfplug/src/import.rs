//! Import helpers for simplifying resource import implementations

use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use std::collections::HashMap;

/// Sets the import ID to a single attribute in state
///
/// Example: ID "my-project" -> state.name = "my-project"
pub fn import_state_passthrough_id(
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    import_state_split_id(&[attr_path], '/', request, response)
}

/// Splits a composite import ID into several attributes
///
/// Example: ID "default/latency" with paths [project, name] ->
/// state.project = "default", state.name = "latency"
pub fn import_state_split_id(
    attr_paths: &[AttributePath],
    separator: char,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let parts: Vec<&str> = if attr_paths.len() == 1 {
        vec![request.id.as_str()]
    } else {
        request.id.splitn(attr_paths.len(), separator).collect()
    };

    if parts.len() != attr_paths.len() || parts.iter().any(|p| p.is_empty()) {
        let expected: Vec<String> = attr_paths.iter().map(|p| p.to_string()).collect();
        response.diagnostics.push(Diagnostic::error(
            "Invalid import ID",
            format!(
                "Expected an ID of the form '{}', got '{}'",
                expected.join(&separator.to_string()),
                request.id
            ),
        ));
        return;
    }

    let mut state = DynamicValue::new(Dynamic::Map(HashMap::new()));
    for (path, part) in attr_paths.iter().zip(parts) {
        if let Err(e) = state.set_string(path, part.to_string()) {
            response.diagnostics.push(
                Diagnostic::error(
                    format!("Failed to set import ID: {}", e),
                    format!("Could not set attribute '{}' to value '{}'", path, part),
                )
                .with_attribute(path.clone()),
            );
            return;
        }
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: Vec::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientCapabilities;

    fn request(id: &str) -> ImportResourceStateRequest {
        ImportResourceStateRequest {
            type_name: "nobl9_service".to_string(),
            id: id.to_string(),
            client_capabilities: ClientCapabilities::default(),
        }
    }

    fn response() -> ImportResourceStateResponse {
        ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
            deferred: None,
        }
    }

    #[test]
    fn passthrough_sets_single_attribute() {
        let mut resp = response();
        import_state_passthrough_id(AttributePath::new("name"), &request("web"), &mut resp);

        assert!(resp.diagnostics.is_empty());
        let state = &resp.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "web");
    }

    #[test]
    fn split_id_sets_each_part() {
        let mut resp = response();
        let paths = [AttributePath::new("project"), AttributePath::new("name")];
        import_state_split_id(&paths, '/', &request("default/web"), &mut resp);

        let state = &resp.imported_resources[0].state;
        assert_eq!(state.get_string(&paths[0]).unwrap(), "default");
        assert_eq!(state.get_string(&paths[1]).unwrap(), "web");
    }

    #[test]
    fn split_id_rejects_missing_parts() {
        let mut resp = response();
        let paths = [AttributePath::new("project"), AttributePath::new("name")];
        import_state_split_id(&paths, '/', &request("web"), &mut resp);

        assert!(resp.imported_resources.is_empty());
        assert_eq!(resp.diagnostics[0].summary, "Invalid import ID");
    }
}
