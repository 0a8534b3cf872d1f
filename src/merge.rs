use crate::errors::UsherError;
use crate::model::VersionContext;
use serde_json::{Map, Value};

/// Merges the structure document into the content document, in place.
///
/// For every tour id the structure declares, the content document must hold a
/// tour with the same number of steps, otherwise the whole data set is
/// rejected; a tour must never run on mismatched data. Structure fields win
/// on key collisions.
pub fn merge_structure(
    content: &mut Map<String, Value>,
    structure: &Map<String, Value>,
    versions: &VersionContext,
) -> Result<(), UsherError> {
    for (tour_id, structure_tour) in structure {
        let structure_steps = steps_of(structure_tour).ok_or_else(|| {
            UsherError::Mismatch(format!("structure tour '{}' has no steps array", tour_id))
        })?;

        let content_tour = content
            .get_mut(tour_id)
            .ok_or_else(|| UsherError::Mismatch(format!("tour '{}' is missing from the content file", tour_id)))?;
        let content_steps = content_tour
            .get_mut("steps")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| UsherError::Mismatch(format!("content tour '{}' has no steps array", tour_id)))?;

        if content_steps.len() != structure_steps.len() {
            return Err(UsherError::Mismatch(format!(
                "tour '{}' has {} content steps but {} structure steps",
                tour_id,
                content_steps.len(),
                structure_steps.len()
            )));
        }

        for (step_index, content_step) in content_steps.iter_mut().enumerate() {
            let base = structure_steps[step_index].as_object().ok_or_else(|| {
                UsherError::Document(format!("structure step {} of '{}' is not an object", step_index, tour_id))
            })?;
            let active = select_override(base, versions);

            let target = content_step.as_object_mut().ok_or_else(|| {
                UsherError::Document(format!("content step {} of '{}' is not an object", step_index, tour_id))
            })?;
            for (key, value) in active {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(())
}

/// Picks the override set for a structure step: the first
/// `specialForVersions` entry valid for the current versions, or the base
/// step itself. Declared order decides ties, so selection is deterministic.
fn select_override<'a>(step: &'a Map<String, Value>, versions: &VersionContext) -> &'a Map<String, Value> {
    if let Some(specials) = step.get("specialForVersions").and_then(Value::as_array) {
        for special in specials {
            if let Some(entry) = special.as_object() {
                if entry_matches_versions(entry, versions) {
                    return entry;
                }
            }
        }
    }
    step
}

fn entry_matches_versions(entry: &Map<String, Value>, versions: &VersionContext) -> bool {
    let kind = entry.get("type").and_then(Value::as_str);
    let listed = |version: &str| {
        entry
            .get("versions")
            .and_then(Value::as_array)
            .map(|list| list.iter().any(|v| v.as_str() == Some(version)))
            .unwrap_or(false)
    };

    match kind {
        Some("server") => listed(&versions.server_version),
        Some("app") => listed(&versions.app_version),
        _ => false,
    }
}

fn steps_of(tour: &Value) -> Option<&Vec<Value>> {
    tour.get("steps").and_then(Value::as_array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn versions() -> VersionContext {
        VersionContext {
            server_version: "29".to_string(),
            app_version: "4.2".to_string(),
        }
    }

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_merge_overlays_structure_fields() {
        let mut content = doc(json!({
            "notes": { "name": "Notes", "steps": [
                { "paragraphs": ["one"] },
                { "paragraphs": ["two"], "position": "top" },
                { "paragraphs": ["three"] }
            ]}
        }));
        let structure = doc(json!({
            "notes": { "steps": [
                { "element": "#inbox" },
                { "element": "#editor", "position": "left" },
                { "element": "" }
            ]}
        }));

        merge_structure(&mut content, &structure, &versions()).unwrap();

        let steps = content["notes"]["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0]["element"], "#inbox");
        assert_eq!(steps[0]["paragraphs"], json!(["one"]));
        // Structure keys take precedence on conflicts.
        assert_eq!(steps[1]["position"], "left");
        assert_eq!(steps[2]["element"], "");
    }

    #[test]
    fn test_missing_tour_id_fails() {
        let mut content = doc(json!({ "other": { "steps": [] } }));
        let structure = doc(json!({ "notes": { "steps": [] } }));

        let err = merge_structure(&mut content, &structure, &versions()).unwrap_err();
        assert!(matches!(err, UsherError::Mismatch(_)));
    }

    #[test]
    fn test_step_count_mismatch_fails() {
        let mut content = doc(json!({ "notes": { "steps": [{}, {}] } }));
        let structure = doc(json!({ "notes": { "steps": [{}, {}, {}] } }));

        let err = merge_structure(&mut content, &structure, &versions()).unwrap_err();
        assert!(matches!(err, UsherError::Mismatch(_)));
    }

    #[test]
    fn test_version_override_server_match() {
        let mut content = doc(json!({ "notes": { "steps": [{ "paragraphs": ["p"] }] } }));
        let structure = doc(json!({
            "notes": { "steps": [{
                "element": "#base",
                "specialForVersions": [
                    { "type": "server", "versions": ["28"], "element": "#v28" },
                    { "type": "server", "versions": ["29"], "element": "#v29" },
                    { "type": "app", "versions": ["4.2"], "element": "#byapp" }
                ]
            }]}
        }));

        merge_structure(&mut content, &structure, &versions()).unwrap();
        // First matching entry in declared order wins.
        assert_eq!(content["notes"]["steps"][0]["element"], "#v29");
    }

    #[test]
    fn test_version_override_no_match_uses_base() {
        let mut content = doc(json!({ "notes": { "steps": [{}] } }));
        let structure = doc(json!({
            "notes": { "steps": [{
                "element": "#base",
                "specialForVersions": [
                    { "type": "server", "versions": ["12"], "element": "#old" }
                ]
            }]}
        }));

        merge_structure(&mut content, &structure, &versions()).unwrap();
        assert_eq!(content["notes"]["steps"][0]["element"], "#base");
    }

    #[test]
    fn test_merge_is_deterministic() {
        let structure = doc(json!({
            "notes": { "steps": [{
                "specialForVersions": [
                    { "type": "app", "versions": ["4.2"], "element": "#a" },
                    { "type": "app", "versions": ["4.2"], "element": "#b" }
                ]
            }]}
        }));

        for _ in 0..3 {
            let mut content = doc(json!({ "notes": { "steps": [{}] } }));
            merge_structure(&mut content, &structure, &versions()).unwrap();
            assert_eq!(content["notes"]["steps"][0]["element"], "#a");
        }
    }
}
