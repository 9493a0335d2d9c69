//! `clinicdesk actions` lists the actions the assistant can take.

use clinicdesk_core::action::ActionSpec;
use clinicdesk_core::record::RecordStore;
use clinicdesk_store::InMemoryRecordStore;
use serde_json::Value;
use std::sync::Arc;

pub fn run(json: bool) -> anyhow::Result<()> {
    // The catalog doesn't depend on the backing store.
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let specs = clinicdesk_actions::default_registry(store).specs();

    if json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("Assistant actions ({})", specs.len());
    println!("=======================\n");
    for spec in &specs {
        println!("{}", summary(spec));
    }

    Ok(())
}

/// `name(required, optional?)` followed by the description.
fn summary(spec: &ActionSpec) -> String {
    let required: Vec<&str> = spec.parameters["required"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let optional: Vec<String> = spec.parameters["properties"]
        .as_object()
        .into_iter()
        .flatten()
        .map(|(name, _)| name.as_str())
        .filter(|name| !required.contains(name) && !matches!(*name, "action" | "tool"))
        .map(|name| format!("{name}?"))
        .collect();

    let params: Vec<String> = required
        .iter()
        .map(|s| s.to_string())
        .chain(optional)
        .collect();

    format!(
        "  {}({})\n      {}",
        spec.name,
        params.join(", "),
        spec.description
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_marks_optional_parameters() {
        let spec = ActionSpec {
            name: "update_condition".into(),
            description: "Update a condition.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "note": { "type": "string" }
                },
                "required": ["id"]
            }),
        };

        let text = summary(&spec);
        assert!(text.starts_with("  update_condition(id, note?)"));
        assert!(text.contains("Update a condition."));
    }
}
