//! System preamble construction.
//!
//! The preamble is the assistant instructions followed by a catalog rendered
//! from the registered action specs, so the model always sees exactly the
//! actions the registry can dispatch.

use clinicdesk_core::action::ActionSpec;
use serde_json::Value;
use std::fmt::Write;

use crate::parser::{BLOCK_CLOSE, BLOCK_OPEN, PARAMS_CLOSE, PARAMS_OPEN};

pub const DEFAULT_INSTRUCTIONS: &str = "\
You are a helpful healthcare assistant for a FHIR HL7 compliant clinic management system.
You can help with:
- Understanding patient records and medical data
- Explaining FHIR resources and healthcare terminology
- Answering questions about appointments, encounters, and medical records
- Creating and managing patient records
- Creating and managing practitioner records
- Scheduling and updating appointments
- Recording clinical encounters
- Recording vital signs and lab observations
- Documenting conditions and diagnoses
- Creating medication prescriptions
- Providing general healthcare information

Always be professional, accurate, and helpful. If you're unsure about something medical, recommend consulting with a healthcare professional.";

const USAGE_RULES: &str = "\
## Tool Usage Rules

1. When you need to use a tool, output the tool_block and STOP. Do not continue your response after the tool_block.
2. Wait for the tool result which will be provided in the next message as [Tool Result: tool_name].
3. After receiving the result, continue your response using the data.
4. Always confirm successful actions with the user.
5. If a tool returns an error, explain the issue and ask for clarification if needed.";

/// `instructions` (or the built-in ones) plus the catalog for `specs`.
pub fn system_prompt(instructions: Option<&str>, specs: &[ActionSpec]) -> String {
    let mut prompt = instructions.unwrap_or(DEFAULT_INSTRUCTIONS).trim_end().to_string();
    prompt.push_str("\n\n");
    prompt.push_str(&catalog(specs));
    prompt.push_str("\n\n");
    prompt.push_str(USAGE_RULES);
    prompt
}

/// The `## Available Tools` section.
pub fn catalog(specs: &[ActionSpec]) -> String {
    let mut out = String::from(
        "## Available Tools\n\n\
         You have access to tools to interact with the clinic database. \
         When you need to use a tool, output a tool_block with the parameters.\n",
    );
    for spec in specs {
        let _ = write!(out, "\n### {}\n{}\n", spec.name, spec.description);
        let _ = write!(out, "\n**Usage:**\n{}\n", usage_example(spec));

        let (required, optional) = split_parameters(&spec.parameters);
        if !required.is_empty() {
            out.push_str("\n**Required parameters:**\n");
            for (name, description) in &required {
                let _ = writeln!(out, "- {name}: {description}");
            }
        }
        if !optional.is_empty() {
            out.push_str("\n**Optional parameters:**\n");
            for (name, description) in &optional {
                let _ = writeln!(out, "- {name}: {description}");
            }
        }
    }
    out
}

/// A complete block built from the first schema example.
fn usage_example(spec: &ActionSpec) -> String {
    let mut params = serde_json::Map::new();
    params.insert("tool".into(), Value::String(spec.name.clone()));
    if let Some(example) = spec.parameters["examples"][0].as_object() {
        params.extend(example.clone());
    }
    let body = serde_json::to_string_pretty(&params).unwrap_or_default();
    format!("{BLOCK_OPEN}\n{PARAMS_OPEN}\n{body}\n{PARAMS_CLOSE}\n{BLOCK_CLOSE}")
}

type ParamLine = (String, String);

fn split_parameters(schema: &Value) -> (Vec<ParamLine>, Vec<ParamLine>) {
    let required: Vec<&str> = schema["required"]
        .as_array()
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut req = Vec::new();
    let mut opt = Vec::new();
    if let Some(properties) = schema["properties"].as_object() {
        for (name, property) in properties {
            let description = property["description"].as_str().unwrap_or_default().to_string();
            if required.contains(&name.as_str()) {
                req.push((name.clone(), description));
            } else {
                opt.push((name.clone(), description));
            }
        }
    }
    // Keep required parameters in their declared order.
    req.sort_by_key(|(name, _)| required.iter().position(|r| *r == name.as_str()));
    (req, opt)
}
