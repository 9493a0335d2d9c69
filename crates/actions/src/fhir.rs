//! FHIR shaping helpers: references, codings, and display names.

use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use serde_json::{Value, json};
use tracing::debug;

pub const UNKNOWN: &str = "Unknown";

/// Best-effort label for a referenced patient or practitioner. Any lookup
/// failure yields [`UNKNOWN`].
pub async fn lookup_display(store: &dyn RecordStore, kind: ResourceKind, id: &str) -> String {
    match store.get(kind, id).await {
        Ok(Some(resource)) => display_name(&resource),
        Ok(None) => UNKNOWN.into(),
        Err(e) => {
            debug!(kind = %kind, id, error = %e, "Display lookup failed");
            UNKNOWN.into()
        }
    }
}

/// `prefix given family suffix` from the official (else first) name.
pub fn display_name(resource: &Resource) -> String {
    let Some(names) = resource.get("name").and_then(Value::as_array) else {
        return UNKNOWN.into();
    };
    let Some(name) = names
        .iter()
        .find(|n| n["use"] == "official")
        .or_else(|| names.first())
    else {
        return UNKNOWN.into();
    };

    let joined = |key: &str| -> Option<String> {
        let parts: Vec<&str> = name[key]
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    };

    let mut parts = Vec::new();
    parts.extend(joined("prefix"));
    parts.extend(joined("given"));
    if let Some(family) = name["family"].as_str() {
        parts.push(family.to_string());
    }
    parts.extend(joined("suffix"));

    if parts.is_empty() {
        name["text"].as_str().unwrap_or(UNKNOWN).to_string()
    } else {
        parts.join(" ")
    }
}

/// `{reference: "Patient/p1", type: "Patient", display}`
pub fn reference(kind: ResourceKind, id: &str, display: Option<&str>) -> Value {
    let mut r = json!({
        "reference": format!("{}/{}", kind.resource_type(), id),
        "type": kind.resource_type(),
    });
    if let Some(display) = display {
        r["display"] = json!(display);
    }
    r
}

/// The id out of a `Type/id` reference string, else the string itself.
pub fn referenced_id<'a>(reference: &'a str, resource_type: &str) -> &'a str {
    reference
        .strip_prefix(resource_type)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(reference)
}

pub fn coding(system: &str, code: &str, display: &str) -> Value {
    json!({ "system": system, "code": code, "display": display })
}

/// `{coding: [{code, display}], text: display}`
pub fn concept(code: &str, display: &str) -> Value {
    json!({
        "coding": [{ "code": code, "display": display }],
        "text": display,
    })
}

const ACT_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

/// Encounter class coding; unrecognised classes fall back to ambulatory.
/// The known class a requested encounter class resolves to; anything else is ambulatory.
pub fn encounter_class_name(class: Option<&str>) -> &'static str {
    match class {
        Some("emergency") => "emergency",
        Some("inpatient") => "inpatient",
        Some("virtual") => "virtual",
        _ => "ambulatory",
    }
}

pub fn encounter_class(class: Option<&str>) -> Value {
    let (code, display) = match encounter_class_name(class) {
        "emergency" => ("EMER", "emergency"),
        "inpatient" => ("IMP", "inpatient encounter"),
        "virtual" => ("VR", "virtual"),
        _ => ("AMB", "ambulatory"),
    };
    coding(ACT_CODE, code, display)
}

const OBSERVATION_CATEGORY: &str = "http://terminology.hl7.org/CodeSystem/observation-category";

pub const OBSERVATION_CATEGORIES: [&str; 5] =
    ["vital-signs", "laboratory", "imaging", "procedure", "exam"];

pub fn observation_category(category: &str) -> Option<Value> {
    let display = match category {
        "vital-signs" => "Vital Signs",
        "laboratory" => "Laboratory",
        "imaging" => "Imaging",
        "procedure" => "Procedure",
        "exam" => "Exam",
        _ => return None,
    };
    Some(coding(OBSERVATION_CATEGORY, category, display))
}

pub const CONDITION_CLINICAL: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
pub const CONDITION_VERIFICATION: &str =
    "http://terminology.hl7.org/CodeSystem/condition-ver-status";

pub fn clinical_status_display(code: &str) -> &str {
    match code {
        "active" => "Active",
        "recurrence" => "Recurrence",
        "relapse" => "Relapse",
        "inactive" => "Inactive",
        "remission" => "Remission",
        "resolved" => "Resolved",
        other => other,
    }
}

pub fn verification_status_display(code: &str) -> &str {
    match code {
        "unconfirmed" => "Unconfirmed",
        "provisional" => "Provisional",
        "differential" => "Differential",
        "confirmed" => "Confirmed",
        "refuted" => "Refuted",
        "entered-in-error" => "Entered in Error",
        other => other,
    }
}

/// Records built with `json!` are always objects.
pub fn into_resource(value: Value) -> Resource {
    match value {
        Value::Object(map) => map,
        _ => Resource::new(),
    }
}

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(v: Value) -> Resource {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn display_prefers_official_name() {
        let patient = resource(json!({
            "name": [
                { "use": "nickname", "given": ["Janie"] },
                { "use": "official", "prefix": ["Ms."], "given": ["Jane", "Q"], "family": "Doe" }
            ]
        }));
        assert_eq!(display_name(&patient), "Ms. Jane Q Doe");
    }

    #[test]
    fn display_falls_back() {
        assert_eq!(display_name(&resource(json!({}))), "Unknown");
        assert_eq!(display_name(&resource(json!({ "name": [] }))), "Unknown");
        assert_eq!(
            display_name(&resource(json!({ "name": [{ "text": "Dr. Who" }] }))),
            "Dr. Who"
        );
    }

    #[test]
    fn references() {
        let r = reference(ResourceKind::Practitioners, "pra-1", Some("Ann Lee"));
        assert_eq!(r["reference"], "Practitioner/pra-1");
        assert_eq!(r["type"], "Practitioner");
        assert_eq!(r["display"], "Ann Lee");

        assert_eq!(referenced_id("Patient/pat-1", "Patient"), "pat-1");
        assert_eq!(referenced_id("pat-1", "Patient"), "pat-1");
        assert_eq!(referenced_id("Patients/x", "Patient"), "Patients/x");
    }

    #[test]
    fn encounter_class_defaults_to_ambulatory() {
        assert_eq!(encounter_class(None)["code"], "AMB");
        assert_eq!(encounter_class(Some("teleport"))["code"], "AMB");
        assert_eq!(encounter_class(Some("emergency"))["code"], "EMER");
        assert_eq!(encounter_class(Some("inpatient"))["display"], "inpatient encounter");
        assert_eq!(encounter_class_name(Some("teleport")), "ambulatory");
    }

    #[test]
    fn observation_categories() {
        for category in OBSERVATION_CATEGORIES {
            assert!(observation_category(category).is_some());
        }
        assert!(observation_category("astrology").is_none());
    }
}
