//! Observations, conditions, and prescriptions.

use async_trait::async_trait;
use clinicdesk_core::action::{Action, Params, ToolResult};
use clinicdesk_core::error::ActionError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::fhir::{self, concept, into_resource, lookup_display, reference};
use crate::params::{optional_object, optional_str, required_str};
use crate::scheduling::not_found;

const CLINICAL_STATUSES: &str =
    "One of \"active\", \"recurrence\", \"relapse\", \"inactive\", \"remission\", \"resolved\"";
const MEDICATION_STATUSES: &str =
    "One of \"active\", \"on-hold\", \"cancelled\", \"completed\", \"stopped\", \"draft\"";

fn clinical_status(code: &str) -> Value {
    json!({
        "coding": [fhir::coding(fhir::CONDITION_CLINICAL, code, fhir::clinical_status_display(code))]
    })
}

pub struct CreateObservation {
    store: Arc<dyn RecordStore>,
}

impl CreateObservation {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreateObservation {
    fn name(&self) -> &str {
        "create_observation"
    }

    fn description(&self) -> &str {
        "Record a clinical observation (vital signs, lab results, etc.)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patientId": { "type": "string", "description": "The patient's ID" },
                "code": { "type": "string", "description": "LOINC or other standard code for the observation" },
                "codeDisplay": { "type": "string", "description": "Human-readable name for the observation" },
                "category": { "type": "string", "description": "One of \"vital-signs\", \"laboratory\", \"imaging\", \"procedure\", \"exam\"" },
                "encounterId": { "type": "string", "description": "Associated encounter ID" },
                "valueQuantity": { "type": "object", "description": "Object with value (number) and unit (string) for single measurements" },
                "valueString": { "type": "string", "description": "String value for text-based observations" },
                "component": { "type": "array", "description": "Array of component measurements (code, codeDisplay, value, unit)" }
            },
            "required": ["patientId", "code", "codeDisplay", "category"],
            "examples": [{
                "patientId": "patient-123",
                "code": "85354-9",
                "codeDisplay": "Blood Pressure",
                "category": "vital-signs",
                "component": [
                    { "code": "8480-6", "codeDisplay": "Systolic", "value": 120, "unit": "mmHg" },
                    { "code": "8462-4", "codeDisplay": "Diastolic", "value": 80, "unit": "mmHg" }
                ]
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let patient_id = required_str(params, "patientId")?;
        let code = required_str(params, "code")?;
        let code_display = required_str(params, "codeDisplay")?;
        let category_name = required_str(params, "category")?;
        let category =
            fhir::observation_category(category_name).ok_or_else(|| ActionError::InvalidParameter {
                field: "category".into(),
                reason: format!("must be one of {}", fhir::OBSERVATION_CATEGORIES.join(", ")),
            })?;

        let patient_name = lookup_display(self.store.as_ref(), ResourceKind::Patients, patient_id).await;

        let mut observation = json!({
            "status": "final",
            "category": [{ "coding": [category] }],
            "code": concept(code, code_display),
            "subject": reference(ResourceKind::Patients, patient_id, Some(patient_name.as_str())),
            "effectiveDateTime": fhir::now(),
        });
        if let Some(encounter_id) = optional_str(params, "encounterId") {
            observation["encounter"] = reference(ResourceKind::Encounters, encounter_id, None);
        }
        if let Some(quantity) = optional_object(params, "valueQuantity") {
            observation["valueQuantity"] = json!({
                "value": quantity.get("value").cloned().unwrap_or(Value::Null),
                "unit": quantity.get("unit").cloned().unwrap_or(Value::Null),
            });
        } else if let Some(text) = optional_str(params, "valueString") {
            observation["valueString"] = json!(text);
        }
        let components: Vec<Value> = params
            .get("component")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|c| {
                        let label = c["codeDisplay"].as_str().unwrap_or_default();
                        json!({
                            "code": concept(c["code"].as_str().unwrap_or_default(), label),
                            "valueQuantity": { "value": c["value"], "unit": c["unit"] },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !components.is_empty() {
            observation["component"] = Value::Array(components);
        }

        let created = self
            .store
            .create(ResourceKind::Observations, into_resource(observation))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully recorded {code_display} observation"),
            "observation": created,
        })))
    }
}

pub struct CreateCondition {
    store: Arc<dyn RecordStore>,
}

impl CreateCondition {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreateCondition {
    fn name(&self) -> &str {
        "create_condition"
    }

    fn description(&self) -> &str {
        "Record a patient condition/diagnosis."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patientId": { "type": "string", "description": "The patient's ID" },
                "code": { "type": "string", "description": "ICD-10 or SNOMED code for the condition" },
                "codeDisplay": { "type": "string", "description": "Human-readable name for the condition" },
                "clinicalStatus": { "type": "string", "description": CLINICAL_STATUSES },
                "verificationStatus": { "type": "string", "description": "One of \"unconfirmed\", \"provisional\", \"differential\", \"confirmed\", \"refuted\" (default: \"confirmed\")" },
                "severity": { "type": "string", "description": "One of \"mild\", \"moderate\", \"severe\"" },
                "onsetDate": { "type": "string", "description": "When the condition started (YYYY-MM-DD)" },
                "note": { "type": "string", "description": "Additional notes about the condition" }
            },
            "required": ["patientId", "code", "codeDisplay", "clinicalStatus"],
            "examples": [{
                "patientId": "patient-123",
                "code": "I10",
                "codeDisplay": "Essential Hypertension",
                "clinicalStatus": "active",
                "severity": "moderate"
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let patient_id = required_str(params, "patientId")?;
        let code = required_str(params, "code")?;
        let code_display = required_str(params, "codeDisplay")?;
        let status = required_str(params, "clinicalStatus")?;
        let verification = optional_str(params, "verificationStatus").unwrap_or("confirmed");

        let patient_name = lookup_display(self.store.as_ref(), ResourceKind::Patients, patient_id).await;

        let mut condition = json!({
            "clinicalStatus": clinical_status(status),
            "verificationStatus": {
                "coding": [fhir::coding(
                    fhir::CONDITION_VERIFICATION,
                    verification,
                    fhir::verification_status_display(verification),
                )]
            },
            "code": concept(code, code_display),
            "subject": reference(ResourceKind::Patients, patient_id, Some(patient_name.as_str())),
            "recordedDate": fhir::now(),
        });
        if let Some(severity) = optional_str(params, "severity") {
            condition["severity"] = json!({
                "coding": [fhir::coding("http://snomed.info/sct", severity, severity)]
            });
        }
        if let Some(onset) = optional_str(params, "onsetDate") {
            condition["onsetDateTime"] = json!(onset);
        }
        if let Some(note) = optional_str(params, "note") {
            condition["note"] = json!([{ "text": note }]);
        }

        let created = self
            .store
            .create(ResourceKind::Conditions, into_resource(condition))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully recorded condition: {code_display}"),
            "condition": created,
        })))
    }
}

pub struct UpdateCondition {
    store: Arc<dyn RecordStore>,
}

impl UpdateCondition {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for UpdateCondition {
    fn name(&self) -> &str {
        "update_condition"
    }

    fn description(&self) -> &str {
        "Update an existing condition's status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The condition ID to update" },
                "clinicalStatus": { "type": "string", "description": CLINICAL_STATUSES },
                "abatementDate": { "type": "string", "description": "When the condition ended/resolved (YYYY-MM-DD)" },
                "note": { "type": "string", "description": "Additional notes" }
            },
            "required": ["id"],
            "examples": [{ "id": "condition-123", "clinicalStatus": "resolved", "abatementDate": "2024-06-15" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let id = required_str(params, "id")?;

        let mut updates = Resource::new();
        if let Some(status) = optional_str(params, "clinicalStatus") {
            updates.insert("clinicalStatus".into(), clinical_status(status));
        }
        if let Some(date) = optional_str(params, "abatementDate") {
            updates.insert("abatementDateTime".into(), json!(date));
        }
        if let Some(note) = optional_str(params, "note") {
            updates.insert("note".into(), json!([{ "text": note }]));
        }
        if updates.is_empty() {
            return Err(ActionError::NoUpdateFields);
        }

        let updated = self
            .store
            .update(ResourceKind::Conditions, id, updates)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Conditions, id))?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully updated condition {id}"),
            "condition": updated,
        })))
    }
}

pub struct CreateMedicationRequest {
    store: Arc<dyn RecordStore>,
}

impl CreateMedicationRequest {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreateMedicationRequest {
    fn name(&self) -> &str {
        "create_medication_request"
    }

    fn description(&self) -> &str {
        "Create a new medication prescription."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patientId": { "type": "string", "description": "The patient's ID" },
                "practitionerId": { "type": "string", "description": "The prescribing practitioner's ID" },
                "medicationName": { "type": "string", "description": "Name and strength of the medication" },
                "dosageInstruction": { "type": "string", "description": "How to take the medication" },
                "intent": { "type": "string", "description": "One of \"proposal\", \"plan\", \"order\", \"original-order\", \"reflex-order\", \"filler-order\", \"instance-order\" (default: \"order\")" },
                "priority": { "type": "string", "description": "One of \"routine\", \"urgent\", \"asap\", \"stat\" (default: \"routine\")" },
                "status": { "type": "string", "description": format!("{MEDICATION_STATUSES} (default: \"active\")") }
            },
            "required": ["patientId", "practitionerId", "medicationName", "dosageInstruction"],
            "examples": [{
                "patientId": "patient-123",
                "practitionerId": "practitioner-456",
                "medicationName": "Lisinopril 10mg",
                "dosageInstruction": "Take 1 tablet daily in the morning"
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let patient_id = required_str(params, "patientId")?;
        let practitioner_id = required_str(params, "practitionerId")?;
        let medication = required_str(params, "medicationName")?;
        let dosage = required_str(params, "dosageInstruction")?;

        let (patient_name, practitioner_name) = tokio::join!(
            lookup_display(self.store.as_ref(), ResourceKind::Patients, patient_id),
            lookup_display(self.store.as_ref(), ResourceKind::Practitioners, practitioner_id),
        );

        let request = json!({
            "status": optional_str(params, "status").unwrap_or("active"),
            "intent": optional_str(params, "intent").unwrap_or("order"),
            "priority": optional_str(params, "priority").unwrap_or("routine"),
            "medicationCodeableConcept": { "text": medication },
            "subject": reference(ResourceKind::Patients, patient_id, Some(patient_name.as_str())),
            "requester": reference(ResourceKind::Practitioners, practitioner_id, Some(practitioner_name.as_str())),
            "dosageInstruction": [{ "text": dosage }],
            "authoredOn": fhir::now(),
        });

        let created = self
            .store
            .create(ResourceKind::MedicationRequests, into_resource(request))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully prescribed {medication}"),
            "medicationRequest": created,
        })))
    }
}

pub struct UpdateMedicationRequest {
    store: Arc<dyn RecordStore>,
}

impl UpdateMedicationRequest {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for UpdateMedicationRequest {
    fn name(&self) -> &str {
        "update_medication_request"
    }

    fn description(&self) -> &str {
        "Update an existing medication request's status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The medication request ID to update" },
                "status": { "type": "string", "description": MEDICATION_STATUSES }
            },
            "required": ["id"],
            "examples": [{ "id": "medication-request-123", "status": "completed" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let id = required_str(params, "id")?;
        let Some(status) = optional_str(params, "status") else {
            return Err(ActionError::NoUpdateFields);
        };

        let mut updates = Resource::new();
        updates.insert("status".into(), json!(status));

        let updated = self
            .store
            .update(ResourceKind::MedicationRequests, id, updates)
            .await?
            .ok_or_else(|| not_found(ResourceKind::MedicationRequests, id))?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully updated medication request {id}"),
            "medicationRequest": updated,
        })))
    }
}
