//! Appointments and encounters.

use async_trait::async_trait;
use clinicdesk_core::action::{Action, Params, ToolResult};
use clinicdesk_core::error::ActionError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::fhir::{self, into_resource, lookup_display, reference};
use crate::params::{optional_str, required_str};

const APPOINTMENT_STATUSES: &str =
    "One of \"proposed\", \"pending\", \"booked\", \"arrived\", \"fulfilled\", \"cancelled\", \"noshow\"";
const ENCOUNTER_STATUSES: &str = "One of \"planned\", \"arrived\", \"triaged\", \"in-progress\", \"onleave\", \"finished\", \"cancelled\"";

/// Display names for a patient and practitioner pair, looked up concurrently.
async fn participant_names(
    store: &dyn RecordStore,
    patient_id: &str,
    practitioner_id: &str,
) -> (String, String) {
    tokio::join!(
        lookup_display(store, ResourceKind::Patients, patient_id),
        lookup_display(store, ResourceKind::Practitioners, practitioner_id),
    )
}

pub struct CreateAppointment {
    store: Arc<dyn RecordStore>,
}

impl CreateAppointment {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreateAppointment {
    fn name(&self) -> &str {
        "create_appointment"
    }

    fn description(&self) -> &str {
        "Create a new appointment between a patient and practitioner."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patientId": { "type": "string", "description": "The patient's ID" },
                "practitionerId": { "type": "string", "description": "The practitioner's ID" },
                "start": { "type": "string", "description": "Start datetime in ISO 8601 format" },
                "end": { "type": "string", "description": "End datetime in ISO 8601 format" },
                "description": { "type": "string", "description": "Description of the appointment" },
                "status": { "type": "string", "description": format!("{APPOINTMENT_STATUSES} (default: \"booked\")") },
                "serviceType": { "type": "string", "description": "Type of service" }
            },
            "required": ["patientId", "practitionerId", "start", "end"],
            "examples": [{
                "patientId": "patient-123",
                "practitionerId": "practitioner-456",
                "start": "2024-01-15T09:00:00Z",
                "end": "2024-01-15T09:30:00Z",
                "description": "Annual checkup"
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let patient_id = required_str(params, "patientId")?;
        let practitioner_id = required_str(params, "practitionerId")?;
        let start = required_str(params, "start")?;
        let end = required_str(params, "end")?;

        let (patient_name, practitioner_name) =
            participant_names(self.store.as_ref(), patient_id, practitioner_id).await;

        let mut appointment = json!({
            "status": optional_str(params, "status").unwrap_or("booked"),
            "description": optional_str(params, "description").unwrap_or(""),
            "start": start,
            "end": end,
            "participant": [
                {
                    "actor": reference(ResourceKind::Patients, patient_id, Some(patient_name.as_str())),
                    "status": "accepted",
                },
                {
                    "actor": reference(ResourceKind::Practitioners, practitioner_id, Some(practitioner_name.as_str())),
                    "status": "accepted",
                },
            ],
        });
        if let Some(service) = optional_str(params, "serviceType") {
            appointment["serviceType"] = json!([{ "text": service }]);
        }

        let created = self
            .store
            .create(ResourceKind::Appointments, into_resource(appointment))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully created appointment for {start}"),
            "appointment": created,
        })))
    }
}

pub struct UpdateAppointment {
    store: Arc<dyn RecordStore>,
}

impl UpdateAppointment {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for UpdateAppointment {
    fn name(&self) -> &str {
        "update_appointment"
    }

    fn description(&self) -> &str {
        "Update an existing appointment's status or details."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The appointment ID to update" },
                "status": { "type": "string", "description": APPOINTMENT_STATUSES },
                "start": { "type": "string", "description": "New start datetime in ISO 8601 format" },
                "end": { "type": "string", "description": "New end datetime in ISO 8601 format" },
                "description": { "type": "string", "description": "Updated description" }
            },
            "required": ["id"],
            "examples": [{ "id": "appointment-123", "status": "fulfilled" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let id = required_str(params, "id")?;

        let mut updates = Resource::new();
        for field in ["status", "start", "end"] {
            if let Some(value) = optional_str(params, field) {
                updates.insert(field.into(), json!(value));
            }
        }
        // An empty description is a legitimate edit.
        if let Some(description) = params.get("description").and_then(Value::as_str) {
            updates.insert("description".into(), json!(description));
        }
        if updates.is_empty() {
            return Err(ActionError::NoUpdateFields);
        }

        let updated = self
            .store
            .update(ResourceKind::Appointments, id, updates)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Appointments, id))?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully updated appointment {id}"),
            "appointment": updated,
        })))
    }
}

pub struct CreateEncounter {
    store: Arc<dyn RecordStore>,
}

impl CreateEncounter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreateEncounter {
    fn name(&self) -> &str {
        "create_encounter"
    }

    fn description(&self) -> &str {
        "Create a new clinical encounter/visit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patientId": { "type": "string", "description": "The patient's ID" },
                "practitionerId": { "type": "string", "description": "The practitioner's ID" },
                "encounterClass": { "type": "string", "description": "One of \"ambulatory\", \"emergency\", \"inpatient\", \"virtual\" (default: \"ambulatory\")" },
                "type": { "type": "string", "description": "Type of encounter" },
                "reasonCode": { "type": "string", "description": "Reason for the encounter" },
                "status": { "type": "string", "description": format!("{ENCOUNTER_STATUSES} (default: \"in-progress\")") }
            },
            "required": ["patientId", "practitionerId"],
            "examples": [{
                "patientId": "patient-123",
                "practitionerId": "practitioner-456",
                "encounterClass": "ambulatory",
                "reasonCode": "Annual wellness visit"
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let patient_id = required_str(params, "patientId")?;
        let practitioner_id = required_str(params, "practitionerId")?;
        let class = fhir::encounter_class_name(optional_str(params, "encounterClass"));

        let (patient_name, practitioner_name) =
            participant_names(self.store.as_ref(), patient_id, practitioner_id).await;

        let mut encounter = json!({
            "status": optional_str(params, "status").unwrap_or("in-progress"),
            "class": fhir::encounter_class(Some(class)),
            "subject": reference(ResourceKind::Patients, patient_id, Some(patient_name.as_str())),
            "participant": [{
                "individual": reference(ResourceKind::Practitioners, practitioner_id, Some(practitioner_name.as_str())),
            }],
            "period": { "start": fhir::now() },
        });
        if let Some(kind) = optional_str(params, "type") {
            encounter["type"] = json!([{ "text": kind }]);
        }
        if let Some(reason) = optional_str(params, "reasonCode") {
            encounter["reasonCode"] = json!([{ "text": reason }]);
        }

        let created = self
            .store
            .create(ResourceKind::Encounters, into_resource(encounter))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully created {class} encounter"),
            "encounter": created,
        })))
    }
}

pub struct UpdateEncounter {
    store: Arc<dyn RecordStore>,
}

impl UpdateEncounter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for UpdateEncounter {
    fn name(&self) -> &str {
        "update_encounter"
    }

    fn description(&self) -> &str {
        "Update an existing encounter's status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The encounter ID to update" },
                "status": { "type": "string", "description": ENCOUNTER_STATUSES },
                "endDate": { "type": "string", "description": "End datetime in ISO 8601 format" }
            },
            "required": ["id"],
            "examples": [{ "id": "encounter-123", "status": "finished", "endDate": "2024-01-15T10:30:00Z" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let id = required_str(params, "id")?;
        let status = optional_str(params, "status");
        let end = optional_str(params, "endDate");
        if status.is_none() && end.is_none() {
            return Err(ActionError::NoUpdateFields);
        }

        let mut updates = Resource::new();
        if let Some(status) = status {
            updates.insert("status".into(), json!(status));
        }
        if let Some(end) = end {
            // Keep the recorded start when closing the period.
            let existing = self
                .store
                .get(ResourceKind::Encounters, id)
                .await?
                .ok_or_else(|| not_found(ResourceKind::Encounters, id))?;
            let mut period = existing
                .get("period")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            period.insert("end".into(), json!(end));
            updates.insert("period".into(), Value::Object(period));
        }

        let updated = self
            .store
            .update(ResourceKind::Encounters, id, updates)
            .await?
            .ok_or_else(|| not_found(ResourceKind::Encounters, id))?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully updated encounter {id}"),
            "encounter": updated,
        })))
    }
}

pub(crate) fn not_found(kind: ResourceKind, id: &str) -> ActionError {
    ActionError::NotFound {
        resource_type: kind.resource_type().into(),
        id: id.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStore;
    use clinicdesk_store::InMemoryRecordStore;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    async fn seeded() -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .seed(
                ResourceKind::Patients,
                params(json!({
                    "resourceType": "Patient",
                    "id": "pat-1",
                    "name": [{ "use": "official", "given": ["Jane"], "family": "Doe" }]
                })),
            )
            .await;
        store
    }

    #[tokio::test]
    async fn appointment_labels_participants() {
        let store = seeded().await;
        let result = CreateAppointment::new(store)
            .execute(&params(json!({
                "patientId": "pat-1",
                "practitionerId": "pra-missing",
                "start": "2024-01-15T09:00:00Z",
                "end": "2024-01-15T09:30:00Z",
                "serviceType": "Consultation"
            })))
            .await
            .unwrap();

        let payload = result.payload.unwrap();
        assert_eq!(
            payload["message"],
            "Successfully created appointment for 2024-01-15T09:00:00Z"
        );
        let appointment = &payload["appointment"];
        assert_eq!(appointment["status"], "booked");
        assert_eq!(appointment["description"], "");
        assert_eq!(appointment["participant"][0]["actor"]["display"], "Jane Doe");
        assert_eq!(appointment["participant"][1]["actor"]["display"], "Unknown");
        assert_eq!(
            appointment["participant"][1]["actor"]["reference"],
            "Practitioner/pra-missing"
        );
        assert_eq!(appointment["serviceType"][0]["text"], "Consultation");
    }

    #[tokio::test]
    async fn appointment_validation_touches_no_store() {
        let store = Arc::new(CountingStore::default());
        let err = CreateAppointment::new(store.clone())
            .execute(&params(json!({ "patientId": "p1" })))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: practitionerId");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn update_requires_a_field() {
        let store = Arc::new(CountingStore::default());
        let err = UpdateAppointment::new(store.clone())
            .execute(&params(json!({ "id": "app-1" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NoUpdateFields));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn update_missing_appointment_is_not_found() {
        let store = Arc::new(InMemoryRecordStore::new());
        let err = UpdateAppointment::new(store)
            .execute(&params(json!({ "id": "app-9", "status": "cancelled" })))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource not found: Appointment with id \"app-9\""
        );
    }

    #[tokio::test]
    async fn encounter_lifecycle() {
        let store = seeded().await;
        let created = CreateEncounter::new(store.clone())
            .execute(&params(json!({
                "patientId": "pat-1",
                "practitionerId": "pra-1",
                "encounterClass": "virtual",
                "reasonCode": "Follow-up"
            })))
            .await
            .unwrap()
            .payload
            .unwrap();
        assert_eq!(created["message"], "Successfully created virtual encounter");
        assert_eq!(created["encounter"]["class"]["code"], "VR");
        assert_eq!(created["encounter"]["status"], "in-progress");
        assert_eq!(created["encounter"]["subject"]["display"], "Jane Doe");
        let id = created["encounter"]["id"].as_str().unwrap().to_string();
        let started = created["encounter"]["period"]["start"].clone();

        let updated = UpdateEncounter::new(store)
            .execute(&params(json!({
                "id": id,
                "status": "finished",
                "endDate": "2024-01-15T10:30:00Z"
            })))
            .await
            .unwrap()
            .payload
            .unwrap();
        let encounter = &updated["encounter"];
        assert_eq!(encounter["status"], "finished");
        assert_eq!(encounter["period"]["end"], "2024-01-15T10:30:00Z");
        assert_eq!(encounter["period"]["start"], started);
        assert_eq!(encounter["meta"]["versionId"], "2");
    }

    #[tokio::test]
    async fn encounter_without_class_is_ambulatory() {
        let store = seeded().await;
        let created = CreateEncounter::new(store)
            .execute(&params(json!({ "patientId": "pat-1", "practitionerId": "pra-1" })))
            .await
            .unwrap()
            .payload
            .unwrap();
        assert_eq!(created["message"], "Successfully created ambulatory encounter");
        assert_eq!(created["encounter"]["class"]["code"], "AMB");
        assert_eq!(created["encounter"]["participant"][0]["individual"]["display"], "Unknown");
    }
}
