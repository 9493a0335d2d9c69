//! Generic record access: query, read, list, delete.

use async_trait::async_trait;
use clinicdesk_core::action::{Action, Params, ToolResult};
use clinicdesk_core::error::ActionError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::fhir::referenced_id;
use crate::params::{optional_count, optional_str, required_kind, required_str};

const KIND_CHOICES: &str = "One of \"patients\", \"practitioners\", \"appointments\", \"encounters\", \"observations\", \"conditions\", \"medication-requests\"";

fn not_found(kind: ResourceKind, id: &str) -> ActionError {
    ActionError::NotFound {
        resource_type: kind.collection().into(),
        id: id.into(),
    }
}

pub struct QueryFhir {
    store: Arc<dyn RecordStore>,
}

impl QueryFhir {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for QueryFhir {
    fn name(&self) -> &str {
        "query_fhir"
    }

    fn description(&self) -> &str {
        "Query FHIR resources from the database."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resource": { "type": "string", "description": KIND_CHOICES },
                "id": { "type": "string", "description": "Specific resource ID to fetch" }
            },
            "required": ["resource"],
            "examples": [{ "resource": "patients" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let kind = required_kind(params, "resource")?;

        let (count, results) = match optional_str(params, "id") {
            Some(id) => {
                let record = self
                    .store
                    .get(kind, id)
                    .await?
                    .ok_or_else(|| not_found(kind, id))?;
                (1, Value::Object(record))
            }
            None => {
                let records = self.store.list(kind).await?;
                (records.len(), json!(records))
            }
        };

        Ok(ToolResult::ok(json!({
            "resource": kind.collection(),
            "count": count,
            "results": results,
        })))
    }
}

pub struct ReadResource {
    store: Arc<dyn RecordStore>,
}

impl ReadResource {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for ReadResource {
    fn name(&self) -> &str {
        "read_resource"
    }

    fn description(&self) -> &str {
        "Read a specific resource by its ID. Use this to get detailed information about a single record."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resourceType": { "type": "string", "description": KIND_CHOICES },
                "id": { "type": "string", "description": "The resource ID to read" }
            },
            "required": ["resourceType", "id"],
            "examples": [{ "resourceType": "patients", "id": "patient-123" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let raw_kind = required_str(params, "resourceType")?;
        let id = required_str(params, "id")?;
        let kind: ResourceKind = raw_kind.parse()?;

        let resource = self
            .store
            .get(kind, id)
            .await?
            .ok_or_else(|| not_found(kind, id))?;

        Ok(ToolResult::ok(json!({
            "resourceType": kind.collection(),
            "resource": resource,
        })))
    }
}

pub struct DeleteResource {
    store: Arc<dyn RecordStore>,
}

impl DeleteResource {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for DeleteResource {
    fn name(&self) -> &str {
        "delete_resource"
    }

    fn description(&self) -> &str {
        "Delete a resource from the database."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resourceType": { "type": "string", "description": KIND_CHOICES },
                "id": { "type": "string", "description": "The resource ID to delete" }
            },
            "required": ["resourceType", "id"],
            "examples": [{ "resourceType": "appointments", "id": "appointment-123" }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let raw_kind = required_str(params, "resourceType")?;
        let id = required_str(params, "id")?;
        let kind: ResourceKind = raw_kind.parse()?;

        if !self.store.delete(kind, id).await? {
            return Err(not_found(kind, id));
        }

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully deleted {} with ID {id}", kind.collection()),
        })))
    }
}

pub struct ListResources {
    store: Arc<dyn RecordStore>,
}

impl ListResources {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for ListResources {
    fn name(&self) -> &str {
        "list_resources"
    }

    fn description(&self) -> &str {
        "List resources of a specific type with optional filtering. Use this to browse records or find specific subsets."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "resourceType": { "type": "string", "description": KIND_CHOICES },
                "limit": { "type": "integer", "description": "Maximum number of results to return" },
                "patientId": { "type": "string", "description": "Filter by patient ID (appointments, encounters, observations, conditions, medication-requests)" },
                "practitionerId": { "type": "string", "description": "Filter by practitioner ID (appointments, encounters, medication-requests)" },
                "status": { "type": "string", "description": "Filter by status (appointments, encounters, conditions, medication-requests)" }
            },
            "required": ["resourceType"],
            "examples": [
                { "resourceType": "appointments", "patientId": "patient-123" },
                { "resourceType": "conditions", "patientId": "patient-123", "status": "active" }
            ]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let kind = required_kind(params, "resourceType")?;
        let limit = optional_count(params, "limit")?;
        let filter = ListFilter {
            patient: optional_str(params, "patientId"),
            practitioner: optional_str(params, "practitionerId"),
            status: optional_str(params, "status"),
        };

        let all = self.store.list(kind).await?;
        let mut matched: Vec<&Resource> = all.iter().filter(|r| filter.matches(kind, r)).collect();
        if let Some(limit) = limit.filter(|n| *n > 0) {
            matched.truncate(limit);
        }

        Ok(ToolResult::ok(json!({
            "resourceType": kind.collection(),
            "totalCount": all.len(),
            "filteredCount": matched.len(),
            "resources": matched,
        })))
    }
}

/// Client-side predicates for `list_resources`. Each filter only applies to
/// the kinds that carry the corresponding reference.
#[derive(Debug, Default)]
pub struct ListFilter<'a> {
    pub patient: Option<&'a str>,
    pub practitioner: Option<&'a str>,
    pub status: Option<&'a str>,
}

impl ListFilter<'_> {
    pub fn matches(&self, kind: ResourceKind, resource: &Resource) -> bool {
        use ResourceKind::*;

        if let Some(patient) = self.patient
            && matches!(kind, Appointments | Encounters | Observations | Conditions | MedicationRequests)
            && !patient_refs(resource).any(|id| id == patient)
        {
            return false;
        }
        if let Some(practitioner) = self.practitioner
            && matches!(kind, Appointments | Encounters | MedicationRequests)
            && !practitioner_refs(resource).any(|id| id == practitioner)
        {
            return false;
        }
        if let Some(status) = self.status
            && matches!(kind, Appointments | Encounters | Conditions | MedicationRequests)
            && status_of(resource) != Some(status)
        {
            return false;
        }
        true
    }
}

fn reference_of(value: &Value) -> Option<&str> {
    value.get("reference").and_then(Value::as_str)
}

fn participant_refs<'r>(resource: &'r Resource, slot: &'static str) -> impl Iterator<Item = &'r str> {
    resource
        .get("participant")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(move |p| p.get(slot).and_then(reference_of))
}

fn patient_refs(resource: &Resource) -> impl Iterator<Item = &str> {
    let direct = ["subject", "patient"]
        .into_iter()
        .filter_map(|field| resource.get(field).and_then(reference_of));
    direct
        .chain(participant_refs(resource, "actor").filter(|r| r.starts_with("Patient/")))
        .map(|r| referenced_id(r, "Patient"))
}

fn practitioner_refs(resource: &Resource) -> impl Iterator<Item = &str> {
    let direct = resource.get("requester").and_then(reference_of);
    direct
        .into_iter()
        .chain(participant_refs(resource, "actor"))
        .chain(participant_refs(resource, "individual"))
        .filter(|r| r.starts_with("Practitioner/"))
        .map(|r| referenced_id(r, "Practitioner"))
}

fn status_of(resource: &Resource) -> Option<&str> {
    resource.get("status").and_then(Value::as_str).or_else(|| {
        resource
            .get("clinicalStatus")?
            .get("coding")?
            .get(0)?
            .get("code")?
            .as_str()
    })
}
