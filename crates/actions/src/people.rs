//! Patient and practitioner registration.

use async_trait::async_trait;
use clinicdesk_core::action::{Action, Params, ToolResult};
use clinicdesk_core::error::ActionError;
use clinicdesk_core::record::{RecordStore, ResourceKind};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::fhir::into_resource;
use crate::params::{optional_object, optional_str, required_str};

fn official_name(first: &str, last: &str) -> Value {
    json!([{ "use": "official", "family": last, "given": [first] }])
}

fn telecom(system: &str, value: &str, usage: &str) -> Value {
    json!({ "system": system, "value": value, "use": usage })
}

pub struct CreatePatient {
    store: Arc<dyn RecordStore>,
}

impl CreatePatient {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreatePatient {
    fn name(&self) -> &str {
        "create_patient"
    }

    fn description(&self) -> &str {
        "Create a new patient record in the system."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "firstName": { "type": "string", "description": "Patient's first name" },
                "lastName": { "type": "string", "description": "Patient's last name" },
                "birthDate": { "type": "string", "description": "Date of birth in YYYY-MM-DD format" },
                "gender": { "type": "string", "enum": ["male", "female", "other", "unknown"], "description": "One of \"male\", \"female\", \"other\", \"unknown\"" },
                "phone": { "type": "string", "description": "Phone number" },
                "email": { "type": "string", "description": "Email address" },
                "address": { "type": "object", "description": "Object with line, city, state, postalCode, country" }
            },
            "required": ["firstName", "lastName", "birthDate", "gender"],
            "examples": [{
                "firstName": "John",
                "lastName": "Doe",
                "birthDate": "1990-05-15",
                "gender": "male",
                "phone": "555-123-4567"
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let first = required_str(params, "firstName")?;
        let last = required_str(params, "lastName")?;
        let birth_date = required_str(params, "birthDate")?;
        let gender = required_str(params, "gender")?;

        let mut telecoms = Vec::new();
        if let Some(phone) = optional_str(params, "phone") {
            telecoms.push(telecom("phone", phone, "mobile"));
        }
        if let Some(email) = optional_str(params, "email") {
            telecoms.push(telecom("email", email, "home"));
        }

        let mut addresses = Vec::new();
        if let Some(address) = optional_object(params, "address") {
            let mut entry = json!({ "use": "home", "type": "physical" });
            if let Some(line) = optional_str(address, "line") {
                entry["line"] = json!([line]);
            }
            for key in ["city", "state", "postalCode", "country"] {
                if let Some(value) = optional_str(address, key) {
                    entry[key] = json!(value);
                }
            }
            addresses.push(entry);
        }

        let patient = json!({
            "active": true,
            "name": official_name(first, last),
            "gender": gender,
            "birthDate": birth_date,
            "telecom": telecoms,
            "address": addresses,
        });

        let created = self
            .store
            .create(ResourceKind::Patients, into_resource(patient))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully created patient record for {first} {last}"),
            "patient": created,
        })))
    }
}

pub struct CreatePractitioner {
    store: Arc<dyn RecordStore>,
}

impl CreatePractitioner {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CreatePractitioner {
    fn name(&self) -> &str {
        "create_practitioner"
    }

    fn description(&self) -> &str {
        "Create a new practitioner/doctor record in the system."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "firstName": { "type": "string", "description": "Practitioner's first name" },
                "lastName": { "type": "string", "description": "Practitioner's last name" },
                "gender": { "type": "string", "enum": ["male", "female", "other", "unknown"], "description": "One of \"male\", \"female\", \"other\", \"unknown\"" },
                "specialty": { "type": "string", "description": "Medical specialty" },
                "phone": { "type": "string", "description": "Work phone number" },
                "email": { "type": "string", "description": "Work email address" }
            },
            "required": ["firstName", "lastName", "gender"],
            "examples": [{
                "firstName": "Jane",
                "lastName": "Smith",
                "gender": "female",
                "specialty": "General Practice"
            }]
        })
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, ActionError> {
        let first = required_str(params, "firstName")?;
        let last = required_str(params, "lastName")?;
        let gender = required_str(params, "gender")?;

        let mut telecoms = Vec::new();
        if let Some(phone) = optional_str(params, "phone") {
            telecoms.push(telecom("phone", phone, "work"));
        }
        if let Some(email) = optional_str(params, "email") {
            telecoms.push(telecom("email", email, "work"));
        }
        let qualifications: Vec<Value> = optional_str(params, "specialty")
            .map(|s| json!({ "code": { "text": s } }))
            .into_iter()
            .collect();

        let practitioner = json!({
            "active": true,
            "name": official_name(first, last),
            "gender": gender,
            "telecom": telecoms,
            "qualification": qualifications,
        });

        let created = self
            .store
            .create(ResourceKind::Practitioners, into_resource(practitioner))
            .await?;

        Ok(ToolResult::ok(json!({
            "message": format!("Successfully created practitioner record for Dr. {first} {last}"),
            "practitioner": created,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicdesk_store::InMemoryRecordStore;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn creates_patient_with_contact_details() {
        let store = Arc::new(InMemoryRecordStore::new());
        let action = CreatePatient::new(store.clone());

        let result = action
            .execute(&params(json!({
                "action": "create_patient",
                "firstName": "Jane",
                "lastName": "Doe",
                "birthDate": "1990-01-01",
                "gender": "female",
                "email": "jane@example.com",
                "address": { "line": "1 Elm St", "city": "Springfield" }
            })))
            .await
            .unwrap();

        assert!(result.succeeded);
        let payload = result.payload.unwrap();
        assert_eq!(
            payload["message"],
            "Successfully created patient record for Jane Doe"
        );
        let patient = &payload["patient"];
        assert_eq!(patient["resourceType"], "Patient");
        assert_eq!(patient["name"][0]["family"], "Doe");
        assert_eq!(patient["name"][0]["given"][0], "Jane");
        assert_eq!(patient["telecom"][0]["use"], "home");
        assert_eq!(patient["address"][0]["line"][0], "1 Elm St");
        assert!(patient["address"][0].get("state").is_none());
        assert_eq!(store.count(ResourceKind::Patients).await, 1);
    }

    #[tokio::test]
    async fn patient_requires_birth_date() {
        let store = Arc::new(InMemoryRecordStore::new());
        let err = CreatePatient::new(store.clone())
            .execute(&params(json!({ "firstName": "A", "lastName": "B", "gender": "male" })))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: birthDate");
        assert_eq!(store.count(ResourceKind::Patients).await, 0);
    }

    #[tokio::test]
    async fn creates_practitioner_with_specialty() {
        let store = Arc::new(InMemoryRecordStore::new());
        let result = CreatePractitioner::new(store)
            .execute(&params(json!({
                "firstName": "Ann",
                "lastName": "Lee",
                "gender": "female",
                "specialty": "Cardiology",
                "phone": "555-0100"
            })))
            .await
            .unwrap();
        let payload = result.payload.unwrap();
        assert_eq!(
            payload["message"],
            "Successfully created practitioner record for Dr. Ann Lee"
        );
        assert_eq!(payload["practitioner"]["qualification"][0]["code"]["text"], "Cardiology");
        assert_eq!(payload["practitioner"]["telecom"][0]["use"], "work");
    }
}
