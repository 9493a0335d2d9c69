//! Record store trait: CRUD over the seven clinical record kinds.
//!
//! Records are FHIR-shaped JSON objects. The store assigns `id` and a
//! `meta.versionId` stamp; beyond that it treats them as opaque.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// A stored record: a JSON object.
pub type Resource = serde_json::Map<String, serde_json::Value>;

/// The seven record categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Patients,
    Practitioners,
    Appointments,
    Encounters,
    Observations,
    Conditions,
    MedicationRequests,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Patients,
        ResourceKind::Practitioners,
        ResourceKind::Appointments,
        ResourceKind::Encounters,
        ResourceKind::Observations,
        ResourceKind::Conditions,
        ResourceKind::MedicationRequests,
    ];

    /// Collection name used in URLs and file names.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Patients => "patients",
            ResourceKind::Practitioners => "practitioners",
            ResourceKind::Appointments => "appointments",
            ResourceKind::Encounters => "encounters",
            ResourceKind::Observations => "observations",
            ResourceKind::Conditions => "conditions",
            ResourceKind::MedicationRequests => "medication-requests",
        }
    }

    /// The FHIR `resourceType` of records in this collection.
    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Patients => "Patient",
            ResourceKind::Practitioners => "Practitioner",
            ResourceKind::Appointments => "Appointment",
            ResourceKind::Encounters => "Encounter",
            ResourceKind::Observations => "Observation",
            ResourceKind::Conditions => "Condition",
            ResourceKind::MedicationRequests => "MedicationRequest",
        }
    }

    pub fn id_prefix(self) -> &'static str {
        &self.collection()[..3]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for ResourceKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.collection() == s)
            .ok_or_else(|| StoreError::InvalidKind(s.to_string()))
    }
}

/// The Record Store contract.
///
/// `None` from [`get`](RecordStore::get)/[`update`](RecordStore::update) and
/// `false` from [`delete`](RecordStore::delete) mean "not found"; `Err` is
/// reserved for storage or transport faults. Concurrent writers get
/// last-write-wins and nothing stronger.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name (e.g., "file", "memory", "http").
    fn name(&self) -> &str;

    async fn list(&self, kind: ResourceKind) -> std::result::Result<Vec<Resource>, StoreError>;

    async fn get(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> std::result::Result<Option<Resource>, StoreError>;

    /// Store a new record; the store assigns `id` and `meta`.
    async fn create(
        &self,
        kind: ResourceKind,
        partial: Resource,
    ) -> std::result::Result<Resource, StoreError>;

    /// Merge `partial` into an existing record and bump its version.
    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        partial: Resource,
    ) -> std::result::Result<Option<Resource>, StoreError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> std::result::Result<bool, StoreError>;
}
