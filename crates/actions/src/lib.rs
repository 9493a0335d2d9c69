//! Clinic record actions the assistant can invoke.
//!
//! Every executor validates its parameters before touching the store, and
//! returns [`ActionError`](clinicdesk_core::ActionError) for anything the
//! model should be told about. [`ActionRegistry::dispatch`] folds those
//! into failed tool results.

pub mod clinical;
pub mod fhir;
pub mod params;
pub mod people;
pub mod records;
pub mod scheduling;

#[cfg(test)]
mod testing;

use clinicdesk_core::action::ActionRegistry;
use clinicdesk_core::record::RecordStore;
use std::sync::Arc;

pub use clinical::{
    CreateCondition, CreateMedicationRequest, CreateObservation, UpdateCondition,
    UpdateMedicationRequest,
};
pub use people::{CreatePatient, CreatePractitioner};
pub use records::{DeleteResource, ListFilter, ListResources, QueryFhir, ReadResource};
pub use scheduling::{CreateAppointment, CreateEncounter, UpdateAppointment, UpdateEncounter};

/// All fifteen clinic actions, in catalog order, backed by `store`.
pub fn default_registry(store: Arc<dyn RecordStore>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Box::new(CreatePatient::new(store.clone())));
    registry.register(Box::new(QueryFhir::new(store.clone())));
    registry.register(Box::new(CreatePractitioner::new(store.clone())));
    registry.register(Box::new(CreateAppointment::new(store.clone())));
    registry.register(Box::new(UpdateAppointment::new(store.clone())));
    registry.register(Box::new(CreateEncounter::new(store.clone())));
    registry.register(Box::new(UpdateEncounter::new(store.clone())));
    registry.register(Box::new(CreateObservation::new(store.clone())));
    registry.register(Box::new(CreateCondition::new(store.clone())));
    registry.register(Box::new(UpdateCondition::new(store.clone())));
    registry.register(Box::new(CreateMedicationRequest::new(store.clone())));
    registry.register(Box::new(UpdateMedicationRequest::new(store.clone())));
    registry.register(Box::new(DeleteResource::new(store.clone())));
    registry.register(Box::new(ReadResource::new(store.clone())));
    registry.register(Box::new(ListResources::new(store)));
    registry
}
