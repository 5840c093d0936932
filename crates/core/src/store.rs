//! Persistence contract for ingested records.
//!
//! The parser never touches storage. Callers hand a [`RecordStore`] to
//! [`persist`](crate::ingest::persist) explicitly. Implementations are shared across worker
//! threads, so `upsert_patient` must be atomic on the patient identifier: two concurrent
//! ingests for the same new patient must end up with one record and the same handle.

use crate::header::MessageHeader;
use crate::model::{DeviceIdentity, Observation, Patient, Transmission};
use crate::StoreError;
use openpace_types::TransmissionKind;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PatientHandle(Uuid);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TransmissionHandle(Uuid);

impl std::fmt::Display for TransmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage operations needed by ingestion.
pub trait RecordStore: Send + Sync {
    /// Returns the handle for `patient.patient_id`, creating the record if it does not exist.
    /// An existing record is left unchanged.
    fn upsert_patient(&self, patient: &Patient) -> Result<PatientHandle, StoreError>;

    /// Stores header and device metadata for a transmission. Observations are inserted
    /// separately.
    fn insert_transmission(
        &self,
        patient: PatientHandle,
        transmission: &Transmission,
    ) -> Result<TransmissionHandle, StoreError>;

    fn insert_observation(
        &self,
        transmission: TransmissionHandle,
        observation: &Observation,
    ) -> Result<(), StoreError>;
}

/// A transmission as held by [`InMemoryStore`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredTransmission {
    pub patient: PatientHandle,
    pub header: MessageHeader,
    pub device: DeviceIdentity,
    pub kind: TransmissionKind,
    pub order_id: Option<String>,
    pub source_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
    pub observations: Vec<Observation>,
}

#[derive(Default)]
struct StoreState {
    patients: HashMap<String, (PatientHandle, Patient)>,
    transmissions: HashMap<TransmissionHandle, StoredTransmission>,
}

/// Process-local [`RecordStore`] guarded by a single mutex.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn patient_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.patients.len())
    }

    pub fn transmission_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.transmissions.len())
    }

    pub fn transmission(
        &self,
        handle: TransmissionHandle,
    ) -> Result<Option<StoredTransmission>, StoreError> {
        Ok(self.lock()?.transmissions.get(&handle).cloned())
    }
}

impl RecordStore for InMemoryStore {
    fn upsert_patient(&self, patient: &Patient) -> Result<PatientHandle, StoreError> {
        let mut state = self.lock()?;
        let (handle, _) = state
            .patients
            .entry(patient.patient_id.clone())
            .or_insert_with(|| {
                tracing::info!(
                    patient = patient
                        .anonymized_id
                        .as_deref()
                        .unwrap_or(&patient.patient_id),
                    "created patient"
                );
                (PatientHandle(Uuid::new_v4()), patient.clone())
            });
        Ok(*handle)
    }

    fn insert_transmission(
        &self,
        patient: PatientHandle,
        transmission: &Transmission,
    ) -> Result<TransmissionHandle, StoreError> {
        let mut state = self.lock()?;
        if !state.patients.values().any(|(h, _)| *h == patient) {
            return Err(StoreError::UnknownPatient(patient.0));
        }

        let handle = TransmissionHandle(Uuid::new_v4());
        state.transmissions.insert(
            handle,
            StoredTransmission {
                patient,
                header: transmission.header.clone(),
                device: transmission.device.clone(),
                kind: transmission.kind,
                order_id: transmission.order_id.clone(),
                source_filename: transmission.source_filename.clone(),
                raw_message: transmission.raw_message.clone(),
                observations: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn insert_observation(
        &self,
        transmission: TransmissionHandle,
        observation: &Observation,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let stored = state
            .transmissions
            .get_mut(&transmission)
            .ok_or(StoreError::UnknownTransmission(transmission.0))?;

        if stored
            .observations
            .iter()
            .any(|o| o.sequence_number == observation.sequence_number)
        {
            return Err(StoreError::DuplicateSequence {
                transmission: transmission.0,
                sequence: observation.sequence_number,
            });
        }

        stored.observations.push(observation.clone());
        Ok(())
    }
}
