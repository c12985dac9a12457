//! Single-flight admission gate for live endpoints
//!
//! At most one heavy live pipeline run is admitted at a time. Excess requests are rejected
//! immediately with [`VisionError::Busy`]; nothing is queued. The slot is released when the
//! returned [`AdmissionPermit`] is dropped, on every exit path.

use crate::error::VisionError;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
}

/// Held for the duration of one admitted request.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the slot if it is free, otherwise fail fast.
    pub fn try_acquire(&self) -> Result<AdmissionPermit, VisionError> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(AdmissionPermit { _permit: permit }),
            Err(_) => {
                debug!("Admission gate busy, rejecting request");
                counter!("sightline_admission_rejected_total").increment(1);
                Err(VisionError::Busy)
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slots.available_permits() == 0
    }
}
