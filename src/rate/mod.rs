//! Per-client sliding-window admission control.

mod admission;
mod counter;

pub use admission::{Admission, AdmissionGate, RATE_LIMIT_EXCEEDED};
pub use counter::RateWindowCounter;
