// Sealvault — Host Module
//
// The untrusted side: compartment lifecycle and the typed entry points the
// host controller calls. Never holds a seal key.

mod ecall;
mod lifecycle;

pub use lifecycle::{CompartmentHandle, EnclaveConfig, EnclaveManager, LifecycleError};
