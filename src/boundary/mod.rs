// Sealvault — Boundary Module
//
// The narrow interface between the host and the trusted compartment:
// marshaled entry calls going in, two-level statuses coming out, and the
// one-way debug notification channel.

mod notify;
mod protocol;

#[cfg(test)]
pub use notify::mock::RecordingSink;
pub use notify::{DebugSink, TracingSink};
pub use protocol::{
    EnclaveStatus, EntryCall, EntryResponse, EntryResult, EntryValue, TransitError,
};
