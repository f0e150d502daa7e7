// Sealvault — Debug notification channel
//
// The only outbound call the trusted compartment may make. The compartment
// side only accepts `&'static str` messages (see `TrustedCompartment::notify`),
// so runtime data such as item fields or keys cannot reach this channel.

/// Host-side receiver for compartment debug notifications. Fire-and-forget.
pub trait DebugSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Renders notifications through `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn notify(&self, message: &str) {
        tracing::debug!(target: "sealvault::ocall", "{}", message);
    }
}

#[cfg(test)]
pub mod mock {
    use super::DebugSink;
    use std::sync::Mutex;

    /// Collects every notification for later inspection.
    #[derive(Default)]
    pub struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl DebugSink for RecordingSink {
        fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}
