use std::sync::OnceLock;

/// In-memory copy of the published subscription blob.
///
/// Written at most once per process; the serving route reads it afterwards
/// and treats an empty slot as "route not registered".
#[derive(Debug, Default)]
pub struct SubscriptionSlot {
    blob: OnceLock<String>,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the blob. Returns `false` if one was already published.
    pub fn publish(&self, blob: String) -> bool {
        self.blob.set(blob).is_ok()
    }

    pub fn get(&self) -> Option<&str> {
        self.blob.get().map(String::as_str)
    }

    pub fn is_ready(&self) -> bool {
        self.blob.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_is_write_once() {
        let slot = SubscriptionSlot::new();
        assert!(slot.get().is_none());

        assert!(slot.publish("first".to_string()));
        assert!(!slot.publish("second".to_string()));
        assert_eq!(slot.get(), Some("first"));
    }
}
