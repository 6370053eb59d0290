use serde_json::{json, Value};

/// Power state of one virtual machine, as reported by the owning hypervisor.
///
/// Numeric values match the legacy wire protocol exactly (`0..=7`), since
/// destinations decode the `state` field of a `guestId` entry positionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestState {
    Unknown = 0,
    Running = 1,
    Blocked = 2,
    Paused = 3,
    ShuttingDown = 4,
    Shutoff = 5,
    Crashed = 6,
    PMSuspended = 7,
}

impl GuestState {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// True for the states that count as "active" for entitlement purposes.
    pub fn is_active(self) -> bool {
        matches!(self, GuestState::Running | GuestState::Paused)
    }
}

/// One virtual machine running on a hypervisor (or on the local host, for
/// `GuestList` reports). Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guest {
    uuid: String,
    virt_type: String,
    state: GuestState,
}

impl Guest {
    pub fn new(uuid: impl Into<String>, virt_type: impl Into<String>, state: GuestState) -> Self {
        Self {
            uuid: uuid.into(),
            virt_type: virt_type.into(),
            state,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn virt_type(&self) -> &str {
        &self.virt_type
    }

    pub fn state(&self) -> GuestState {
        self.state
    }

    /// Canonical wire representation: `{guestId, state, attributes: {virtWhoType, active}}`.
    pub fn to_value(&self) -> Value {
        json!({
            "attributes": {
                "active": if self.state.is_active() { 1 } else { 0 },
                "virtWhoType": self.virt_type,
            },
            "guestId": self.uuid,
            "state": self.state.as_i32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_flag_follows_running_and_paused_only() {
        assert!(GuestState::Running.is_active());
        assert!(GuestState::Paused.is_active());
        assert!(!GuestState::Blocked.is_active());
        assert!(!GuestState::Shutoff.is_active());
        assert!(!GuestState::Unknown.is_active());
    }

    #[test]
    fn to_value_echoes_virt_who_type_and_active() {
        let guest = Guest::new("abc-123", "esx", GuestState::Running);
        let value = guest.to_value();
        assert_eq!(value["guestId"], "abc-123");
        assert_eq!(value["state"], 1);
        assert_eq!(value["attributes"]["virtWhoType"], "esx");
        assert_eq!(value["attributes"]["active"], 1);
    }
}
