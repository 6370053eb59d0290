use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::guest::Guest;

/// One physical or logical host that runs guests, as discovered by a remote
/// hypervisor-management source. `facts` is a free-form key/value bag (CPU
/// socket count, hypervisor type/version, cluster name, system UUID, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypervisor {
    hypervisor_id: String,
    name: Option<String>,
    facts: Option<BTreeMap<String, String>>,
    guests: Vec<Guest>,
}

impl Hypervisor {
    pub fn new(hypervisor_id: impl Into<String>, guests: Vec<Guest>) -> Self {
        Self {
            hypervisor_id: hypervisor_id.into(),
            name: None,
            facts: None,
            guests,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_facts(mut self, facts: BTreeMap<String, String>) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn hypervisor_id(&self) -> &str {
        &self.hypervisor_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn facts(&self) -> Option<&BTreeMap<String, String>> {
        self.facts.as_ref()
    }

    pub fn guests(&self) -> &[Guest] {
        &self.guests
    }

    /// Canonical wire representation. Guests are sorted by `guestId`,
    /// bytewise, independent of discovery order.
    pub fn to_value(&self) -> Value {
        let mut sorted_guests: Vec<&Guest> = self.guests.iter().collect();
        sorted_guests.sort_by(|a, b| a.uuid().cmp(b.uuid()));

        let mut map = Map::new();
        map.insert(
            "hypervisorId".to_string(),
            json!({ "hypervisorId": self.hypervisor_id }),
        );
        if let Some(name) = &self.name {
            map.insert("name".to_string(), json!(name));
        }
        map.insert(
            "guestIds".to_string(),
            Value::Array(sorted_guests.iter().map(|g| g.to_value()).collect()),
        );
        if let Some(facts) = &self.facts {
            map.insert("facts".to_string(), json!(facts));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::GuestState;

    #[test]
    fn guests_serialize_sorted_by_id() {
        let hv = Hypervisor::new(
            "hv-1",
            vec![
                Guest::new("zzz", "esx", GuestState::Running),
                Guest::new("aaa", "esx", GuestState::Shutoff),
            ],
        );
        let value = hv.to_value();
        let ids: Vec<&str> = value["guestIds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["guestId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["aaa", "zzz"]);
    }

    #[test]
    fn name_is_omitted_when_absent() {
        let hv = Hypervisor::new("hv-1", vec![]);
        let value = hv.to_value();
        assert!(value.get("name").is_none());
    }
}
