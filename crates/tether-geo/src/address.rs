use serde::{Deserialize, Serialize};

/// The address block of a location form. Blank strings count as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressFields {
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub barangay: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

fn present(part: Option<&String>) -> Option<&str> {
    part.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl AddressFields {
    #[must_use]
    pub fn address_line(&self) -> Option<&str> {
        present(self.address_line.as_ref())
    }

    #[must_use]
    pub fn barangay(&self) -> Option<&str> {
        present(self.barangay.as_ref())
    }

    #[must_use]
    pub fn city(&self) -> Option<&str> {
        present(self.city.as_ref())
    }

    #[must_use]
    pub fn province(&self) -> Option<&str> {
        present(self.province.as_ref())
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        present(self.region.as_ref())
    }

    /// False when every part is missing; such an address is never looked up.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.address_line().is_some()
            || self.barangay().is_some()
            || self.city().is_some()
            || self.province().is_some()
            || self.region().is_some()
    }
}

/// Join the present parts with `", "`.
pub(crate) fn join_present<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts.into_iter().flatten().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_parts_count_as_missing() {
        let fields = AddressFields {
            address_line: Some("   ".into()),
            city: Some(String::new()),
            ..AddressFields::default()
        };
        assert!(!fields.has_any());
        assert_eq!(fields.address_line(), None);
    }

    #[test]
    fn any_single_part_is_enough() {
        let fields = AddressFields {
            region: Some("NCR".into()),
            ..AddressFields::default()
        };
        assert!(fields.has_any());
    }

    #[test]
    fn parts_are_trimmed() {
        let fields = AddressFields {
            city: Some("  Quezon City ".into()),
            ..AddressFields::default()
        };
        assert_eq!(fields.city(), Some("Quezon City"));
    }

    #[test]
    fn join_skips_missing_parts() {
        assert_eq!(
            join_present([Some("Bagong Silang"), None, Some("Caloocan")]),
            "Bagong Silang, Caloocan"
        );
        assert_eq!(join_present([None, None]), "");
    }
}
