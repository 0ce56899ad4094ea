//! The lookup cascade, richest query first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{AddressFields, join_present};

/// One step of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Structured: street, "barangay, city", province, region, country.
    StructuredFull,
    /// Structured without the street.
    StructuredLocality,
    /// Free text over every part plus the country.
    FreeTextFull,
    /// Free text from the barangay down.
    FreeTextLocality,
    /// Free text over province, region and country.
    FreeTextProvince,
}

impl Strategy {
    /// Every strategy, in the order the cascade tries them.
    pub const CASCADE: [Self; 5] = [
        Self::StructuredFull,
        Self::StructuredLocality,
        Self::FreeTextFull,
        Self::FreeTextLocality,
        Self::FreeTextProvince,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StructuredFull => "structured_full",
            Self::StructuredLocality => "structured_locality",
            Self::FreeTextFull => "free_text_full",
            Self::FreeTextLocality => "free_text_locality",
            Self::FreeTextProvince => "free_text_province",
        }
    }

    /// 1-based position in [`Self::CASCADE`].
    #[must_use]
    pub const fn step(self) -> usize {
        match self {
            Self::StructuredFull => 1,
            Self::StructuredLocality => 2,
            Self::FreeTextFull => 3,
            Self::FreeTextLocality => 4,
            Self::FreeTextProvince => 5,
        }
    }

    /// Build the query this step issues for `fields`.
    #[must_use]
    pub fn build(self, fields: &AddressFields, country: &str) -> LookupQuery {
        let city = join_present([fields.barangay(), fields.city()]);
        let city = (!city.is_empty()).then_some(city);
        let country = Some(country).filter(|c| !c.trim().is_empty());

        match self {
            Self::StructuredFull | Self::StructuredLocality => {
                let street = match self {
                    Self::StructuredFull => fields.address_line().map(str::to_string),
                    _ => None,
                };
                LookupQuery::Structured(StructuredQuery {
                    street,
                    city,
                    county: fields.province().map(str::to_string),
                    state: fields.region().map(str::to_string),
                    country: country.map(str::to_string),
                })
            }
            Self::FreeTextFull => LookupQuery::FreeText(join_present([
                fields.address_line(),
                fields.barangay(),
                fields.city(),
                fields.province(),
                fields.region(),
                country,
            ])),
            Self::FreeTextLocality => LookupQuery::FreeText(join_present([
                fields.barangay(),
                fields.city(),
                fields.province(),
                fields.region(),
                country,
            ])),
            Self::FreeTextProvince => {
                LookupQuery::FreeText(join_present([fields.province(), fields.region(), country]))
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured search fields. Missing fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub street: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl StructuredQuery {
    /// Present fields as `(name, value)` pairs in request order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("street", self.street.as_deref()),
            ("city", self.city.as_deref()),
            ("county", self.county.as_deref()),
            ("state", self.state.as_deref()),
            ("country", self.country.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// What one cascade step asks the geocoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "query", rename_all = "snake_case")]
pub enum LookupQuery {
    Structured(StructuredQuery),
    FreeText(String),
}

impl fmt::Display for LookupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(query) => {
                let rendered: Vec<String> = query
                    .pairs()
                    .into_iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                write!(f, "structured({})", rendered.join("; "))
            }
            Self::FreeText(q) => write!(f, "q={q}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> AddressFields {
        AddressFields {
            address_line: Some("12 Rizal St".into()),
            barangay: Some("San Roque".into()),
            city: Some("Marikina".into()),
            province: Some("Metro Manila".into()),
            region: Some("NCR".into()),
        }
    }

    #[test]
    fn cascade_is_ordered_by_step() {
        for (index, strategy) in Strategy::CASCADE.iter().enumerate() {
            assert_eq!(strategy.step(), index + 1);
        }
    }

    #[test]
    fn structured_full_joins_barangay_into_city() {
        let query = Strategy::StructuredFull.build(&full(), "Philippines");
        assert_eq!(
            query,
            LookupQuery::Structured(StructuredQuery {
                street: Some("12 Rizal St".into()),
                city: Some("San Roque, Marikina".into()),
                county: Some("Metro Manila".into()),
                state: Some("NCR".into()),
                country: Some("Philippines".into()),
            })
        );
    }

    #[test]
    fn structured_locality_drops_street() {
        let LookupQuery::Structured(query) = Strategy::StructuredLocality.build(&full(), "Philippines")
        else {
            panic!("expected structured query");
        };
        assert_eq!(query.street, None);
        assert_eq!(query.city.as_deref(), Some("San Roque, Marikina"));
    }

    #[test]
    fn free_text_steps_narrow() {
        let fields = full();
        assert_eq!(
            Strategy::FreeTextFull.build(&fields, "Philippines"),
            LookupQuery::FreeText(
                "12 Rizal St, San Roque, Marikina, Metro Manila, NCR, Philippines".into()
            )
        );
        assert_eq!(
            Strategy::FreeTextLocality.build(&fields, "Philippines"),
            LookupQuery::FreeText("San Roque, Marikina, Metro Manila, NCR, Philippines".into())
        );
        assert_eq!(
            Strategy::FreeTextProvince.build(&fields, "Philippines"),
            LookupQuery::FreeText("Metro Manila, NCR, Philippines".into())
        );
    }

    #[test]
    fn missing_parts_are_skipped() {
        let fields = AddressFields {
            city: Some("Cebu City".into()),
            ..AddressFields::default()
        };
        let LookupQuery::Structured(query) = Strategy::StructuredFull.build(&fields, "Philippines")
        else {
            panic!("expected structured query");
        };
        assert_eq!(
            query.pairs(),
            vec![("city", "Cebu City"), ("country", "Philippines")]
        );
        assert_eq!(
            Strategy::FreeTextProvince.build(&fields, "Philippines"),
            LookupQuery::FreeText("Philippines".into())
        );
    }
}
