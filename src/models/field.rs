use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Categorical dimension carried by an event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    SiteLocation,
    SiteReferrer,
    Source,
    SiteLanguage,
    Country,
    DeviceType,
    DeviceName,
    DeviceManufacturer,
    OsName,
    OsVersion,
    BrowserName,
    BrowserVersion,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::SiteLocation,
        Field::SiteReferrer,
        Field::Source,
        Field::SiteLanguage,
        Field::Country,
        Field::DeviceType,
        Field::DeviceName,
        Field::DeviceManufacturer,
        Field::OsName,
        Field::OsVersion,
        Field::BrowserName,
        Field::BrowserVersion,
    ];

    /// Name used in query strings and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::SiteLocation => "siteLocation",
            Field::SiteReferrer => "siteReferrer",
            Field::Source => "source",
            Field::SiteLanguage => "siteLanguage",
            Field::Country => "country",
            Field::DeviceType => "deviceType",
            Field::DeviceName => "deviceName",
            Field::DeviceManufacturer => "deviceManufacturer",
            Field::OsName => "osName",
            Field::OsVersion => "osVersion",
            Field::BrowserName => "browserName",
            Field::BrowserVersion => "browserVersion",
        }
    }

    /// Column holding this field in the SQL backends
    pub fn column(&self) -> &'static str {
        match self {
            Field::SiteLocation => "site_location",
            Field::SiteReferrer => "site_referrer",
            Field::Source => "source",
            Field::SiteLanguage => "site_language",
            Field::Country => "country",
            Field::DeviceType => "device_type",
            Field::DeviceName => "device_name",
            Field::DeviceManufacturer => "device_manufacturer",
            Field::OsName => "os_name",
            Field::OsVersion => "os_version",
            Field::BrowserName => "browser_name",
            Field::BrowserVersion => "browser_version",
        }
    }

    /// Parse a comma-separated field list such as `osName,osVersion`
    pub fn parse_list(input: &str) -> Result<Vec<Field>, UnknownField> {
        input
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field '{0}'")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .find(|field| field.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// Composite key over one or more fields, in the order they were requested.
///
/// Serializes as `{ "osName": "Linux", "osVersion": "6.1" }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldValues(Vec<(Field, String)>);

impl FieldValues {
    pub fn new(pairs: Vec<(Field, String)>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn pairs(&self) -> &[(Field, String)] {
        &self.0
    }
}

impl Serialize for FieldValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in &self.0 {
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}
