use chrono::{DateTime, TimeDelta, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::field::{Field, FieldValues};

/// Identifier of a tracked domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(Uuid);

impl DomainId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed domain id '{0}'")]
pub struct MalformedDomainId(pub String);

impl FromStr for DomainId {
    type Err = MalformedDomainId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| MalformedDomainId(s.to_string()))
    }
}

/// Longest visit duration accepted, in seconds (one leap year)
pub const MAX_DURATION_SECS: i64 = 366 * 24 * 60 * 60;

/// Rejected at ingestion
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecord {
    #[error("duration {0}s is outside 0..={MAX_DURATION_SECS}")]
    Duration(i64),
}

fn check_duration(seconds: i64) -> Result<i64, InvalidRecord> {
    if (0..=MAX_DURATION_SECS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(InvalidRecord::Duration(seconds))
    }
}

fn duration_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Option::<i64>::deserialize(deserializer)?
        .map(check_duration)
        .transpose()
        .map_err(de::Error::custom)
}

/// One logged pageview or action. Immutable once written, except for
/// `duration`, which is backfilled when the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub domain_id: DomainId,
    pub session_id: String,
    pub created_at: DateTime<Utc>,

    /// Elapsed seconds of the visit, unknown while the session is open
    #[serde(default, deserialize_with = "duration_seconds")]
    pub duration: Option<i64>,

    #[serde(default)]
    pub site_location: Option<String>,
    #[serde(default)]
    pub site_referrer: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub site_language: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_manufacturer: Option<String>,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub browser_name: Option<String>,
    #[serde(default)]
    pub browser_version: Option<String>,
}

impl EventRecord {
    /// Bare record with no categorical values set
    pub fn new(domain_id: DomainId, session_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain_id,
            session_id: session_id.into(),
            created_at,
            duration: None,
            site_location: None,
            site_referrer: None,
            source: None,
            site_language: None,
            country: None,
            device_type: None,
            device_name: None,
            device_manufacturer: None,
            os_name: None,
            os_version: None,
            browser_name: None,
            browser_version: None,
        }
    }

    /// Builder-style setter for a categorical value
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        *self.slot_mut(field) = Some(value.into());
        self
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn value(&self, field: Field) -> Option<&str> {
        match field {
            Field::SiteLocation => self.site_location.as_deref(),
            Field::SiteReferrer => self.site_referrer.as_deref(),
            Field::Source => self.source.as_deref(),
            Field::SiteLanguage => self.site_language.as_deref(),
            Field::Country => self.country.as_deref(),
            Field::DeviceType => self.device_type.as_deref(),
            Field::DeviceName => self.device_name.as_deref(),
            Field::DeviceManufacturer => self.device_manufacturer.as_deref(),
            Field::OsName => self.os_name.as_deref(),
            Field::OsVersion => self.os_version.as_deref(),
            Field::BrowserName => self.browser_name.as_deref(),
            Field::BrowserVersion => self.browser_version.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::SiteLocation => &mut self.site_location,
            Field::SiteReferrer => &mut self.site_referrer,
            Field::Source => &mut self.source,
            Field::SiteLanguage => &mut self.site_language,
            Field::Country => &mut self.country,
            Field::DeviceType => &mut self.device_type,
            Field::DeviceName => &mut self.device_name,
            Field::DeviceManufacturer => &mut self.device_manufacturer,
            Field::OsName => &mut self.os_name,
            Field::OsVersion => &mut self.os_version,
            Field::BrowserName => &mut self.browser_name,
            Field::BrowserVersion => &mut self.browser_version,
        }
    }

    /// Composite key for `fields`, or `None` if any of them is unset
    pub fn key(&self, fields: &[Field]) -> Option<FieldValues> {
        fields
            .iter()
            .map(|&field| self.value(field).map(|value| (field, value.to_string())))
            .collect::<Option<Vec<_>>>()
            .map(FieldValues::new)
    }

    pub fn has_fields(&self, fields: &[Field]) -> bool {
        fields.iter().all(|&field| self.value(field).is_some())
    }

    /// Checks applied by every store before a record is written
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        if let Some(seconds) = self.duration {
            check_duration(seconds)?;
        }
        Ok(())
    }

    /// The duration, if known and within `0..=MAX_DURATION_SECS`
    pub fn valid_duration(&self) -> Option<i64> {
        self.duration.and_then(|seconds| check_duration(seconds).ok())
    }

    /// `created_at + duration` once a valid duration is known, else `created_at`
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.valid_duration()
            .and_then(TimeDelta::try_seconds)
            .and_then(|elapsed| self.created_at.checked_add_signed(elapsed))
            .unwrap_or(self.created_at)
    }
}

/// Engine ordering for record sets: oldest first, record id as tie-break
pub fn sort_chronologically(records: &mut [EventRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
