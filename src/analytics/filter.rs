//! Record selection predicates.
//!
//! A [`Predicate`] is plain data: the memory store evaluates it with
//! [`Predicate::matches`], the SQL stores translate it into a `WHERE` clause.

use chrono::{DateTime, Utc};

use crate::models::{DomainId, EventRecord, Field};

/// Which instant of a record a [`TimeRange`] constrains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeField {
    #[default]
    CreatedAt,
    /// `created_at + duration` (see [`EventRecord::last_activity`])
    LastActivity,
}

/// Inclusive start, exclusive end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub field: TimeField,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn created_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            field: TimeField::CreatedAt,
            start,
            end: Some(end),
        }
    }

    pub fn active_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            field: TimeField::LastActivity,
            start,
            end: Some(end),
        }
    }

    pub fn contains(&self, record: &EventRecord) -> bool {
        let instant = match self.field {
            TimeField::CreatedAt => record.created_at,
            TimeField::LastActivity => record.last_activity(),
        };
        instant >= self.start && self.end.map_or(true, |end| instant < end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub domain_id: DomainId,
    pub time_range: Option<TimeRange>,
    /// Fields that must be non-null on a selected record
    pub required_fields: Vec<Field>,
}

impl Predicate {
    pub fn matches(&self, record: &EventRecord) -> bool {
        record.domain_id == self.domain_id
            && self.time_range.map_or(true, |range| range.contains(record))
            && record.has_fields(&self.required_fields)
    }
}

/// Predicate for one domain, optionally narrowed by time and required fields
pub fn scope(domain_id: DomainId, time_range: Option<TimeRange>, required_fields: &[Field]) -> Predicate {
    Predicate {
        domain_id,
        time_range,
        required_fields: required_fields.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_scope_matches() {
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = EventRecord::new(domain, "s1", t0).with(Field::OsName, "Linux");

        assert!(scope(domain, None, &[]).matches(&record));
        assert!(scope(domain, None, &[Field::OsName]).matches(&record));
        assert!(!scope(domain, None, &[Field::OsVersion]).matches(&record));
        assert!(!scope(DomainId::random(), None, &[]).matches(&record));
    }

    #[test]
    fn test_time_range_is_half_open() {
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = EventRecord::new(domain, "s1", t0);

        let range = TimeRange::created_between(t0, t0 + Duration::hours(1));
        assert!(scope(domain, Some(range), &[]).matches(&record));

        let range = TimeRange::created_between(t0 - Duration::hours(1), t0);
        assert!(!scope(domain, Some(range), &[]).matches(&record));
    }

    #[test]
    fn test_active_range_uses_last_activity() {
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = EventRecord::new(domain, "s1", t0).with_duration(600);

        let window = TimeRange::active_between(t0 + Duration::minutes(8), t0 + Duration::minutes(13));
        assert!(scope(domain, Some(window), &[]).matches(&record));

        let created = TimeRange::created_between(t0 + Duration::minutes(8), t0 + Duration::minutes(13));
        assert!(!scope(domain, Some(created), &[]).matches(&record));
    }
}
