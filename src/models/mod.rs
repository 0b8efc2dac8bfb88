mod event;
mod field;

pub use event::{
    sort_chronologically, DomainId, EventRecord, InvalidRecord, MalformedDomainId, MAX_DURATION_SECS,
};
pub use field::{Field, FieldValues, UnknownField};
