//! Source record types
//!
//! A [`SourceRecord`] is kept as the untyped JSON object exported by the
//! source repository, so fields the crosswalk does not know about survive the
//! round trip to the archived JSON copy. The typed views ([`Person`] and
//! [`FileRef`]) are parsed leniently on demand.

mod record;

pub use record::{FileRef, Person, SourceRecord};
