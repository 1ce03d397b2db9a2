pub mod tag_index;
pub mod rebuild;

pub use tag_index::{IndexEntry, MemberKey, TagIndex};
pub use rebuild::RebuildReport;
