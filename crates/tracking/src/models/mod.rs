mod entity;
mod row;

pub use self::entity::{GroupSummary, PositionUpdate, StaticAttributes, TrackedEntity};
pub(crate) use self::row::{EntityRow, GroupRow, unix_millis};
