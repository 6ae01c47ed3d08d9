mod map_content;
mod relationship;
mod session;
mod trust_level;

pub use map_content::MapContent;
pub use relationship::{Relationship, RelationshipRecord, ScorePair};
pub use session::{DemoItem, Session, SessionError, Step, MAX_RELATIONSHIPS, MIN_RELATIONSHIPS};
pub use trust_level::TrustLevel;
