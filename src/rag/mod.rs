pub mod sqlite;
pub mod store;

pub use sqlite::SqliteVectorIndex;
pub use store::{Passage, ScoredPassage, VectorIndex};
