pub mod attendance;
pub mod base;
pub mod sabha_centers;
pub mod sabhas;
pub mod selection;
pub mod youths;

// Re-export the stores so code outside can do
// "use crate::store::{YouthStore, ChapterSelection};"
pub use attendance::AttendanceStore;
pub use base::{ListCache, StoreState};
pub use sabha_centers::SabhaCenterStore;
pub use sabhas::SabhaStore;
pub use selection::{ChapterSelection, ChapterSelector, CurrentSabha};
pub use youths::YouthStore;
