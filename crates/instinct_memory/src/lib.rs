pub mod conflict;
pub mod coordinator;
pub mod emotion;
pub mod events;
pub mod injector;
pub mod observer;
pub mod profiles;
pub mod sqlite;
pub mod store;
pub mod tools;
pub mod triggers;

pub use conflict::{rank_order, Candidate, ConflictResolver};
pub use coordinator::{BehaviorEngine, TurnBoundary};
pub use emotion::{EmotionalReading, EmotionalStateTracker};
pub use events::{EventRecord, InstinctEvent, Snapshot};
pub use injector::{compose, format_entry, GuidanceDigest, GuidanceEntry, GuidanceInjector, TurnContext};
pub use observer::{
    detect_signals, Applied, AppliedDetection, Detection, DetectionKind, Observation, ObservationPipeline,
    OutcomeSignal,
};
pub use profiles::{Profile, ProfilePreset, PROFILES};
pub use sqlite::SqliteInstinctLog;
pub use store::{
    system_time, ExportFile, ExportedInstinct, InstinctStore, InstinctSummary, ListFilter, ScoredInstinct,
    TimeSource,
};
pub use tools::{register_management_tools, ManagementOp, ManagementTool};

#[cfg(test)]
mod tests;
