pub mod clock_refresh;
pub mod session;
pub mod workflow;

pub use clock_refresh::ClockRefresher;
pub use session::{Phase, Session, SessionSnapshot};
pub use workflow::{AnalysisOutcome, AnalysisWorkflow, MetadataUpdate};
