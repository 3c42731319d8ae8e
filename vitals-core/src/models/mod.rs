pub mod evaluation;
pub mod event;
pub mod record;
pub mod session;

pub use evaluation::{EvaluationResult, RecordDigest};
pub use event::{EventContent, EventType, Metadata, TraceEvent};
pub use record::ClientRecord;
pub use session::{Session, SessionSummary};
