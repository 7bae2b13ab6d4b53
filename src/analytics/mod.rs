//! Visit analytics
//!
//! Visits are appended off the redirect path by a sharded recorder, and owner
//! rollups are recomputed from the link store on demand.

pub mod ip_extractor;
pub mod recorder;
pub mod summary;

pub use ip_extractor::extract_client_ip;
pub use recorder::VisitRecorder;
pub use summary::{summarize_owner, OwnerSummary};
