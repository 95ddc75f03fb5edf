pub mod allowlist;
mod cache;
pub mod coalesce;
mod refresher;

pub use allowlist::is_allowlisted;
pub use cache::{normalize_domain, ReconcileSummary, ReputationCache};
pub use coalesce::{Coalesced, RequestCoalescer};
pub use refresher::Refresher;
