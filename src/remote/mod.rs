pub mod http;
pub mod types;

pub use self::http::HttpRemote;
pub use self::types::{ChangeEvent, ChangeKind, ReputationRemote, IDENTITY_HEADER};
