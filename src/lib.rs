//! Phishing-domain lookups backed by a locally synchronized reputation cache.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod init;
pub mod remote;
pub mod scanner;
pub mod stats;

pub use client::{YachtsClient, YachtsClientBuilder, MAX_RECENT_SECONDS};
pub use config::{Config, StorageMode};
pub use error::{Error, Result};
pub use remote::{ChangeEvent, ChangeKind};
