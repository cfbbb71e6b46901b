//! Peer scouting for blockchain nodes.
//!
//! Asks a peer directory for live peers of a network, keeps the ones located
//! in the wanted countries that answer fast enough, and retries with fresh
//! candidates until enough are found or the attempt budget runs out.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod network;
pub mod output;
pub mod scout;
pub mod types;

pub use config::Config;
pub use error::{AppError, SearchError};
pub use evaluator::{evaluate, RejectReason, Verdict};
pub use scout::{PeerScout, ScoutSettings};
pub use types::{CountryCode, PeerAssessment, PeerCandidate, SearchCriteria, SearchResult, SearchStatus};
