//! Read-side views: leaderboards, recent event feeds and joinable session
//! summaries.

pub mod reporter;

pub use reporter::{JoinableSession, LeaderboardEntry, RecentEvent, Reporter};
