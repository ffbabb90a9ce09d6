#[cfg(feature = "http")]
pub mod api;
pub mod clock;
pub mod config;
pub mod day;
pub mod duration;
pub mod error;
pub mod session;
pub mod settings;
pub mod staleness;

pub use day::{resolve_logical_day, today, DayStartTime, LogicalDay};
pub use error::RemoteError;
pub use session::{SessionLoader, SessionSnapshot};
pub use settings::DayStartSettingCache;
