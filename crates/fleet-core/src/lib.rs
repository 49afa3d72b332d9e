pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{parse_duration, Cloud, ConfigError, Environment, SystemName, Zone, ZoneConfig};
pub use types::*;
