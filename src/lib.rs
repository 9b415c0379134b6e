mod acquisition;
mod backup;
mod clock;
mod config;
mod db;
mod error;
mod link;
mod protocol;
mod services;
mod utils;

pub use acquisition::{acquisition_loop, AcquisitionSchedule};
pub use backup::{backup_loop, BackupOrchestrator, RetentionState};
pub use clock::{Clock, SystemClock};
pub use config::{DeviceConfig, GeoPosition, RetentionConfig};
pub use db::{Database, Reading};
pub use error::{ConfigError, DecodeError, ServiceControlError, TransportError};
pub use link::SensorLink;
pub use protocol::{Measurements, SensorModel};
pub use services::{ServiceController, SystemdServiceController};
