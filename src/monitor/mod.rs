//! The four control loops: uptime, certificate scheduling, certificate
//! notification, and host monitoring.

pub mod cert;
pub mod host;
pub mod uptime;

pub use cert::{CertNotifier, CertScheduler};
pub use host::HostMonitor;
pub use uptime::UptimeMonitor;
