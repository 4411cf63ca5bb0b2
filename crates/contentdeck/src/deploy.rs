//! Deploy completion monitoring.
//!
//! After content is committed the hosting platform rebuilds the site. The
//! [`DeployCompletionMonitor`] polls a status endpoint with capped exponential
//! backoff and treats a deploy as done only once the live site's version
//! marker differs from the one captured before the commit.

mod backoff;
mod error;
mod monitor;
mod progress;
mod source;

pub use backoff::{BACKOFF_FACTOR, Backoff};
pub use error::{MonitorError, SourceError};
pub use monitor::{
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MONITOR_TIMEOUT,
    DeployCompletionMonitor, MonitorConfig, MonitorOutcome,
};
pub use progress::{DeployEvent, DeployEventCallback, emit};
pub use source::{
    DeployStatus, DeployStatusSource, HttpDeployStatus, HttpSiteVersion, SiteVersionSource,
    extract_version,
};
