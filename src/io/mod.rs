//! JSON external interfaces (spec §6 "External interfaces"). Kept as two
//! small, independent loaders rather than one generic "config" layer,
//! matching the way the rest of the crate keeps concerns in separate
//! modules (platform vs. workload).

pub mod platform_io;
pub mod scenario;

pub use platform_io::load_platform;
pub use scenario::Scenario;
