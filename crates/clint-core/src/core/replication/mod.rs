//! Deciding whether, and how, a bag may be copied to another host.

mod planner;
mod probe;

pub use planner::{CopyPlan, ReplicationPlanner, SkipReason};
pub use probe::{local_size, parse_usage_table, ProbeError, RemoteProbe, VolumeUsage};
