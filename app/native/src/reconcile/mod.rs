//! Keeps the running renderers in line with the configuration and the
//! connected displays.

pub mod driver;
pub mod topology;

pub use driver::{
    ApplyTarget, DriverHandle, ReconciliationDriver, Trigger, auto_assign, desired_processes,
    prepare_pass,
};
pub use topology::{
    DisplayTopology, StaticTopology, TopologyError, XrandrTopology, connected_screens,
    parse_xrandr, watch_topology,
};
