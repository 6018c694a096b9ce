//! acape: adaptive latency targets for `fq_codel`
// (c) 2024 Ross Younger

//! Watches the packet drop counter of a network interface's root queueing discipline and
//! tightens the codel latency target while the interface is congested, relaxing it again
//! once the drops subside.
//!
//! The control loop lives in [`controller`]; it talks to the system only through the
//! [`qdisc::SignalSource`] and [`qdisc::Actuator`] traits.

mod cli;
pub use cli::cli;
pub mod config;
pub mod controller;
/// OS abstraction layer
pub mod os;
pub mod qdisc;
/// Utilities
pub mod util;

#[doc(hidden)]
pub use derive_deftly;
