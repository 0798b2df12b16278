//! Test orchestration.
//!
//! A non-blocking state machine that sequences self-tests, link parameter
//! negotiation and throughput runs on top of a [`TestLink`]. It is driven
//! from two directions:
//!
//! - [`Orchestrator::update`] is called on every tick and advances at most
//!   one state.
//! - [`Orchestrator::event`] is called for every radio event, in arrival
//!   order, between ticks.
//!
//! Waits are explicit states ([`State::WriteWait`], [`State::Delay`], ...);
//! what to do afterwards is kept on a bounded continuation deque.
//!
//! [`TestLink`]: crate::ble::TestLink

pub mod machine;
pub mod presets;
pub mod queue;
pub mod report;

pub use machine::Orchestrator;
pub use presets::Trigger;
pub use report::TestReport;

/// Orchestrator states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Init,
    Idle,
    /// Write a test notification request to CONTROL.
    WriteSelfTest,
    /// Read DATA once.
    ReadSelfTest,
    TestInit,
    /// Waiting for both conn-param and PHY confirmations.
    TestWaitParams,
    TestInit2,
    TestStart,
    TestRun,
    WriteWait,
    ReadWait,
    /// Reserved, never entered by the machine itself.
    NotifyWait,
    Delay,
    TestComplete,
    TestTerminate,
}

/// Core status bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags {
    pub connected: bool,
    pub test_running: bool,
    pub conn_param_updated: bool,
    pub phy_updated: bool,
    pub terminate_requested: bool,
}

/// Non-blocking delay, checked on every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DelayTimer {
    pub start_ms: u32,
    pub duration_ms: u32,
}

impl DelayTimer {
    pub fn arm(&mut self, now_ms: u32, duration_ms: u32) {
        self.start_ms = now_ms;
        self.duration_ms = duration_ms;
    }

    /// Strictly more than the duration has passed.
    pub fn expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.start_ms) > self.duration_ms
    }
}
