//! Central side of a BLE throughput benchmark.
//!
//! Everything in this library is hardware-independent and runs on the
//! host: the radio sits behind [`ble::GattTransport`], time behind
//! [`clock::Clock`]. The nRF52840 firmware in `main.rs` supplies the
//! SoftDevice-backed implementations.
//!
//! Usage: `cargo test` on the host, `cargo run --release --features
//! embedded --target thumbv7em-none-eabihf` for the board.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

// ═══════════════════════════════════════════════════════════════════════════
// Foundation
// ═══════════════════════════════════════════════════════════════════════════

pub mod clock;
pub mod config;
pub mod error;

pub use fmt::Hex;

// ═══════════════════════════════════════════════════════════════════════════
// Test parameters & BLE client
// ═══════════════════════════════════════════════════════════════════════════

pub mod ble;
pub mod params;

// ═══════════════════════════════════════════════════════════════════════════
// Orchestration
// ═══════════════════════════════════════════════════════════════════════════

pub mod bench;

pub use bench::{Orchestrator, State, TestReport, Trigger};
pub use error::{Error, GattError};
