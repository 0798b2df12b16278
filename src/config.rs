//! Application-wide constants and compile-time configuration.
//!
//! Timing parameters, queue capacities, protocol constants and the
//! retry policy live here so they can be tuned in one place.

// BLE link defaults

/// Connection interval range requested outside of a test (in 1.25 ms units).
/// 6 = 7.5 ms, 24 = 30 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 24;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Interval requested between tests. Never matches a preset, so a late
/// confirmation for it cannot satisfy the next test's wait.
pub const IDLE_CONN_INTERVAL_MS: f32 = 999.9;

// ATT

/// Default ATT MTU before any exchange.
pub const ATT_MTU_DEFAULT: u16 = 23;

/// ATT MTU requested by the central.
pub const ATT_MTU_MAX: u16 = 247;

/// Opcode (1) + attribute handle (2).
pub const ATT_HEADER_LEN: u16 = 3;

/// Largest GATT value we ever carry in an event.
pub const MAX_ATT_PAYLOAD: usize = (ATT_MTU_MAX - ATT_HEADER_LEN) as usize;

/// Scratch buffer used to build outgoing writes.
pub const TX_BUFFER_LEN: usize = 255;

// Test service (vendor-specific 128-bit base, 16-bit aliases at bytes 12..14)

/// `0000xxxx-6b1f-4d7c-9a3e-5a5d2c7e1b40`, little-endian.
pub const TEST_SERVICE_UUID_BASE: [u8; 16] = [
    0x40, 0x1b, 0x7e, 0x2c, 0x5d, 0x5a, 0x3e, 0x9a, 0x7c, 0x4d, 0x1f, 0x6b, 0x00, 0x00, 0x00, 0x00,
];
pub const TEST_SERVICE_UUID: u16 = 0x1400;
pub const CONTROL_CHAR_UUID: u16 = 0x1401;
pub const DATA_CHAR_UUID: u16 = 0x1402;

// Orchestration

/// Capacity of the pending test queue.
pub const MAX_QUEUED_TESTS: usize = 100;

/// Capacity of the state continuation deque.
pub const STATE_STACK_DEPTH: usize = 16;

/// Pause after both link parameters are confirmed (ms).
pub const PARAM_SETTLE_MS: u32 = 50;

/// Pause between the parameter write and the start command (ms).
pub const TEST_START_DELAY_MS: u32 = 2000;

/// Back-off used for `Busy` control writes and reads (ms).
pub const BUSY_RETRY_MS: u32 = 10;

/// State machine tick period on target (ms).
pub const TICK_INTERVAL_MS: u64 = 1;

// Presets

/// Bytes transferred by each preset test.
pub const PRESET_TRANSFER_SIZE: u32 = 1024 * 1024;

/// Connection intervals swept by each preset batch (ms).
pub const PRESET_CONN_INTERVALS_MS: [f32; 6] = [7.5, 30.0, 75.0, 150.0, 400.0, 1000.0];

// GPIO (nRF52840-DK)
//
//   Button 1 → P0.11    Button 2 → P0.12
//   Button 3 → P0.24    Button 4 → P0.25

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Hold time that turns a press into a terminate request (ms).
pub const BUTTON_LONG_PRESS_MS: u64 = 1000;

/// What to do when the stack reports transient back-pressure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Backoff {
    /// Stay in the same state and reissue on the next tick.
    Immediate,
    /// Reissue after a non-blocking delay (ms).
    Delay(u32),
    /// Wait for the in-flight write to complete, then reissue.
    AwaitCompletion,
}

/// Retry flavour per operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Writes to the CONTROL characteristic (params/start/terminate).
    pub control: Backoff,
    /// Benchmark data writes (with and without response).
    pub data_write: Backoff,
    /// Benchmark reads.
    pub read: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            control: Backoff::Delay(BUSY_RETRY_MS),
            data_write: Backoff::AwaitCompletion,
            read: Backoff::Delay(BUSY_RETRY_MS),
        }
    }
}
