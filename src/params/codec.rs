//! Test parameter codec and CONTROL command bytes.
//!
//! The orchestrator only depends on [`ParamCodec`]; [`PatternCodec`] is the
//! encoding shared with the peer firmware:
//!
//! ```text
//! Byte 0    : test case
//! Byte 1    : BLE profile
//! Byte 2-5  : transfer size (u32 LE)
//! Byte 6-7  : connection interval, 1.25 ms units (u16 LE)
//! Byte 8    : PHY bit
//! Byte 9    : connection event length extension (0/1)
//! ```
//!
//! Payload byte `n` of a transfer is `n mod 256`, so any chunk can be built
//! or checked from its offset alone.

use super::{BleVersion, Phy, TestCase, TestParams, UNIT_1_25_MS};
use crate::error::Error;

/// First byte of every CONTROL write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ControlCommand {
    WriteTestParams = 0x01,
    StartTest = 0x02,
    TerminateTest = 0x03,
    /// Ask the peer to send a test notification.
    TestNotify = 0x04,
}

impl ControlCommand {
    pub const fn byte(self) -> u8 {
        self as u8
    }
}

/// What the peer answers before any test has been configured.
pub const PLACEHOLDER_PAYLOAD: &[u8] = b"TEST READ/NOTIFY";

/// Encoded length of a [`TestParams`].
pub const ENCODED_PARAMS_LEN: usize = 10;

/// Received payload did not match the expected pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadMismatch {
    /// Absolute transfer offset of the first bad byte.
    pub offset: u32,
    pub expected: u8,
    pub actual: u8,
}

/// Encoding and payload generation for benchmark runs.
pub trait ParamCodec {
    /// Write `params` into `out`, returning the encoded length.
    fn serialize(&self, params: &TestParams, out: &mut [u8]) -> Result<usize, Error>;

    /// Fill `out` with the payload starting at `offset`. Returns the chunk
    /// length, bounded by `out.len()` and the bytes remaining.
    fn build_chunk(&self, params: &TestParams, offset: u32, out: &mut [u8]) -> usize;

    /// Check a received chunk that starts at `offset`.
    fn confirm_chunk(
        &self,
        params: &TestParams,
        offset: u32,
        data: &[u8],
    ) -> Result<(), PayloadMismatch>;

    /// Diagnostic dump.
    fn print(&self, params: &TestParams) {
        info!(
            "test {} profile {:?}: {} bytes, interval {} ms, phy {:?}, evt ext {}",
            params.test_case.name(),
            params.ble_version,
            params.transfer_data_size,
            params.conn_interval,
            params.rxtx_phy,
            params.conn_evt_len_ext_enabled
        );
    }
}

/// Byte-pattern codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternCodec;

impl PatternCodec {
    pub const fn new() -> Self {
        Self
    }

    /// Expected payload byte at absolute offset.
    pub const fn pattern_byte(offset: u32) -> u8 {
        (offset & 0xFF) as u8
    }

    /// Inverse of [`ParamCodec::serialize`].
    pub fn deserialize(data: &[u8]) -> Option<TestParams> {
        if data.len() < ENCODED_PARAMS_LEN {
            return None;
        }
        let test_case = TestCase::from_u8(data[0])?;
        let ble_version = BleVersion::from_u8(data[1])?;
        let transfer_data_size = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
        let units = u16::from_le_bytes([data[6], data[7]]);
        let rxtx_phy = Phy::from_bits(data[8])?;
        Some(TestParams {
            test_case,
            ble_version,
            transfer_data_size,
            conn_interval: units as f32 * UNIT_1_25_MS as f32 / 1000.0,
            rxtx_phy,
            conn_evt_len_ext_enabled: data[9] != 0,
        })
    }
}

impl ParamCodec for PatternCodec {
    fn serialize(&self, params: &TestParams, out: &mut [u8]) -> Result<usize, Error> {
        if out.len() < ENCODED_PARAMS_LEN {
            return Err(Error::BufferOverflow);
        }
        out[0] = params.test_case as u8;
        out[1] = params.ble_version as u8;
        out[2..6].copy_from_slice(&params.transfer_data_size.to_le_bytes());
        out[6..8].copy_from_slice(&params.conn_interval_units().to_le_bytes());
        out[8] = params.rxtx_phy.bits();
        out[9] = params.conn_evt_len_ext_enabled as u8;
        Ok(ENCODED_PARAMS_LEN)
    }

    fn build_chunk(&self, params: &TestParams, offset: u32, out: &mut [u8]) -> usize {
        let remaining = params.transfer_data_size.saturating_sub(offset) as usize;
        let len = out.len().min(remaining);
        for (i, b) in out[..len].iter_mut().enumerate() {
            *b = Self::pattern_byte(offset.wrapping_add(i as u32));
        }
        len
    }

    fn confirm_chunk(
        &self,
        _params: &TestParams,
        offset: u32,
        data: &[u8],
    ) -> Result<(), PayloadMismatch> {
        for (i, &actual) in data.iter().enumerate() {
            let at = offset.wrapping_add(i as u32);
            let expected = Self::pattern_byte(at);
            if actual != expected {
                return Err(PayloadMismatch {
                    offset: at,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}
