//! Benchmark test parameters.
//!
//! A [`TestParams`] describes one run: what GATT procedure to exercise,
//! how many bytes to move and which link settings to request first.

pub mod codec;

use crate::ble::ConnParams;
use crate::config::{BLE_SLAVE_LATENCY, BLE_SUP_TIMEOUT, IDLE_CONN_INTERVAL_MS};

/// GATT procedure exercised by a test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TestCase {
    /// Sentinel - nothing to run.
    Null = 0,
    Write = 1,
    WriteNoResponse = 2,
    Read = 3,
    Notify = 4,
}

impl TestCase {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TestCase::Null),
            1 => Some(TestCase::Write),
            2 => Some(TestCase::WriteNoResponse),
            3 => Some(TestCase::Read),
            4 => Some(TestCase::Notify),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TestCase::Null => "NULL",
            TestCase::Write => "WRITE",
            TestCase::WriteNoResponse => "WRITE_NO_RSP",
            TestCase::Read => "READ",
            TestCase::Notify => "NOTIFY",
        }
    }
}

/// Link profile a test emulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BleVersion {
    Ble41 = 0,
    Ble42 = 1,
    /// BLE 5 high speed (2M PHY).
    Ble5Hs = 2,
}

impl BleVersion {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(BleVersion::Ble41),
            1 => Some(BleVersion::Ble42),
            2 => Some(BleVersion::Ble5Hs),
            _ => None,
        }
    }
}

/// Radio PHY, encoded as the GAP PHY bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Phy {
    OneMbps = 0x01,
    TwoMbps = 0x02,
    Coded = 0x04,
}

impl Phy {
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn from_bits(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Phy::OneMbps),
            0x02 => Some(Phy::TwoMbps),
            0x04 => Some(Phy::Coded),
            _ => None,
        }
    }
}

/// One benchmark run.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestParams {
    pub test_case: TestCase,
    pub ble_version: BleVersion,
    /// Bytes to move before the test completes.
    pub transfer_data_size: u32,
    /// Requested connection interval (ms).
    pub conn_interval: f32,
    pub rxtx_phy: Phy,
    pub conn_evt_len_ext_enabled: bool,
}

/// Default transfer size for freshly loaded params.
const DEFAULT_TRANSFER_SIZE: u32 = 100 * 1024;

/// Default connection interval for freshly loaded params (ms).
const DEFAULT_CONN_INTERVAL_MS: f32 = 7.5;

impl TestParams {
    /// Profile defaults for `(version, case)`; callers override fields after.
    pub const fn load(ble_version: BleVersion, test_case: TestCase) -> Self {
        let (rxtx_phy, conn_evt_len_ext_enabled) = match ble_version {
            BleVersion::Ble41 => (Phy::OneMbps, false),
            BleVersion::Ble42 => (Phy::OneMbps, true),
            BleVersion::Ble5Hs => (Phy::TwoMbps, true),
        };
        Self {
            test_case,
            ble_version,
            transfer_data_size: DEFAULT_TRANSFER_SIZE,
            conn_interval: DEFAULT_CONN_INTERVAL_MS,
            rxtx_phy,
            conn_evt_len_ext_enabled,
        }
    }

    /// NULL test for the given profile.
    pub const fn null(ble_version: BleVersion) -> Self {
        Self::load(ble_version, TestCase::Null)
    }

    /// Between-tests placeholder: BLE 4.2 NULL with the idle interval.
    pub const fn idle() -> Self {
        let mut p = Self::null(BleVersion::Ble42);
        p.conn_interval = IDLE_CONN_INTERVAL_MS;
        p
    }

    pub fn is_null(&self) -> bool {
        self.test_case == TestCase::Null
    }

    /// Requested interval in 1.25 ms units.
    pub fn conn_interval_units(&self) -> u16 {
        ms_to_units(self.conn_interval, UNIT_1_25_MS)
    }

    /// Fixed-interval connection parameters for this test.
    pub fn conn_params(&self) -> ConnParams {
        let units = self.conn_interval_units();
        ConnParams {
            min_conn_interval: units,
            max_conn_interval: units,
            slave_latency: BLE_SLAVE_LATENCY,
            conn_sup_timeout: BLE_SUP_TIMEOUT,
        }
    }
}

/// 1.25 ms, in microseconds.
pub const UNIT_1_25_MS: u32 = 1250;

/// 10 ms, in microseconds.
pub const UNIT_10_MS: u32 = 10_000;

/// Convert milliseconds to stack time units (truncating).
pub fn ms_to_units(ms: f32, unit_us: u32) -> u16 {
    (ms * 1000.0 / unit_us as f32) as u16
}
