//! Button-triggered test batches.

use crate::config::{PRESET_CONN_INTERVALS_MS, PRESET_TRANSFER_SIZE};
use crate::params::{BleVersion, TestCase, TestParams};

/// User input fed to the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    Key0,
    Key1,
    Key2,
    Key3,
    /// Abort the running test.
    Terminate,
}

impl Trigger {
    /// Short press on button `idx` (0-based).
    pub const fn from_button(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Trigger::Key0),
            1 => Some(Trigger::Key1),
            2 => Some(Trigger::Key2),
            3 => Some(Trigger::Key3),
            _ => None,
        }
    }

    /// Batch queued by this trigger, `None` for [`Trigger::Terminate`].
    pub const fn preset(self) -> Option<Preset> {
        match self {
            Trigger::Key0 => Some(Preset {
                ble_version: BleVersion::Ble41,
                cases: &[TestCase::Notify],
            }),
            Trigger::Key1 => Some(Preset {
                ble_version: BleVersion::Ble41,
                cases: &[TestCase::WriteNoResponse],
            }),
            Trigger::Key2 => Some(Preset {
                ble_version: BleVersion::Ble42,
                cases: &[TestCase::Notify, TestCase::WriteNoResponse],
            }),
            Trigger::Key3 => Some(Preset {
                ble_version: BleVersion::Ble5Hs,
                cases: &[TestCase::Notify, TestCase::WriteNoResponse],
            }),
            Trigger::Terminate => None,
        }
    }
}

/// One profile swept over every preset interval, per case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preset {
    pub ble_version: BleVersion,
    pub cases: &'static [TestCase],
}

impl Preset {
    /// Tests in queue order: cases outer, intervals inner.
    pub fn tests(&self) -> impl Iterator<Item = TestParams> {
        let version = self.ble_version;
        let cases: &'static [TestCase] = self.cases;
        cases.iter().flat_map(move |&case| {
            PRESET_CONN_INTERVALS_MS.iter().map(move |&interval| {
                let mut p = TestParams::load(version, case);
                p.transfer_data_size = PRESET_TRANSFER_SIZE;
                p.conn_interval = interval;
                p.conn_evt_len_ext_enabled = true;
                p
            })
        })
    }

    pub fn len(&self) -> usize {
        self.cases.len() * PRESET_CONN_INTERVALS_MS.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Phy;
    use std::vec::Vec;

    #[test]
    fn key0_is_ble41_notify_sweep() {
        let tests: Vec<_> = Trigger::Key0.preset().unwrap().tests().collect();
        assert_eq!(tests.len(), 6);
        assert!(tests.iter().all(|t| t.test_case == TestCase::Notify
            && t.ble_version == BleVersion::Ble41
            && t.rxtx_phy == Phy::OneMbps
            && t.conn_evt_len_ext_enabled
            && t.transfer_data_size == 1024 * 1024));
        let intervals: Vec<f32> = tests.iter().map(|t| t.conn_interval).collect();
        assert_eq!(intervals, [7.5, 30.0, 75.0, 150.0, 400.0, 1000.0]);
    }

    #[test]
    fn key1_is_write_no_response() {
        let p = Trigger::Key1.preset().unwrap();
        assert_eq!(p.len(), 6);
        assert!(p.tests().all(|t| t.test_case == TestCase::WriteNoResponse));
    }

    #[test]
    fn key2_runs_notify_then_write() {
        let tests: Vec<_> = Trigger::Key2.preset().unwrap().tests().collect();
        assert_eq!(tests.len(), 12);
        assert!(tests[..6].iter().all(|t| t.test_case == TestCase::Notify));
        assert!(tests[6..].iter().all(|t| t.test_case == TestCase::WriteNoResponse));
        assert_eq!(tests[6].conn_interval, 7.5);
        assert!(tests.iter().all(|t| t.ble_version == BleVersion::Ble42));
    }

    #[test]
    fn key3_uses_2m_phy() {
        let p = Trigger::Key3.preset().unwrap();
        assert_eq!(p.len(), 12);
        assert!(p.tests().all(|t| t.rxtx_phy == Phy::TwoMbps));
    }

    #[test]
    fn terminate_has_no_batch() {
        assert!(Trigger::Terminate.preset().is_none());
    }

    #[test]
    fn buttons_map_to_keys() {
        assert_eq!(Trigger::from_button(0), Some(Trigger::Key0));
        assert_eq!(Trigger::from_button(3), Some(Trigger::Key3));
        assert_eq!(Trigger::from_button(4), None);
    }
}
