//! Bluetooth Low Energy subsystem.
//!
//! The benchmark runs in **Central** role against a peer exposing the
//! vendor test service:
//!
//! 1. **Advertisement filter** - recognises peers advertising the test
//!    service UUID.
//! 2. **Characteristic table** - maps raw attribute handles back to the
//!    logical CONTROL / DATA characteristics.
//! 3. **Test service client** - validates and issues GATT writes/reads and
//!    turns raw radio events into [`CoreEvent`]s for the state machine.
//!
//! The radio itself sits behind [`GattTransport`]; the firmware provides a
//! SoftDevice implementation, tests provide mocks.

pub mod adv_parser;
pub mod char_table;
pub mod client;

use crate::config::MAX_ATT_PAYLOAD;
use crate::error::{Error, GattError};
use crate::params::Phy;
use heapless::Vec;

/// No connection.
pub const CONN_HANDLE_INVALID: u16 = 0xFFFF;

/// Attribute value carried by an event.
pub type Payload = Vec<u8, MAX_ATT_PAYLOAD>;

/// Characteristics tracked per discovered service.
pub const MAX_DISCOVERED_CHARS: usize = 4;

/// 16-bit UUID alias plus the stack's UUID base type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BleUuid {
    pub uuid: u16,
    pub uuid_type: u8,
}

/// GAP connection parameters, in stack units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    /// 1.25 ms units.
    pub min_conn_interval: u16,
    /// 1.25 ms units.
    pub max_conn_interval: u16,
    pub slave_latency: u16,
    /// 10 ms units.
    pub conn_sup_timeout: u16,
}

/// PHYs in use after a PHY update procedure (GAP PHY bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyUpdate {
    pub tx_phy: u8,
    pub rx_phy: u8,
}

/// GATT write flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOp {
    /// Write request, acknowledged by a write response.
    Request,
    /// Write command (without response).
    Command,
}

/// One characteristic reported by service discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredChar {
    pub uuid: BleUuid,
    pub value_handle: u16,
    /// 0 when the characteristic has no CCCD.
    pub cccd_handle: u16,
}

/// Result of a completed service discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveredService {
    pub conn_handle: u16,
    pub uuid: BleUuid,
    pub chars: Vec<DiscoveredChar, MAX_DISCOVERED_CHARS>,
}

/// Raw radio events, as copied out of the stack's event buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LowLevelEvent {
    Connected { conn_handle: u16 },
    Disconnected { conn_handle: u16, reason: u8 },
    PhyUpdated(PhyUpdate),
    ConnParamsUpdated(ConnParams),
    /// ATT MTU agreed with the peer.
    MtuExchanged { att_mtu: u16 },
    DiscoveryComplete(DiscoveredService),
    Notification { handle: u16, data: Payload },
    WriteResponse { handle: u16, data: Payload },
    WriteCmdTxComplete { count: u8 },
    ReadResponse { handle: u16, data: Payload },
}

/// Payload of a resolved data event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharData<'a> {
    /// Logical index, possibly tagged with [`char_table::CCCD_BIT`].
    pub char_id: u8,
    pub uuid: u16,
    pub data: &'a [u8],
}

/// Events consumed by the orchestration state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreEvent<'a> {
    Connected,
    Disconnected,
    /// Test service found and characteristic table populated.
    DiscoveryDone,
    WriteDone(CharData<'a>),
    WriteNoResponseDone { count: u8 },
    ReadDone(CharData<'a>),
    NotifyReceived(CharData<'a>),
    ConnParamsUpdated(ConnParams),
    PhyUpdated(PhyUpdate),
}

/// Non-blocking radio primitives. Completions arrive later as
/// [`LowLevelEvent`]s.
pub trait GattTransport {
    /// Register a vendor 128-bit UUID base, returning its type index.
    fn add_vendor_uuid(&mut self, base: &[u8; 16]) -> Result<u8, GattError>;

    /// Ask the discovery layer to look for `uuid` on every connection.
    fn register_discovery(&mut self, uuid: BleUuid) -> Result<(), GattError>;

    /// Begin scanning for a peer.
    fn start_scan(&mut self) -> Result<(), GattError>;

    fn write(
        &mut self,
        conn_handle: u16,
        handle: u16,
        op: WriteOp,
        data: &[u8],
    ) -> Result<(), GattError>;

    fn read(&mut self, conn_handle: u16, handle: u16) -> Result<(), GattError>;

    fn conn_param_update(&mut self, conn_handle: u16, params: &ConnParams)
        -> Result<(), GattError>;

    fn phy_update(&mut self, conn_handle: u16, phy: Phy) -> Result<(), GattError>;

    /// Toggle connection event length extension.
    fn set_conn_evt_ext(&mut self, enabled: bool) -> Result<(), GattError>;
}

/// What the orchestration state machine needs from the test service.
pub trait TestLink {
    fn init(&mut self) -> Result<(), Error>;
    fn start_scan(&mut self) -> Result<(), GattError>;
    fn write(&mut self, char_idx: u8, data: &[u8]) -> Result<(), GattError>;
    fn write_no_response(&mut self, char_idx: u8, data: &[u8]) -> Result<(), GattError>;
    fn read(&mut self, char_idx: u8) -> Result<(), GattError>;
    fn set_connection_parameters(&mut self, params: &ConnParams) -> Result<(), GattError>;
    fn set_phy(&mut self, phy: Phy) -> Result<(), GattError>;
    fn set_conn_evt_ext(&mut self, enabled: bool) -> Result<(), GattError>;
    /// Largest value a single write may carry.
    fn max_data_len(&self) -> usize;
}
