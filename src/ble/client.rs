//! GATT client for the vendor test service.
//!
//! Owns the connection handle and the characteristic table, validates
//! every outgoing GATT operation, and turns raw radio events into
//! [`CoreEvent`]s. Events for handles outside the test service never reach
//! the state machine.

use crate::ble::char_table::{CharEntry, CharTable, CONTROL, DATA, NOT_FOUND};
use crate::ble::{
    BleUuid, CharData, ConnParams, CoreEvent, DiscoveredService, GattTransport, LowLevelEvent,
    TestLink, WriteOp, CONN_HANDLE_INVALID,
};
use crate::config::{
    ATT_HEADER_LEN, ATT_MTU_DEFAULT, CONTROL_CHAR_UUID, DATA_CHAR_UUID, TEST_SERVICE_UUID,
    TEST_SERVICE_UUID_BASE,
};
use crate::error::{Error, GattError};
use crate::fmt::Hex;
use crate::params::Phy;

/// CCCD value enabling notifications.
const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];

/// Client side of the test service, generic over the radio.
pub struct TestServiceClient<T> {
    transport: T,
    conn_handle: u16,
    service_uuid: BleUuid,
    control_uuid: BleUuid,
    data_uuid: BleUuid,
    chars: CharTable,
    att_mtu: u16,
}

impl<T: GattTransport> TestServiceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            conn_handle: CONN_HANDLE_INVALID,
            service_uuid: BleUuid {
                uuid: TEST_SERVICE_UUID,
                uuid_type: 0,
            },
            control_uuid: BleUuid {
                uuid: CONTROL_CHAR_UUID,
                uuid_type: 0,
            },
            data_uuid: BleUuid {
                uuid: DATA_CHAR_UUID,
                uuid_type: 0,
            },
            chars: CharTable::new(),
            att_mtu: ATT_MTU_DEFAULT,
        }
    }

    /// Allocate the vendor UUID bases and register the service for
    /// discovery.
    pub fn init(&mut self) -> Result<(), Error> {
        for uuid in [
            &mut self.service_uuid,
            &mut self.control_uuid,
            &mut self.data_uuid,
        ] {
            match self.transport.add_vendor_uuid(&TEST_SERVICE_UUID_BASE) {
                Ok(ty) => uuid.uuid_type = ty,
                Err(e) => {
                    error!("Failed to add vendor UUID ({:?})", e);
                    return Err(Error::UuidRegistration(e));
                }
            }
        }

        self.conn_handle = CONN_HANDLE_INVALID;

        self.transport
            .register_discovery(self.service_uuid)
            .map_err(|e| {
                error!("Failed to register service for discovery ({:?})", e);
                Error::DiscoveryRegistration(e)
            })
    }

    /// Populate the characteristic table from a discovery result.
    ///
    /// Returns [`CoreEvent::DiscoveryDone`] once the test service has been
    /// processed, `None` for any other service.
    pub fn on_discovery_complete(&mut self, svc: &DiscoveredService) -> Option<CoreEvent<'static>> {
        info!(
            "Discovery of service 0x{:04x} complete, {} chars",
            svc.uuid.uuid,
            svc.chars.len()
        );
        if svc.uuid != self.service_uuid {
            return None;
        }

        self.conn_handle = svc.conn_handle;

        for c in svc.chars.iter() {
            debug!(
                "Characteristic 0x{:04x} handle 0x{:04x}",
                c.uuid.uuid, c.value_handle
            );
            let entry = CharEntry {
                value_handle: c.value_handle,
                cccd_handle: c.cccd_handle,
                uuid: c.uuid.uuid,
            };
            if c.uuid == self.control_uuid {
                self.chars.set(CONTROL, entry);
            } else if c.uuid == self.data_uuid {
                self.chars.set(DATA, entry);
                self.enable_notifications(c.cccd_handle);
            } else {
                info!(
                    "Unknown characteristic 0x{:04x} type {}",
                    c.uuid.uuid, c.uuid.uuid_type
                );
            }
        }

        Some(CoreEvent::DiscoveryDone)
    }

    /// Completion arrives later as a write response on the CCCD handle.
    fn enable_notifications(&mut self, cccd_handle: u16) {
        debug!("Configuring CCCD 0x{:04x}", cccd_handle);
        if let Err(e) =
            self.transport
                .write(self.conn_handle, cccd_handle, WriteOp::Request, &CCCD_NOTIFY)
        {
            error!("Write to CCCD failed ({:?})", e);
        }
    }

    fn issue_write(&mut self, char_idx: u8, data: &[u8], op: WriteOp) -> Result<(), GattError> {
        let handle = self
            .chars
            .value_handle(char_idx)
            .ok_or(GattError::InvalidParameter)?;

        if data.len() > self.max_payload_len() {
            error!("Data length too long: {}", data.len());
            return Err(GattError::InvalidParameter);
        }
        if self.conn_handle == CONN_HANDLE_INVALID {
            error!("Connection handle invalid");
            return Err(GattError::InvalidState);
        }

        trace!(
            "Writing {} bytes to handle 0x{:04x} ({:?})",
            data.len(),
            handle,
            op
        );
        self.transport.write(self.conn_handle, handle, op, data)
    }

    pub fn write(&mut self, char_idx: u8, data: &[u8]) -> Result<(), GattError> {
        self.issue_write(char_idx, data, WriteOp::Request)
    }

    pub fn write_no_response(&mut self, char_idx: u8, data: &[u8]) -> Result<(), GattError> {
        self.issue_write(char_idx, data, WriteOp::Command)
    }

    pub fn read(&mut self, char_idx: u8) -> Result<(), GattError> {
        let handle = self
            .chars
            .value_handle(char_idx)
            .ok_or(GattError::InvalidParameter)?;

        if self.conn_handle == CONN_HANDLE_INVALID {
            error!("Connection handle invalid");
            return Err(GattError::InvalidState);
        }

        self.transport.read(self.conn_handle, handle)
    }

    pub fn set_connection_parameters(&mut self, params: &ConnParams) -> Result<(), GattError> {
        self.transport.conn_param_update(self.conn_handle, params)
    }

    /// MTU minus the ATT opcode and handle.
    pub fn max_payload_len(&self) -> usize {
        self.att_mtu.saturating_sub(ATT_HEADER_LEN) as usize
    }

    pub fn conn_handle(&self) -> u16 {
        self.conn_handle
    }

    pub fn char_table(&self) -> &CharTable {
        &self.chars
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Map a raw radio event onto the core's event set.
    pub fn translate_event<'a>(&mut self, evt: &'a LowLevelEvent) -> Option<CoreEvent<'a>> {
        match evt {
            LowLevelEvent::Connected { conn_handle } => {
                self.conn_handle = *conn_handle;
                self.att_mtu = ATT_MTU_DEFAULT;
                Some(CoreEvent::Connected)
            }
            LowLevelEvent::Disconnected { reason, .. } => {
                debug!("Link lost (reason 0x{:02x})", reason);
                self.conn_handle = CONN_HANDLE_INVALID;
                self.chars.clear();
                Some(CoreEvent::Disconnected)
            }
            LowLevelEvent::PhyUpdated(p) => Some(CoreEvent::PhyUpdated(*p)),
            LowLevelEvent::ConnParamsUpdated(p) => Some(CoreEvent::ConnParamsUpdated(*p)),
            LowLevelEvent::MtuExchanged { att_mtu } => {
                info!("ATT MTU {}", att_mtu);
                self.att_mtu = (*att_mtu).max(ATT_MTU_DEFAULT);
                None
            }
            LowLevelEvent::DiscoveryComplete(svc) => self.on_discovery_complete(svc),
            LowLevelEvent::Notification { handle, data } => self
                .resolve(*handle, data, "notification")
                .map(CoreEvent::NotifyReceived),
            LowLevelEvent::WriteResponse { handle, data } => self
                .resolve(*handle, data, "write")
                .map(CoreEvent::WriteDone),
            LowLevelEvent::WriteCmdTxComplete { count } => {
                Some(CoreEvent::WriteNoResponseDone { count: *count })
            }
            LowLevelEvent::ReadResponse { handle, data } => self
                .resolve(*handle, data, "read")
                .map(CoreEvent::ReadDone),
        }
    }

    fn resolve<'a>(&self, handle: u16, data: &'a [u8], what: &str) -> Option<CharData<'a>> {
        let char_id = self.chars.lookup(handle);
        if char_id == NOT_FOUND {
            error!(
                "Unknown handle for {}: 0x{:04x} [{}]",
                what,
                handle,
                Hex(data)
            );
            return None;
        }
        Some(CharData {
            char_id,
            uuid: self.chars.uuid_of(handle),
            data,
        })
    }
}

impl<T: GattTransport> TestLink for TestServiceClient<T> {
    fn init(&mut self) -> Result<(), Error> {
        TestServiceClient::init(self)
    }

    fn start_scan(&mut self) -> Result<(), GattError> {
        self.transport.start_scan()
    }

    fn write(&mut self, char_idx: u8, data: &[u8]) -> Result<(), GattError> {
        TestServiceClient::write(self, char_idx, data)
    }

    fn write_no_response(&mut self, char_idx: u8, data: &[u8]) -> Result<(), GattError> {
        TestServiceClient::write_no_response(self, char_idx, data)
    }

    fn read(&mut self, char_idx: u8) -> Result<(), GattError> {
        TestServiceClient::read(self, char_idx)
    }

    fn set_connection_parameters(&mut self, params: &ConnParams) -> Result<(), GattError> {
        TestServiceClient::set_connection_parameters(self, params)
    }

    fn set_phy(&mut self, phy: Phy) -> Result<(), GattError> {
        self.transport.phy_update(self.conn_handle, phy)
    }

    fn set_conn_evt_ext(&mut self, enabled: bool) -> Result<(), GattError> {
        self.transport.set_conn_evt_ext(enabled)
    }

    fn max_data_len(&self) -> usize {
        self.max_payload_len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
