//! SoftDevice S140 bindings: stack configuration, the raw event pump and
//! the [`GattTransport`] / [`Clock`] implementations.

use core::sync::atomic::Ordering;

use ble_bench_central::ble::{
    BleUuid, ConnParams, GattTransport, LowLevelEvent, Payload, PhyUpdate, WriteOp,
    CONN_HANDLE_INVALID,
};
use ble_bench_central::clock::Clock;
use ble_bench_central::config::{ATT_MTU_MAX, MAX_ATT_PAYLOAD};
use ble_bench_central::params::Phy;
use ble_bench_central::GattError;
use defmt::debug;
use embassy_time::Instant;
use nrf_softdevice::{raw, Softdevice};

use super::{DISCOVERY, DROPPED_EVENTS, EVENTS, SCAN};

/// Stack configuration: one central link with a large MTU and a deep
/// write-command queue.
pub fn sd_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 320,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: ATT_MTU_MAX,
        }),
        conn_gattc: Some(raw::ble_gattc_conn_cfg_t {
            write_cmd_tx_queue_size: 8,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 0,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        common_vs_uuid: Some(raw::ble_common_cfg_vs_uuid_t { vs_uuid_count: 4 }),
        ..Default::default()
    }
}

/// Run the SoftDevice, copying every BLE event into [`EVENTS`]. Events
/// that do not fit are counted in [`DROPPED_EVENTS`].
#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run_with_callback(|evt| {
        // SAFETY: the SoftDevice hands us a valid event for the duration
        // of the callback.
        if let Some(e) = unsafe { convert(evt) } {
            if EVENTS.try_send(e).is_err() {
                DROPPED_EVENTS.fetch_add(1, Ordering::Relaxed);
            }
        }
    })
    .await
}

fn payload(src: &[u8]) -> Payload {
    let mut p = Payload::new();
    let n = src.len().min(MAX_ATT_PAYLOAD);
    let _ = p.extend_from_slice(&src[..n]);
    p
}

/// Translate the raw events the benchmark cares about.
unsafe fn convert(evt: *const raw::ble_evt_t) -> Option<LowLevelEvent> {
    let evt = &*evt;
    let id = evt.header.evt_id as u32;
    match id {
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONNECTED => Some(LowLevelEvent::Connected {
            conn_handle: evt.evt.gap_evt.conn_handle,
        }),
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_DISCONNECTED => Some(LowLevelEvent::Disconnected {
            conn_handle: evt.evt.gap_evt.conn_handle,
            reason: evt.evt.gap_evt.params.disconnected.reason,
        }),
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_PHY_UPDATE => {
            let p = &evt.evt.gap_evt.params.phy_update;
            Some(LowLevelEvent::PhyUpdated(PhyUpdate {
                tx_phy: p.tx_phy,
                rx_phy: p.rx_phy,
            }))
        }
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_CONN_PARAM_UPDATE => {
            let p = &evt.evt.gap_evt.params.conn_param_update.conn_params;
            Some(LowLevelEvent::ConnParamsUpdated(ConnParams {
                min_conn_interval: p.min_conn_interval,
                max_conn_interval: p.max_conn_interval,
                slave_latency: p.slave_latency,
                conn_sup_timeout: p.conn_sup_timeout,
            }))
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_EXCHANGE_MTU_RSP => {
            let server = evt.evt.gattc_evt.params.exchange_mtu_rsp.server_rx_mtu;
            Some(LowLevelEvent::MtuExchanged {
                att_mtu: server.min(ATT_MTU_MAX),
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_HVX => {
            let p = &evt.evt.gattc_evt.params.hvx;
            Some(LowLevelEvent::Notification {
                handle: p.handle,
                data: payload(p.data.as_slice(p.len as usize)),
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_WRITE_RSP => {
            let p = &evt.evt.gattc_evt.params.write_rsp;
            Some(LowLevelEvent::WriteResponse {
                handle: p.handle,
                data: payload(p.data.as_slice(p.len as usize)),
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_WRITE_CMD_TX_COMPLETE => {
            Some(LowLevelEvent::WriteCmdTxComplete {
                count: evt.evt.gattc_evt.params.write_cmd_tx_complete.count,
            })
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_READ_RSP => {
            let p = &evt.evt.gattc_evt.params.read_rsp;
            Some(LowLevelEvent::ReadResponse {
                handle: p.handle,
                data: payload(p.data.as_slice(p.len as usize)),
            })
        }
        _ => None,
    }
}

/// Issues SoftDevice GATT client / GAP calls. Completions arrive through
/// [`softdevice_task`].
pub struct SdTransport;

impl GattTransport for SdTransport {
    fn add_vendor_uuid(&mut self, base: &[u8; 16]) -> Result<u8, GattError> {
        let uuid = raw::ble_uuid128_t { uuid128: *base };
        let mut uuid_type = 0u8;
        // SAFETY: both pointers are valid for the call.
        let ret = unsafe { raw::sd_ble_uuid_vs_add(&uuid, &mut uuid_type) };
        GattError::check(ret)?;
        Ok(uuid_type)
    }

    fn register_discovery(&mut self, uuid: BleUuid) -> Result<(), GattError> {
        DISCOVERY.signal(uuid);
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), GattError> {
        SCAN.signal(());
        Ok(())
    }

    fn write(
        &mut self,
        conn_handle: u16,
        handle: u16,
        op: WriteOp,
        data: &[u8],
    ) -> Result<(), GattError> {
        let write_op = match op {
            WriteOp::Request => raw::BLE_GATT_OP_WRITE_REQ,
            WriteOp::Command => raw::BLE_GATT_OP_WRITE_CMD,
        };
        let params = raw::ble_gattc_write_params_t {
            write_op: write_op as u8,
            flags: 0,
            handle,
            offset: 0,
            len: data.len() as u16,
            p_value: data.as_ptr(),
        };
        // SAFETY: the SoftDevice copies the value before returning.
        GattError::check(unsafe { raw::sd_ble_gattc_write(conn_handle, &params) })
    }

    fn read(&mut self, conn_handle: u16, handle: u16) -> Result<(), GattError> {
        GattError::check(unsafe { raw::sd_ble_gattc_read(conn_handle, handle, 0) })
    }

    fn conn_param_update(
        &mut self,
        conn_handle: u16,
        params: &ConnParams,
    ) -> Result<(), GattError> {
        let p = raw::ble_gap_conn_params_t {
            min_conn_interval: params.min_conn_interval,
            max_conn_interval: params.max_conn_interval,
            slave_latency: params.slave_latency,
            conn_sup_timeout: params.conn_sup_timeout,
        };
        let ret = if conn_handle == CONN_HANDLE_INVALID {
            // No link: store as preferred parameters for the next one.
            unsafe { raw::sd_ble_gap_ppcp_set(&p) }
        } else {
            unsafe { raw::sd_ble_gap_conn_param_update(conn_handle, &p) }
        };
        GattError::check(ret)
    }

    fn phy_update(&mut self, conn_handle: u16, phy: Phy) -> Result<(), GattError> {
        let phys = raw::ble_gap_phys_t {
            tx_phys: phy.bits(),
            rx_phys: phy.bits(),
        };
        debug!("Requesting PHY {}", phy);
        GattError::check(unsafe { raw::sd_ble_gap_phy_update(conn_handle, &phys) })
    }

    fn set_conn_evt_ext(&mut self, enabled: bool) -> Result<(), GattError> {
        let opt = raw::ble_opt_t {
            common_opt: raw::ble_common_opt_t {
                conn_evt_ext: raw::ble_common_opt_conn_evt_ext_t {
                    _bitfield_align_1: [],
                    _bitfield_1: raw::ble_common_opt_conn_evt_ext_t::new_bitfield_1(
                        enabled as u8,
                    ),
                },
            },
        };
        GattError::check(unsafe {
            raw::sd_ble_opt_set(raw::BLE_COMMON_OPTS_BLE_COMMON_OPT_CONN_EVT_EXT, &opt)
        })
    }
}

/// Milliseconds since boot from the embassy time driver.
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }
}
