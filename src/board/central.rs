//! Central link management: scan for a peer advertising the test service,
//! connect, exchange MTU, discover, then hold the link until it drops.
//!
//! Everything the orchestrator needs to know arrives through [`EVENTS`];
//! this task only drives procedures the SoftDevice wrapper owns.

use ble_bench_central::ble::adv_parser::{
    contains_service_uuid128, extract_device_name, uuid128_from_base,
};
use ble_bench_central::ble::{BleUuid, DiscoveredChar, DiscoveredService, LowLevelEvent};
use ble_bench_central::config::{
    self, ATT_MTU_MAX, CONTROL_CHAR_UUID, DATA_CHAR_UUID, MAX_ATT_PAYLOAD,
    TEST_SERVICE_UUID, TEST_SERVICE_UUID_BASE,
};
use defmt::{info, warn};
use embassy_time::{Duration, Timer};
use heapless::Vec;
use nrf_softdevice::ble::{central, gatt_client, Address, Connection};
use nrf_softdevice::{raw, Softdevice};

use super::{DISCOVERY, EVENTS, SCAN};

/// Pause before scanning again after a failed attempt (ms).
const RETRY_DELAY_MS: u64 = 500;

/// Test service as seen by the SoftDevice discovery procedure.
#[nrf_softdevice::gatt_client(uuid = "00001400-6b1f-4d7c-9a3e-5a5d2c7e1b40")]
pub struct TestServiceRawClient {
    /// Test parameters and start / terminate commands.
    #[characteristic(uuid = "00001401-6b1f-4d7c-9a3e-5a5d2c7e1b40", read, write, notify)]
    pub control: Vec<u8, MAX_ATT_PAYLOAD>,

    /// Benchmark payload.
    #[characteristic(
        uuid = "00001402-6b1f-4d7c-9a3e-5a5d2c7e1b40",
        read,
        write,
        write_without_response,
        notify
    )]
    pub data: Vec<u8, MAX_ATT_PAYLOAD>,
}

/// Handles found by discovery, in the shape the test service client expects.
fn discovered(conn_handle: u16, svc: BleUuid, client: &TestServiceRawClient) -> DiscoveredService {
    let alias = |uuid| BleUuid {
        uuid,
        uuid_type: svc.uuid_type,
    };
    let mut chars = Vec::new();
    let _ = chars.push(DiscoveredChar {
        uuid: alias(CONTROL_CHAR_UUID),
        value_handle: client.control_value_handle,
        cccd_handle: client.control_cccd_handle,
    });
    let _ = chars.push(DiscoveredChar {
        uuid: alias(DATA_CHAR_UUID),
        value_handle: client.data_value_handle,
        cccd_handle: client.data_cccd_handle,
    });
    DiscoveredService {
        conn_handle,
        uuid: svc,
        chars,
    }
}

/// Scan until a peer advertising the test service shows up.
async fn find_peer(sd: &Softdevice) -> Option<Address> {
    let service = uuid128_from_base(&TEST_SERVICE_UUID_BASE, TEST_SERVICE_UUID);
    let config = central::ScanConfig {
        active: true,
        ..Default::default()
    };

    let result = central::scan(sd, &config, |params| {
        let data =
            unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
        if !contains_service_uuid128(data, &service) {
            return None;
        }
        info!(
            "Found {} (RSSI {})",
            extract_device_name(data).as_str(),
            params.rssi
        );
        Some(Address::from_raw(params.peer_addr))
    })
    .await;

    match result {
        Ok(address) => Some(address),
        Err(_) => {
            warn!("BLE scan ended with error");
            None
        }
    }
}

async fn connect(sd: &Softdevice, address: &Address) -> Option<Connection> {
    let whitelist = [address];
    let conn_cfg = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
            max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
            slave_latency: config::BLE_SLAVE_LATENCY,
            conn_sup_timeout: config::BLE_SUP_TIMEOUT,
        },
        ..Default::default()
    };

    match central::connect(sd, &conn_cfg).await {
        Ok(conn) => Some(conn),
        Err(_) => {
            warn!("Connection attempt failed");
            None
        }
    }
}

/// One connection lifetime. Returns once the link is gone.
async fn run_link(sd: &Softdevice, service: BleUuid) {
    let Some(address) = find_peer(sd).await else {
        return;
    };
    let Some(conn) = connect(sd, &address).await else {
        return;
    };
    let Some(conn_handle) = conn.handle() else {
        return;
    };
    info!("Connected, handle {}", conn_handle);

    if gatt_client::att_mtu_exchange(&conn, ATT_MTU_MAX).await.is_err() {
        warn!("MTU exchange failed, staying at default");
    }

    let client: TestServiceRawClient = match gatt_client::discover(&conn).await {
        Ok(client) => client,
        Err(_) => {
            warn!("Test service not found, disconnecting");
            let _ = conn.disconnect();
            return;
        }
    };

    EVENTS
        .send(LowLevelEvent::DiscoveryComplete(discovered(
            conn_handle,
            service,
            &client,
        )))
        .await;

    // Notifications reach the orchestrator through the raw event pump;
    // this only keeps the link alive until the peer goes away.
    let _ = gatt_client::run(&conn, &client, |_| {}).await;
    info!("Link closed");
}

/// Waits for the orchestrator to request scanning, then keeps a link up
/// for as long as the firmware runs.
#[embassy_executor::task]
pub async fn central_task(sd: &'static Softdevice) -> ! {
    let service = DISCOVERY.wait().await;
    SCAN.wait().await;
    info!("Scanning for test service peers");

    loop {
        run_link(sd, service).await;
        Timer::after(Duration::from_millis(RETRY_DELAY_MS)).await;
    }
}
