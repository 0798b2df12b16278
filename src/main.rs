//! Firmware entry point for the nRF52840-DK.
//!
//! Task layout:
//!
//! ```text
//!   softdevice_task ──raw events──▶ EVENTS ──▶ bench_task ◀── TRIGGERS ◀── button_task ×4
//!                                     ▲             │
//!   central_task ──DiscoveryComplete──┘             └── SCAN / DISCOVERY ──▶ central_task
//! ```

#![no_std]
#![no_main]

mod board;

use defmt::info;
use embassy_executor::Spawner;
use embassy_nrf::gpio::Pin;
use embassy_nrf::interrupt::Priority;
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;

use defmt_rtt as _;
use panic_probe as _;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("BLE throughput central starting");

    // SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    let sd = Softdevice::enable(&board::softdevice::sd_config());
    spawner.must_spawn(board::softdevice::softdevice_task(sd));

    static BENCH: StaticCell<board::Bench> = StaticCell::new();
    // First tick registers the service and requests scanning.
    let bench = BENCH.init(board::new_bench());

    spawner.must_spawn(board::central::central_task(sd));
    spawner.must_spawn(board::bench_task(bench));

    spawner.must_spawn(board::buttons::button_task(p.P0_11.degrade(), 0));
    spawner.must_spawn(board::buttons::button_task(p.P0_12.degrade(), 1));
    spawner.must_spawn(board::buttons::button_task(p.P0_24.degrade(), 2));
    spawner.must_spawn(board::buttons::button_task(p.P0_25.degrade(), 3));

    info!("All tasks spawned");
}
