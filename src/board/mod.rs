//! nRF52840-DK wiring: SoftDevice transport, central link task, buttons
//! and the task that owns the orchestrator.

pub mod buttons;
pub mod central;
pub mod softdevice;

use ble_bench_central::ble::client::TestServiceClient;
use ble_bench_central::ble::{BleUuid, LowLevelEvent};
use ble_bench_central::config::TICK_INTERVAL_MS;
use ble_bench_central::params::codec::PatternCodec;
use ble_bench_central::{Orchestrator, Trigger};
use core::sync::atomic::{AtomicU32, Ordering};
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

use self::softdevice::{EmbassyClock, SdTransport};

/// Room for a full write-command TX queue worth of completions plus a
/// burst of notifications between two ticks.
const EVENT_QUEUE_DEPTH: usize = 48;

/// Radio events copied out of the SoftDevice, in arrival order.
pub static EVENTS: Channel<CriticalSectionRawMutex, LowLevelEvent, EVENT_QUEUE_DEPTH> =
    Channel::new();

/// Events the SoftDevice callback could not queue since the last tick.
pub static DROPPED_EVENTS: AtomicU32 = AtomicU32::new(0);

/// Button presses.
pub static TRIGGERS: Channel<CriticalSectionRawMutex, Trigger, 4> = Channel::new();

/// Service the central task should look for, set once at init.
pub static DISCOVERY: Signal<CriticalSectionRawMutex, BleUuid> = Signal::new();

/// Raised when the orchestrator asks for scanning to begin.
pub static SCAN: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub type Bench = Orchestrator<TestServiceClient<SdTransport>, EmbassyClock, PatternCodec>;

pub fn new_bench() -> Bench {
    Orchestrator::new(
        TestServiceClient::new(SdTransport),
        EmbassyClock,
        PatternCodec,
    )
}

/// Sole owner of the orchestrator: ticks it and feeds it events and
/// triggers.
#[embassy_executor::task]
pub async fn bench_task(bench: &'static mut Bench) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS));

    loop {
        match select3(ticker.next(), EVENTS.receive(), TRIGGERS.receive()).await {
            Either3::First(()) => {
                // Anything that arrived since the last tick goes first.
                while let Ok(evt) = EVENTS.try_receive() {
                    bench.handle_ble_event(&evt);
                }
                let dropped = DROPPED_EVENTS.swap(0, Ordering::Relaxed);
                if dropped > 0 {
                    bench.note_dropped_events(dropped);
                }
                bench.update();
            }
            Either3::Second(evt) => bench.handle_ble_event(&evt),
            Either3::Third(trigger) => {
                bench.trigger(trigger);
            }
        }
    }
}
