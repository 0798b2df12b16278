//! DK buttons: short press starts a preset batch, long press terminates
//! the running test.

use ble_bench_central::config::{BUTTON_DEBOUNCE_MS, BUTTON_LONG_PRESS_MS};
use ble_bench_central::Trigger;
use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{with_timeout, Duration, Timer};

use super::TRIGGERS;

/// Active-low button with internal pull-up on `pin`, reported as index
/// `idx` (0-based).
#[embassy_executor::task(pool_size = 4)]
pub async fn button_task(pin: AnyPin, idx: usize) -> ! {
    let mut btn = Input::new(pin, Pull::Up);

    loop {
        btn.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        if btn.is_low() {
            let hold = with_timeout(
                Duration::from_millis(BUTTON_LONG_PRESS_MS),
                btn.wait_for_rising_edge(),
            )
            .await;

            let trigger = match hold {
                Ok(()) => Trigger::from_button(idx),
                Err(_) => {
                    btn.wait_for_rising_edge().await;
                    Some(Trigger::Terminate)
                }
            };

            if let Some(trigger) = trigger {
                info!("Button {}: {}", idx + 1, trigger);
                TRIGGERS.send(trigger).await;
            }
            Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;
        }
    }
}
