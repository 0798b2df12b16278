//! Monotonic millisecond time source.

/// Millisecond clock. Wraps after ~49 days; all arithmetic is wrapping.
pub trait Clock {
    fn now_ms(&self) -> u32;

    fn elapsed_since(&self, start_ms: u32) -> u32 {
        self.now_ms().wrapping_sub(start_ms)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}
