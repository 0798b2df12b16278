//! Bounded containers driving the orchestrator.
//!
//! [`TestQueue`] is a plain FIFO of pending runs. [`StateStack`] holds
//! continuations: `queue` appends work to do eventually, `inject` puts work
//! in front of everything else, `next` pops the front or falls back to
//! [`State::Idle`].

use super::State;
use crate::config::{MAX_QUEUED_TESTS, STATE_STACK_DEPTH};
use crate::error::Error;
use crate::params::TestParams;
use heapless::Deque;

pub struct TestQueue {
    inner: Deque<TestParams, MAX_QUEUED_TESTS>,
}

impl Default for TestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TestQueue {
    pub const fn new() -> Self {
        Self {
            inner: Deque::new(),
        }
    }

    pub fn push(&mut self, params: TestParams) -> Result<(), Error> {
        self.inner.push_back(params).map_err(|_| Error::QueueFull)
    }

    pub fn pop(&mut self) -> Option<TestParams> {
        self.inner.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn space(&self) -> usize {
        MAX_QUEUED_TESTS - self.inner.len()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

pub struct StateStack {
    inner: Deque<State, STATE_STACK_DEPTH>,
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStack {
    pub const fn new() -> Self {
        Self {
            inner: Deque::new(),
        }
    }

    /// Append at the tail.
    pub fn queue(&mut self, state: State) -> Result<(), Error> {
        self.inner.push_back(state).map_err(|_| {
            error!("State stack full, dropping {:?}", state);
            Error::QueueFull
        })
    }

    /// Push at the head.
    pub fn inject(&mut self, state: State) -> Result<(), Error> {
        self.inner.push_front(state).map_err(|_| {
            error!("State stack full, dropping {:?}", state);
            Error::QueueFull
        })
    }

    /// Pop the head, or [`State::Idle`] when empty.
    pub fn next(&mut self) -> State {
        self.inner.pop_front().unwrap_or(State::Idle)
    }

    pub fn peek(&self) -> Option<State> {
        self.inner.front().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn space(&self) -> usize {
        STATE_STACK_DEPTH - self.inner.len()
    }

    pub fn drain(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{BleVersion, TestCase};

    #[test]
    fn next_on_empty_is_idle() {
        let mut s = StateStack::new();
        assert_eq!(s.next(), State::Idle);
    }

    #[test]
    fn inject_goes_before_queue() {
        let mut s = StateStack::new();
        s.queue(State::WriteSelfTest).unwrap();
        s.queue(State::ReadSelfTest).unwrap();
        s.inject(State::TestRun).unwrap();
        assert_eq!(s.next(), State::TestRun);
        assert_eq!(s.next(), State::WriteSelfTest);
        assert_eq!(s.next(), State::ReadSelfTest);
        assert_eq!(s.next(), State::Idle);
    }

    #[test]
    fn latest_inject_runs_first() {
        let mut s = StateStack::new();
        s.inject(State::TestStart).unwrap();
        s.inject(State::Delay).unwrap();
        assert_eq!(s.peek(), Some(State::Delay));
        assert_eq!(s.next(), State::Delay);
        assert_eq!(s.next(), State::TestStart);
    }

    #[test]
    fn full_stack_refuses_without_overwriting() {
        let mut s = StateStack::new();
        for _ in 0..STATE_STACK_DEPTH {
            s.queue(State::ReadWait).unwrap();
        }
        assert_eq!(s.queue(State::TestRun), Err(Error::QueueFull));
        assert_eq!(s.inject(State::TestRun), Err(Error::QueueFull));
        assert_eq!(s.len(), STATE_STACK_DEPTH);
        assert_eq!(s.space(), 0);
        assert!(s.iter().all(|st| *st == State::ReadWait));
    }

    #[test]
    fn space_tracks_pushes_and_pops() {
        let mut s = StateStack::new();
        assert_eq!(s.space(), STATE_STACK_DEPTH);
        s.inject(State::TestRun).unwrap();
        s.queue(State::Delay).unwrap();
        assert_eq!(s.space(), STATE_STACK_DEPTH - 2);
        s.next();
        assert_eq!(s.space(), STATE_STACK_DEPTH - 1);
    }

    #[test]
    fn drain_empties() {
        let mut s = StateStack::new();
        s.queue(State::Delay).unwrap();
        s.drain();
        assert!(s.is_empty());
    }

    #[test]
    fn test_queue_is_fifo_and_bounded() {
        let mut q = TestQueue::new();
        let mut p = TestParams::load(BleVersion::Ble41, TestCase::Write);
        for i in 0..MAX_QUEUED_TESTS as u32 {
            p.transfer_data_size = i;
            q.push(p).unwrap();
        }
        assert!(q.is_full());
        assert_eq!(q.space(), 0);
        assert_eq!(q.push(p), Err(Error::QueueFull));
        assert_eq!(q.pop().map(|t| t.transfer_data_size), Some(0));
        assert_eq!(q.pop().map(|t| t.transfer_data_size), Some(1));
        assert_eq!(q.len(), MAX_QUEUED_TESTS - 2);
    }
}
