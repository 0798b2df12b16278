//! The orchestration state machine.

use super::presets::Trigger;
use super::queue::{StateStack, TestQueue};
use super::report::{Progress, TestReport};
use super::{DelayTimer, Flags, State};
use crate::ble::char_table::{CharTable, CCCD_BIT, CONTROL, DATA};
use crate::ble::client::TestServiceClient;
use crate::ble::{CharData, ConnParams, CoreEvent, GattTransport, LowLevelEvent, TestLink};
use crate::clock::Clock;
use crate::config::{
    Backoff, RetryPolicy, BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SLAVE_LATENCY,
    BLE_SUP_TIMEOUT, PARAM_SETTLE_MS, TEST_START_DELAY_MS, TX_BUFFER_LEN,
};
use crate::error::{Error, GattError};
use crate::fmt::Hex;
use crate::params::codec::{ControlCommand, ParamCodec, PatternCodec, PLACEHOLDER_PAYLOAD};
use crate::params::{BleVersion, TestCase, TestParams};

/// Self-test CONTROL write: ask the peer for a notification.
const SELF_TEST_WRITE: [u8; 5] = [ControlCommand::TestNotify.byte(), 1, 2, 3, 4];

/// Connection parameters requested once the link is gone.
const DEFAULT_CONN_PARAMS: ConnParams = ConnParams {
    min_conn_interval: BLE_CONN_INTERVAL_MIN,
    max_conn_interval: BLE_CONN_INTERVAL_MAX,
    slave_latency: BLE_SLAVE_LATENCY,
    conn_sup_timeout: BLE_SUP_TIMEOUT,
};

/// Completion a backed-off operation waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pending {
    Write,
    Read,
}

/// Drives benchmark runs over a [`TestLink`].
pub struct Orchestrator<L, C, P = PatternCodec> {
    link: L,
    clock: C,
    codec: P,
    retry: RetryPolicy,

    state: State,
    stack: StateStack,
    tests: TestQueue,
    flags: Flags,
    write_done: bool,
    read_done: bool,

    current: TestParams,
    bytes_done: u32,
    started_at: u32,
    progress: Progress,
    timer: DelayTimer,
    last_report: Option<TestReport>,
    dropped_events: u32,

    buf: [u8; TX_BUFFER_LEN],
}

impl<L: TestLink, C: Clock, P: ParamCodec> Orchestrator<L, C, P> {
    pub fn new(link: L, clock: C, codec: P) -> Self {
        Self::with_retry_policy(link, clock, codec, RetryPolicy::default())
    }

    pub fn with_retry_policy(link: L, clock: C, codec: P, retry: RetryPolicy) -> Self {
        Self {
            link,
            clock,
            codec,
            retry,
            state: State::Init,
            stack: StateStack::new(),
            tests: TestQueue::new(),
            flags: Flags::default(),
            write_done: true,
            read_done: true,
            current: TestParams::null(BleVersion::Ble41),
            bytes_done: 0,
            started_at: 0,
            progress: Progress::default(),
            timer: DelayTimer::default(),
            last_report: None,
            dropped_events: 0,
            buf: [0; TX_BUFFER_LEN],
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Tick
    // ═══════════════════════════════════════════════════════════════════

    /// Advance by at most one state. Never blocks.
    pub fn update(&mut self) {
        match self.state {
            State::Init => self.on_init(),
            State::Idle => {
                if !self.tests.is_empty() && !self.flags.test_running {
                    if let Some(t) = self.tests.pop() {
                        self.current = t;
                        debug!("Dequeued test, {} left", self.tests.len());
                        self.state = State::TestInit;
                    }
                } else {
                    self.state = self.stack.next();
                }
            }
            State::WriteSelfTest => {
                info!("Self-test write");
                match self.link.write(CONTROL, &SELF_TEST_WRITE) {
                    Ok(()) => self.await_write(),
                    Err(e) => {
                        error!("Write to control failed ({:?})", e);
                        self.state = self.stack.next();
                    }
                }
            }
            State::ReadSelfTest => {
                info!("Self-test read");
                match self.link.read(DATA) {
                    Ok(()) => self.await_read(),
                    Err(e) => {
                        error!("Read data failed ({:?})", e);
                        self.state = self.stack.next();
                    }
                }
            }
            State::TestInit => self.on_test_init(),
            State::TestWaitParams => {
                if self.flags.conn_param_updated && self.flags.phy_updated {
                    self.flags.conn_param_updated = false;
                    self.flags.phy_updated = false;
                    self.state = State::TestInit2;
                    self.delay(PARAM_SETTLE_MS);
                }
            }
            State::TestInit2 => self.on_test_init2(),
            State::TestStart => {
                self.buf[0] = ControlCommand::StartTest.byte();
                match self.link.write(CONTROL, &self.buf[..1]) {
                    Ok(()) => {
                        self.await_write();
                        if self.inject(State::TestRun) {
                            self.flags.test_running = true;
                            self.started_at = self.clock.now_ms();
                            self.dropped_events = 0;
                            info!("Started {} test", self.current.test_case.name());
                        }
                    }
                    Err(e) => self.on_write_error(e, self.retry.control),
                }
            }
            State::TestRun => self.on_test_run(),
            State::TestComplete => self.on_test_complete(),
            State::TestTerminate => self.on_test_terminate(),
            State::WriteWait => {
                if self.write_done {
                    self.state = self.stack.next();
                }
            }
            State::ReadWait => {
                if self.read_done {
                    self.state = self.stack.next();
                }
            }
            State::Delay => {
                if self.timer.expired(self.clock.now_ms()) {
                    self.state = self.stack.next();
                }
            }
            State::NotifyWait => {
                error!("Unhandled state {:?}", self.state);
                self.state = State::Idle;
            }
        }
    }

    fn on_init(&mut self) {
        self.flags = Flags::default();
        match self.link.init() {
            Ok(()) => {
                info!("Test service client initialized");
                if let Err(e) = self.link.start_scan() {
                    error!("Failed to start scanning ({:?})", e);
                }
            }
            Err(e) => error!("Test service client init failed ({:?})", e),
        }
        self.state = State::Idle;
    }

    fn on_test_init(&mut self) {
        if self.current.is_null() {
            error!("Tried to init NULL test");
            self.state = self.stack.next();
            return;
        }

        info!("Init test:");
        self.codec.print(&self.current);
        self.apply_link_params();
        if let Err(e) = self.link.set_phy(self.current.rxtx_phy) {
            warn!("PHY update request failed ({:?})", e);
        }

        debug!("Waiting for params...");
        self.flags.conn_param_updated = false;
        self.flags.phy_updated = false;
        self.state = State::TestWaitParams;
    }

    fn on_test_init2(&mut self) {
        // Start delay and start command both go in front of the stack.
        if self.stack.space() < 2 {
            error!("No room to schedule test start");
            self.abort_run();
            return;
        }

        self.buf[0] = ControlCommand::WriteTestParams.byte();
        let len = match self.codec.serialize(&self.current, &mut self.buf[1..]) {
            Ok(n) => n + 1,
            Err(e) => {
                error!("Failed to encode test params ({:?})", e);
                self.state = self.stack.next();
                return;
            }
        };
        self.bytes_done = 0;
        self.progress.reset();

        match self.link.write(CONTROL, &self.buf[..len]) {
            Ok(()) => {
                self.await_write();
                if self.inject(State::TestStart) && self.inject(State::Delay) {
                    self.timer.arm(self.clock.now_ms(), TEST_START_DELAY_MS);
                }
            }
            Err(e) => self.on_write_error(e, self.retry.control),
        }
    }

    fn on_test_run(&mut self) {
        if self.flags.terminate_requested {
            self.flags.terminate_requested = false;
            self.state = State::TestTerminate;
            return;
        }
        if self.bytes_done >= self.current.transfer_data_size {
            self.state = State::TestComplete;
            return;
        }

        match self.current.test_case {
            TestCase::Null => {
                info!("NULL test case, exiting testing");
                self.state = self.stack.next();
            }
            TestCase::Write | TestCase::WriteNoResponse => self.send_chunk(),
            TestCase::Read => match self.link.read(DATA) {
                Ok(()) => {
                    self.await_read();
                    self.inject(State::TestRun);
                }
                Err(e) if e.is_retryable() => {
                    debug!("Read busy @ byte {}", self.bytes_done);
                    self.backoff(self.retry.read, Pending::Read);
                }
                Err(e) => {
                    error!("Read data failed ({:?})", e);
                    self.abort_run();
                }
            },
            // Data arrives as notifications.
            TestCase::Notify => {}
        }
    }

    fn send_chunk(&mut self) {
        let cap = self.link.max_data_len().min(TX_BUFFER_LEN);
        let len = self
            .codec
            .build_chunk(&self.current, self.bytes_done, &mut self.buf[..cap]);
        if len == 0 {
            error!("Empty chunk at byte {}, aborting", self.bytes_done);
            self.abort_run();
            return;
        }

        let data = &self.buf[..len];
        let res = match self.current.test_case {
            TestCase::WriteNoResponse => self.link.write_no_response(DATA, data),
            _ => self.link.write(DATA, data),
        };
        match res {
            Ok(()) => {
                // Commands are counted once queued.
                self.bytes_done += len as u32;
                self.report_progress("Wrote");
            }
            Err(e) if e.is_retryable() => {
                trace!("Write busy @ byte {}", self.bytes_done);
                self.backoff(self.retry.data_write, Pending::Write);
            }
            Err(e) => {
                error!("Write to data failed ({:?})", e);
                self.abort_run();
            }
        }
    }

    fn on_test_complete(&mut self) {
        let elapsed = self.clock.elapsed_since(self.started_at);
        let mut report = TestReport::new(
            self.current.test_case,
            self.current.transfer_data_size,
            elapsed,
        );
        report.dropped_events = self.dropped_events;
        info!(
            "Finished test: {} of {} bytes",
            report.test_case.name(),
            report.bytes
        );
        info!("Time: {}s", report.seconds());
        info!("Speed: {} kbit/s", report.kbit_per_sec());
        if report.dropped_events > 0 {
            warn!("{} radio events lost during the test", report.dropped_events);
        }
        self.last_report = Some(report);

        self.flags.test_running = false;
        self.current = TestParams::idle();
        self.apply_link_params();
        self.started_at = 0;
        self.state = self.stack.next();
    }

    fn on_test_terminate(&mut self) {
        warn!(
            "Terminate test. Done {} / {} bytes",
            self.bytes_done, self.current.transfer_data_size
        );
        self.codec.print(&self.current);
        self.flags.test_running = false;
        self.current = TestParams::null(BleVersion::Ble42);
        self.started_at = 0;
        self.stack.drain();

        self.buf[0] = ControlCommand::TerminateTest.byte();
        match self.link.write(CONTROL, &self.buf[..1]) {
            Ok(()) => self.await_write(),
            Err(e) => self.on_write_error(e, self.retry.control),
        }
    }

    /// Give up on the running test: free the link for queued tests and
    /// resume the next continuation.
    fn abort_run(&mut self) {
        if self.flags.test_running {
            warn!(
                "Aborted {} test after {} of {} bytes",
                self.current.test_case.name(),
                self.bytes_done,
                self.current.transfer_data_size
            );
            self.flags.test_running = false;
            self.current = TestParams::idle();
            self.started_at = 0;
            self.apply_link_params();
        }
        self.state = self.stack.next();
    }

    /// Error path for CONTROL writes.
    fn on_write_error(&mut self, e: GattError, backoff: Backoff) {
        if e.is_retryable() {
            debug!("Write busy ({:?}), backing off", e);
            self.backoff(backoff, Pending::Write);
        } else {
            error!("Write to control failed ({:?})", e);
            self.state = self.stack.next();
        }
    }

    fn backoff(&mut self, backoff: Backoff, pending: Pending) {
        match backoff {
            Backoff::Immediate => {}
            Backoff::Delay(ms) => self.delay(ms),
            Backoff::AwaitCompletion => {
                if self.inject(self.state) {
                    match pending {
                        Pending::Write => self.await_write(),
                        Pending::Read => self.await_read(),
                    }
                }
            }
        }
    }

    /// Park in [`State::Delay`] for `ms`, then resume the current state.
    fn delay(&mut self, ms: u32) {
        if self.inject(self.state) {
            self.state = State::Delay;
            self.timer.arm(self.clock.now_ms(), ms);
        }
    }

    fn await_write(&mut self) {
        self.state = State::WriteWait;
        self.write_done = false;
    }

    fn await_read(&mut self) {
        self.state = State::ReadWait;
        self.read_done = false;
    }

    /// Put `state` in front of the continuations. A full stack abandons
    /// the running test; returns false in that case.
    fn inject(&mut self, state: State) -> bool {
        if self.stack.inject(state).is_ok() {
            return true;
        }
        self.abort_run();
        false
    }

    /// Connection parameters and event length extension of the current test.
    fn apply_link_params(&mut self) {
        let params = self.current.conn_params();
        if let Err(e) = self.link.set_connection_parameters(&params) {
            warn!("Conn param update request failed ({:?})", e);
        }
        if let Err(e) = self.link.set_conn_evt_ext(self.current.conn_evt_len_ext_enabled) {
            warn!("Conn event extension failed ({:?})", e);
        }
    }

    fn report_progress(&mut self, what: &str) {
        let total = self.current.transfer_data_size;
        if let Some(pct) = self.progress.update(self.bytes_done, total) {
            info!(
                "{} {}/{} KB ({}%)",
                what,
                self.bytes_done / 1024,
                total / 1024,
                pct
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════════════

    /// Feed one radio event.
    pub fn event(&mut self, evt: CoreEvent<'_>) {
        match evt {
            CoreEvent::Connected => {
                info!("Connected");
                self.flags.connected = true;
                self.current = TestParams::idle();
                self.apply_link_params();
            }
            CoreEvent::Disconnected => {
                info!("Disconnected -> resetting the core");
                self.flags.connected = false;
                self.flags.test_running = false;
                self.flags.terminate_requested = false;
                self.current = TestParams::null(BleVersion::Ble41);
                self.started_at = 0;
                self.write_done = true;
                self.read_done = true;
                self.stack.drain();
                self.tests.clear();
                if let Err(e) = self.link.set_connection_parameters(&DEFAULT_CONN_PARAMS) {
                    debug!("Default conn params not applied ({:?})", e);
                }
                self.state = State::Idle;
            }
            CoreEvent::DiscoveryDone => {
                // CCCD write is in flight; self-tests run once it completes.
                const SELF_TESTS: [State; 3] =
                    [State::WriteWait, State::WriteSelfTest, State::ReadSelfTest];
                if self.stack.space() < SELF_TESTS.len() {
                    error!("No room for self-tests, skipping");
                    return;
                }
                self.write_done = false;
                for s in SELF_TESTS {
                    if self.stack.queue(s).is_err() {
                        break;
                    }
                }
            }
            CoreEvent::WriteDone(d) => {
                self.write_done = true;
                if CharTable::is_cccd(d.char_id) {
                    info!("Wrote to CCCD for char id {}", d.char_id & !CCCD_BIT);
                } else if !d.data.is_empty() {
                    info!("Write RSP len {}: {}", d.data.len(), Hex(d.data));
                }
            }
            CoreEvent::WriteNoResponseDone { count } => {
                self.write_done = true;
                trace!("Wrote {} packets without response", count);
            }
            CoreEvent::ReadDone(d) => {
                self.read_done = true;
                self.on_data(d, "Read");
            }
            CoreEvent::NotifyReceived(d) => self.on_data(d, "Notify rx"),
            CoreEvent::ConnParamsUpdated(p) => {
                debug!("Conn params updated, max interval {}", p.max_conn_interval);
                if p.max_conn_interval == self.current.conn_interval_units() {
                    self.flags.conn_param_updated = true;
                }
            }
            CoreEvent::PhyUpdated(p) => {
                debug!("PHY updated tx {} rx {}", p.tx_phy, p.rx_phy);
                let want = self.current.rxtx_phy.bits();
                if p.rx_phy == want && p.tx_phy == want {
                    self.flags.phy_updated = true;
                }
            }
        }
    }

    fn on_data(&mut self, d: CharData<'_>, what: &str) {
        let placeholder = d.data == PLACEHOLDER_PAYLOAD;

        if self.flags.test_running && d.char_id == DATA {
            if placeholder {
                warn!("{} placeholder data", what);
            } else if let Err(m) = self.codec.confirm_chunk(&self.current, self.bytes_done, d.data)
            {
                error!(
                    "Payload mismatch at byte {}: expected {}, got {}",
                    m.offset, m.expected, m.actual
                );
            }
            self.bytes_done += d.data.len() as u32;
            self.report_progress(what);
        } else if placeholder {
            warn!("{} placeholder data", what);
        } else {
            info!(
                "{} UUID 0x{:04x} len {}: {}",
                what,
                d.uuid,
                d.data.len(),
                Hex(d.data)
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // User input
    // ═══════════════════════════════════════════════════════════════════

    /// Handle a button trigger. Returns how many tests were queued.
    pub fn trigger(&mut self, trigger: Trigger) -> usize {
        let Some(preset) = trigger.preset() else {
            self.request_terminate();
            return 0;
        };

        if self.flags.test_running || !self.flags.connected {
            info!("Ignoring {:?}: no idle connection", trigger);
            return 0;
        }

        let mut queued = 0;
        for t in preset.tests() {
            if self.tests.push(t).is_err() {
                break;
            }
            queued += 1;
        }
        info!("{:?} queued {} tests", trigger, queued);
        queued
    }

    /// Radio events lost before reaching the machine. Counted into the
    /// report of the running test.
    pub fn note_dropped_events(&mut self, count: u32) {
        warn!("{} radio events dropped", count);
        self.dropped_events = self.dropped_events.saturating_add(count);
    }

    /// Abort the running test on the next tick.
    pub fn request_terminate(&mut self) {
        if self.flags.test_running {
            info!("Terminate requested");
            self.flags.terminate_requested = true;
        } else {
            debug!("No test running, terminate ignored");
        }
    }

    /// Queue a test directly.
    pub fn queue_test(&mut self, params: TestParams) -> Result<(), Error> {
        self.tests.push(params)
    }

    /// Append a continuation.
    pub fn queue_state(&mut self, state: State) -> Result<(), Error> {
        self.stack.queue(state)
    }

    /// Put a continuation in front of all others.
    pub fn inject_state(&mut self, state: State) -> Result<(), Error> {
        self.stack.inject(state)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════

    pub fn state(&self) -> State {
        self.state
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn current_test(&self) -> &TestParams {
        &self.current
    }

    pub fn bytes_done(&self) -> u32 {
        self.bytes_done
    }

    pub fn queued_tests(&self) -> usize {
        self.tests.len()
    }

    pub fn continuations(&self) -> &StateStack {
        &self.stack
    }

    pub fn write_done(&self) -> bool {
        self.write_done
    }

    pub fn read_done(&self) -> bool {
        self.read_done
    }

    pub fn last_report(&self) -> Option<&TestReport> {
        self.last_report.as_ref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<T: GattTransport, C: Clock, P: ParamCodec> Orchestrator<TestServiceClient<T>, C, P> {
    /// Translate a raw radio event through the client and feed the result.
    pub fn handle_ble_event(&mut self, evt: &LowLevelEvent) {
        if let Some(core) = self.link.translate_event(evt) {
            self.event(core);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
