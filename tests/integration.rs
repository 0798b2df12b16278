//! End-to-end tests: orchestrator + test service client over a scripted
//! radio.

use std::cell::Cell;

use ble_bench_central::ble::char_table::{CONTROL, DATA};
use ble_bench_central::ble::client::TestServiceClient;
use ble_bench_central::ble::{
    BleUuid, ConnParams, DiscoveredChar, DiscoveredService, GattTransport, LowLevelEvent, Payload,
    PhyUpdate, WriteOp,
};
use ble_bench_central::clock::Clock;
use ble_bench_central::config::{CONTROL_CHAR_UUID, DATA_CHAR_UUID, TEST_SERVICE_UUID};
use ble_bench_central::params::codec::{ControlCommand, PatternCodec};
use ble_bench_central::params::{BleVersion, Phy, TestCase, TestParams};
use ble_bench_central::{GattError, Orchestrator, State, Trigger};

const CONN: u16 = 1;
const CONTROL_HANDLE: u16 = 0x000E;
const DATA_HANDLE: u16 = 0x0010;
const DATA_CCCD: u16 = 0x0011;
const UUID_TYPE: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
struct Written {
    handle: u16,
    op: WriteOp,
    data: Vec<u8>,
}

#[derive(Default)]
struct MockRadio {
    writes: Vec<Written>,
    reads: Vec<u16>,
    conn_params: Vec<ConnParams>,
    phys: Vec<Phy>,
    scanning: bool,
    /// Errors returned by upcoming DATA writes, in order.
    data_write_errors: Vec<GattError>,
    /// Errors returned by upcoming CONTROL writes, in order.
    control_write_errors: Vec<GattError>,
}

impl MockRadio {
    fn data_bytes(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| w.handle == DATA_HANDLE)
            .map(|w| w.data.len())
            .sum()
    }

    fn control_writes(&self) -> Vec<&Written> {
        self.writes
            .iter()
            .filter(|w| w.handle == CONTROL_HANDLE)
            .collect()
    }
}

impl GattTransport for MockRadio {
    fn add_vendor_uuid(&mut self, _base: &[u8; 16]) -> Result<u8, GattError> {
        Ok(UUID_TYPE)
    }

    fn register_discovery(&mut self, _uuid: BleUuid) -> Result<(), GattError> {
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), GattError> {
        self.scanning = true;
        Ok(())
    }

    fn write(&mut self, _conn: u16, handle: u16, op: WriteOp, data: &[u8]) -> Result<(), GattError> {
        if handle == DATA_HANDLE && !self.data_write_errors.is_empty() {
            return Err(self.data_write_errors.remove(0));
        }
        if handle == CONTROL_HANDLE && !self.control_write_errors.is_empty() {
            return Err(self.control_write_errors.remove(0));
        }
        self.writes.push(Written {
            handle,
            op,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn read(&mut self, _conn: u16, handle: u16) -> Result<(), GattError> {
        self.reads.push(handle);
        Ok(())
    }

    fn conn_param_update(&mut self, _conn: u16, params: &ConnParams) -> Result<(), GattError> {
        self.conn_params.push(*params);
        Ok(())
    }

    fn phy_update(&mut self, _conn: u16, phy: Phy) -> Result<(), GattError> {
        self.phys.push(phy);
        Ok(())
    }

    fn set_conn_evt_ext(&mut self, _enabled: bool) -> Result<(), GattError> {
        Ok(())
    }
}

struct MockClock(Cell<u32>);

impl MockClock {
    fn advance(&self, ms: u32) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}

type Bench<'c> = Orchestrator<TestServiceClient<MockRadio>, &'c MockClock, PatternCodec>;

fn bench(clock: &MockClock) -> Bench<'_> {
    Orchestrator::new(TestServiceClient::new(MockRadio::default()), clock, PatternCodec)
}

fn radio<'a>(b: &'a Bench<'_>) -> &'a MockRadio {
    b.link().transport()
}

fn payload(bytes: &[u8]) -> Payload {
    Payload::from_slice(bytes).unwrap()
}

fn uuid(alias: u16) -> BleUuid {
    BleUuid {
        uuid: alias,
        uuid_type: UUID_TYPE,
    }
}

fn discovered() -> DiscoveredService {
    let mut svc = DiscoveredService {
        conn_handle: CONN,
        uuid: uuid(TEST_SERVICE_UUID),
        chars: Default::default(),
    };
    svc.chars
        .push(DiscoveredChar {
            uuid: uuid(CONTROL_CHAR_UUID),
            value_handle: CONTROL_HANDLE,
            cccd_handle: 0,
        })
        .unwrap();
    svc.chars
        .push(DiscoveredChar {
            uuid: uuid(DATA_CHAR_UUID),
            value_handle: DATA_HANDLE,
            cccd_handle: DATA_CCCD,
        })
        .unwrap();
    svc
}

fn write_rsp(handle: u16) -> LowLevelEvent {
    LowLevelEvent::WriteResponse {
        handle,
        data: payload(&[]),
    }
}

/// Tick until `done` holds, at most `limit` times.
fn tick_until(b: &mut Bench<'_>, limit: usize, done: impl Fn(&Bench<'_>) -> bool) {
    for _ in 0..limit {
        if done(b) {
            return;
        }
        b.update();
    }
    assert!(done(b), "condition not reached, state {:?}", b.state());
}

/// Boot, connect and finish discovery plus self-tests.
fn connected_bench(clock: &MockClock) -> Bench<'_> {
    let mut b = bench(clock);
    b.update();
    assert_eq!(b.state(), State::Idle);
    assert!(radio(&b).scanning);

    b.handle_ble_event(&LowLevelEvent::Connected { conn_handle: CONN });
    b.handle_ble_event(&LowLevelEvent::DiscoveryComplete(discovered()));
    assert_eq!(
        radio(&b).writes[0],
        Written {
            handle: DATA_CCCD,
            op: WriteOp::Request,
            data: vec![0x01, 0x00],
        }
    );

    // Waiting for the CCCD write.
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    b.handle_ble_event(&write_rsp(DATA_CCCD));

    // Self-test write.
    b.update();
    assert_eq!(b.state(), State::WriteSelfTest);
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    assert_eq!(
        radio(&b).control_writes()[0].data,
        vec![ControlCommand::TestNotify.byte(), 1, 2, 3, 4]
    );
    b.handle_ble_event(&write_rsp(CONTROL_HANDLE));

    // Self-test read.
    b.update();
    assert_eq!(b.state(), State::ReadSelfTest);
    b.update();
    assert_eq!(b.state(), State::ReadWait);
    assert_eq!(radio(&b).reads, [DATA_HANDLE]);
    b.handle_ble_event(&LowLevelEvent::ReadResponse {
        handle: DATA_HANDLE,
        data: payload(b"TEST READ/NOTIFY"),
    });

    b.update();
    assert_eq!(b.state(), State::Idle);
    assert!(b.continuations().is_empty());
    b
}

/// Drive a queued test through negotiation until it is running.
fn start_test(b: &mut Bench<'_>, clock: &MockClock, params: TestParams) {
    b.queue_test(params).unwrap();
    b.update();
    assert_eq!(b.state(), State::TestInit);
    b.update();
    assert_eq!(b.state(), State::TestWaitParams);
    assert_eq!(radio(b).phys.last(), Some(&params.rxtx_phy));

    b.handle_ble_event(&LowLevelEvent::ConnParamsUpdated(params.conn_params()));
    b.handle_ble_event(&LowLevelEvent::PhyUpdated(PhyUpdate {
        tx_phy: params.rxtx_phy.bits(),
        rx_phy: params.rxtx_phy.bits(),
    }));
    b.update();
    assert_eq!(b.state(), State::Delay);
    clock.advance(51);
    b.update();
    assert_eq!(b.state(), State::TestInit2);

    b.update();
    assert_eq!(b.state(), State::WriteWait);
    let params_write = radio(b).control_writes().last().unwrap().data.clone();
    assert_eq!(params_write[0], ControlCommand::WriteTestParams.byte());
    assert_eq!(PatternCodec::deserialize(&params_write[1..]), Some(params));
    b.handle_ble_event(&write_rsp(CONTROL_HANDLE));

    b.update();
    assert_eq!(b.state(), State::Delay);
    clock.advance(2001);
    b.update();
    assert_eq!(b.state(), State::TestStart);
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    assert!(b.flags().test_running);
    b.handle_ble_event(&write_rsp(CONTROL_HANDLE));
    b.update();
    assert_eq!(b.state(), State::TestRun);
}

#[test]
fn discovery_and_self_tests_return_to_idle() {
    let clock = MockClock(Cell::new(0));
    let b = connected_bench(&clock);
    assert!(b.flags().connected);
    assert!(!b.flags().test_running);
    assert_eq!(*b.current_test(), TestParams::idle());
    assert_eq!(b.link().char_table().value_handle(CONTROL), Some(CONTROL_HANDLE));
    assert_eq!(b.link().char_table().value_handle(DATA), Some(DATA_HANDLE));
}

#[test]
fn write_test_moves_exact_transfer_size() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);

    let mut t = TestParams::load(BleVersion::Ble42, TestCase::Write);
    t.transfer_data_size = 1000;
    t.conn_interval = 30.0;
    start_test(&mut b, &clock, t);

    let started = clock.now_ms();
    tick_until(&mut b, 200, |b| b.state() == State::TestComplete);
    assert_eq!(b.bytes_done(), 1000);
    assert_eq!(radio(&b).data_bytes(), 1000);
    // Default MTU: 20-byte chunks.
    assert!(radio(&b)
        .writes
        .iter()
        .filter(|w| w.handle == DATA_HANDLE)
        .all(|w| w.data.len() == 20 && w.op == WriteOp::Request));

    clock.advance(500);
    b.update();
    let report = b.last_report().copied().unwrap();
    assert_eq!(report.bytes, 1000);
    assert_eq!(report.elapsed_ms, clock.now_ms() - started);
    assert!(!b.flags().test_running);
    assert_eq!(*b.current_test(), TestParams::idle());
    assert_eq!(b.state(), State::Idle);
}

#[test]
fn larger_mtu_means_larger_chunks() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);
    b.handle_ble_event(&LowLevelEvent::MtuExchanged { att_mtu: 247 });

    let mut t = TestParams::load(BleVersion::Ble5Hs, TestCase::WriteNoResponse);
    t.transfer_data_size = 1000;
    start_test(&mut b, &clock, t);

    tick_until(&mut b, 50, |b| b.state() == State::TestComplete);
    let sizes: Vec<usize> = radio(&b)
        .writes
        .iter()
        .filter(|w| w.handle == DATA_HANDLE)
        .map(|w| w.data.len())
        .collect();
    assert_eq!(sizes, [244, 244, 244, 244, 24]);
    assert_eq!(b.bytes_done(), 1000);
}

#[test]
fn write_no_response_resumes_after_tx_complete() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);

    let mut t = TestParams::load(BleVersion::Ble41, TestCase::WriteNoResponse);
    t.transfer_data_size = 100;
    start_test(&mut b, &clock, t);

    b.link_mut().transport_mut().data_write_errors = vec![GattError::ResourceExhausted];
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    assert_eq!(b.bytes_done(), 0);

    // Stays parked until the stack frees buffers.
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    b.handle_ble_event(&LowLevelEvent::WriteCmdTxComplete { count: 1 });

    tick_until(&mut b, 20, |b| b.state() == State::TestComplete);
    assert_eq!(radio(&b).data_bytes(), 100);
}

#[test]
fn busy_write_request_resumes_after_write_response() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);

    let mut t = TestParams::load(BleVersion::Ble42, TestCase::Write);
    t.transfer_data_size = 60;
    t.conn_interval = 30.0;
    start_test(&mut b, &clock, t);

    b.update();
    assert_eq!(b.bytes_done(), 20);
    b.link_mut().transport_mut().data_write_errors = vec![GattError::Busy];
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    assert!(!b.write_done());
    assert_eq!(b.bytes_done(), 20);

    // Parked on the previous request's response, no delay timer involved.
    clock.advance(1000);
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    b.handle_ble_event(&write_rsp(DATA_HANDLE));
    assert!(b.write_done());
    b.update();
    assert_eq!(b.state(), State::TestRun);

    tick_until(&mut b, 20, |b| b.state() == State::TestComplete);
    assert_eq!(b.bytes_done(), 60);
    assert_eq!(radio(&b).data_bytes(), 60);
}

#[test]
fn failed_data_write_lets_next_test_run() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);

    let mut first = TestParams::load(BleVersion::Ble42, TestCase::Write);
    first.transfer_data_size = 100;
    first.conn_interval = 30.0;
    let mut second = TestParams::load(BleVersion::Ble42, TestCase::WriteNoResponse);
    second.transfer_data_size = 40;
    second.conn_interval = 75.0;

    start_test(&mut b, &clock, first);
    b.queue_test(second).unwrap();

    b.link_mut().transport_mut().data_write_errors = vec![GattError::InvalidState];
    b.update();
    assert!(!b.flags().test_running);
    assert_eq!(b.state(), State::Idle);
    assert!(b.last_report().is_none());

    b.update();
    assert_eq!(b.state(), State::TestInit);
    assert_eq!(*b.current_test(), second);
}

#[test]
fn notify_test_completes_from_notifications() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);

    let mut t = TestParams::load(BleVersion::Ble41, TestCase::Notify);
    t.transfer_data_size = 40;
    start_test(&mut b, &clock, t);

    b.update();
    assert_eq!(b.state(), State::TestRun);

    let chunk: Vec<u8> = (0u8..20).collect();
    b.handle_ble_event(&LowLevelEvent::Notification {
        handle: DATA_HANDLE,
        data: payload(&chunk),
    });
    let chunk: Vec<u8> = (20u8..40).collect();
    b.handle_ble_event(&LowLevelEvent::Notification {
        handle: DATA_HANDLE,
        data: payload(&chunk),
    });
    // Stray handle is dropped by the client.
    b.handle_ble_event(&LowLevelEvent::Notification {
        handle: 0x0099,
        data: payload(&[1, 2, 3]),
    });
    assert_eq!(b.bytes_done(), 40);

    clock.advance(1000);
    b.update();
    assert_eq!(b.state(), State::TestComplete);
    b.update();
    assert_eq!(b.last_report().unwrap().test_case, TestCase::Notify);
}

#[test]
fn disconnect_mid_test_resets_core() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);
    assert_eq!(b.trigger(Trigger::Key1), 6);

    let params = *b.current_test();
    assert!(params.is_null());
    b.update();
    assert_eq!(b.state(), State::TestInit);
    b.update();
    assert_eq!(b.state(), State::TestWaitParams);

    b.handle_ble_event(&LowLevelEvent::Disconnected {
        conn_handle: CONN,
        reason: 0x08,
    });
    assert_eq!(b.state(), State::Idle);
    assert_eq!(b.queued_tests(), 0);
    assert!(b.continuations().is_empty());
    assert!(!b.flags().connected);
    assert!(!b.flags().test_running);
    assert_eq!(*b.current_test(), TestParams::null(BleVersion::Ble41));
    assert_eq!(b.link().char_table().value_handle(DATA), None);
    assert_eq!(
        radio(&b).conn_params.last(),
        Some(&ConnParams {
            min_conn_interval: 6,
            max_conn_interval: 24,
            slave_latency: 0,
            conn_sup_timeout: 400,
        })
    );

    // Nothing left to do.
    b.update();
    assert_eq!(b.state(), State::Idle);
}

#[test]
fn terminate_differs_from_completion() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);

    let mut t = TestParams::load(BleVersion::Ble41, TestCase::Notify);
    t.transfer_data_size = 1000;
    start_test(&mut b, &clock, t);
    b.queue_state(State::ReadSelfTest).unwrap();

    assert_eq!(b.trigger(Trigger::Terminate), 0);
    b.update();
    assert_eq!(b.state(), State::TestTerminate);
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    assert_eq!(
        radio(&b).control_writes().last().unwrap().data,
        vec![ControlCommand::TerminateTest.byte()]
    );
    assert!(b.continuations().is_empty());
    assert!(b.last_report().is_none());
    assert!(!b.flags().test_running);

    b.handle_ble_event(&write_rsp(CONTROL_HANDLE));
    b.update();
    assert_eq!(b.state(), State::Idle);
}

#[test]
fn busy_params_write_is_retried() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);
    let t = TestParams::load(BleVersion::Ble42, TestCase::Write);

    b.queue_test(t).unwrap();
    b.update();
    b.update();
    b.handle_ble_event(&LowLevelEvent::ConnParamsUpdated(t.conn_params()));
    b.handle_ble_event(&LowLevelEvent::PhyUpdated(PhyUpdate {
        tx_phy: 1,
        rx_phy: 1,
    }));
    b.update();
    clock.advance(51);
    b.update();
    assert_eq!(b.state(), State::TestInit2);

    let before = radio(&b).control_writes().len();
    b.link_mut().transport_mut().control_write_errors = vec![GattError::Busy];
    b.update();
    assert_eq!(b.state(), State::Delay);
    assert_eq!(radio(&b).control_writes().len(), before);

    clock.advance(11);
    b.update();
    assert_eq!(b.state(), State::TestInit2);
    b.update();
    assert_eq!(b.state(), State::WriteWait);
    assert_eq!(radio(&b).control_writes().len(), before + 1);
    assert!(!b.flags().test_running);
}

#[test]
fn preset_batch_runs_in_order() {
    let clock = MockClock(Cell::new(0));
    let mut b = connected_bench(&clock);
    assert_eq!(b.trigger(Trigger::Key3), 12);
    b.update();
    assert_eq!(b.current_test().test_case, TestCase::Notify);
    assert_eq!(b.current_test().rxtx_phy, Phy::TwoMbps);
    assert_eq!(b.current_test().conn_interval, 7.5);
    assert_eq!(b.queued_tests(), 11);
}
