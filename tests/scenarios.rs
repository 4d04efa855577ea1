use std::time::{Duration, Instant};

use uhid_replay::capture::{self, Capture};
use uhid_replay::device::Model;
use uhid_replay::dispatch::Handlers;
use uhid_replay::event_loop::{EventLoop, LoopOptions, LoopOutcome};
use uhid_replay::replay::{Pacing, ReplayScheduler};
use uhid_replay::uhid::mock::{MockGateway, MockOp};
use uhid_replay::uhid::{
    DeviceHandle, DeviceIdentity, EventType, Frame, GatewayError, GetReportRequest, OutputReport,
    ReportType, UHID_EVENT_SIZE,
};
use uhid_replay::Error;

fn options() -> LoopOptions {
    LoopOptions {
        handshake_timeout: Duration::from_secs(2),
        linger: Duration::from_millis(20),
        strict: false,
    }
}

fn created(text: &str, uniq: &str) -> (MockGateway, Capture, DeviceHandle<MockGateway>) {
    let mock = MockGateway::new();
    let capture = capture::parse(text).unwrap();
    let mut handle = DeviceHandle::new(mock.clone());
    handle
        .create(&capture, DeviceIdentity::from_capture(&capture, uniq))
        .unwrap();
    (mock, capture, handle)
}

fn run(
    handle: DeviceHandle<MockGateway>,
    capture: &Capture,
    handlers: Handlers,
) -> uhid_replay::Result<LoopOutcome> {
    let scheduler = ReplayScheduler::new(&capture.reports, Pacing::Immediate);
    EventLoop::new(handle, handlers, scheduler, options()).run()
}

fn get_report(id: u32, rnum: u8) -> Frame {
    Frame::GetReport(GetReportRequest { id, rnum, rtype: ReportType::Feature })
}

fn replies(mock: &MockGateway) -> Vec<(u32, u16, Vec<u8>)> {
    mock.written_frames()
        .into_iter()
        .filter_map(|f| match f {
            Frame::GetReportReply { id, err, data } => Some((id, err, data)),
            _ => None,
        })
        .collect()
}

fn inputs(mock: &MockGateway) -> Vec<Vec<u8>> {
    mock.written_frames()
        .into_iter()
        .filter_map(|f| match f {
            Frame::Input(data) => Some(data),
            _ => None,
        })
        .collect()
}

/// Every GET_REPORT read is answered by the very next write.
fn assert_replies_follow_requests(mock: &MockGateway) {
    let log = mock.log();
    for (i, op) in log.iter().enumerate() {
        if *op == MockOp::Read(Some(EventType::GetReport)) {
            assert_eq!(
                log.get(i + 1),
                Some(&MockOp::Write(Some(EventType::GetReportReply))),
                "GET_REPORT at {} not answered before the next read",
                i
            );
        }
    }
}

#[test]
fn ds3_handshake() {
    let (mock, capture, handle) =
        created("# info 0003 054c 0268\nR 2 5 1\n", "00:01:23:45:67:89:AB");
    mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
    mock.queue_frame(&get_report(1, 0xF2)).unwrap();
    mock.queue_frame(&get_report(2, 0xF2)).unwrap();
    mock.queue_frame(&get_report(3, 0xF5)).unwrap();

    let signals = handle.signals().clone();
    let outcome = run(handle, &capture, Model::DualShock3.handlers()).unwrap();
    assert_eq!(outcome, LoopOutcome::ReplayComplete);
    assert!(signals.handshake_done.is_set());

    let replies = replies(&mock);
    assert_eq!(replies.len(), 3);
    for (n, (id, err, data)) in replies[..2].iter().enumerate() {
        assert_eq!(*id, n as u32 + 1);
        assert_eq!(*err, 0);
        assert_eq!(data.len(), 17);
        assert_eq!(&data[..3], &[0xF2, 0xFF, 0xFF]);
        assert_eq!(&data[4..10], &[0x00, 0x01, 0x23, 0x45, 0x67, 0x89]);
    }
    assert_eq!(replies[2], (3, 0, vec![0x01, 0x00, 0x18, 0x5E, 0x0F, 0x71, 0xA4, 0xBB]));
    assert_replies_follow_requests(&mock);
}

#[test]
fn ds4_handshake() {
    let (mock, capture, handle) = created("R 2 5 1\n", "01:23:45:67:89:AB");
    mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
    mock.queue_frame(&get_report(7, 0x81)).unwrap();
    mock.queue_frame(&get_report(8, 0x02)).unwrap();

    let signals = handle.signals().clone();
    run(handle, &capture, Model::DualShock4.handlers()).unwrap();

    assert_eq!(
        replies(&mock),
        vec![
            (7, 0, vec![0x81, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]),
            (8, 0, vec![]),
        ]
    );
    assert!(signals.handshake_done.is_set());
    assert_replies_follow_requests(&mock);
}

#[test]
fn switch_pro_initialization() {
    let (mock, capture, handle) = created("# info 0005 057e 2009\nR 2 5 1\n", "98:b6:e9:12:34:56");
    mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
    mock.queue_frame(&Frame::Open).unwrap();

    let steps: [(u8, u8); 10] = [
        (0x30, 0x01),
        (0x40, 0x01),
        (0x41, 0x03),
        (0x10, 0x20),
        (0x10, 0x80),
        (0x10, 0x3D),
        (0x10, 0x86),
        (0x48, 0x01),
        (0x38, 0x22),
        (0x03, 0x30),
    ];
    for (n, (sub, arg)) in steps.iter().enumerate() {
        let mut data = vec![0u8; 49];
        data[0] = 0x01;
        data[1] = n as u8;
        data[10] = *sub;
        data[11] = *arg;
        mock.queue_frame(&Frame::Output(OutputReport { data, rtype: ReportType::Output }))
            .unwrap();
    }

    let signals = handle.signals().clone();
    run(handle, &capture, Model::SwitchPro.handlers()).unwrap();

    let injected = inputs(&mock);
    assert_eq!(injected.len(), 10);
    for (reply, (sub, arg)) in injected.iter().zip(steps) {
        assert_eq!(reply.len(), 64);
        assert_eq!(reply[0], 0x21);
        assert_eq!(reply[14], sub);
        if sub == 0x10 {
            assert_eq!(reply[15], arg);
        }
    }
    assert!(signals.handshake_done.is_set());
}

#[test]
fn replay_dedup() {
    let text = "\
R 2 5 1
E 0.000000 2 1 65
E 0.000100 2 1 65
E 0.000200 2 1 66
E 0.000300 2 1 65
E 0.000400 2 1 65
E 0.000500 2 1 65
E 0.000600 2 1 67
";
    let (mock, capture, handle) = created(text, "");
    mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
    mock.queue_frame(&Frame::Open).unwrap();

    let outcome = run(handle, &capture, Model::Generic.handlers()).unwrap();

    assert_eq!(outcome, LoopOutcome::ReplayComplete);
    assert_eq!(
        inputs(&mock),
        vec![vec![1, 65], vec![1, 66], vec![1, 65], vec![1, 67]]
    );
}

#[test]
fn late_handshake_times_out() {
    let (mock, capture, handle) = created("R 2 5 1\nE 0.0 1 1\nE 0.1 1 2\n", "");
    mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
    mock.queue_frame(&get_report(1, 0x10)).unwrap();

    let started = Instant::now();
    let err = run(handle, &capture, Model::Generic.handlers()).unwrap_err();

    assert!(matches!(err, Error::HandshakeTimeout(d) if d == Duration::from_secs(2)));
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(inputs(&mock).is_empty());
    assert_eq!(mock.written_frames().last(), Some(&Frame::Destroy));
}

#[test]
fn truncated_write_poisons_handle() {
    let (mock, _capture, mut handle) = created("R 2 5 1\n", "");
    mock.truncate_write(1, UHID_EVENT_SIZE - 1);

    let err = handle.inject(&[1, 2, 3]).unwrap_err();
    assert!(matches!(
        err,
        Error::Gateway(GatewayError::TruncatedWrite { written }) if written == UHID_EVENT_SIZE - 1
    ));
    assert!(handle.is_poisoned());

    let calls = mock.write_calls();
    let err = handle.inject(&[4]).unwrap_err();
    assert!(matches!(err, Error::Gateway(GatewayError::Poisoned)));
    assert_eq!(mock.write_calls(), calls);

    handle.destroy().unwrap();
    assert_eq!(mock.write_calls(), calls);
}

#[test]
fn recorded_pacing_keeps_order() {
    let (mock, capture, handle) = created("R 2 5 1\nE 0.000 1 1\nE 0.030 1 2\nE 0.060 1 3\n", "");
    mock.queue_frame(&Frame::Open).unwrap();

    let scheduler = ReplayScheduler::new(&capture.reports, Pacing::Recorded);
    let started = Instant::now();
    let outcome = EventLoop::new(handle, Model::Generic.handlers(), scheduler, options())
        .run()
        .unwrap();

    assert_eq!(outcome, LoopOutcome::ReplayComplete);
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(inputs(&mock), vec![vec![1], vec![2], vec![3]]);
}
