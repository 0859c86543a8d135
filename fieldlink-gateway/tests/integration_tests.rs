// Fieldlink Gateway - Integration Tests
//
// End-to-end runs of the gateway against the in-memory fieldbus, pins and
// radio. The tests are organized into categories:
// 1. Join gating
// 2. Alarm scheduling
// 3. Bulk uplink and chunking
// 4. Frame counter durability
// 5. Configuration documents and reload

use std::net::Ipv4Addr;

use fieldlink::{
    AbpSession, AlarmNotification, CompareOp, Completion, FrameKind, FunctionCode, InputKind,
    JoinMode, MemoryCounterStore, MemoryRadio, RadioConfig, Section, SpreadingFactor, TxOutcome,
    UplinkDecoder, ALARM_PORT, BULK_PORT, TX_TIMEOUT_MS,
};
use fieldlink_gateway::{
    FieldbusTransport, FileCounterStore, Gateway, GatewayConfig, InputConfig, MemoryFieldbus,
    MemoryPins, TargetConfig,
};
use tempfile::tempdir;

const DEVICE_A: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 187);
const DEVICE_B: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 188);

fn abp() -> RadioConfig {
    RadioConfig {
        join: JoinMode::Abp(AbpSession {
            dev_addr: 0x2601_1BA0,
            ..AbpSession::default()
        }),
        ..RadioConfig::default()
    }
}

fn bus_with(devices: Vec<(Ipv4Addr, Vec<u16>)>) -> MemoryFieldbus {
    let mut bus = MemoryFieldbus::new();
    for (address, values) in devices {
        bus.add_device(address);
        bus.connect(address).unwrap();
        bus.set_registers(address, 0, &values);
    }
    bus
}

fn holding(address: Ipv4Addr, count: u8) -> TargetConfig {
    TargetConfig::new(address, 1, 0, count, FunctionCode::ReadHoldingRegisters)
}

// ============================================================================
// Join Gating Tests
// ============================================================================

#[test]
fn test_nothing_sent_before_join() {
    let config = GatewayConfig {
        targets: vec![holding(DEVICE_A, 2)],
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(
        config,
        bus_with(vec![(DEVICE_A, vec![1, 2])]),
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();
    assert!(gateway.session().link().join_started());

    for t in [0, 5_000, 10_000, 15_000] {
        let report = gateway.tick(t);
        assert!(!report.joined);
        assert!(report.transmitted.is_none());
    }

    // Polling continues while joining
    assert_eq!(gateway.metrics().poll_cycles, 4);
    assert_eq!(gateway.metrics().unjoined_ticks, 4);
    assert!(gateway.session().link().sent().is_empty());
    assert_eq!(gateway.queued_frames(), 0);
}

#[test]
fn test_uplink_starts_after_join() {
    let mut gateway = Gateway::new(
        GatewayConfig::default(),
        MemoryFieldbus::new(),
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();
    gateway.tick(0);

    gateway.session_mut().link_mut().accept_join();
    let report = gateway.tick(100);
    assert!(report.joined);
    assert_eq!(report.frames_encoded, 1);
    assert_eq!(report.transmitted, Some(FrameKind::Bulk));
}

#[test]
fn test_start_without_counter_stays_unjoined() {
    struct BrokenStore;

    impl fieldlink::CounterStore for BrokenStore {
        fn load(&mut self, key: &str) -> fieldlink::Result<Option<u32>> {
            Err(fieldlink::StoreError::Io {
                key: key.to_string(),
                reason: "flash unavailable".to_string(),
            }
            .into())
        }

        fn save(&mut self, _key: &str, _value: u32) -> fieldlink::Result<()> {
            Ok(())
        }
    }

    let config = GatewayConfig {
        radio: abp(),
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(
        config,
        MemoryFieldbus::new(),
        MemoryPins::new(),
        MemoryRadio::new(),
        BrokenStore,
    )
    .unwrap();

    assert!(gateway.start().is_err());
    let report = gateway.tick(0);
    assert!(!report.joined);
    assert!(gateway.session().link().sent().is_empty());
}

// ============================================================================
// Alarm Scheduling Tests
// ============================================================================

#[test]
fn test_alarms_drain_before_bulk_one_per_tick() {
    let (mut config, _) = GatewayConfig::from_documents(None, None, None);
    config.radio = abp();
    config.targets = vec![
        holding(DEVICE_A, 2).with_alarm(0, CompareOp::GreaterThan, 100),
        holding(DEVICE_B, 2).with_alarm(1, CompareOp::LessThan, 10),
    ];

    let mut gateway = Gateway::new(
        config,
        bus_with(vec![(DEVICE_A, vec![500, 0]), (DEVICE_B, vec![0, 3])]),
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();

    let kinds: Vec<_> = (0..4).map(|t| gateway.tick(t).transmitted).collect();
    assert_eq!(
        kinds,
        vec![
            Some(FrameKind::Alarm),
            Some(FrameKind::Alarm),
            Some(FrameKind::Alarm),
            Some(FrameKind::Bulk)
        ]
    );

    let sent = gateway.session().link().sent();
    let ports: Vec<u8> = sent.iter().map(|f| f.port).collect();
    assert_eq!(ports, vec![ALARM_PORT, ALARM_PORT, ALARM_PORT, BULK_PORT]);
    assert!(sent.iter().all(|f| f.confirmed));

    let decoder = UplinkDecoder::new();
    assert_eq!(
        decoder.decode_alarm(&sent[0].payload).unwrap(),
        AlarmNotification::Fieldbus {
            address: DEVICE_A,
            unit_id: 1,
            register: 0,
            op: CompareOp::GreaterThan,
            threshold: 100,
            value: 500,
        }
    );
    assert!(matches!(
        decoder.decode_alarm(&sent[1].payload).unwrap(),
        AlarmNotification::Fieldbus { address, register: 1, value: 3, .. } if address == DEVICE_B
    ));
    // Pin 14 reads low but is expected high
    assert_eq!(
        decoder.decode_alarm(&sent[2].payload).unwrap(),
        AlarmNotification::Input {
            channel: 0,
            expected: true,
            actual: false,
        }
    );
    assert_eq!(gateway.metrics().alarms_raised, 3);
    assert_eq!(gateway.metrics().alarms_sent, 3);
}

#[test]
fn test_standing_alarm_sent_once() {
    let config = GatewayConfig {
        targets: vec![holding(DEVICE_A, 1).with_alarm(0, CompareOp::GreaterThan, 99)],
        radio: abp(),
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(
        config,
        bus_with(vec![(DEVICE_A, vec![100])]),
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();

    for t in (0..60_000).step_by(1_000) {
        gateway.tick(t);
    }
    let alarms = gateway
        .session()
        .link()
        .sent()
        .iter()
        .filter(|f| f.port == ALARM_PORT)
        .count();
    assert_eq!(alarms, 1);

    // Falls, then rises again
    gateway.transport_mut().set_registers(DEVICE_A, 0, &[10]);
    gateway.tick(60_000);
    gateway.transport_mut().set_registers(DEVICE_A, 0, &[150]);
    gateway.tick(65_000);
    gateway.tick(65_100);
    assert_eq!(gateway.metrics().alarms_sent, 2);
}

#[test]
fn test_timeout_frees_radio() {
    let config = GatewayConfig {
        radio: abp(),
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(
        config,
        MemoryFieldbus::new(),
        MemoryPins::new(),
        MemoryRadio::with_completion(Completion::Silent),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();

    assert_eq!(gateway.tick(0).transmitted, Some(FrameKind::Bulk));
    assert!(gateway.tick(TX_TIMEOUT_MS - 1).completed.is_none());

    let report = gateway.tick(TX_TIMEOUT_MS);
    assert_eq!(report.completed, Some(TxOutcome::TimedOut));
    assert!(gateway.session().is_idle());
    assert_eq!(gateway.metrics().tx_timeouts, 1);
    assert_eq!(gateway.session().link().metrics().cancelled, 1);
}

// ============================================================================
// Bulk Uplink Tests
// ============================================================================

#[test]
fn test_bulk_chunked_at_link_mtu() {
    let mut radio = abp();
    radio.adr = false;
    radio.spreading_factor = SpreadingFactor::Sf10;

    let devices: Vec<Ipv4Addr> = (1..=4).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
    let values: Vec<u16> = (0..20).collect();
    let config = GatewayConfig {
        targets: devices.iter().map(|d| holding(*d, 20)).collect(),
        radio,
        ..GatewayConfig::default()
    };
    let bus = bus_with(devices.iter().map(|d| (*d, values.clone())).collect());

    let mut gateway = Gateway::new(
        config,
        bus,
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();
    assert_eq!(gateway.session().current_mtu(), 51);

    // One 50-byte record per frame, input section in its own
    let report = gateway.tick(0);
    assert_eq!(report.frames_encoded, 5);
    for t in 1..5 {
        assert_eq!(gateway.tick(t).transmitted, Some(FrameKind::Bulk));
    }
    assert_eq!(gateway.queued_frames(), 0);

    let sent = gateway.session().link().sent();
    assert_eq!(sent.len(), 5);
    assert!(sent.iter().all(|f| f.payload.len() <= 51));

    let sections = UplinkDecoder::new()
        .decode_frames(sent.iter().map(|f| f.payload.as_slice()))
        .unwrap();
    assert_eq!(sections.len(), 5);
    for (section, device) in sections.iter().zip(&devices) {
        match section {
            Section::Target(record) => {
                assert_eq!(record.address, *device);
                assert!(record.success);
                assert_eq!(record.values, values);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(sections[4], Section::Inputs(Vec::new()));
}

#[test]
fn test_unreachable_target_zero_filled() {
    let config = GatewayConfig {
        targets: vec![holding(DEVICE_A, 2), holding(DEVICE_B, 2)],
        inputs: vec![InputConfig {
            pin: 15,
            kind: InputKind::Counter,
            ..InputConfig::default()
        }],
        radio: abp(),
        ..GatewayConfig::default()
    };

    let mut gateway = Gateway::new(
        config,
        bus_with(vec![(DEVICE_A, vec![7, 8])]),
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();
    gateway.tick(0);

    // Two pulses on the counter pin before the next uplink
    for (t, level) in [(1, true), (2, false), (3, true), (4, false)] {
        gateway.pins_mut().set(15, level);
        gateway.tick(t);
    }
    gateway.tick(10_000);

    let sent = gateway.session().link().sent();
    assert_eq!(sent.len(), 2);
    let sections = UplinkDecoder::new().decode_frame(&sent[1].payload).unwrap();
    match (&sections[0], &sections[1], &sections[2]) {
        (Section::Target(a), Section::Target(b), Section::Inputs(inputs)) => {
            assert!(a.success);
            assert_eq!(a.values, vec![7, 8]);
            assert!(!b.success);
            assert_eq!(b.values, vec![0, 0]);
            assert_eq!(inputs[0].kind, InputKind::Counter);
            assert_eq!(inputs[0].value, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(gateway.model().inputs()[0].count(), 0);
}

#[test]
fn test_rejected_frame_abandoned() {
    let config = GatewayConfig {
        radio: abp(),
        ..GatewayConfig::default()
    };
    let mut radio = MemoryRadio::new();
    radio.set_reject_sends(true);

    let mut gateway = Gateway::new(
        config,
        MemoryFieldbus::new(),
        MemoryPins::new(),
        radio,
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();

    let report = gateway.tick(0);
    assert_eq!(report.frames_encoded, 1);
    assert!(report.transmitted.is_none());
    assert_eq!(gateway.metrics().tx_rejected, 1);
    assert_eq!(gateway.queued_frames(), 0);
    assert!(gateway.session().is_idle());
}

#[test]
fn test_stale_bulk_frames_replaced() {
    let config = GatewayConfig {
        uplink_interval_ms: 1_000,
        radio: abp(),
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(
        config,
        MemoryFieldbus::new(),
        MemoryPins::new(),
        MemoryRadio::with_completion(Completion::Silent),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();

    assert_eq!(gateway.tick(0).transmitted, Some(FrameKind::Bulk));
    gateway.tick(1_000);
    assert_eq!(gateway.queued_frames(), 1);

    gateway.tick(2_000);
    assert_eq!(gateway.queued_frames(), 1);
    assert_eq!(gateway.metrics().stale_frames_dropped, 1);

    let report = gateway.tick(TX_TIMEOUT_MS);
    assert_eq!(report.completed, Some(TxOutcome::TimedOut));
    assert_eq!(report.transmitted, Some(FrameKind::Bulk));
    assert_eq!(gateway.metrics().stale_frames_dropped, 2);
    assert_eq!(gateway.queued_frames(), 0);
}

// ============================================================================
// Frame Counter Tests
// ============================================================================

#[test]
fn test_frame_counter_survives_restart() {
    let dir = tempdir().unwrap();
    let config = GatewayConfig {
        uplink_interval_ms: 10,
        radio: abp(),
        ..GatewayConfig::default()
    };

    {
        let mut gateway = Gateway::new(
            config.clone(),
            MemoryFieldbus::new(),
            MemoryPins::new(),
            MemoryRadio::new(),
            FileCounterStore::new(dir.path()),
        )
        .unwrap();
        gateway.start().unwrap();

        for t in [0, 10, 20, 25] {
            gateway.tick(t);
        }
        let counters: Vec<u32> = gateway
            .session()
            .link()
            .sent()
            .iter()
            .map(|f| f.frame_counter)
            .collect();
        assert_eq!(counters, vec![0, 1, 2]);
        assert!(!gateway.session().counter_dirty());
    }

    let mut gateway = Gateway::new(
        config,
        MemoryFieldbus::new(),
        MemoryPins::new(),
        MemoryRadio::new(),
        FileCounterStore::new(dir.path()),
    )
    .unwrap();
    gateway.start().unwrap();
    gateway.tick(0);

    assert_eq!(gateway.session().link().sent()[0].frame_counter, 3);
}

#[test]
fn test_restart_with_frame_on_air_never_reuses_counter() {
    let dir = tempdir().unwrap();
    let config = GatewayConfig {
        radio: abp(),
        ..GatewayConfig::default()
    };

    {
        let mut gateway = Gateway::new(
            config.clone(),
            MemoryFieldbus::new(),
            MemoryPins::new(),
            MemoryRadio::with_completion(Completion::Silent),
            FileCounterStore::new(dir.path()),
        )
        .unwrap();
        gateway.start().unwrap();
        gateway.tick(0);

        assert_eq!(gateway.session().link().sent()[0].frame_counter, 0);
        assert!(gateway.session().link().is_in_flight());
        // Power lost before the transmission completes
    }

    let mut gateway = Gateway::new(
        config,
        MemoryFieldbus::new(),
        MemoryPins::new(),
        MemoryRadio::new(),
        FileCounterStore::new(dir.path()),
    )
    .unwrap();
    gateway.start().unwrap();
    gateway.tick(0);

    assert_eq!(gateway.session().link().sent()[0].frame_counter, 1);
}

// ============================================================================
// Configuration Tests
// ============================================================================

const POLL_DOC: &str = r#"{
    "interval": 1000,
    "requests": [
        { "ip": [192,168,0,187], "unitID": 1, "start": 0, "count": 2, "function": 3,
          "alarms": [ { "index": 0, "op": ">", "threshold": 1000 } ] },
        { "ip": [192,168,0,188], "unitID": 2, "start": 0, "count": 10, "function": 1 },
        { "ip": [255,0,0,1], "unitID": 1, "start": 0, "count": 1, "function": 3 }
    ]
}"#;

const RADIO_DOC: &str = r#"{ "lora": {
    "join": "ABP", "interval": 30000, "subband": 2, "adr": false, "sf": 9,
    "nwkskey": "000102030405060708090A0B0C0D0E0F",
    "appskey": "0F0E0D0C0B0A09080706050403020100",
    "devaddr": "26011BA0"
} }"#;

#[test]
fn test_gateway_from_documents() {
    let (config, report) = GatewayConfig::from_documents(Some(POLL_DOC), Some(RADIO_DOC), None);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(config.targets.len(), 2);

    let mut bus = bus_with(vec![(DEVICE_A, vec![1200, 5])]);
    bus.add_device(DEVICE_B);
    bus.connect(DEVICE_B).unwrap();
    bus.set_coils(DEVICE_B, 0, &[true, false, true]);

    let mut gateway = Gateway::new(
        config,
        bus,
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();

    let link = gateway.session().link();
    assert!(!link.adr());
    assert_eq!(link.sub_band(), 2);
    assert_eq!(link.session().map(|s| s.dev_addr), Some(0x2601_1BA0));
    assert_eq!(gateway.session().current_mtu(), 115);

    // Target alarm, then input alarm from the default inputs, then bulk
    for t in 0..3 {
        gateway.tick(t);
    }
    let sent = gateway.session().link().sent();
    assert_eq!(sent.len(), 3);

    let sections = UplinkDecoder::new().decode_frame(&sent[2].payload).unwrap();
    match &sections[1] {
        Section::Target(record) => {
            assert_eq!(record.function, FunctionCode::ReadCoils);
            assert_eq!(&record.values[..3], &[1, 0, 1]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_reload_between_ticks() {
    let config = GatewayConfig {
        targets: vec![holding(DEVICE_A, 2)],
        radio: abp(),
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(
        config,
        bus_with(vec![(DEVICE_A, vec![1, 2]), (DEVICE_B, vec![3, 4, 5])]),
        MemoryPins::new(),
        MemoryRadio::new(),
        MemoryCounterStore::new(),
    )
    .unwrap();
    gateway.start().unwrap();
    gateway.tick(0);

    let mut invalid = gateway.config().clone();
    invalid.targets.push(holding(DEVICE_B, 126));
    assert!(gateway.reload(invalid).is_err());
    assert_eq!(gateway.model().targets().len(), 1);

    let mut next = gateway.config().clone();
    next.targets = vec![holding(DEVICE_B, 3)];
    gateway.reload(next).unwrap();

    let report = gateway.tick(100);
    assert_eq!(report.polled.map(|p| p.succeeded), Some(1));
    assert_eq!(gateway.model().targets()[0].result(), &[3, 4, 5]);
}
