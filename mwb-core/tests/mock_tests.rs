use core::{cell::RefCell, convert::Infallible};

use embedded_hal::pwm::{ErrorType, SetDutyCycle};
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTrans};
use mwb_core::utils::{
    connection::{
        frame::{self, PAYLOAD_OFFSET},
        link::{Downlink, LinkConfig, LinkState, Transport, Uplink},
        protocol::{
            self, ChassisCommandPayload, ChassisCommandSink, PacketType, SuspendOnOffline, TelemetrySource,
            WheelTelemetryPayload,
        },
    },
    controllers::{
        chassis::{ChassisCommand, ChassisConfig, ChassisState, MecanumChassis},
        driver::{AtomicEncoder, Direction, HBridge, IdleMode, WheelOutput},
        motor::{MotorActuator, MotorConfig, MotorState},
    },
    scheduler::{Heartbeat, HeartbeatConfig},
};

/// PWM channel that only remembers the last duty cycle.
struct FakePwm {
    max: u16,
    duty: u16,
}

impl ErrorType for FakePwm {
    type Error = Infallible;
}

impl SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.duty = duty;
        Ok(())
    }
}

/// Wheel output that records the last command it received.
#[derive(Default)]
struct Recorder {
    direction: Option<Direction>,
    magnitude: u16,
    idle: Option<IdleMode>,
}

impl WheelOutput for Recorder {
    type Error = Infallible;

    fn max_magnitude(&self) -> u16 {
        1000
    }

    fn set_direction(
        &mut self,
        direction: Direction,
    ) -> Result<(), Infallible> {
        self.direction = Some(direction);
        self.idle = None;
        Ok(())
    }

    fn set_magnitude(
        &mut self,
        magnitude: u16,
    ) -> Result<(), Infallible> {
        self.magnitude = magnitude;
        Ok(())
    }

    fn set_idle(
        &mut self,
        mode: IdleMode,
    ) -> Result<(), Infallible> {
        self.idle = Some(mode);
        self.direction = None;
        Ok(())
    }
}

/// Transport collecting every sent frame.
struct Wire<'a>(&'a RefCell<Vec<Vec<u8>>>);

impl Transport for Wire<'_> {
    type Error = Infallible;

    fn send(
        &mut self,
        frame: &[u8],
    ) -> Result<(), Infallible> {
        self.0.borrow_mut().push(frame.to_vec());
        Ok(())
    }
}

fn wheels(encoders: &[AtomicEncoder; 4]) -> [MotorActuator<&AtomicEncoder, Recorder>; 4] {
    core::array::from_fn(|i| MotorActuator::new(MotorConfig::default(), &encoders[i], Recorder::default()))
}

/// Build a downlink command frame the way the host does.
fn command_frame(
    state: ChassisState,
    vx: f32,
    vy: f32,
    omega: f32,
) -> Vec<u8> {
    let cfg = LinkConfig::default();
    let mut buf = vec![0u8; cfg.rx_len];
    let payload = ChassisCommandPayload { state, vx, vy, omega };
    protocol::encode(&payload, &mut buf[PAYLOAD_OFFSET..cfg.rx_len - 1]).unwrap();
    frame::seal(&mut buf, cfg.head, PacketType::ChassisCommand.into()).unwrap();
    buf
}

fn approx(
    a: f32,
    b: f32,
) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn test_hbridge_pin_patterns() {
    let a_expect = [
        PinTrans::set(PinState::Low),
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::Low),
    ];
    let b_expect = [
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::Low),
        PinTrans::set(PinState::High),
        PinTrans::set(PinState::Low),
    ];
    let pwm = FakePwm { max: 1000, duty: 0 };
    let mut bridge = HBridge::new(PinMock::new(&a_expect), PinMock::new(&b_expect), pwm);

    bridge.set_direction(Direction::Forward).unwrap();
    bridge.set_direction(Direction::Reverse).unwrap();
    bridge.set_idle(IdleMode::Float).unwrap();
    bridge.set_idle(IdleMode::Brake).unwrap();

    assert_eq!(bridge.max_magnitude(), 1000);
    bridge.set_magnitude(4000).unwrap();

    let (mut a, mut b, pwm) = bridge.free();
    assert_eq!(pwm.duty, 1000);
    a.done();
    b.done();
}

#[test]
fn test_motor_drives_hbridge_forward() {
    let a_expect = [PinTrans::set(PinState::Low)];
    let b_expect = [PinTrans::set(PinState::High)];
    let bridge = HBridge::new(
        PinMock::new(&a_expect),
        PinMock::new(&b_expect),
        FakePwm { max: 1000, duty: 0 },
    );
    let encoder = AtomicEncoder::new();
    let mut motor = MotorActuator::new(MotorConfig::default(), &encoder, bridge);

    motor.set_motion(12.0);
    for _ in 0..motor.config().control_period {
        motor.tick();
    }

    let (_, bridge) = motor.release();
    let (mut a, mut b, pwm) = bridge.free();
    assert_eq!(pwm.duty, 87);
    a.done();
    b.done();
}

#[test]
fn test_forward_scenario_wheel_targets() {
    let encoders: [AtomicEncoder; 4] = Default::default();
    let command = ChassisCommand::new();
    let mut chassis = MecanumChassis::new(ChassisConfig::default(), &command, wheels(&encoders));

    chassis.enable().unwrap();
    assert_eq!(chassis.state(), ChassisState::Suspended);
    chassis.set_motion(0.1, 0.0, 0.0).unwrap();
    for _ in 0..50 {
        chassis.tick();
    }

    let r = 0.1 / 0.0635;
    assert!(approx(r, 1.575));
    let expected = [r, -r, r, -r];
    for (i, e) in expected.into_iter().enumerate() {
        assert!(approx(chassis.wheel(i).unwrap().set_speed(), e), "wheel {i}");
    }
    assert_eq!(chassis.scale(), 1.0);
}

#[test]
fn test_set_motion_while_disabled() {
    let command = ChassisCommand::new();
    let state = LinkState::new();
    let mut downlink = Downlink::new(LinkConfig::default(), &state, ChassisCommandSink::new(&command));

    downlink.receive(&command_frame(ChassisState::Running, 1.0, 1.0, 1.0)).unwrap();

    let snap = command.snapshot();
    assert_eq!(snap.state, ChassisState::Disabled);
    assert_eq!((snap.vx, snap.vy, snap.omega), (0.0, 0.0, 0.0));
    assert_eq!(state.error_count(), 0);
}

#[test]
fn test_command_round_trip() {
    let command = ChassisCommand::new();
    command.enable().unwrap();
    let state = LinkState::new();
    let mut downlink = Downlink::new(LinkConfig::default(), &state, ChassisCommandSink::new(&command));

    downlink.receive(&command_frame(ChassisState::Running, 0.25, -0.125, 1.5)).unwrap();

    let snap = command.snapshot();
    assert_eq!(snap.state, ChassisState::Running);
    assert_eq!((snap.vx, snap.vy, snap.omega), (0.25, -0.125, 1.5));
}

#[test]
fn test_overflowing_command_frame_stays_bounded() {
    let encoders: [AtomicEncoder; 4] = Default::default();
    let command = ChassisCommand::new();
    let state = LinkState::new();
    let mut downlink = Downlink::new(LinkConfig::default(), &state, ChassisCommandSink::new(&command));
    let mut chassis = MecanumChassis::new(ChassisConfig::default(), &command, wheels(&encoders));
    chassis.enable().unwrap();

    downlink.receive(&command_frame(ChassisState::Running, f32::MAX, 0.0, 0.0)).unwrap();
    for _ in 0..500 {
        chassis.tick_wheels();
        chassis.tick();
    }

    assert!(chassis.scale() > 0.0 && chassis.scale() < 1.0);
    let max = MotorConfig::default().max_omega;
    for i in 0..4 {
        let wheel = chassis.wheel(i).unwrap();
        let (rate, direction) = if i % 2 == 0 {
            (max, Direction::Forward)
        } else {
            (-max, Direction::Reverse)
        };
        assert_eq!(wheel.set_speed(), rate, "wheel {i}");
        assert!(wheel.target_omega().is_finite() && wheel.target_omega().abs() <= max);
        assert_eq!(wheel.driver().direction, Some(direction), "wheel {i}");
    }

    // non-finite twists are dropped before they reach the command
    downlink.receive(&command_frame(ChassisState::Running, f32::NAN, 0.0, 0.0)).unwrap();
    downlink.receive(&command_frame(ChassisState::Running, 0.0, f32::INFINITY, 0.0)).unwrap();
    let snap = command.snapshot();
    assert_eq!((snap.state, snap.vx, snap.vy), (ChassisState::Running, f32::MAX, 0.0));
    assert_eq!(state.error_count(), 0);
}

#[test]
fn test_double_stop_is_idempotent() {
    let command = ChassisCommand::new();
    command.enable().unwrap();
    let state = LinkState::new();
    let mut downlink = Downlink::new(LinkConfig::default(), &state, ChassisCommandSink::new(&command));

    let stop = command_frame(ChassisState::Suspended, 0.0, 0.0, 0.0);
    downlink.receive(&command_frame(ChassisState::Running, 0.3, 0.0, 0.0)).unwrap();
    downlink.receive(&stop).unwrap();
    let once = command.snapshot();
    downlink.receive(&stop).unwrap();

    assert_eq!(command.snapshot(), once);
    assert_eq!(once.state, ChassisState::Suspended);
}

#[test]
fn test_single_bit_corruption_counts_once() {
    let command = ChassisCommand::new();
    command.enable().unwrap();
    command.set_motion(0.1, 0.2, 0.3).unwrap();
    let before = command.snapshot();

    let state = LinkState::new();
    let mut downlink = Downlink::new(LinkConfig::default(), &state, ChassisCommandSink::new(&command));
    let good = command_frame(ChassisState::Braked, 0.0, 0.0, 0.0);

    let mut expected_errors = 0;
    for byte in 0..good.len() {
        for bit in 0..8 {
            let mut corrupted = good.clone();
            corrupted[byte] ^= 1 << bit;
            assert!(downlink.receive(&corrupted).is_err(), "byte {byte} bit {bit}");
            expected_errors += 1;
            assert_eq!(state.error_count(), expected_errors);
            assert_eq!(command.snapshot(), before);
        }
    }

    downlink.receive(&good).unwrap();
    assert_eq!(state.error_count(), expected_errors);
    assert_eq!(command.state(), ChassisState::Braked);
}

#[test]
fn test_heartbeat_telemetry_and_watchdog() {
    let encoders: [AtomicEncoder; 4] = Default::default();
    let command = ChassisCommand::new();
    let state = LinkState::new();
    let frames = RefCell::new(Vec::new());
    let cfg = LinkConfig::default();

    let chassis = MecanumChassis::new(ChassisConfig::default(), &command, wheels(&encoders));
    let uplink = Uplink::new(cfg, &state, Wire(&frames), TelemetrySource, SuspendOnOffline::new(&command));
    let mut heartbeat = Heartbeat::new(HeartbeatConfig::default(), chassis, uplink);
    let mut downlink = Downlink::new(cfg, &state, ChassisCommandSink::new(&command));

    command.enable().unwrap();
    downlink.receive(&command_frame(ChassisState::Running, 0.1, 0.0, 0.0)).unwrap();
    // one output revolution on wheel 0 during the first control period
    encoders[0].add(728);

    for _ in 0..60 {
        heartbeat.tick();
    }
    {
        let sent = frames.borrow();
        assert_eq!(sent.len(), 3);
        let last = &sent[2];
        assert_eq!(last.len(), cfg.tx_len);
        let (packet_type, payload) = frame::validate(last, cfg.head).unwrap();
        assert_eq!(packet_type, u8::from(PacketType::WheelTelemetry));
        let wheels: WheelTelemetryPayload = protocol::decode(payload).unwrap();
        assert!((wheels.wheel_omega[0] - 2.0 * core::f32::consts::PI / 0.05).abs() < 1e-2);
    }

    for _ in 60..100 {
        heartbeat.tick();
    }
    // the command above landed inside the first window
    assert_eq!(command.state(), ChassisState::Running);
    let chassis = heartbeat.chassis();
    assert!((0..4).all(|i| chassis.wheel(i).unwrap().state() == MotorState::Running));
    let front = chassis.wheel(0).unwrap().driver();
    assert_eq!(front.direction, Some(Direction::Forward));
    assert!(front.magnitude > 0);
    assert_eq!(chassis.wheel(1).unwrap().driver().direction, Some(Direction::Reverse));

    // silent second window
    for _ in 100..200 {
        heartbeat.tick();
    }
    assert_eq!(command.state(), ChassisState::Suspended);

    // the chassis re-targets at 250, the wheels idle at their next period
    for _ in 200..300 {
        heartbeat.tick();
    }
    let chassis = heartbeat.chassis();
    assert!((0..4).all(|i| chassis.wheel(i).unwrap().driver().idle == Some(IdleMode::Float)));
    assert_eq!(frames.borrow().len(), 15);
    assert_eq!(heartbeat.send_failures(), 0);
    assert_eq!(heartbeat.ticks(), 300);
}
