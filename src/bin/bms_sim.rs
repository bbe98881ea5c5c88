use bmscore::can::{CanFrame, MessageId, RxCodec, RxSignal, TxCodec};
use bmscore::config::BmsConfig;
use bmscore::contactor::{
    check_fuse, check_precharge, ContState, ContSubstate, ContactorControl, ContactorId, ContactorStateMachine, SimulatedPins,
    StateRequest,
};
use bmscore::diag::DiagRecorder;
use bmscore::store::MemoryStore;
use clap::{App, Arg};
use colored::*;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, Level};

const BATTERY_MV: f32 = 400_000.0;
const PRECHARGE_RESISTANCE_OHM: f32 = 100.0;
const PRECHARGE_TAU_MS: f32 = 150.0;
const DISCHARGE_TAU_MS: f32 = 2_000.0;
const LOAD_CURRENT_MA: i32 = 2_500;
const TX_PERIOD_MS: u32 = 100;
const SETTLE_TIMEOUT_MS: u32 = 3_000;

/// First-order model of the DC link behind the contactors.
#[derive(Debug, Default)]
struct Plant {
    link_mv: f32,
    current_ma: i32,
}

impl Plant {
    fn step(&mut self, pins: &SimulatedPins, tick_ms: u16) {
        let minus = pins.is_closed(ContactorId::MainMinus);
        let plus = pins.is_closed(ContactorId::MainPlus);
        let precharge = pins.is_closed(ContactorId::Precharge);
        let dt = f32::from(tick_ms);

        if minus && plus {
            self.link_mv = BATTERY_MV;
            self.current_ma = LOAD_CURRENT_MA;
        } else if minus && precharge {
            let delta = BATTERY_MV - self.link_mv;
            self.link_mv += delta * dt / PRECHARGE_TAU_MS;
            self.current_ma = (delta / PRECHARGE_RESISTANCE_OHM) as i32;
        } else {
            self.link_mv -= self.link_mv * dt / DISCHARGE_TAU_MS;
            self.current_ma = 0;
        }
    }

    fn frames(&self) -> [CanFrame; 4] {
        [
            sensor_frame(MessageId::IvtCurrent, RxSignal::IvtCurrentMeasurement, f64::from(self.current_ma)),
            sensor_frame(MessageId::IvtVoltage1, RxSignal::IvtVoltage1Measurement, f64::from(BATTERY_MV)),
            sensor_frame(MessageId::IvtVoltage2, RxSignal::IvtVoltage2Measurement, f64::from(BATTERY_MV)),
            sensor_frame(MessageId::IvtVoltage3, RxSignal::IvtVoltage3Measurement, f64::from(self.link_mv)),
        ]
    }
}

fn sensor_frame(message: MessageId, measurement: RxSignal, value: f64) -> CanFrame {
    let descriptor = measurement.descriptor();
    let mut data = [0u8; 8];
    descriptor.insert(&mut data, descriptor.to_raw(value));
    CanFrame::for_message(message, data)
}

fn state_request_frame(request: StateRequest) -> CanFrame {
    let mut data = [0u8; 8];
    data[1] = request.code();
    CanFrame::for_message(MessageId::StateRequest, data)
}

struct Simulation {
    config: BmsConfig,
    store: MemoryStore,
    diag: DiagRecorder,
    control: ContactorControl<SimulatedPins>,
    rx: RxCodec,
    tx: TxCodec,
    plant: Plant,
    now_ms: u32,
    tx_frames: usize,
}

impl Simulation {
    fn new(config: BmsConfig) -> Self {
        let machine = ContactorStateMachine::new(SimulatedPins::new(), &config);
        let control = ContactorControl::new(machine);
        let rx = RxCodec::new(config.codec).with_sink(control.handle());
        Self {
            config,
            store: MemoryStore::new(),
            diag: DiagRecorder::new(),
            rx,
            tx: TxCodec::new(config.codec),
            control,
            plant: Plant::default(),
            now_ms: 0,
            tx_frames: 0,
        }
    }

    fn receive(&mut self, frame: &CanFrame) {
        if let Err(e) = self.rx.decode_frame(&self.store, &mut self.diag, frame, self.now_ms) {
            error!("rx decode failed: {}", e);
        }
    }

    fn tick(&mut self) {
        let tick_ms = self.config.contactor.tick_ms;
        let plant = &mut self.plant;
        self.control.with_machine(|m| plant.step(m.bank().pins(), tick_ms));
        for frame in self.plant.frames() {
            self.receive(&frame);
        }

        self.control.trigger(&self.store, &mut self.diag);

        if self.now_ms % TX_PERIOD_MS == 0 {
            match self.tx.encode_cycle(&self.store, |frame| {
                debug!(id = frame.id, data = ?frame.data, "tx");
            }) {
                Ok(count) => self.tx_frames += count,
                Err(e) => error!("tx encode failed: {}", e),
            }
        }
        self.now_ms = self.now_ms.wrapping_add(u32::from(tick_ms));
    }

    fn position(&self) -> (ContState, ContSubstate) {
        self.control.with_machine(|m| (m.state(), m.substate()))
    }

    /// Ticks until the machine rests in `state` or `limit_ms` has passed.
    async fn run_until(&mut self, interval: &mut time::Interval, state: ContState, substate: ContSubstate, limit_ms: u32) -> bool {
        let deadline = self.now_ms.saturating_add(limit_ms);
        while self.now_ms < deadline {
            interval.tick().await;
            self.tick();
            if self.position() == (state, substate) {
                return true;
            }
        }
        false
    }

    async fn run_for(&mut self, interval: &mut time::Interval, duration_ms: u32) {
        let deadline = self.now_ms.saturating_add(duration_ms);
        while self.now_ms < deadline {
            interval.tick().await;
            self.tick();
        }
    }

    fn print_summary(&self) {
        let (state, substate, line, cycles, rejected, tries) = self.control.with_machine(|m| {
            (
                m.state(),
                m.substate(),
                m.power_line(),
                m.cycle_counter(),
                m.rejected_requests(),
                m.precharge_try_counter(),
            )
        });

        println!();
        println!("{}", "BMS simulation summary".bright_white().bold());
        println!("========================");
        println!("  {:<22} {:?} / {:?}", "contactor state:", state, substate);
        println!("  {:<22} {:?}", "power line:", line);
        println!("  {:<22} {}", "trigger cycles:", cycles);
        println!("  {:<22} {}", "precharge attempts:", tries);
        println!("  {:<22} {}", "rejected requests:", rejected);
        println!("  {:<22} {}", "busy triggers:", self.control.busy_count());
        println!("  {:<22} {}", "rx frames:", self.rx.frames_decoded());
        println!("  {:<22} {}", "tx frames:", self.tx_frames);
        println!("  {:<22} {:.1} V", "dc link:", self.plant.link_mv / 1000.0);

        let failing: Vec<_> = self.diag.failing_channels().collect();
        if failing.is_empty() {
            println!("  {:<22} {}", "diagnostics:", "all OK".green());
        } else {
            for record in failing {
                println!(
                    "  {:<22} {:?} ({} NOK)",
                    "diagnostics:".red(),
                    record.channel,
                    record.nok_count
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("bms-sim")
        .version("0.1.0")
        .author("BMS Firmware Team")
        .about("Contactor sequencing and CAN codec simulator")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("request")
                .short("r")
                .long("request")
                .value_name("STATE")
                .help("Operating state requested over the bus")
                .takes_value(true)
                .possible_values(&["normal", "charge", "engine"])
                .default_value("normal"),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("Time to hold the operating state")
                .takes_value(true)
                .default_value("5")
                .validator(|v| match v.parse::<u32>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Duration must be a whole number of seconds".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match matches.value_of("config") {
        Some(path) => BmsConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => BmsConfig::default(),
    };
    let request = match matches.value_of("request") {
        Some("charge") => StateRequest::Charge,
        Some("engine") => StateRequest::Engine,
        _ => StateRequest::Normal,
    };
    let hold_ms = matches
        .value_of("duration")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(5)
        .saturating_mul(1000);

    println!("{}", "BMS Contactor Simulator".bright_cyan().bold());
    println!("=======================");

    let mut sim = Simulation::new(config);
    let mut interval = time::interval(Duration::from_millis(u64::from(config.contactor.tick_ms)));

    sim.control.handle().submit(StateRequest::Init);
    if !sim.run_until(&mut interval, ContState::Standby, ContSubstate::Standby, SETTLE_TIMEOUT_MS).await {
        println!("{} machine did not reach standby", "✗".red());
        sim.print_summary();
        return Ok(());
    }
    println!("{} standby reached at {} ms", "✓".green(), sim.now_ms);

    sim.receive(&state_request_frame(request));
    info!(?request, "operating request sent over the bus");
    let target = match request {
        StateRequest::Charge => ContState::Charge,
        StateRequest::Engine => ContState::Engine,
        _ => ContState::Normal,
    };
    let limit = u32::from(config.contactor.oscillation_limit) * u32::from(config.contactor.tick_ms) + SETTLE_TIMEOUT_MS;
    if sim.run_until(&mut interval, target, ContSubstate::Standby, limit).await {
        println!("{} {:?} reached at {} ms", "✓".green(), target, sim.now_ms);
        let line = sim.control.with_machine(|m| m.power_line());
        let charged = check_precharge(&sim.store, line, &config.limits);
        let fuse = check_fuse(&sim.store, line, &config.limits, &mut sim.diag, sim.now_ms);
        info!(?line, charged, ?fuse, "power line checks");
        sim.run_for(&mut interval, hold_ms).await;
    } else {
        println!("{} precharge did not complete", "✗".red());
    }

    sim.receive(&state_request_frame(StateRequest::Standby));
    if sim.run_until(&mut interval, ContState::Standby, ContSubstate::Standby, SETTLE_TIMEOUT_MS).await {
        println!("{} contactors opened at {} ms", "✓".green(), sim.now_ms);
    } else {
        println!("{} open sequence did not complete", "✗".red());
    }

    sim.print_summary();
    Ok(())
}
