//! # Trueshot Loopback Simulation
//!
//! Runs N clients against one server over simulated links and reports the
//! rewinds the compensator granted, per buffer mode.
//!
//! ```text
//! client ──FireRequest──► [ordered delay line] ──► server connection
//!   ▲                                                  │
//!   └──────ClockSync─── [lossy delay line] ◄───────────┘
//! ```
//!
//! Every player gets its own link, clock skew and weapon. `--report` writes
//! the whole run as JSON for offline analysis.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use trueshot_networking::client::{CompensationClient, FireAttempt};
use trueshot_networking::integration::{
    AimSource, FireAuthority, FireModeKind, PingSource, PositionSource, PreFireEffect,
    ValidatedShot, WeaponTimers,
};
use trueshot_networking::protocol::{ClockSyncUpdate, FireMode, FireRequest};
use trueshot_networking::server::{ConnectionId, ConnectionRegistry, TickTiming};
use trueshot_networking::simulation::{DelayLine, Delivery, NetworkConditions};
use trueshot_networking::transport::{
    reliable_channel, unreliable_channel, ReliableReceiver, ReliableSender, UnreliableReceiver,
    UnreliableSender,
};
use trueshot_networking::{ChannelError, TickLoop, DEFAULT_TICK_RATE, SYNC_CHANNEL_CAPACITY};
use trueshot_security::compensation::max_rewind;
use trueshot_security::{CompensationError, LatencyCompensator, TickSummary};
use trueshot_shared::constants::MAX_REWIND_CEILING_SECS;
use trueshot_shared::{BufferMode, CompensationConfig, Rotator, Vec3};

/// Largest accepted one-way latency or jitter.
const MAX_LINK_MS: u32 = 10_000;

/// Largest accepted player count.
const MAX_PLAYERS: u32 = 256;

/// Extra clock skew per player index, so no two players share a clock.
const SKEW_STEP_SECS: f64 = 0.37;

#[derive(Debug, Error)]
enum SimError {
    #[error(transparent)]
    Compensation(#[from] CompensationError),

    #[error("connection {0} vanished")]
    ConnectionLost(ConnectionId),

    #[error("cannot encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot write report {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

impl From<ChannelError> for SimError {
    fn from(e: ChannelError) -> Self {
        Self::Compensation(e.into())
    }
}

/// Command-line options.
#[derive(Clone, Debug)]
struct SimArgs {
    conditions: NetworkConditions,
    seconds: u32,
    fire_interval: f64,
    clock_skew: f64,
    seed: u64,
    players: u32,
    modes: Vec<BufferMode>,
    config: CompensationConfig,
    verbose: bool,
    realtime: bool,
    report: Option<String>,
}

fn print_usage() {
    println!("Usage: trueshot_sim [options]");
    println!();
    println!("Options:");
    println!("  --conditions <perfect|good|average|poor>  Link preset (default average)");
    println!("  --latency <ms>       One-way base latency, overrides the preset");
    println!("  --jitter <ms>        Jitter, overrides the preset");
    println!("  --loss <percent>     Clock-sync loss, overrides the preset");
    println!("  --seconds <n>        Simulated duration (default 30)");
    println!("  --players <n>        Simultaneous clients (default 1)");
    println!("  --fire-interval <s>  Seconds between trigger presses (default 0.25)");
    println!("  --skew <s>           Server minus client clock of player 0 (default 3.5)");
    println!("  --mode <name|all>    Buffer mode to run (default all, or the config's mode)");
    println!("  --config <path>      Compensation config TOML");
    println!("  --seed <n>           RNG seed (default 7)");
    println!("  --realtime           Pace ticks against the wall clock");
    println!("  --report <path>      Write the run as JSON");
    println!("  --verbose            Log every compensation breakdown");
}

fn value_of<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_mode(name: &str) -> Option<BufferMode> {
    BufferMode::ALL.iter().copied().find(|m| m.name() == name)
}

fn parse_link_ms(args: &[String], flag: &str) -> Result<Option<u32>, String> {
    let Some(v) = value_of(args, flag) else {
        return Ok(None);
    };
    match v.parse::<u32>() {
        Ok(ms) if ms <= MAX_LINK_MS => Ok(Some(ms)),
        Ok(_) => Err(format!("{flag} must be at most {MAX_LINK_MS} ms")),
        Err(_) => Err(format!("bad {flag} `{v}`")),
    }
}

fn parse_args(args: &[String]) -> Result<SimArgs, String> {
    let mut conditions = match value_of(args, "--conditions") {
        Some(name) => NetworkConditions::preset(name).ok_or(format!("unknown conditions `{name}`"))?,
        None => NetworkConditions::default(),
    };
    if let Some(ms) = parse_link_ms(args, "--latency")? {
        conditions.base_latency_ms = ms;
    }
    if let Some(ms) = parse_link_ms(args, "--jitter")? {
        conditions.jitter_ms = ms;
    }
    if let Some(v) = value_of(args, "--loss") {
        conditions.packet_loss_percent = v
            .parse()
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(format!("bad --loss `{v}`"))?;
    }

    let parse_f64 = |flag: &str, default: f64| -> Result<f64, String> {
        value_of(args, flag).map_or(Ok(default), |v| v.parse().map_err(|_| format!("bad {flag} `{v}`")))
    };

    let config = match value_of(args, "--config") {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
            CompensationConfig::from_toml_str(&source).map_err(|e| e.to_string())?
        }
        None => CompensationConfig::default(),
    };

    let modes = match (value_of(args, "--mode"), value_of(args, "--config")) {
        (Some("all"), _) | (None, None) => BufferMode::ALL.to_vec(),
        (None, Some(_)) => vec![config.buffer_mode],
        (Some(name), _) => vec![parse_mode(name).ok_or(format!("unknown mode `{name}`"))?],
    };

    let players = value_of(args, "--players")
        .map_or(Ok(1), str::parse::<u32>)
        .ok()
        .filter(|n| (1..=MAX_PLAYERS).contains(n))
        .ok_or(format!("--players must be between 1 and {MAX_PLAYERS}"))?;

    Ok(SimArgs {
        conditions,
        seconds: value_of(args, "--seconds")
            .map_or(Ok(30), str::parse)
            .map_err(|_| "bad --seconds".to_string())?,
        fire_interval: parse_f64("--fire-interval", 0.25)?.max(0.02),
        clock_skew: parse_f64("--skew", 3.5)?,
        seed: value_of(args, "--seed")
            .map_or(Ok(7), str::parse)
            .map_err(|_| "bad --seed".to_string())?,
        players,
        modes,
        config,
        verbose: args.iter().any(|a| a == "--verbose"),
        realtime: args.iter().any(|a| a == "--realtime"),
        report: value_of(args, "--report").map(str::to_owned),
    })
}

// ============================================================================
// SIMULATED GAME OBJECTS
// ============================================================================

/// Client-side weapon: one trigger press every `interval` seconds.
struct SimShooter {
    interval: f64,
    next_fire_time: f64,
    eye: Vec3,
}

impl WeaponTimers for SimShooter {
    fn is_firing(&self, _mode: FireMode) -> bool {
        false
    }
    fn is_mode_exclusive(&self, _mode: FireMode) -> bool {
        false
    }
    fn cooldown_allows(&self, _mode: FireMode) -> bool {
        true
    }
    fn next_fire_time(&self, _mode: FireMode) -> f64 {
        self.next_fire_time
    }
    fn pre_fire_time(&self, _mode: FireMode) -> f64 {
        0.0
    }
}

impl AimSource for SimShooter {
    fn view_rotation(&self) -> Rotator {
        Rotator::from_degrees(90.0, 0.0)
    }
    fn eye_position(&self) -> Vec3 {
        self.eye
    }
}

struct NoEffects;

impl PreFireEffect for NoEffects {
    fn play_pre_fire(&mut self, _mode: FireMode) {}
}

/// Server-side weapon with a refire delay slightly shorter than the client's.
struct SimWeapon {
    now: f64,
    refire: f64,
    ready_at: f64,
    rewinds: Vec<f64>,
}

impl FireAuthority for SimWeapon {
    fn fire_mode_kind(&self, _mode: FireMode) -> FireModeKind {
        FireModeKind::InstantHit
    }
    fn is_ready(&self, _mode: FireMode) -> bool {
        self.now >= self.ready_at
    }
    fn allow_fire(&self, _mode: FireMode) -> bool {
        true
    }
    fn ammo_amount(&self, _mode: FireMode) -> u32 {
        u32::MAX
    }
    fn start_fire(&mut self, _mode: FireMode, shot: &ValidatedShot) {
        self.ready_at = self.now + self.refire;
        self.rewinds.push(shot.result.ping_lag_seconds);
    }
    fn request_ammo_resync(&mut self, _mode: FireMode, _amount: u32) {}
}

struct SimPawn(Vec3);

impl PositionSource for SimPawn {
    fn current_eye_position(&self) -> Option<Vec3> {
        Some(self.0)
    }
}

// ============================================================================
// PLAYER
// ============================================================================

/// One client, its link and both ends of its channels.
struct Player {
    index: u32,
    id: ConnectionId,
    clock_skew: f64,
    client: CompensationClient,
    srv_sync_rx: UnreliableReceiver<ClockSyncUpdate>,
    srv_fire_tx: ReliableSender<FireRequest>,
    cli_sync_tx: UnreliableSender<ClockSyncUpdate>,
    cli_fire_rx: ReliableReceiver<FireRequest>,
    down: DelayLine<ClockSyncUpdate>,
    up: DelayLine<FireRequest>,
    shooter: SimShooter,
    weapon: SimWeapon,
    pawn: SimPawn,
    presses: u64,
    outcomes: TickSummary,
    rtt_ms: Vec<f32>,
}

impl Player {
    fn join(index: u32, registry: &mut ConnectionRegistry, args: &SimArgs) -> Self {
        let (srv_sync_tx, srv_sync_rx) = unreliable_channel::<ClockSyncUpdate>(SYNC_CHANNEL_CAPACITY);
        let (srv_fire_tx, srv_fire_rx) = reliable_channel::<FireRequest>();
        let (cli_sync_tx, cli_sync_rx) = unreliable_channel::<ClockSyncUpdate>(SYNC_CHANNEL_CAPACITY);
        let (cli_fire_tx, cli_fire_rx) = reliable_channel::<FireRequest>();

        let id = registry.accept(srv_sync_tx, srv_fire_rx);
        #[allow(clippy::cast_precision_loss)]
        let eye = Vec3::new(index as f32 * 100.0, 0.0, 64.0);

        Self {
            index,
            id,
            clock_skew: args.clock_skew + f64::from(index) * SKEW_STEP_SECS,
            client: CompensationClient::new(cli_sync_rx, cli_fire_tx),
            srv_sync_rx,
            srv_fire_tx,
            cli_sync_tx,
            cli_fire_rx,
            down: DelayLine::new(args.conditions, Delivery::Lossy),
            up: DelayLine::new(args.conditions, Delivery::Ordered),
            shooter: SimShooter { interval: args.fire_interval, next_fire_time: 1.0, eye },
            weapon: SimWeapon { now: 0.0, refire: args.fire_interval * 0.9, ready_at: 0.0, rewinds: Vec::new() },
            pawn: SimPawn(eye),
            presses: 0,
            outcomes: TickSummary::default(),
            rtt_ms: Vec::new(),
        }
    }

    /// Server half of a tick: forward the clock sample, measure the link,
    /// then compensate whatever fire requests arrived.
    #[allow(clippy::cast_possible_truncation)]
    fn server_tick(
        &mut self,
        timing: TickTiming,
        registry: &mut ConnectionRegistry,
        compensator: &mut LatencyCompensator,
        rng: &mut StdRng,
    ) -> Result<(), SimError> {
        let conditions = self.down.conditions();
        self.weapon.now = timing.now;

        if let Some(update) = self.srv_sync_rx.latest() {
            self.down.send(timing.now, update, rng.gen(), rng.gen());
        }

        let connection = registry.get_mut(self.id).ok_or(SimError::ConnectionLost(self.id))?;
        let rtt = conditions.generate_latency(rng.gen()) + conditions.generate_latency(rng.gen());
        let rtt_ms = (rtt * 1000.0) as f32;
        connection.record_ping(rtt_ms);
        if timing.tick % u64::from(DEFAULT_TICK_RATE) == 0 {
            self.rtt_ms.push(rtt_ms);
        }

        let srv_fire_tx = &self.srv_fire_tx;
        self.up.deliver_due(timing.now, |request| {
            if let Err(e) = srv_fire_tx.send(&request) {
                tracing::warn!("Fire request lost in loopback: {e}");
            }
        });

        let summary = compensator.service(connection, &mut self.weapon, &self.pawn);
        self.outcomes.started += summary.started;
        self.outcomes.deferred += summary.deferred;
        self.outcomes.ammo_resyncs += summary.ammo_resyncs;
        self.outcomes.dropped += summary.dropped;
        self.outcomes.aborted += summary.aborted;
        Ok(())
    }

    /// Client half of a tick: newest clock sample, then maybe fire.
    fn client_tick(
        &mut self,
        timing: TickTiming,
        registry: &ConnectionRegistry,
        rng: &mut StdRng,
    ) -> Result<(), SimError> {
        let client_now = timing.now - self.clock_skew;

        let cli_sync_tx = &self.cli_sync_tx;
        self.down.deliver_due(timing.now, |update| {
            if let Err(e) = cli_sync_tx.send(&update) {
                tracing::warn!("Clock sample lost in loopback: {e}");
            }
        });
        self.client.tick(client_now, timing.delta);

        let ping = registry.get(self.id).map(|c| *c.ping()).unwrap_or_default();
        if let FireAttempt::Sent { .. } =
            self.client.try_fire(FireMode::Primary, client_now, &self.shooter, &ping, &mut NoEffects)?
        {
            self.presses += 1;
            self.shooter.next_fire_time = client_now + self.shooter.interval;
        }
        while let Some(Ok(request)) = self.cli_fire_rx.try_recv() {
            self.up.send(timing.now, request, rng.gen(), 0);
        }
        Ok(())
    }

    fn into_report(self, registry: &ConnectionRegistry) -> PlayerReport {
        let connection = registry.get(self.id);
        PlayerReport {
            player: self.index,
            clock_skew_s: self.clock_skew,
            presses: self.presses,
            started: self.outcomes.started,
            deferred: self.outcomes.deferred,
            ammo_resyncs: self.outcomes.ammo_resyncs,
            dropped: self.outcomes.dropped,
            aborted: self.outcomes.aborted,
            rewind: RewindStats::from_seconds(&self.weapon.rewinds),
            final_offset_error_ms: (self.client.clock().state().offset_server_minus_client() - self.clock_skew)
                .abs()
                * 1000.0,
            samples_sent: connection.map_or(0, |c| c.samples_sent()),
            samples_lost: self.down.stats().dropped,
            ping_avg_ms: connection.and_then(|c| c.ping().reported_ping_ms()),
            rtt_ms: self.rtt_ms,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Serialize)]
struct RunReport {
    link: LinkReport,
    seconds: u32,
    seed: u64,
    players: u32,
    realtime: bool,
    modes: Vec<ModeReport>,
}

#[derive(Debug, Serialize)]
struct LinkReport {
    base_latency_ms: u32,
    jitter_ms: u32,
    packet_loss_percent: u8,
}

#[derive(Debug, Serialize)]
struct ModeReport {
    mode: BufferMode,
    nominal_ceiling_ms: f64,
    players: Vec<PlayerReport>,
    tick: Option<TickReport>,
}

#[derive(Debug, Serialize)]
struct PlayerReport {
    player: u32,
    clock_skew_s: f64,
    presses: u64,
    started: u32,
    deferred: u32,
    ammo_resyncs: u32,
    dropped: u32,
    aborted: u32,
    rewind: RewindStats,
    final_offset_error_ms: f64,
    samples_sent: u64,
    samples_lost: u64,
    ping_avg_ms: Option<f32>,
    /// One round-trip sample per simulated second.
    rtt_ms: Vec<f32>,
}

#[derive(Debug, Default, Serialize)]
struct RewindStats {
    count: usize,
    min_ms: f64,
    mean_ms: f64,
    max_ms: f64,
    over_ceiling: usize,
}

impl RewindStats {
    #[allow(clippy::cast_precision_loss)]
    fn from_seconds(rewinds: &[f64]) -> Self {
        if rewinds.is_empty() {
            return Self::default();
        }
        let (min, max, sum) = rewinds
            .iter()
            .fold((f64::INFINITY, 0.0f64, 0.0), |(lo, hi, sum), &r| (lo.min(r), hi.max(r), sum + r));
        Self {
            count: rewinds.len(),
            min_ms: min * 1000.0,
            mean_ms: sum / rewinds.len() as f64 * 1000.0,
            max_ms: max * 1000.0,
            over_ceiling: rewinds.iter().filter(|&&r| r > MAX_REWIND_CEILING_SECS).count(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TickReport {
    avg_tick_us: u64,
    max_tick_us: u64,
    late_ticks: u64,
    total_ticks: u64,
}

// ============================================================================
// RUN
// ============================================================================

fn next_tick(ticks: &mut TickLoop, realtime: bool) -> (TickTiming, Option<Instant>) {
    if !realtime {
        return (ticks.step(), None);
    }
    while !ticks.should_tick() {
        ticks.wait_for_next_tick();
    }
    let (timing, start) = ticks.begin_tick();
    (timing, Some(start))
}

fn run(args: &SimArgs, mode: BufferMode) -> Result<ModeReport, SimError> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut registry = ConnectionRegistry::with_buffer_mode(mode);
    let mut compensator = LatencyCompensator::new(args.config.clone());

    let mut players: Vec<Player> = (0..args.players)
        .map(|index| Player::join(index, &mut registry, args))
        .collect();

    let mut ticks = TickLoop::new(DEFAULT_TICK_RATE);
    let total_ticks = u64::from(args.seconds) * u64::from(DEFAULT_TICK_RATE);

    while ticks.tick_count() < total_ticks {
        let (timing, started_at) = next_tick(&mut ticks, args.realtime);

        registry.tick_all(timing.now, timing.delta);
        for player in &mut players {
            player.server_tick(timing, &mut registry, &mut compensator, &mut rng)?;
        }
        for player in &mut players {
            player.client_tick(timing, &registry, &mut rng)?;
        }

        if let Some(start) = started_at {
            ticks.end_tick(start);
        }
    }

    let stats = ticks.stats();
    Ok(ModeReport {
        mode,
        nominal_ceiling_ms: max_rewind(f64::from(args.conditions.nominal_rtt_ms()) / 1000.0) * 1000.0,
        players: players.into_iter().map(|p| p.into_report(&registry)).collect(),
        tick: args.realtime.then_some(TickReport {
            avg_tick_us: stats.avg_tick_us,
            max_tick_us: stats.max_tick_us,
            late_ticks: stats.late_ticks,
            total_ticks: stats.total_ticks,
        }),
    })
}

fn write_report(path: &str, report: &RunReport) -> Result<(), SimError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|source| SimError::Write { path: path.to_owned(), source })
}

fn print_report(report: &ModeReport) {
    println!("┌─ {:<12} ───────────────────────────────────────────────┐", report.mode.name());
    println!("│ Nominal ceiling: {:.2} ms", report.nominal_ceiling_ms);
    for p in &report.players {
        println!(
            "│ P{:<3} presses {:>5}  started {:>5}  deferred {:>4}  dropped {:>3}  aborted {}",
            p.player, p.presses, p.started, p.deferred, p.dropped, p.aborted
        );
        println!(
            "│      rewind ms min {:.2}  mean {:.2}  max {:.2}  over 45 ms: {}",
            p.rewind.min_ms, p.rewind.mean_ms, p.rewind.max_ms, p.rewind.over_ceiling
        );
        println!(
            "│      clock samples {} sent, {} lost  offset error {:.2} ms  ping {}",
            p.samples_sent,
            p.samples_lost,
            p.final_offset_error_ms,
            p.ping_avg_ms.map_or_else(|| "n/a".to_string(), |ms| format!("{ms:.1} ms"))
        );
    }
    if let Some(tick) = &report.tick {
        println!(
            "│ Tick: avg {} us  max {} us  late {}/{}",
            tick.avg_tick_us, tick.max_tick_us, tick.late_ticks, tick.total_ticks
        );
    }
    println!("└──────────────────────────────────────────────────────────────┘");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let sim = match parse_args(&args) {
        Ok(sim) => sim,
        Err(e) => {
            println!("Error: {e}");
            println!();
            print_usage();
            return;
        }
    };

    let default_level = if sim.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║         TRUESHOT LOOPBACK SIMULATION                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!(
        "Link: {} ms ± {} ms, {}% clock-sync loss | {} player(s) | {} s | skew {:.3} s | seed {}{}",
        sim.conditions.base_latency_ms,
        sim.conditions.jitter_ms,
        sim.conditions.packet_loss_percent,
        sim.players,
        sim.seconds,
        sim.clock_skew,
        sim.seed,
        if sim.realtime { " | real time" } else { "" }
    );
    println!();

    let mut run_args = sim.clone();
    run_args.config.debug_logging = sim.verbose;

    let mut modes = Vec::with_capacity(sim.modes.len());
    for &mode in &sim.modes {
        match run(&run_args, mode) {
            Ok(report) => {
                print_report(&report);
                modes.push(report);
            }
            Err(e) => tracing::error!("{mode}: simulation failed: {e}"),
        }
    }

    if let Some(path) = &sim.report {
        let report = RunReport {
            link: LinkReport {
                base_latency_ms: sim.conditions.base_latency_ms,
                jitter_ms: sim.conditions.jitter_ms,
                packet_loss_percent: sim.conditions.packet_loss_percent,
            },
            seconds: sim.seconds,
            seed: sim.seed,
            players: sim.players,
            realtime: sim.realtime,
            modes,
        };
        match write_report(path, &report) {
            Ok(()) => println!("Report written to {path}"),
            Err(e) => tracing::error!("{e}"),
        }
    }
}
