//! spine-runner: headless runner for the rewind spine.
//!
//! Usage:
//!   spine-runner --seed 12345 --ticks 250 --horizon 100 --rewind-to 200
//!   spine-runner --seed 12345 --db history.db --data-dir ./data
//!   spine-runner --seed 12345 --ipc-mode

use anyhow::Result;
use std::env;
use std::io::{self, BufRead, Write};
use timespine_core::{
    clock::SimSpeed,
    command::TimeCommand,
    config::SimConfig,
    controller::RewindMode,
    engine::{EngineState, SimEngine},
    event::SimEvent,
    store::HistoryExport,
    types::Tick,
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick { count: u64 },
    Rewind { target: Tick },
    Resume,
    Branch,
    Pause,
    SetSpeed { speed: SimSpeed },
    Quit,
}

#[derive(serde::Serialize)]
struct IpcReply<'a> {
    state:  EngineState,
    events: &'a [SimEvent],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 250u64);
    let rewind_to = args
        .windows(2)
        .find(|w| w[0] == "--rewind-to")
        .and_then(|w| w[1].parse::<Tick>().ok());
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str());
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let mut config = SimConfig::load(data_dir)?;
    let horizon = parse_arg(&args, "--horizon", config.spine.horizon);
    config = config.with_horizon(horizon);

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    let mut engine = SimEngine::build(run_id.clone(), seed, &config)?;

    if let Some(path) = db {
        let export = HistoryExport::open(path)?;
        export.migrate()?;
        engine.attach_export(export)?;
    }

    if ipc_mode {
        return run_ipc_loop(&mut engine);
    }

    println!("spine-runner");
    println!("  run_id:    {run_id}");
    println!("  seed:      {seed}");
    println!("  ticks:     {ticks}");
    println!("  horizon:   {horizon}");
    println!("  db:        {}", db.unwrap_or("(none)"));
    println!("  data_dir:  {data_dir}");
    println!();

    engine.run_ticks(ticks)?;
    print_summary(&engine)?;

    if let Some(target) = rewind_to {
        let live = engine.fingerprint()?;
        println!();
        match engine.rewind_to(target) {
            Ok(report) => {
                println!("=== REWIND ===");
                println!("  target:        {}", report.target);
                println!("  from snapshot: {}", report.snapshot_tick);
                println!("  replayed:      {}", report.replayed);
                println!("  skipped:       {}", report.skipped);
                print_world(&engine);

                engine.request(TimeCommand::ResumePlayback)?;
                while engine.mode() != RewindMode::Recording {
                    engine.run_ticks(1)?;
                }
                let restored = engine.fingerprint()? == live;
                println!("  caught up:     tick {} (state restored: {restored})", engine.world_tick());
            }
            Err(e) => println!("=== REWIND REJECTED ===\n  {e}"),
        }
    }
    Ok(())
}

/// Parse one IPC line. Unparseable lines are logged and answered with an error.
fn parse_command(line: &str) -> serde_json::Result<IpcCommand> {
    serde_json::from_str(line.trim()).map_err(|e| {
        log::warn!("Unknown command: {} ({e})", line.trim());
        e
    })
}

fn run_ipc_loop(engine: &mut SimEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd = match parse_command(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let events = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Vec::new(),
            IpcCommand::Tick { count } => engine.run_ticks(count)?,
            IpcCommand::Rewind { target } => engine.request(TimeCommand::Rewind { target })?,
            IpcCommand::Resume => engine.request(TimeCommand::ResumePlayback)?,
            IpcCommand::Branch => engine.request(TimeCommand::Branch)?,
            IpcCommand::Pause => engine.request(TimeCommand::Pause)?,
            IpcCommand::SetSpeed { speed } => engine.request(TimeCommand::SetSpeed { speed })?,
        };

        // Per-tick chatter stays out of the reply; spine events go through.
        let events: Vec<SimEvent> = events
            .into_iter()
            .filter(|e| !matches!(e, SimEvent::TickStarted { .. } | SimEvent::TickCompleted { .. }))
            .collect();
        let reply = IpcReply { state: engine.state(), events: &events };
        writeln!(stdout, "{}", serde_json::to_string(&reply)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn print_summary(engine: &SimEngine) -> Result<()> {
    let state = engine.state();
    println!("=== RUN SUMMARY ===");
    println!("  final tick:      {}", state.live_tick);
    println!("  oldest tick:     {:?}", state.oldest_tick);
    println!("  frames:          {}", state.frames);
    println!("  snapshot rows:   {}", engine.spine().snapshots().entry_count());
    println!("  journal entries: {}", state.journal_entries);
    if let Some(export) = engine.export() {
        println!(
            "  exported:        {} snapshot rows, {} journal rows",
            export.snapshot_entry_count(&engine.run_id)?,
            export.journal_entry_count(&engine.run_id)?
        );
    }
    print_world(engine);
    Ok(())
}

fn print_world(engine: &SimEngine) {
    let world = engine.world();
    println!("  -- world at tick {} --", engine.world_tick());
    for node in world.nodes.values() {
        println!("  {:<10} remaining {:>9.2}", node.name, node.remaining);
    }
    for vessel in world.vessels.values() {
        println!("  {:<10} cargo     {:>9.2} / {:.0}", vessel.name, vessel.cargo, vessel.capacity);
    }
    println!("  pickups:    {}", world.pickup_count());
    println!("  ore_in_hold {:>9.2}", world.telemetry.ore_in_hold);
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
