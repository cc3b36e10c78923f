//! Simulation driver (spec §6 "CLI surface of the simulator driver").
//! Loads a platform and scenario, wires a reclamation/DVFS/DPM policy
//! stack onto one `EdfScheduler` per platform cluster, runs the engine,
//! and emits a trace JSON plus optional summary metrics.

use clap::Parser;
use schedsim::allocator::{Allocator, Cluster, FirstFit, MultiClusterAllocator, SingleSchedulerAllocator};
use schedsim::dvfs::{DisableDpm, DvfsPolicy, PowerAwareDvfsPolicy};
use schedsim::engine::Engine;
use schedsim::error::Error;
use schedsim::io::{load_platform, Scenario};
use schedsim::reclaim::{CashPolicy, GrubPolicy, ReclamationPolicy, StandardPolicy};
use schedsim::scheduler::EdfScheduler;
use schedsim::time::{Duration, TimePoint};
use schedsim::trace::JsonTraceWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "schedsim", about = "Deterministic discrete-event simulator for real-time multi-core scheduling")]
struct Args {
    #[arg(long)]
    input: String,

    #[arg(long)]
    platform: String,

    #[arg(long, default_value = "edf")]
    scheduler: String,

    #[arg(long, default_value = "none")]
    reclaim: String,

    #[arg(long, default_value = "none")]
    dvfs: String,

    #[arg(long, default_value_t = 0.0)]
    dvfs_cooldown: f64,

    #[arg(long, default_value = "basic")]
    dpm: String,

    #[arg(long, default_value_t = 1)]
    dpm_cstate: u8,

    #[arg(long, default_value_t = 0.0)]
    duration: f64,

    #[arg(long)]
    energy: bool,

    #[arg(long)]
    context_switch: Option<f64>,

    #[arg(long, default_value = "-")]
    output: String,

    #[arg(long, default_value = "json")]
    format: String,

    #[arg(long)]
    metrics: bool,

    #[arg(long)]
    verbose: bool,
}

fn make_reclaim(name: &str, processor_count: usize) -> Result<Box<dyn ReclamationPolicy>, String> {
    match name {
        "none" => Ok(Box::new(StandardPolicy::new())),
        "grub" => Ok(Box::new(GrubPolicy::new(processor_count))),
        "cash" => Ok(Box::new(CashPolicy::new())),
        other => Err(format!("unknown --reclaim {other} (expected none|grub|cash)")),
    }
}

fn make_dvfs(name: &str, cooldown: Duration, dpm: &str) -> Result<Option<Box<dyn DvfsPolicy>>, String> {
    let inner: Box<dyn DvfsPolicy> = match name {
        "none" => return Ok(None),
        "power-aware" => Box::new(PowerAwareDvfsPolicy::new(cooldown)),
        other => return Err(format!("unknown --dvfs {other} (expected none|power-aware)")),
    };
    match dpm {
        "basic" => Ok(Some(inner)),
        "none" => Ok(Some(Box::new(DisableDpm::new(inner)))),
        other => Err(format!("unknown --dpm {other} (expected none|basic)")),
    }
}

fn run(args: Args) -> Result<ExitCode, Error> {
    if args.scheduler != "edf" {
        eprintln!("unknown --scheduler {} (only edf is supported)", args.scheduler);
        return Ok(ExitCode::from(64));
    }

    let platform_file = File::open(&args.platform).map_err(|e| Error::LoaderError(format!("opening platform file: {e}")))?;
    let mut loaded = load_platform(platform_file)?;
    if let Some(cs) = args.context_switch {
        for pt in loaded.platform.proc_types.iter_mut() {
            pt.context_switch_delay = Duration::from_secs_f64(cs);
        }
    }

    let scenario_file = File::open(&args.input).map_err(|e| Error::LoaderError(format!("opening scenario file: {e}")))?;
    let scenario = Scenario::load(scenario_file)?;

    let engine = Engine::new(loaded.platform, args.energy);
    let cooldown = Duration::from_secs_f64(args.dvfs_cooldown / 1000.0);

    let mut clusters = Vec::with_capacity(loaded.clusters.len());
    for lc in &loaded.clusters {
        let reclaim = make_reclaim(&args.reclaim, lc.processors.len()).map_err(Error::InvalidState)?;
        let sched = EdfScheduler::new(engine.platform().clone(), reclaim, lc.processors.clone());
        if let Some(dvfs) = make_dvfs(&args.dvfs, cooldown, &args.dpm).map_err(Error::InvalidState)? {
            sched.borrow_mut().set_dvfs_policy(dvfs);
        }
        let freq_max = engine.platform().platform().clock_domain(lc.clock_domain).freq_max;
        clusters.push(Cluster { clock_domain: lc.clock_domain, scheduler: sched, perf_score: lc.perf_score, reference_freq_max: freq_max, u_target: 1.0 });
    }

    let allocator: Rc<dyn Allocator> = if clusters.len() == 1 {
        let cluster = clusters.pop().unwrap();
        for task in &scenario.tasks {
            let util = task.wcet / task.period;
            if !cluster.scheduler.borrow().admission_test(util) {
                eprintln!("task {} fails admission on the single scheduler", task.id);
                return Ok(ExitCode::from(2));
            }
            cluster.scheduler.borrow_mut().attach_task(task.id, task.period, util);
        }
        Rc::new(SingleSchedulerAllocator::new(cluster.scheduler))
    } else {
        let multi = MultiClusterAllocator::new(engine.platform().clone(), clusters, FirstFit);
        for task in &scenario.tasks {
            multi.register_task(task.id, task.wcet, task.period);
        }
        Rc::new(multi)
    };

    let mut engine = engine;
    engine.set_allocator(allocator)?;

    let trace_writer: Option<Box<dyn schedsim::trace::TraceSink>> = if args.format == "null" {
        None
    } else if args.output == "-" {
        Some(Box::new(JsonTraceWriter::new(std::io::stdout())))
    } else {
        let file = File::create(&args.output).map_err(|e| Error::LoaderError(format!("creating output file: {e}")))?;
        Some(Box::new(JsonTraceWriter::new(BufWriter::new(file))))
    };
    engine.set_trace_writer(trace_writer);
    engine.finalize_registration();

    for task in &scenario.tasks {
        for job_spec in &task.jobs {
            let job = schedsim::job::Job::new(task.id, job_spec.arrival, task.relative_deadline, job_spec.duration);
            engine.schedule_arrival(task.id, job)?;
        }
    }

    if args.duration > 0.0 {
        engine.run_until(TimePoint::ZERO + Duration::from_secs_f64(args.duration));
    } else {
        engine.run();
    }
    engine.flush_trace();

    if args.metrics {
        let mut out = std::io::stdout();
        writeln!(out, "final_time={:.6}", engine.now().as_secs_f64()).ok();
        if let Some(energy) = engine.energy() {
            writeln!(out, "total_energy_mj={:.6}", energy.borrow().total_energy().value()).ok();
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(64);
        }
    };

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
