//! Scenario generator (spec §6 "Scenario generator CLI"). Splits a target
//! utilization across `--tasks` tasks with UUniFast, samples each task's
//! period log-uniformly (or uniformly) between `--period-min`/`--period-max`,
//! and — when `--duration` is positive — fills in periodic job arrivals
//! whose per-job duration is drawn from a Weibull distribution scaled by
//! `--exec-ratio` and clamped to the task's WCET.
//!
//! Grounded on `examples/original_source/apps/generator_new.cpp` (the CLI
//! surface this binary's flags mirror exactly) and `examples/
//! original_source/schedsim/io/include/schedsim/io/scenario_generation.hpp`
//! (UUniFast, period distribution, Weibull job sampling).

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use schedsim::io::scenario::{Scenario, ScenarioJob, ScenarioTask};
use schedsim::time::{Duration, TimePoint};
use std::fs::File;
use std::io::Write;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "schedgen", about = "UUniFast/Weibull task-set generator for schedsim scenarios")]
struct Args {
    #[arg(long)]
    tasks: usize,

    #[arg(long)]
    utilization: f64,

    #[arg(long, default_value_t = 10.0)]
    period_min: f64,

    #[arg(long, default_value_t = 1000.0)]
    period_max: f64,

    #[arg(long)]
    log_uniform: bool,

    #[arg(long)]
    uniform: bool,

    #[arg(long, default_value_t = 0.0)]
    duration: f64,

    #[arg(long, default_value_t = 1.0)]
    exec_ratio: f64,

    #[arg(long, default_value = "-")]
    output: String,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    batch: Option<usize>,

    #[arg(long)]
    dir: Option<String>,
}

/// Bini-Buttazzo UUniFast: splits `total` across `n` tasks so every
/// ordering is equally likely and the sum is exact (spec §6, ported from
/// `schedsim::io::uunifast`).
fn uunifast(n: usize, total: f64, rng: &mut impl Rng) -> Vec<f64> {
    let mut sum_u = total;
    let mut utils = Vec::with_capacity(n);
    for i in 1..n {
        let next = sum_u * rng.gen::<f64>().powf(1.0 / (n - i) as f64);
        utils.push(sum_u - next);
        sum_u = next;
    }
    utils.push(sum_u);
    utils
}

fn sample_period_ms(min_ms: f64, max_ms: f64, log_uniform: bool, rng: &mut impl Rng) -> f64 {
    if log_uniform {
        let lo = min_ms.ln();
        let hi = max_ms.ln();
        rng.gen_range(lo..=hi).exp()
    } else {
        rng.gen_range(min_ms..=max_ms)
    }
}

/// Draws a job duration from a Weibull distribution (shape 2, scale chosen
/// so the mean sits at `exec_ratio * wcet`), clamped to `(0, wcet]`.
fn sample_weibull_duration(wcet: Duration, exec_ratio: f64, rng: &mut impl Rng) -> Duration {
    const SHAPE: f64 = 2.0;
    let mean_target = wcet.as_secs_f64() * exec_ratio;
    let scale = mean_target / libm_gamma(1.0 + 1.0 / SHAPE);
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    let sample = scale * (-u.ln()).powf(1.0 / SHAPE);
    Duration::from_secs_f64(sample.clamp(1e-9, wcet.as_secs_f64()))
}

/// Lanczos approximation of Γ(x); only ever called with `x` near 1.5, so a
/// generic crate dependency isn't worth pulling in for one call site.
fn libm_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * libm_gamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        let t = x + G + 0.5;
        for (i, c) in COEFFS.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * a
    }
}

fn generate_one(args: &Args, rng: &mut impl Rng) -> Scenario {
    let utils = uunifast(args.tasks, args.utilization, rng);
    let log_uniform = !args.uniform;
    let mut tasks = Vec::with_capacity(args.tasks);

    for (i, util) in utils.into_iter().enumerate() {
        let period_ms = sample_period_ms(args.period_min, args.period_max, log_uniform, rng);
        let period = Duration::from_secs_f64(period_ms / 1000.0);
        let wcet = period * util;

        let mut jobs = Vec::new();
        if args.duration > 0.0 {
            let mut t = 0.0;
            let period_s = period.as_secs_f64();
            while t < args.duration {
                let job_duration = sample_weibull_duration(wcet, args.exec_ratio, rng);
                jobs.push(ScenarioJob { arrival: TimePoint::ZERO + Duration::from_secs_f64(t), duration: job_duration });
                t += period_s;
            }
        }

        tasks.push(ScenarioTask { id: schedsim::ids::TaskId(i as u32), period, relative_deadline: period, wcet, jobs });
    }

    Scenario { tasks }
}

fn validate(args: &Args) -> Result<(), String> {
    if args.tasks == 0 {
        return Err("--tasks must be at least 1".into());
    }
    if !(args.utilization > 0.0 && args.utilization <= 1.0) {
        return Err("--utilization must be in (0, 1]".into());
    }
    if args.period_min <= 0.0 || args.period_max <= 0.0 {
        return Err("--period-min/--period-max must be positive".into());
    }
    if args.period_min > args.period_max {
        return Err("--period-min must be <= --period-max".into());
    }
    if args.log_uniform && args.uniform {
        return Err("--log-uniform and --uniform are mutually exclusive".into());
    }
    if !(args.exec_ratio > 0.0 && args.exec_ratio <= 1.0) {
        return Err("--exec-ratio must be in (0, 1]".into());
    }
    if args.batch.is_some() && args.dir.is_none() {
        return Err("--dir is required with --batch".into());
    }
    Ok(())
}

fn run(args: Args) -> Result<ExitCode, String> {
    validate(&args)?;

    let mut rng = match args.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    if let Some(count) = args.batch {
        let dir = args.dir.as_ref().unwrap();
        std::fs::create_dir_all(dir).map_err(|e| format!("creating {dir}: {e}"))?;
        for i in 0..count {
            let scenario = generate_one(&args, &mut rng);
            let path = std::path::Path::new(dir).join(format!("scenario_{i}.json"));
            let file = File::create(&path).map_err(|e| format!("creating {}: {e}", path.display()))?;
            scenario.write(file).map_err(|e| e.to_string())?;
        }
        eprintln!("generated {count} scenarios in {dir}");
    } else {
        let scenario = generate_one(&args, &mut rng);
        if args.output == "-" {
            scenario.write(std::io::stdout()).map_err(|e| e.to_string())?;
        } else {
            let file = File::create(&args.output).map_err(|e| format!("creating {}: {e}", args.output))?;
            scenario.write(file).map_err(|e| e.to_string())?;
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

    match run(args) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(64)
        }
    }
}
