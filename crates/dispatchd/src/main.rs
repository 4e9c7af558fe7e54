//! The `dispatchd` daemon.
//!
//! Loads a `[thread]` configuration section, starts the worker pool and a
//! dedicated admin REPL thread, and feeds the pool from a toy request
//! generator so the scheduler has something to dispatch. Real deployments
//! would replace the generator with whatever actually decodes requests off
//! the wire; the scheduler itself doesn't care where `enqueue` calls come
//! from.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::Rng;

use dispatch_admin::{CommandTable, ReplConfig};
use dispatch_common::request::{AtomicChildState, AtomicMasterState, ProcessFn};
use dispatch_common::{Action, ChildState, MasterState, Request, RequestHandle, Trigger, TriggerSink};
use dispatch_config::ThreadConfig;
use dispatch_pool::Pool;

#[derive(Parser)]
#[command(name = "dispatchd", version, about = "The request-dispatch worker pool daemon")]
struct Cli {
    /// Path to a TOML file containing a `[thread]` section. A missing file
    /// falls back to the documented defaults.
    #[arg(long, default_value = "dispatchd.toml")]
    config: PathBuf,

    /// Milliseconds between toy requests fed into the pool.
    #[arg(long = "generate-every-ms", default_value = "200")]
    generate_every_ms: u64,
}

fn main() {
    let cli = Cli::parse();

    let raw = match std::fs::metadata(&cli.config) {
        Ok(_) => ThreadConfig::from_file(&cli.config),
        Err(_) => {
            eprintln!("[dispatchd] no config at '{}', using defaults", cli.config.display());
            Ok(ThreadConfig::default())
        }
    };

    let config = match raw.and_then(ThreadConfig::validate) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[dispatchd] fatal: {e}");
            std::process::exit(1);
        }
    };

    eprintln!(
        "[dispatchd] starting: start_servers={} max_servers={} max_queue_size={}",
        config.start_servers, config.max_servers, config.max_queue_size
    );

    let process: Arc<ProcessFn> = Arc::new(demo_process);
    let triggers = Arc::new(LoggingSink);
    let pool = Pool::new(config, process, triggers);

    let stop_generator = Arc::new(AtomicBool::new(false));
    let generator = {
        let pool = pool.clone();
        let stop_generator = Arc::clone(&stop_generator);
        let interval = Duration::from_millis(cli.generate_every_ms);
        std::thread::spawn(move || run_generator(pool, stop_generator, interval))
    };

    dispatch_admin::run_repl(&build_admin_tree(pool.clone()), &ReplConfig::default())
        .unwrap_or_else(|e| eprintln!("[dispatchd] admin REPL error: {e}"));

    eprintln!("[dispatchd] shutting down");
    stop_generator.store(true, Ordering::Relaxed);
    let _ = generator.join();
    pool.stop();
    eprintln!("[dispatchd] stopped");
}

fn run_generator(pool: Pool, stop: Arc<AtomicBool>, interval: Duration) {
    while !stop.load(Ordering::Relaxed) {
        pool.enqueue(demo_request());
        std::thread::sleep(interval);
    }
}

/// Prints every named lifecycle trigger the pool emits, in the `[component]
/// message` style used throughout this workspace.
struct LoggingSink;

impl TriggerSink for LoggingSink {
    fn emit(&self, trigger: Trigger) {
        eprintln!("[dispatchd] {}", trigger.name());
    }
}

fn build_admin_tree(pool: Pool) -> CommandTable {
    let mut table = CommandTable::new();
    table.register_context(&[], "stats", "queue depth and packet-rate stats");

    let p = pool.clone();
    table.register(&["stats"], "queue", "pending requests currently queued", move |_| {
        p.queue_stats().queue_len.to_string()
    });

    let p = pool.clone();
    table.register(&["stats"], "pps", "smoothed packets-per-second in/out", move |_| {
        let s = p.queue_stats();
        format!("in={:.2} out={:.2}", s.pps_in, s.pps_out)
    });

    let p = pool.clone();
    table.register(&[], "threads", "idle/active/total worker counts", move |_| {
        format!(
            "idle={} active={} total={}",
            p.idle_threads(),
            p.active_threads(),
            p.total_threads()
        )
    });

    table
}

/// A stand-in for a real decoded wire request: fixed priority, no protocol
/// rounds, a five-second budget, never accounting or proxied.
struct DemoRequest {
    arrival: Instant,
    master_state: AtomicMasterState,
    child_state: AtomicChildState,
}

fn demo_request() -> RequestHandle {
    Arc::new(DemoRequest {
        arrival: Instant::now(),
        master_state: AtomicMasterState::new(MasterState::Queued),
        child_state: AtomicChildState::new(ChildState::Runnable),
    })
}

impl Request for DemoRequest {
    fn arrival(&self) -> Instant {
        self.arrival
    }

    fn priority(&self) -> i32 {
        0
    }

    fn rounds(&self) -> u32 {
        0
    }

    fn max_request_time(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn is_accounting(&self) -> bool {
        false
    }

    fn is_proxied(&self) -> bool {
        false
    }

    fn master_state(&self) -> MasterState {
        self.master_state.load()
    }

    fn set_master_state(&self, state: MasterState) {
        self.master_state.store(state);
    }

    fn child_state(&self) -> ChildState {
        self.child_state.load()
    }

    fn set_child_state(&self, state: ChildState) {
        self.child_state.store(state);
    }
}

/// The opaque handler every worker invokes. A real deployment plugs in
/// protocol decoding and authentication/accounting logic here; this one
/// just simulates a bit of work.
fn demo_process(request: RequestHandle, action: Action) {
    match action {
        Action::Run => {
            request.set_master_state(MasterState::Running);
            let work = rand::thread_rng().gen_range(5..30);
            std::thread::sleep(Duration::from_millis(work));
            request.set_master_state(MasterState::Done);
        }
        Action::Done => {
            eprintln!("[dispatchd] a request will not be processed further");
        }
    }
}
