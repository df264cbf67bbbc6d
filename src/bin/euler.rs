use euler::config::{EngineConfig, StressConfig};
use euler::logging::init_logging;
use euler::stress::run_stress;
use euler::{bind_function, bind_method, make_handle, make_reference, ContextAnchor, HostType, Object, ScriptHeap, Value};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug)]
enum Command {
    Stress { threads: Option<usize>, operations: Option<usize> },
    Demo,
}

#[derive(Debug)]
struct Args {
    command: Command,
    config: Option<PathBuf>,
}

impl Args {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let prog = args.first().map(String::as_str).unwrap_or("euler");

        let Some(command) = args.get(1) else {
            return Err(Self::usage(prog));
        };

        let mut threads = None;
        let mut operations = None;
        let mut config = None;

        let mut rest = args[2..].iter();
        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "--help" | "-h" => return Err(Self::usage(prog)),
                "--threads" => threads = Some(Self::number(rest.next(), "--threads")?),
                "--ops" => operations = Some(Self::number(rest.next(), "--ops")?),
                "--config" => match rest.next() {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => return Err("--config requires a path".to_string()),
                },
                opt => return Err(format!("Unknown option: {}\n\n{}", opt, Self::usage(prog))),
            }
        }

        let command = match command.as_str() {
            "stress" => Command::Stress { threads, operations },
            "demo" => Command::Demo,
            "--help" | "-h" => return Err(Self::usage(prog)),
            other => return Err(format!("Unknown command: {}\n\n{}", other, Self::usage(prog))),
        };

        Ok(Self { command, config })
    }

    fn number(value: Option<&String>, flag: &str) -> Result<usize, String> {
        value
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("{} requires a positive number", flag))
    }

    fn usage(prog: &str) -> String {
        format!(
            "Euler - native/script shared ownership core\n\n\
            USAGE:\n    {} <COMMAND> [OPTIONS]\n\n\
            COMMANDS:\n    \
            stress          Concurrent copy/drop workload on one shared object\n    \
            demo            Engine startup: anchor, bound type, collection\n\n\
            OPTIONS:\n    \
            -h, --help      Print help information\n    \
            --threads N     Worker threads (stress)\n    \
            --ops M         Operations per thread (stress)\n    \
            --config FILE   TOML configuration file\n\n\
            EXAMPLES:\n    \
            {} stress --threads 8 --ops 10000\n    \
            {} demo --config euler.toml",
            prog, prog, prog
        )
    }
}

/// Engine state reachable from native callbacks through the anchor
struct Engine {
    messages: Mutex<Vec<String>>,
}

impl Object for Engine {}

struct Logger {
    prefix: String,
}

impl Object for Logger {}

static LOGGER: HostType = HostType::new::<Logger>("Euler::Logger");

fn run_demo(config: &EngineConfig) -> Result<serde_json::Value, String> {
    let engine = make_reference(Engine { messages: Mutex::new(Vec::new()) });
    let mut heap = ScriptHeap::with_config(&config.heap);

    // Safety: `engine` outlives `heap`, which is dropped first below
    unsafe { ContextAnchor::install(&mut heap, &engine) };

    bind_method::<Engine, Logger, _>(&mut heap, &LOGGER, "log", |_, engine, logger, args| {
        let text = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        if let Ok(mut messages) = engine.messages.lock() {
            messages.push(format!("{} {}", logger.prefix, text));
        }
        Ok(Value::Nil)
    });

    bind_function::<Engine, _>(&mut heap, &LOGGER, "backlog", |_, engine, _| {
        let count = engine.messages.lock().map(|m| m.len()).unwrap_or(0);
        Ok(Value::Int(count as i64))
    });

    let main_logger = make_reference(Logger { prefix: "[main]".to_string() });
    let value = make_handle(&mut heap, &main_logger, &LOGGER);
    heap.define_global("$logger", value.clone());

    for frame in 0..4 {
        let scratch = make_reference(Logger { prefix: format!("[frame {}]", frame) });
        let temp = make_handle(&mut heap, &scratch, &LOGGER);
        heap.call(&temp, "log", &[Value::Int(frame)]).map_err(|e| e.to_string())?;
        heap.call(&value, "log", &[Value::Str("tick".into()), Value::Int(frame)])
            .map_err(|e| e.to_string())?;
    }

    let backlog = heap.call_function(&LOGGER, "backlog", &[]).map_err(|e| e.to_string())?;
    let freed = heap.collect(&[]);
    let stats = heap.stats();
    info!(freed, live = stats.live_handles, "demo collection finished");

    drop(heap);
    let messages = engine.messages.lock().map(|m| m.len()).unwrap_or(0);

    Ok(serde_json::json!({
        "heap": stats,
        "freed": freed,
        "messages": messages,
        "backlog": backlog.as_int(),
        "logger_references": main_logger.reference_count(),
    }))
}

fn main() {
    let args = match Args::from_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    config.apply_env();

    let _guard = init_logging(config.log_config());
    debug!(command = ?args.command, "Configuration loaded");

    let result = match args.command {
        Command::Stress { threads, operations } => {
            let settings = StressConfig {
                threads: threads.unwrap_or(config.stress.threads),
                operations: operations.unwrap_or(config.stress.operations),
            };
            run_stress(&settings).and_then(|report| {
                serde_json::to_value(&report).map_err(|e| e.to_string())
            })
        }
        Command::Demo => run_demo(&config),
    };

    match result.and_then(|report| serde_json::to_string_pretty(&report).map_err(|e| e.to_string())) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
