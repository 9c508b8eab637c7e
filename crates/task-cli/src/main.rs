use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use task_runner::{
    Completion, DisplayEvent, HttpTransport, PlatformInfo, PlatformProvider, QueryPlatform,
    RecordingDisplay, RecordingTransport, RunOutcome, Script, ScriptedEngine, Session,
    StaticPlatform, TaskConfig, Transport,
};
use tracing_subscriber::EnvFilter;

const DRY_RUN_PAGE: &str = "<html><body><p>Dry run: nothing was submitted.</p></body></html>";

#[derive(Parser)]
#[command(name = "task", version = "0.3.0", about = "Image-choice task runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Describe {
        config: PathBuf,
        #[arg(long = "set")]
        set_values: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    Assemble {
        config: PathBuf,
        #[arg(long = "set")]
        set_values: Vec<String>,
    },
    Run {
        config: PathBuf,
        #[arg(long)]
        script: PathBuf,
        #[arg(long = "set")]
        set_values: Vec<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = 0)]
        manual_retries: u32,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    Platform {
        query: String,
        #[arg(long)]
        json: bool,
    },
    Init {
        #[arg(long, default_value = "task.yaml")]
        config: PathBuf,
        #[arg(long, default_value = "script.yaml")]
        script: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            if !payload_ok(&payload) {
                std::process::exit(1);
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Describe {
            config,
            set_values,
            json,
        } => {
            let cfg = load_config(&config, &set_values)?;
            let session = Session::new(
                &cfg,
                Box::new(StaticPlatform::default()),
                Box::new(RecordingTransport::new(DRY_RUN_PAGE)),
            );
            let labels: Vec<String> = session.sequence().iter().map(|b| b.label()).collect();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": summary_to_json(&cfg, &labels)
                })));
            }
            print_summary(&cfg, &labels);
        }
        Commands::Assemble { config, set_values } => {
            let cfg = load_config(&config, &set_values)?;
            let session = Session::new(
                &cfg,
                Box::new(StaticPlatform::default()),
                Box::new(RecordingTransport::new(DRY_RUN_PAGE)),
            );
            return Ok(Some(json!({
                "ok": true,
                "command": "assemble",
                "task_id": cfg.task_id,
                "sequence": serde_json::to_value(session.sequence())?
            })));
        }
        Commands::Run {
            config,
            script,
            set_values,
            query,
            dry_run,
            manual_retries,
            out,
            json,
        } => {
            let cfg = load_config(&config, &set_values)?;
            let script = Script::load(&script)?;
            let platform: Box<dyn PlatformProvider> = match &query {
                Some(q) => Box::new(QueryPlatform::parse(q)?),
                None => Box::new(StaticPlatform(PlatformInfo {
                    outside_turk: true,
                    ..PlatformInfo::default()
                })),
            };
            let recorder = Arc::new(RecordingTransport::new(DRY_RUN_PAGE));
            let transport: Box<dyn Transport> = if dry_run {
                Box::new(recorder.clone())
            } else {
                Box::new(HttpTransport::new(cfg.timeout)?)
            };

            let mut session = Session::new(&cfg, platform, transport);
            let mut engine = ScriptedEngine::new(script);
            let mut display = RecordingDisplay::new();
            let mut outcome = session.run(&mut engine, &mut display)?;
            let mut retries_used = 0;
            while let RunOutcome::SubmissionPending(_) = outcome {
                if retries_used >= manual_retries {
                    break;
                }
                retries_used += 1;
                outcome = match session.retry_submission(&mut display) {
                    Ok(completion) => RunOutcome::Completed(completion),
                    Err(err) => RunOutcome::SubmissionPending(err),
                };
            }

            if let (Some(path), Some(page)) = (&out, display.document()) {
                std::fs::write(path, page)?;
                tracing::info!(path = %path.display(), "wrote response page");
            }
            let report = run_report_to_json(&outcome, &display, retries_used);
            if let RunOutcome::SubmissionPending(err) = &outcome {
                if !json {
                    print_display(&display);
                    return Err(anyhow!("responses were not submitted: {}", err));
                }
            }
            if json {
                let ok = matches!(outcome, RunOutcome::Completed(_));
                let mut payload = json!({
                    "ok": ok,
                    "command": "run",
                    "task_id": cfg.task_id,
                    "dry_run": dry_run,
                    "run": report
                });
                if dry_run {
                    payload["requests"] = Value::from(recorder.requests().len());
                }
                return Ok(Some(payload));
            }
            print_display(&display);
            match &outcome {
                RunOutcome::Completed(Completion::Submitted {
                    envelope,
                    delivery,
                    completed_at,
                }) => {
                    println!("task_id: {}", cfg.task_id);
                    println!("attempts: {}", delivery.attempts);
                    println!("digest: {}", delivery.digest);
                    println!("completed_at: {}", completed_at.to_rfc3339());
                    println!("fields: {}", envelope.fields().len());
                    if dry_run {
                        println!("envelope: {}", serde_json::to_string(envelope)?);
                    }
                }
                RunOutcome::Completed(_) => println!("completed without submission"),
                RunOutcome::Incomplete => println!("sequence did not finish"),
                RunOutcome::SubmissionPending(_) => {}
            }
            if let Some(path) = &out {
                println!("page: {}", path.display());
            }
        }
        Commands::Platform { query, json } => {
            let info = QueryPlatform::parse(&query)?.platform_info();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "platform",
                    "platform": serde_json::to_value(&info)?
                })));
            }
            println!("assignmentId: {}", info.assignment_id);
            println!("hitId: {}", info.hit_id);
            println!("workerId: {}", info.worker_id);
            println!("previewMode: {}", info.preview_mode);
            println!("outsideTurk: {}", info.outside_turk);
        }
        Commands::Init {
            config,
            script,
            force,
        } => {
            for (path, contents) in [
                (&config, task_runner::config::STARTER_CONFIG),
                (&script, task_runner::config::STARTER_SCRIPT),
            ] {
                if !force && path.exists() {
                    return Err(anyhow!(
                        "init file already exists (use --force): {}",
                        path.display()
                    ));
                }
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(path, contents)?;
                println!("wrote: {}", path.display());
            }
            println!(
                "next: task run {} --script {} --dry-run",
                config.display(),
                script.display()
            );
        }
    }
    Ok(None)
}

fn load_config(path: &Path, set_values: &[String]) -> Result<TaskConfig> {
    let overrides = task_runner::parse_overrides(set_values)?;
    Ok(TaskConfig::load(path, &overrides)?)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn payload_ok(payload: &Value) -> bool {
    payload.get("ok").and_then(Value::as_bool).unwrap_or(false)
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Describe { json, .. }
        | Commands::Run { json, .. }
        | Commands::Platform { json, .. } => *json,
        Commands::Assemble { .. } => true,
        Commands::Init { .. } => false,
    }
}

fn summary_to_json(cfg: &TaskConfig, labels: &[String]) -> Value {
    json!({
        "task_id": cfg.task_id,
        "practice": cfg.flags.practice,
        "collect_demo": cfg.flags.collect_demo,
        "collect_validating_demo": cfg.flags.collect_validating_demo,
        "submit": cfg.endpoint.as_str(),
        "submit_format": cfg.submit_format,
        "base_blocks": cfg.blocks.len(),
        "sequence": labels,
        "retry": cfg.retry,
    })
}

fn print_summary(cfg: &TaskConfig, labels: &[String]) {
    println!("task_id: {}", cfg.task_id);
    println!("practice: {}", cfg.flags.practice);
    println!("collect_demo: {}", cfg.flags.collect_demo);
    println!("collect_validating_demo: {}", cfg.flags.collect_validating_demo);
    println!("submit: {}", cfg.endpoint);
    println!("base_blocks: {}", cfg.blocks.len());
    println!("sequence:");
    for (idx, label) in labels.iter().enumerate() {
        println!("  {:>2}. {}", idx, label);
    }
}

fn print_display(display: &RecordingDisplay) {
    for event in display.events() {
        match event {
            DisplayEvent::Alert(m) => eprintln!("alert: {}", m),
            DisplayEvent::Error(m) => eprintln!("error: {}", m),
            DisplayEvent::Replaced(_) => {}
        }
    }
}

fn run_report_to_json(outcome: &RunOutcome, display: &RecordingDisplay, manual_retries: u32) -> Value {
    let status = match outcome {
        RunOutcome::Completed(Completion::Submitted { .. }) => "submitted",
        RunOutcome::Completed(_) => "completed",
        RunOutcome::SubmissionPending(_) => "submission_pending",
        RunOutcome::Incomplete => "incomplete",
    };
    let mut report = json!({
        "status": status,
        "alerts": display.alerts(),
        "errors": display.errors(),
        "manual_retries": manual_retries,
        "page_replaced": display.document().is_some(),
    });
    match outcome {
        RunOutcome::Completed(Completion::Submitted {
            envelope,
            delivery,
            completed_at,
        }) => {
            report["attempts"] = Value::from(delivery.attempts);
            report["digest"] = Value::from(delivery.digest.clone());
            report["completed_at"] = Value::from(completed_at.to_rfc3339());
            report["envelope"] = serde_json::to_value(envelope).unwrap_or(Value::Null);
        }
        RunOutcome::SubmissionPending(err) => {
            report["error"] = Value::from(err.to_string());
        }
        _ => {}
    }
    report
}
