//! `memengine`: thin external-collaborator adapter (C11) over
//! `memengine-core`. Resolves a project path through the context manager
//! and dispatches to the tool surface named in spec.md §6, printing
//! structured JSON to stdout. Logging goes to stderr so stdout stays
//! machine-readable, mirroring the teacher's stdio-transport convention.

mod commands;

use std::io;
use std::path::PathBuf;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use memengine_core::config::EngineConfig;
use memengine_core::context::ContextManager;

fn print_usage() {
    println!("memengine {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Per-project knowledge memory engine CLI.");
    println!();
    println!("USAGE:");
    println!("    memengine <COMMAND> --project <PATH> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    remember --category <C> --content <TEXT> [--rationale <T>] [--tags a,b]");
    println!("    recall --topic <TEXT> [--limit N] [--tags a,b]");
    println!("    search --query <TEXT> [--limit N]");
    println!("    record-outcome --id <N> --outcome <TEXT> [--worked true|false]");
    println!("    pin --id <N> [--unpin]");
    println!("    archive --id <N> [--unarchive]");
    println!("    prune --older-than-days <N> --categories a,b [--dry-run]");
    println!("    cleanup [--dry-run]");
    println!("    rebuild-index");
    println!("    export");
    println!("    import --file <PATH> [--merge]");
    println!("    add-rule --trigger <TEXT> [--priority N]");
    println!("    list-rules [--enabled-only]");
    println!("    check-rules --text <TEXT>");
    println!("    index-project");
    println!("    find-code --name <TEXT>");
    println!("    analyze-impact --entity-id <ID>");
    println!("    health");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG            Log level filter (e.g., debug, info, warn, error)");
    println!("    MEMENGINE_*         Overrides for EngineConfig fields, see DESIGN.md");
}

struct Args {
    command: String,
    project: PathBuf,
    rest: Vec<String>,
}

fn parse_args() -> Option<Args> {
    let raw: Vec<String> = std::env::args().collect();
    if raw.len() < 2 || raw[1] == "--help" || raw[1] == "-h" {
        print_usage();
        return None;
    }
    if raw[1] == "--version" || raw[1] == "-V" {
        println!("memengine {}", env!("CARGO_PKG_VERSION"));
        return None;
    }

    let command = raw[1].clone();
    let mut project = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut rest = Vec::new();

    let mut i = 2;
    while i < raw.len() {
        if raw[i] == "--project" {
            i += 1;
            if i >= raw.len() {
                eprintln!("error: --project requires a path argument");
                std::process::exit(1);
            }
            project = PathBuf::from(&raw[i]);
        } else {
            rest.push(raw[i].clone());
        }
        i += 1;
    }

    Some(Args { command, project, rest })
}

#[tokio::main]
async fn main() {
    let Some(args) = parse_args() else { return };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!(command = %args.command, project = %args.project.display(), "memengine starting");

    let config = EngineConfig::from_env("MEMENGINE");
    let manager = ContextManager::new(config);

    let result = tokio::task::spawn_blocking(move || {
        let ctx = manager.get_context(&args.project)?;
        commands::dispatch(&ctx, &manager, &args.command, &args.rest)
    })
    .await;

    match result {
        Ok(Ok(value)) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Ok(Err(err)) => {
            error!(error = %err, "command failed");
            println!(
                "{}",
                serde_json::json!({"error": {"code": err.code(), "message": err.to_string()}})
            );
            std::process::exit(1);
        }
        Err(join_err) => {
            error!(error = %join_err, "command task panicked");
            std::process::exit(1);
        }
    }
}
