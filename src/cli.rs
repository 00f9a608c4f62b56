use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::analysis::HoistReason;
use crate::program::{link, Program};
use crate::runtime::{PromiseState, Runtime};
use crate::values::{json_to_val, val_to_json, Val};

#[derive(Parser)]
#[command(name = "strudel")]
#[command(about = "Strudel - resumable async core of a TypeScript-like runtime", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program's entry function to completion
    Run {
        /// Path to a program JSON file (parser output)
        program: String,

        /// Entry function name
        #[arg(short = 'e', long = "entry", default_value = "main")]
        entry: String,

        /// Arguments as a JSON array
        #[arg(short = 'a', long = "args", default_value = "[]")]
        args: String,
    },

    /// Print the suspension analysis of each function
    Analyze {
        /// Path to a program JSON file (parser output)
        program: String,

        /// Only this function
        #[arg(short = 'f', long = "function")]
        function: Option<String>,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            entry,
            args,
        } => run_program(&program, &entry, &args),
        Commands::Analyze { program, function } => analyze_program(&program, function.as_deref()),
    }
}

fn load(path: &str) -> Result<Program> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    Program::from_json(&source).with_context(|| format!("failed to load {}", path))
}

fn run_program(path: &str, entry: &str, args: &str) -> Result<()> {
    let program = load(path)?;
    let linked = link(&program)?;
    let mut rt = Runtime::new(linked);

    let args: serde_json::Value =
        serde_json::from_str(args).context("arguments must be a JSON array")?;
    let args: Vec<Val> = args
        .as_array()
        .context("arguments must be a JSON array")?
        .iter()
        .map(json_to_val)
        .collect();

    let completion = rt
        .call(entry, args)
        .with_context(|| format!("unknown function {}", entry))?;

    // Drain ready work, fast-forwarding the clock to each next timer until
    // the program settles or nothing can make progress.
    rt.run_until_idle();
    while rt.peek(&completion) == Some(&PromiseState::Pending) {
        let Some(fire_at) = rt.next_timer() else {
            break;
        };
        let ms = (fire_at - rt.now()).num_milliseconds().max(1);
        rt.advance_time(ms);
    }

    for line in rt.take_console() {
        println!("{}", line);
    }

    match rt.settled_result(&completion) {
        Some(Ok(value)) => {
            println!("{}", serde_json::to_string_pretty(&val_to_json(&value))?);
            Ok(())
        }
        Some(Err(error)) => anyhow::bail!("{} rejected: {}", entry, error),
        None => anyhow::bail!("{} never settled (pending external awaitables)", entry),
    }
}

fn analyze_program(path: &str, function: Option<&str>) -> Result<()> {
    let program = load(path)?;
    let linked = link(&program)?;

    let mut names: Vec<&String> = linked.functions.keys().collect();
    names.sort();

    for name in names {
        if let Some(only) = function {
            if name != only {
                continue;
            }
        }
        let func = &linked.functions[name];
        let analysis = &func.analysis;

        println!("{}({})", name, func.params.join(", "));
        println!("  await points: {}", analysis.state_count());
        for point in &analysis.await_points {
            println!(
                "    state {} (try region {:?})",
                point.state_number, point.try_region
            );
        }
        println!("  try regions: {}", analysis.try_regions.len());
        for region in &analysis.try_regions {
            println!(
                "    region {} parent {:?} awaits: try={} catch={} finally={}",
                region.id,
                region.parent,
                region.has_await_in_try,
                region.has_await_in_catch,
                region.has_await_in_finally
            );
        }
        println!("  hoisted:");
        for (var, reason) in &analysis.hoisted {
            println!("    {} ({})", var, reason_name(*reason));
        }
        println!("  uses receiver: {}", analysis.uses_enclosing_receiver);
        println!(
            "  nested async closures: {}",
            analysis.has_nested_async_closures
        );
        println!();
    }

    Ok(())
}

fn reason_name(reason: HoistReason) -> &'static str {
    match reason {
        HoistReason::CapturedByClosure => "captured by closure",
        HoistReason::LoopVariable => "loop variable",
        HoistReason::CatchBinding => "catch binding",
        HoistReason::Param => "parameter",
        HoistReason::DeclaredAcrossAwait => "declared across await",
    }
}
