//! RG-015: CLI subcommands: validate, run, fmt, infra.

use crate::core::config::{RuntimeConfig, CONFIG_FILE};
use crate::core::context::{ConsoleUi, SharedContext};
use crate::core::executor::Executor;
use crate::core::types::{ExecuteEvent, Plan};
use crate::core::{encoder, eventlog, parser};
use crate::directory::{Backend, Lookup, SqliteBackend};
use crate::tasks::TaskRegistry;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a plan document without running it
    Validate {
        /// Path to the plan document
        #[arg(short, long, default_value = "plan.json")]
        file: PathBuf,
    },

    /// Validate, then execute every plan in a document
    Run {
        /// Path to the plan document
        #[arg(short, long, default_value = "plan.json")]
        file: PathBuf,

        /// Runtime configuration
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },

    /// Print a plan document in canonical form
    Fmt {
        /// Path to the plan document
        #[arg(short, long, default_value = "plan.json")]
        file: PathBuf,

        /// Rewrite the file in place instead of printing
        #[arg(long)]
        write: bool,
    },

    /// Show an infrastructure record from the directory
    Infra {
        /// Infrastructure type
        #[arg(long)]
        infra: String,

        /// Infrastructure flavor
        #[arg(long, default_value = "")]
        flavor: String,

        /// Foundation name (empty: the infrastructure itself)
        #[arg(long, default_value = "")]
        foundation: String,

        /// Application type
        #[arg(long, default_value = "")]
        app: String,

        /// Runtime configuration
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Run { file, config } => cmd_run(&file, &config),
        Commands::Fmt { file, write } => cmd_fmt(&file, write),
        Commands::Infra {
            infra,
            flavor,
            foundation,
            app,
            config,
        } => {
            let lookup = Lookup {
                app,
                infra,
                infra_flavor: flavor,
                foundation,
            };
            cmd_infra(&lookup, &config)
        }
    }
}

fn load_plans(file: &Path) -> Result<Vec<Plan>, String> {
    parser::parse_plan_file(file).map_err(|e| e.to_string())
}

/// Validate every plan, printing each problem. Fails if any plan is invalid.
fn validate_all(executor: &Executor<'_>, plans: &[Plan]) -> Result<(), String> {
    let mut total = 0;
    for (i, plan) in plans.iter().enumerate() {
        if let Err(err) = executor.validate(plan) {
            for issue in &err.issues {
                eprintln!("  ERROR: plan {}: {}", i + 1, issue);
            }
            total += err.issues.len();
        }
    }
    if total > 0 {
        return Err(format!("{} validation error(s)", total));
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let plans = load_plans(file)?;
    let registry = TaskRegistry::builtin();
    let executor = Executor::new(&registry);
    validate_all(&executor, &plans)?;

    for plan in &plans {
        println!("OK: {} ({} tasks)", display_name(plan), plan.tasks.len());
    }
    Ok(())
}

fn display_name(plan: &Plan) -> &str {
    if plan.description.is_empty() {
        "<unnamed plan>"
    } else {
        &plan.description
    }
}

fn open_directory(config: &RuntimeConfig) -> Result<SqliteBackend, String> {
    SqliteBackend::open(config.directory_dir()).map_err(|e| e.to_string())
}

fn cmd_run(file: &Path, config_path: &Path) -> Result<(), String> {
    let config = RuntimeConfig::load(config_path)?;
    let plans = load_plans(file)?;
    let registry = TaskRegistry::builtin();

    let directory = open_directory(&config)?;
    let ctx = SharedContext::new(Box::new(directory), Box::new(ConsoleUi))
        .with_creds(config.credentials.clone())
        .with_provisioner(config.provisioner.clone());

    let run_id = eventlog::generate_run_id();
    let journal = |event: &ExecuteEvent| {
        if let Err(e) = eventlog::append_event(&config.data_dir, &run_id, event) {
            tracing::warn!(error = %e, "journal write failed");
        }
    };

    let mut executor = Executor::new(&registry).with_context(&ctx);
    if config.journal {
        executor = executor.with_callback(&journal);
    }

    validate_all(&executor, &plans)?;

    let start = Instant::now();
    let mut tasks_run = 0;
    for plan in &plans {
        ctx.ui.header(display_name(plan));
        executor
            .execute(plan, &mut std::io::stdout())
            .map_err(|e| e.to_string())?;
        tasks_run += plan.tasks.len();
    }

    println!();
    println!(
        "Run complete: {} plan(s), {} task(s) in {:.1}s ({})",
        plans.len(),
        tasks_run,
        start.elapsed().as_secs_f64(),
        run_id
    );
    Ok(())
}

fn cmd_fmt(file: &Path, write: bool) -> Result<(), String> {
    let plans = load_plans(file)?;
    let mut encoded = encoder::encode_plans(&plans);
    encoded.push('\n');

    if write {
        std::fs::write(file, &encoded)
            .map_err(|e| format!("cannot write {}: {}", file.display(), e))?;
    } else {
        print!("{}", encoded);
    }
    Ok(())
}

fn cmd_infra(lookup: &Lookup, config_path: &Path) -> Result<(), String> {
    let config = RuntimeConfig::load(config_path)?;
    let directory = open_directory(&config)?;
    let infra = directory
        .get_infra(lookup)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("infra not found in directory: {}", lookup))?;

    println!("Infrastructure: {}", infra.lookup);
    println!("  ID:     {}", infra.id);
    println!("  State:  {}", infra.state);
    if let Some(ref version) = infra.deploy_version {
        println!("  Deploy: {}", version);
    }
    if !infra.outputs.is_empty() {
        println!("  Outputs:");
        let mut names: Vec<&String> = infra.outputs.keys().collect();
        names.sort();
        for name in names {
            println!("    {} = {}", name, infra.outputs[name]);
        }
    }
    Ok(())
}
