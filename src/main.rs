//! buildlane CLI.
//!
//! Entry point for the `buildlane` command-line tool.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use buildlane::{
    build_project, summary, BuildContext, BuildPlan, ToolRegistry, ToolSetup, ToolchainConfig,
};

#[derive(Parser)]
#[command(name = "buildlane")]
#[command(about = "CI build orchestration for mobile app repositories", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a build plan and report the issues it finds
    Run {
        /// Path to the build plan file
        #[arg(long, short = 'p')]
        plan: PathBuf,

        /// Working directory for build output and logs (created if absent)
        #[arg(long)]
        work_dir: PathBuf,

        /// Checked-out source directory
        #[arg(long)]
        source_dir: PathBuf,

        /// Path to the toolchain version file
        /// (default: toolchains.toml next to the plan)
        #[arg(long)]
        toolchains: Option<PathBuf>,

        /// Context window used by review relevance filtering
        #[arg(long, default_value_t = buildlane::context::DEFAULT_LINES_AROUND_RELATED)]
        lines_around_related: u32,

        /// Write a JSON run report into the work directory
        #[arg(long)]
        report: bool,
    },

    /// Show the toolchain version file, creating it with a default entry
    /// when absent
    Toolchains {
        /// Path to the toolchain version file
        #[arg(long, short = 'f')]
        file: PathBuf,
    },
}

fn main() {
    // A hung build tool is recovered by killing the whole process; the
    // handler only keeps the exit deliberate.
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\ninterrupted");
        process::exit(130);
    }) {
        eprintln!("warning: could not install interrupt handler: {e}");
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            plan,
            work_dir,
            source_dir,
            toolchains,
            lines_around_related,
            report,
        } => run_plan(
            plan,
            work_dir,
            source_dir,
            toolchains,
            lines_around_related,
            report,
        ),
        Commands::Toolchains { file } => show_toolchains(file),
    }
}

fn run_plan(
    plan_path: PathBuf,
    work_dir: PathBuf,
    source_dir: PathBuf,
    toolchains: Option<PathBuf>,
    lines_around_related: u32,
    write_report: bool,
) {
    let toolchains_path = toolchains.unwrap_or_else(|| {
        plan_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("toolchains.toml")
    });
    let toolchains = match ToolchainConfig::load_or_init(&toolchains_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let plan = match BuildPlan::load(&plan_path) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = fs::create_dir_all(&work_dir) {
        eprintln!("error: cannot create work directory: {e}");
        process::exit(1);
    }

    let mut ctx = match BuildContext::new(&work_dir, &source_dir) {
        Ok(ctx) => ctx.with_lines_around_related(lines_around_related),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let mut tools = match ToolRegistry::new(ToolSetup { toolchains }, Vec::new()) {
        Ok(tools) => tools,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    eprintln!(
        "building with plan {} ({})",
        plan.path.display(),
        &plan.digest[..12.min(plan.digest.len())]
    );
    if let Err(e) = build_project(&plan, &mut ctx, &mut tools) {
        eprintln!("error: {e}");
        process::exit(1);
    }

    if write_report {
        let report = summary::RunReport::new(&ctx, &plan);
        let report_path = ctx.work_directory().join("report.json");
        match report.to_json() {
            Ok(json) => {
                if let Err(e) = fs::write(&report_path, json) {
                    eprintln!("warning: could not write run report: {e}");
                } else {
                    eprintln!("wrote {}", report_path.display());
                }
            }
            Err(e) => eprintln!("warning: could not serialize run report: {e}"),
        }
    }

    let outcome = summary::report(ctx.issues());
    process::exit(outcome.exit_code());
}

fn show_toolchains(file: PathBuf) {
    match ToolchainConfig::load_or_init(&file) {
        Ok(config) => {
            for (version, path) in config.entries() {
                println!("{version} = {path}");
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
