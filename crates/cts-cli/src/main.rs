mod report;

use std::time::Instant;

use ash::vk;
use clap::{Parser, Subcommand};
use cts_core::config::{default_config_path, CtsConfig, OutputFormat};
use cts_core::{RunReport, TestFilter};
use cts_vk::{execute_case, Context, ContextOptions};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cts-runner")]
#[command(about = "Vulkan conformance test runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List case paths without touching a device
    List {
        /// Glob pattern of case paths to include (repeatable)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Glob pattern of case paths to skip (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// Run the selected cases and report their verdicts
    Run {
        /// Glob pattern of case paths to include (repeatable)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Glob pattern of case paths to skip (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,

        /// Physical device index
        #[arg(short, long)]
        device: Option<usize>,

        /// Enable the Khronos validation layer
        #[arg(long)]
        validation: bool,

        /// Worker threads for multi-threaded cases
        #[arg(long)]
        threads: Option<usize>,

        /// Stop after the first failing case
        #[arg(long)]
        fail_fast: bool,

        /// Write the report to this file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show the device a run would use
    Info {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,

        /// Physical device index
        #[arg(short, long)]
        device: Option<usize>,
    },
}

fn load_config(path: Option<String>) -> anyhow::Result<CtsConfig> {
    match path {
        Some(path) => Ok(CtsConfig::load(&path)?),
        None => Ok(CtsConfig::load_or_default(&default_config_path())),
    }
}

fn build_filter(config: &CtsConfig, include: Vec<String>, exclude: Vec<String>) -> TestFilter {
    let include = if include.is_empty() {
        config.filter.include.clone()
    } else {
        include
    };
    let mut all_exclude = config.filter.exclude.clone();
    all_exclude.extend(exclude);
    TestFilter::new(include, all_exclude)
}

fn main() -> anyhow::Result<()> {
    cts_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { filter, exclude } => {
            let filter = TestFilter::new(filter, exclude);
            let tree = cts_modules::create_test_tree();
            let mut count = 0usize;
            for (path, _) in tree.cases() {
                if filter.matches(&path) {
                    println!("{}", path);
                    count += 1;
                }
            }
            info!("{} of {} cases listed", count, tree.case_count());
        }

        Commands::Run {
            filter,
            exclude,
            json,
            config,
            device,
            validation,
            threads,
            fail_fast,
            output,
        } => {
            let mut cts_config = load_config(config)?;

            // CLI flags override the config file
            if let Some(index) = device {
                cts_config.runner.device_index = index;
            }
            if validation {
                cts_config.runner.validation = true;
            }
            if threads.is_some() {
                cts_config.runner.threads = threads;
            }
            if fail_fast {
                cts_config.runner.fail_fast = true;
            }
            if json {
                cts_config.output.format = OutputFormat::Json;
            }
            if output.is_some() {
                cts_config.output.path = output;
            }

            let filter = build_filter(&cts_config, filter, exclude);
            let options = ContextOptions {
                device_index: cts_config.runner.device_index,
                validation: cts_config.runner.validation,
                stress_threads: cts_config.runner.threads,
            };
            let context = Context::new(&options)?;
            info!("running on {}", context.device_name());

            let tree = cts_modules::create_test_tree();
            let mut run = RunReport::new(context.device_name());
            for (path, case) in tree.cases() {
                if !filter.matches(&path) {
                    continue;
                }
                info!("{}", path);
                let start = Instant::now();
                let status = execute_case(&**case, &context);
                let failed = status.code.is_failure();
                let elapsed = start.elapsed().as_millis() as u64;
                run.record(path, status, elapsed);

                if failed && cts_config.runner.fail_fast {
                    warn!("stopping after first failure");
                    break;
                }
            }

            report::write(&run, &cts_config.output)?;

            // Exit code 1 if any failures
            if run.has_failures() {
                std::process::exit(1);
            }
        }

        Commands::Info { config, device } => {
            let cts_config = load_config(config)?;
            let options = ContextOptions {
                device_index: device.unwrap_or(cts_config.runner.device_index),
                ..ContextOptions::default()
            };
            let context = Context::new(&options)?;
            let api = context.api_version();

            println!(
                "Platform:   {} ({} CPUs)",
                cts_common::platform::platform_name(),
                cts_common::platform::cpu_count()
            );
            println!("Device:     {}", context.device_name());
            println!(
                "API:        {}.{}.{}",
                vk::api_version_major(api),
                vk::api_version_minor(api),
                vk::api_version_patch(api)
            );
            println!("Extensions:");
            for ext in context.enabled_device_extensions() {
                println!("  {}", ext.to_string_lossy());
            }
            println!("Queue families:");
            for (index, family) in context.queue_family_properties().iter().enumerate() {
                println!(
                    "  [{}] {:?} x{} (timestamp bits {})",
                    index, family.queue_flags, family.queue_count, family.timestamp_valid_bits
                );
            }
        }
    }

    Ok(())
}
