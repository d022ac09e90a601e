#[macro_use]
extern crate log;

use std::collections::BTreeSet;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use bzlsdk_bazel_wrapper::bazel_subprocess_wrapper::LogConsoleFactory;
use bzlsdk_core::bazel_command::DebugTarget;
use bzlsdk_core::config::load_config_file;
use bzlsdk_core::label_utils::BazelLabel;
use bzlsdk_core::workspace::{BazelCommandManager, BazelWorkspace, BazelWorkspaceCommandRunner};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(name = "bzlsdk")]
struct Opt {
    /// Config file, otherwise ~/.bzlsdk or /etc/.bzlsdk if present.
    #[clap(long, env = "BZLSDK_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the bazel executable from the config file.
    #[clap(long, env = "BAZEL_BINARY_PATH")]
    bazel_binary_path: Option<PathBuf>,

    /// Any directory inside the workspace, defaults to the current directory.
    #[clap(long, env = "BZLSDK_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Show bazel's output as it is produced.
    #[clap(long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that bazel runs and is recent enough.
    Version,
    /// Print `bazel info`, or one key of it.
    Info { key: Option<String> },
    /// Print the workspace's execution root, output base and bazel-bin.
    Paths,
    /// Run a query, one result per line.
    Query { expression: String },
    /// Build targets and print the problems found.
    Build {
        #[clap(required = true)]
        targets: Vec<String>,
        /// Extra arguments for bazel, split like a shell would.
        #[clap(long)]
        extra_args: Option<String>,
    },
    /// Print the dependency information of targets, computed by the aspect.
    Aspects {
        #[clap(required = true)]
        targets: Vec<String>,
    },
    /// Print the rules of the packages the labels point into.
    BuildFiles { labels: Vec<String> },
    /// Print the workspace relative source files a target depends on.
    SourceFiles { target: String },
    /// Print the options the workspace rc files apply.
    Options,
    Clean,
    /// Run a binary or test target.
    Launch {
        target: String,
        /// Rule kind of the target, e.g. java_binary or java_test.
        #[clap(long)]
        kind: String,
        #[clap(long)]
        debug_port: Option<u16>,
        #[clap(long, default_value = "localhost")]
        debug_host: String,
        #[clap(last = true)]
        args: Vec<String>,
    },
}

fn parse_labels(raw: &[String]) -> Result<BTreeSet<BazelLabel>, Box<dyn Error>> {
    let mut labels = BTreeSet::new();
    for label in raw {
        labels.insert(BazelLabel::parse(label)?);
    }
    Ok(labels)
}

async fn workspace_runner(
    manager: &BazelCommandManager,
    workspace: &Option<PathBuf>,
) -> Result<Arc<BazelWorkspaceCommandRunner>, Box<dyn Error>> {
    let start = match workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let workspace = BazelWorkspace::find_enclosing(&start)?;
    Ok(manager.workspace_command_runner(workspace.root()).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let opt = Opt::parse();

    let mut config = load_config_file(opt.config.as_deref(), "bzlsdk")?;
    if let Some(bazel) = opt.bazel_binary_path.as_ref() {
        config.bazel_executable = bazel.clone();
    }
    let mut manager = BazelCommandManager::new(config);
    if opt.verbose {
        manager = manager.with_console_factory(Arc::new(LogConsoleFactory));
    }

    let monitor = CancellationToken::new();
    let ctrl_c = monitor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling bazel");
            ctrl_c.cancel();
        }
    });

    let start = Instant::now();
    match &opt.command {
        Command::Version => {
            let version = manager.global_runner().run_bazel_version_check(&monitor).await?;
            println!("{}", version);
        }
        Command::Info { key } => {
            let values = manager
                .global_runner()
                .run_bazel_info(key.as_deref(), &monitor)
                .await?;
            for (k, v) in values {
                println!("{}: {}", k, v);
            }
        }
        Command::Paths => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let exec_root = runner.compute_bazel_workspace_exec_root(&monitor).await?;
            let output_base = runner.compute_bazel_workspace_output_base(&monitor).await?;
            let bazel_bin = runner.compute_bazel_workspace_bin(&monitor).await?;
            println!("execution_root: {}", exec_root.display());
            println!("output_base: {}", output_base.display());
            println!("bazel-bin: {}", bazel_bin.display());
        }
        Command::Query { expression } => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            for line in runner.compute_bazel_query(expression, &monitor).await? {
                println!("{}", line);
            }
        }
        Command::Build {
            targets,
            extra_args,
        } => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let extra_args = match extra_args {
                Some(raw) => shellwords::split(raw)
                    .map_err(|e| anyhow!("Unable to split extra args `{}`: {}", raw, e))?,
                None => Vec::new(),
            };
            let problems = runner
                .run_bazel_build(&parse_labels(targets)?, &extra_args, &monitor)
                .await?;
            for problem in problems.iter() {
                println!("{}", problem);
            }
            if !problems.is_empty() {
                return Err(anyhow!("Build reported {} problems", problems.len()).into());
            }
        }
        Command::Aspects { targets } => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let infos = runner
                .get_aspect_target_infos(&parse_labels(targets)?, "bzlsdk", &monitor)
                .await?;
            for (label, deps) in infos {
                println!("{}", label);
                for info in deps {
                    println!(
                        "  {} ({})",
                        info.label,
                        info.kind.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
        Command::BuildFiles { labels } => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let build_files = runner
                .query_bazel_targets_in_build_file(&parse_labels(labels)?, &monitor)
                .await?;
            for build_file in build_files {
                println!("{}", build_file.label);
                for rule_type in build_file.rule_types() {
                    for target in build_file.targets_of_type(rule_type).into_iter().flatten() {
                        println!("  {} {}", rule_type, target);
                    }
                }
            }
        }
        Command::SourceFiles { target } => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let label = BazelLabel::parse(target)?;
            for path in runner.query_source_files_for_target(&label, &monitor).await? {
                println!("{}", path);
            }
        }
        Command::Options => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let options = runner.populate_workspace_command_options(&monitor).await?;
            println!("{}", options);
        }
        Command::Clean => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            runner.run_bazel_clean(&monitor).await;
        }
        Command::Launch {
            target,
            kind,
            debug_port,
            debug_host,
            args,
        } => {
            let runner = workspace_runner(&manager, &opt.workspace).await?;
            let debug = debug_port.map(|port| DebugTarget::new(debug_host, port));
            let result = runner
                .launch(BazelLabel::parse(target)?, kind, args.clone(), debug, &monitor)
                .await?;
            if let Some(stdout) = result.stdout.as_ref() {
                print!("{}", stdout);
            }
            eprint!("{}", result.stderr);
            if !result.success() {
                return Err(anyhow!("{} exited with {}", target, result.exit_code).into());
            }
        }
    }
    info!(
        "Finished in {}",
        humantime::format_duration(std::time::Duration::from_millis(
            start.elapsed().as_millis() as u64
        ))
    );
    Ok(())
}
