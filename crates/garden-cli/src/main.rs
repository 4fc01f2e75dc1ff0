mod commands;

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_REGISTRY_ERROR, EXIT_RUNTIME_ERROR};
use garden_core::GardenConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "garden",
    version,
    about = "Run hash-verified scan modules in containers against a target"
)]
struct Cli {
    /// Path to a garden.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Increase logging output (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the selected modules against a target.
    Run {
        /// Value substituted for <TARGET> in every module command.
        #[arg(short, long)]
        target: String,
        /// Comma-separated categories to run; `*` selects all.
        #[arg(short, long, default_value = "")]
        category: String,
        /// Comma-separated `category/name` modules to run.
        #[arg(short, long, default_value = "")]
        single: String,
        /// Module argument overrides, e.g. `net/nmap-flag=-F,nuclei-tags=cve`.
        #[arg(long, default_value = "")]
        modargs: String,
        /// Module tree directory or meta.json path.
        #[arg(long)]
        modules: Option<PathBuf>,
        /// Directory reports are written under.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip sha256 verification of categories and modules.
        #[arg(long, default_value_t = false)]
        ignore_hash: bool,
        /// Docker daemon endpoint.
        #[arg(long)]
        host: Option<String>,
        /// Docker context name; takes precedence over --host.
        #[arg(long)]
        context: Option<String>,
        /// Runtime backend (docker or mock).
        #[arg(long)]
        backend: Option<String>,
        /// Per-module timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Fail before running if any command keeps a <placeholder>.
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// Do not write report files.
        #[arg(long, default_value_t = false)]
        no_report: bool,
    },
    /// List resolvable modules and their commands.
    List {
        /// Comma-separated categories to list.
        #[arg(short, long, default_value = "*")]
        category: String,
        /// Comma-separated `category/name` modules to list.
        #[arg(short, long, default_value = "")]
        single: String,
        /// Module tree directory or meta.json path.
        #[arg(long)]
        modules: Option<PathBuf>,
        /// Skip sha256 verification of categories and modules.
        #[arg(long, default_value_t = false)]
        ignore_hash: bool,
    },
    /// Verify the sha256 digest of every category and module file.
    Verify {
        /// Module tree directory or meta.json path.
        #[arg(long)]
        modules: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GARDEN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = GardenConfig::discover(cli.config.as_deref())
        .map_err(|e| e.to_string())
        .and_then(|config| dispatch(cli.command, &config, json_output));

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("registry error:")
                || msg.starts_with("module argument error:")
            {
                EXIT_REGISTRY_ERROR
            } else if msg.starts_with("runtime error:") {
                EXIT_RUNTIME_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: Commands, config: &GardenConfig, json: bool) -> Result<u8, String> {
    match command {
        Commands::Run {
            target,
            category,
            single,
            modargs,
            modules,
            output,
            ignore_hash,
            host,
            context,
            backend,
            timeout,
            strict,
            no_report,
        } => {
            let mut config = config.clone();
            if let Some(dir) = modules {
                config.modules_dir = dir;
            }
            if let Some(dir) = output {
                config.reports_dir = dir;
            }
            if host.is_some() {
                config.host = host;
            }
            if context.is_some() {
                config.context = context;
            }
            if let Some(name) = backend {
                config.backend = name;
            }
            if timeout.is_some() {
                config.unit_timeout_secs = timeout;
            }
            config.ignore_hashes |= ignore_hash;
            config.strict_placeholders |= strict;

            commands::run::run(
                &config,
                &commands::run::RunArgs {
                    target,
                    categories: commands::split_list(&category),
                    singles: commands::split_list(&single),
                    modargs,
                    write_reports: !no_report,
                },
                json,
            )
        }
        Commands::List {
            category,
            single,
            modules,
            ignore_hash,
        } => commands::list::run(
            modules.as_deref().unwrap_or(&config.modules_dir),
            commands::split_list(&category),
            commands::split_list(&single),
            ignore_hash || config.ignore_hashes,
            json,
        ),
        Commands::Verify { modules } => {
            commands::verify::run(modules.as_deref().unwrap_or(&config.modules_dir), json)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}
