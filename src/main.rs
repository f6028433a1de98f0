//! rcman - supervised robocopy runner.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rcman::config::{ConfigLoader, ManagerConfig};
use rcman::display;
use rcman::robocopy::{exit_code_is_success, BuiltCommand, CommandError, RobocopyCommandBuilder};
use rcman::supervisor::{event_channel, Supervisor, UiEvent};

#[derive(Parser)]
#[command(
    name = "rcman",
    about = "Supervised robocopy runner with per-invocation logging",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CopyArgs {
    /// Source files (all from the same folder), or a single source folder.
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Destination folder.
    #[arg(short, long)]
    dest: PathBuf,

    /// Multithreaded copy width (/MT).
    #[arg(long)]
    threads: Option<u32>,

    /// Retry count per failed copy (/R).
    #[arg(long)]
    retries: Option<u32>,

    /// Wait between retries in seconds (/W).
    #[arg(long)]
    wait: Option<u32>,

    /// Robocopy binary name or path.
    #[arg(long)]
    binary: Option<String>,

    /// Extra robocopy switches, passed through verbatim after `--`.
    #[arg(last = true)]
    extra: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run robocopy under supervision.
    Run {
        #[command(flatten)]
        copy: CopyArgs,

        /// Logs directory override.
        #[arg(long)]
        logs_dir: Option<PathBuf>,

        /// Allow the destructive /MIR switch in extra arguments.
        #[arg(long)]
        allow_mir: bool,
    },
    /// Print the robocopy command without running it.
    Preview {
        #[command(flatten)]
        copy: CopyArgs,
    },
    /// Print the logs directory.
    Logs,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn build_command(copy: &CopyArgs, config: &ManagerConfig) -> Result<BuiltCommand, CommandError> {
    let preset = config.preset;
    RobocopyCommandBuilder::new()
        .binary(copy.binary.clone().unwrap_or_else(|| config.binary.clone()))
        .sources(copy.sources.clone())
        .destination(copy.dest.clone())
        .retries(copy.retries.unwrap_or(preset.retries))
        .wait_secs(copy.wait.unwrap_or(preset.wait_secs))
        .threads(copy.threads.unwrap_or(preset.threads))
        .extra_args(copy.extra.clone())
        .build()
}

fn render(event: &UiEvent) {
    match event {
        UiEvent::Text(line) => display::print_output_line(line),
        UiEvent::Status(status) => display::print_status(*status),
        UiEvent::ControlsRestored => {}
    }
}

fn preview(copy: &CopyArgs, config: &ManagerConfig) -> ExitCode {
    match build_command(copy, config) {
        Ok(built) => {
            for note in &built.notes {
                display::print_note(note);
            }
            println!("Preview: {}", built.preview());
            println!(
                "Files will be copied into: {} (original filenames kept)",
                built.destination_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::from(2)
        }
    }
}

async fn run(
    copy: CopyArgs,
    logs_dir: Option<PathBuf>,
    allow_mir: bool,
    config: ManagerConfig,
) -> ExitCode {
    let built = match build_command(&copy, &config) {
        Ok(built) => built,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::from(2);
        }
    };
    if built.contains_mir() && !allow_mir {
        display::print_error(
            "/MIR makes the destination exactly match the source and DELETES files \
             not present in the source; pass --allow-mir to proceed",
        );
        return ExitCode::from(2);
    }
    for note in &built.notes {
        display::print_note(note);
    }
    display::print_note(&format!(
        "Destination folder: {} (filenames preserved)",
        built.destination_dir.display()
    ));

    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, config.stop_escalation());
    let logs_dir = logs_dir.unwrap_or_else(|| config.logs_dir());

    let log_path = match supervisor.start(built.args, &logs_dir).await {
        Ok(path) => path,
        Err(e) => {
            // Failure events were already emitted; show them before exiting.
            while let Ok(event) = rx.try_recv() {
                render(&event);
            }
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C requests cooperative termination; the drain loop finishes up.
    let stopper = supervisor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = stopper.stop().await {
                tracing::warn!(error = %e, "Stop request rejected");
            }
        }
    });

    while let Some(event) = rx.recv().await {
        let done = event == UiEvent::ControlsRestored;
        render(&event);
        if done {
            break;
        }
    }
    display::print_note(&format!("Log saved to {}", log_path.display()));

    // Robocopy codes below 8 are success; signal termination is a failure.
    match supervisor.last_exit_code().await {
        Some(code) if exit_code_is_success(code) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)),
        None => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Commands::Run {
            copy,
            logs_dir,
            allow_mir,
        } => run(copy, logs_dir, allow_mir, config).await,
        Commands::Preview { copy } => preview(&copy, &config),
        Commands::Logs => {
            println!("{}", config.logs_dir().display());
            ExitCode::SUCCESS
        }
    }
}
