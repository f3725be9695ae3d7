use crate::commands::{
    run_export, run_positives_report, run_submit, ExportArgs, ReportArgs, SubmitArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use epi_report::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Epidemiological Reporting Service",
    about = "Serve and run laboratory surveillance reports from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print a surveillance report as JSON
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    /// Write the case tracing spreadsheet (seguimiento.csv)
    Export(ExportArgs),
    /// Upload resulted cases to the ministry web service
    Submit(SubmitArgs),
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    /// Positives dashboard for the configured communes
    Positives(ReportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Report {
            command: ReportCommand::Positives(args),
        } => run_positives_report(args),
        Command::Export(args) => run_export(args),
        Command::Submit(args) => run_submit(args).await,
    }
}
