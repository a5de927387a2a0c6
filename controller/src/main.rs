use crate::reconciler::Reconciler;
use anyhow::anyhow;
use clap::Parser;
use log::error;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use pingora::prelude::background_service;
use tokio::runtime::Runtime;

mod k8s;
mod processing;
mod reconciler;
mod server;

#[derive(Parser, Debug)]
#[command(version, about = "Reconciles APIRules into Istio VirtualServices", long_about = None)]
struct CliArgs {
    #[arg(short, long, default_value = "/etc/apigate/config.yaml")]
    config_file: String,

    #[arg(long, default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,
}

fn main() {
    let cli_args = CliArgs::parse();
    env_logger::builder()
        .filter_level(cli_args.log_level)
        .init();

    if let Err(e) = run(cli_args) {
        error!("{}", e);
    }
}

fn run(args: CliArgs) -> Result<(), anyhow::Error> {
    let config = server::config::load(&args.config_file)?;
    let mut server = server::new(config.server);

    let (watch_failure_tx, mut watch_failure_rx) = tokio::sync::mpsc::channel(1);

    let reconciler = Reconciler::new(&config.reconciliation);

    server.bootstrap();
    server.add_service(background_service(
        "Kubernetes APIRule watcher",
        k8s::watcher::Service::new(reconciler.reconcile(), watch_failure_tx),
    ));

    let rt = Runtime::new().map_err(|e| anyhow!("Failed to create watch failure runtime {}", e))?;
    rt.spawn(async move {
        if let Some(failure) = watch_failure_rx.recv().await {
            error!("Watcher error: {}", failure);
            if let Err(e) = signal::kill(Pid::this(), Signal::SIGINT) {
                error!("Unable to signal shutdown: {}", e);
            }
        }
    });
    server.run_forever();
}
