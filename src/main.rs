use std::net::SocketAddr;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use static_routing_agent::{
    config::{
        AgentConfig, DEFAULT_PERIODIC_RECONCILIATION_INTERVAL_SECS, DEFAULT_REQUEUE_INTERVAL_SECS,
    },
    controller::{
        self, ControllerState, DryRunRouteTable, KubeNrtClient, NetlinkRouteTable, RouteTable,
    },
    telemetry, Error,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the routing agent
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Name of the node this agent manages
    #[arg(long, env = "NODE_NAME")]
    node_name: String,

    /// Seconds to wait before retrying a failed pass
    #[arg(long, env = "REQUEUE_INTERVAL", default_value_t = DEFAULT_REQUEUE_INTERVAL_SECS)]
    requeue_interval: u64,

    /// Seconds between timer-driven passes, 0 disables them
    #[arg(
        long,
        env = "PERIODIC_RECONCILIATION_INTERVAL",
        default_value_t = DEFAULT_PERIODIC_RECONCILIATION_INTERVAL_SECS
    )]
    periodic_reconciliation_interval: u64,

    /// Delete realm routes that no NodeRoutingTable desires
    #[arg(long, env = "CLEANUP_ORPHAN_ROUTES", default_value_t = true, action = ArgAction::Set)]
    cleanup_orphan_routes: bool,

    /// Run in dry-run mode (log route changes without applying them)
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Address of the health and metrics endpoint
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:9695")]
    health_probe_bind_address: SocketAddr,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl RunArgs {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig::new(&self.node_name)
            .with_requeue_interval_secs(self.requeue_interval)
            .with_periodic_interval_secs(self.periodic_reconciliation_interval)
            .with_orphan_cleanup(self.cleanup_orphan_routes)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("static-routing-agent v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_agent(run_args).await,
    }
}

async fn run_agent(args: RunArgs) -> Result<(), Error> {
    telemetry::init_tracing(args.log_json);

    let config = args.agent_config();
    config.validate()?;

    info!(
        node = %config.node_name,
        dry_run = args.dry_run,
        "Starting static-routing-agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let netlink = NetlinkRouteTable::new(config.realm)?;
    let route_table: Arc<dyn RouteTable> = if args.dry_run {
        warn!("Dry-run mode: kernel routes will not be modified");
        Arc::new(DryRunRouteTable::new(netlink))
    } else {
        Arc::new(netlink)
    };

    let cancel = CancellationToken::new();
    let state = Arc::new(ControllerState::new(
        Arc::new(KubeNrtClient::with_label(
            client.clone(),
            config.node_name_label.clone(),
        )),
        route_table,
        config,
        cancel.clone(),
    ));

    tokio::spawn(shutdown_on_signal(cancel.clone()));

    if let Some(interval) = state.config.periodic_reconciliation_interval {
        tokio::spawn(controller::run_periodic_reconcile(state.clone(), interval));
    }

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        let addr = args.health_probe_bind_address;
        tokio::spawn(async move {
            if let Err(e) = static_routing_agent::rest_api::run_server(api_state, addr).await {
                error!("Health server error: {:?}", e);
            }
        });
    }

    let result = controller::run_controller(client, state).await;
    cancel.cancel();
    result
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Unable to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    token.cancel();
}
