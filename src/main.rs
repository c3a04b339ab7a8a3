//! Demo binary driving a simulator over standard streams.
//!
//! Each stdin line is either a launch request such as
//! `{"launch": "UpdateFaxStatus", "parameters": [{"name": "referenceId", "value": "7"}]}`
//! or an inbound [`Message`] in its JSON form. Outbound messages are printed
//! to stdout as JSON lines; logs go to stderr.

mod cli;

use std::time::Duration;

use clap::Parser;
use scenario_sim::{
    ChannelEndpoint,
    Message,
    ScenarioParameter,
    Simulator,
    SimulatorBuilder,
    SimulatorConfig,
    samples::{fax, hello::HelloStarter},
};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Command {
    Launch {
        launch: String,
        #[serde(default)]
        parameters: Vec<ScenarioParameter>,
    },
    Inbound(Message),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving prometheus metrics");
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        warn!("metrics support not compiled in; ignoring --metrics-addr");
    }

    let mut config = SimulatorConfig::default()
        .workers(cli.workers)
        .correlation_timeout(Duration::from_millis(cli.correlation_timeout_ms))
        .shutdown_grace(Duration::from_millis(cli.shutdown_grace_ms))
        .scenario_header(Some(cli.scenario_header));
    if let Some(name) = cli.default_scenario {
        config = config.default_scenario(name);
    }

    let (endpoint, mut outbound) = ChannelEndpoint::new(config.outbound_capacity)?;
    let simulator = fax::register_with_delay(
        SimulatorBuilder::new(config),
        Duration::from_millis(cli.fax_delay_ms),
    )?
    .scenario("HelloStarter", HelloStarter)?
    .endpoint(endpoint)
    .start()?;

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = outbound.recv().await {
            let line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if stdout.write_all(format!("{line}\n").as_bytes()).await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => handle_line(&simulator, &line).await,
                None => {
                    info!("stdin closed; waiting for running scenarios");
                    wait_idle(&simulator).await;
                    break;
                }
            }
        }
    }

    simulator.shutdown().await;
    for execution in simulator.executions() {
        info!(
            execution_id = %execution.execution_id,
            scenario = %execution.scenario_name,
            status = execution.status.as_str(),
            error = ?execution.error,
            "execution summary"
        );
    }
    drop(simulator);
    // Scenario tasks hold endpoint clones until they unwind.
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        warn!("outbound printer did not drain in time");
    }
    Ok(())
}

async fn handle_line(simulator: &Simulator, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Command>(line) {
        Ok(Command::Launch { launch, parameters }) => match simulator.launch(&launch, parameters).await {
            Ok(id) => info!(execution_id = %id, scenario = %launch, "scenario launched"),
            Err(e) => warn!(scenario = %launch, error = %e, "launch refused"),
        },
        Ok(Command::Inbound(message)) => match simulator.receive(message).await {
            Ok(outcome) => debug!(?outcome, "inbound message routed"),
            Err(e) => warn!(error = %e, "inbound message rejected"),
        },
        Err(e) => warn!(error = %e, "ignoring malformed input line"),
    }
}

async fn wait_idle(simulator: &Simulator) {
    let idle = async {
        while simulator.service().in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        () = idle => {}
    }
}
