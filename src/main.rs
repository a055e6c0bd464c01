//! FluentControl demo workflow
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│  Layout  │───▶│ Session  │───▶│ Monitor  │
//! │  (YAML)  │    │  (POST)  │    │ (submit) │    │  (poll)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Posts the standard 96-well deck and runs a three-transfer session to a
//! terminal state. Ctrl-C stops monitoring and cancels the session.

use anyhow::Context;

use fluent_control::client::{ClientError, FluentClient};
use fluent_control::config::AppConfig;
use fluent_control::plan::TransferPlan;
use fluent_control::presets::{standard_deck, standard_transfer};
use fluent_control::session::{MonitorError, SessionState};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn demo_plan() -> TransferPlan {
    TransferPlan::new(vec![
        standard_transfer("A1", "A2", 50.0),
        standard_transfer("A1", "A2", 25.0),
        standard_transfer("B1", "A2", 100.0),
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).with_context(|| format!("loading config for {}", env))?;
    let _log_guard = fluent_control::logging::init_logging(&app_config);

    tracing::info!(
        build = env!("GIT_HASH"),
        instrument = %app_config.instrument.base_url,
        "Starting FluentControl client in {} mode",
        env
    );

    let mut client = FluentClient::from_config(&app_config).context("creating client")?;

    match client.instrument_status().await {
        Ok(status) => tracing::info!(status = %status.status, "Instrument reachable"),
        Err(e) => tracing::warn!(error = %e, "Instrument status unavailable"),
    }

    client
        .post_layout(standard_deck())
        .await
        .context("posting deck layout")?;

    let mut session = client.create_session(demo_plan())?;
    client.submit(&mut session).await.context("submitting session")?;
    client.start(&mut session).await.context("starting session")?;

    let stop = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    match client.monitor_until(&mut session, stop).await {
        Ok(done) => {
            tracing::info!(
                session_id = done.session_id(),
                transitions = done.transitions().len(),
                "Transfer session completed"
            );
        }
        Err(ClientError::Monitor(MonitorError::Stopped { last_state })) => {
            tracing::warn!(state = %last_state, "Interrupted, cancelling session");
            let state = client.cancel(&mut session).await.context("cancelling session")?;
            tracing::info!(state = %state, "Cancel acknowledged");
        }
        Err(e) => {
            tracing::error!(
                code = e.code(),
                error = %e,
                state = %session.state(),
                "Transfer session did not complete"
            );
            if session.state() == SessionState::Failed {
                anyhow::bail!(
                    "session failed: {}",
                    session.error_detail().unwrap_or("no detail")
                );
            }
            return Err(e).context("monitoring session");
        }
    }

    Ok(())
}
