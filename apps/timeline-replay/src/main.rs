mod logging;
mod script;

use std::{env, path::PathBuf, process, sync::Arc};

use timeline_core::{
    Clock, FixedClock, PipelineConfig, SignalStream, SystemClock, TimelineDeps, TimelineSignal,
    spawn_timeline,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::script::ReplayScript;

#[tokio::main]
async fn main() {
    logging::init();

    let Some(path) = env::args()
        .nth(1)
        .or_else(|| env::var("TIMELINE_REPLAY_SCRIPT").ok())
        .map(PathBuf::from)
    else {
        eprintln!("usage: timeline-replay <script.json> (or set TIMELINE_REPLAY_SCRIPT)");
        process::exit(2);
    };

    let mut config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid timeline configuration");
            process::exit(2);
        }
    };
    let script = match ReplayScript::load(&path) {
        Ok(script) => script,
        Err(err) => {
            error!(error = %err, "failed to load replay script");
            process::exit(1);
        }
    };
    if let Some(mode) = script.mode {
        config.mode = mode;
    }

    let clock: Arc<dyn Clock> = match script.now_ms {
        Some(now_ms) => Arc::new(FixedClock::new(now_ms)),
        None => Arc::new(SystemClock),
    };
    let handle = spawn_timeline(
        config,
        TimelineDeps {
            room: script.room.clone(),
            clock,
            resolver: None,
        },
    );
    let signal_task = tokio::spawn(log_signals(handle.signals()));

    info!(steps = script.steps.len(), mode = ?config.mode, "replaying timeline script");
    for (index, step) in script.steps.into_iter().enumerate() {
        if let Err(err) = handle.send(step).await {
            error!(step = index, error = %err, "pipeline rejected input");
            process::exit(1);
        }
        if let Err(err) = handle.flush().await {
            error!(step = index, error = %err, "pipeline stopped during replay");
            process::exit(1);
        }
        let status = handle.status();
        debug!(
            step = index,
            items = handle.snapshot().len(),
            needs_resync = status.needs_resync,
            "step applied"
        );
    }

    let snapshot = handle.snapshot();
    handle.close();
    signal_task.abort();

    match serde_json::to_string_pretty(&*snapshot) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!(error = %err, "failed to encode final snapshot");
            process::exit(1);
        }
    }
}

async fn log_signals(mut signals: SignalStream) {
    loop {
        match signals.recv().await {
            Ok(TimelineSignal::ResyncRequired) => {
                warn!("timeline desynchronized; waiting for a reset")
            }
            Ok(signal) => info!(?signal, "timeline signal"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "signal stream lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
