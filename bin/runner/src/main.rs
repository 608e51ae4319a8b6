use automation_engine::{EngineRunner, FileScheduleStore, ScheduleEngine, SystemClock};
use automation_runner::{
    config::RunnerConfig, definitions::DefinitionSet, events::EventReader,
    executor::JsonLinesExecutor,
};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment
    let config = RunnerConfig::from_env().expect("failed to load configuration");
    tracing::info!(state_path = %config.state_path.display(), "Loaded configuration");

    let store = FileScheduleStore::new(&config.state_path);
    let mut engine = ScheduleEngine::load(store, config.engine)
        .await
        .expect("failed to load engine state");

    if let Some(path) = &config.definitions_path {
        let definitions = DefinitionSet::load(path)
            .await
            .expect("failed to load schedule definitions");
        definitions.register(&mut engine).await;
    }

    let executor = JsonLinesExecutor::new(tokio::io::stdout());
    let (runner, handle) = EngineRunner::new(engine, executor, SystemClock);
    let runner_task = tokio::spawn(runner.run());

    let mut events = EventReader::new(BufReader::new(tokio::io::stdin()));
    loop {
        tokio::select! {
            next = events.next_event() => match next {
                Ok(Some(event)) => {
                    if let Err(report) = handle.submit(event).await {
                        tracing::warn!(error = %report, "engine runner is gone");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read events");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received interrupt");
                break;
            }
        }
    }

    handle.shutdown().await;
    let engine = runner_task.await.expect("engine runner panicked");
    tracing::info!(active = engine.len(), "Shut down");
}
