use std::sync::Arc;

use gymgate_core::{
    ConsoleNotifier, Event, SessionDb, SessionManager, SettingsStore, TimerKey, TokioClock,
};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{location_from_env, print_events, CliResult};

/// Foreground alarm loop: resumes persisted sessions (starting a new
/// one if none is in flight) and reacts to timers until the cycle
/// completes or ctrl-c.
pub fn run() -> CliResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_loop())
}

async fn run_loop() -> CliResult {
    let (clock, rx) = TokioClock::new();
    let manager = SessionManager::new(
        clock,
        Arc::new(ConsoleNotifier),
        location_from_env(),
        SessionDb::open()?,
    );

    let replayed = manager.resume()?;
    print_events(&replayed)?;
    react(&manager, &replayed)?;

    if manager.active_sessions().is_empty() {
        let settings = SettingsStore::open_default()?.load()?;
        let (id, events) = manager.start(settings)?;
        println!("session {id}");
        print_events(&events)?;
    }

    wait_for_completion(&manager, rx).await
}

async fn wait_for_completion(
    manager: &SessionManager,
    mut rx: UnboundedReceiver<TimerKey>,
) -> CliResult {
    loop {
        tokio::select! {
            maybe_key = rx.recv() => {
                let Some(key) = maybe_key else { break };
                let events = manager.timer_fired(key)?;
                print_events(&events)?;
                react(manager, &events)?;
                if manager.active_sessions().is_empty() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted; sessions stay persisted");
                break;
            }
        }
    }
    Ok(())
}

/// A due location check pulls a sample from the location source right
/// away.
fn react(manager: &SessionManager, events: &[Event]) -> CliResult {
    for event in events {
        if matches!(event, Event::LocationCheckDue { .. }) {
            let (_outcome, events) = manager.verify_location(event.session_id())?;
            print_events(&events)?;
        }
    }
    Ok(())
}
