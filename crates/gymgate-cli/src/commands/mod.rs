pub mod config;
pub mod geo;
pub mod run;
pub mod session;

use std::sync::Arc;

use gymgate_core::location::{FixedLocation, LocationProvider, NoLocation};
use gymgate_core::{
    ConsoleNotifier, Coordinates, Event, ManualClock, SessionDb, SessionId, SessionManager,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the manager for a one-shot command: deterministic clock pinned
/// to now, console notifications, persisted sessions resumed. Timers
/// that came due since the last invocation replay here, so `status`
/// after the gym time has passed reflects the fired alarm.
pub fn open_manager() -> Result<(SessionManager, Vec<Event>), Box<dyn std::error::Error>> {
    let clock = Arc::new(ManualClock::starting_now());
    let manager = SessionManager::new(
        clock,
        Arc::new(ConsoleNotifier),
        location_from_env(),
        SessionDb::open()?,
    );
    let replayed = manager.resume()?;
    Ok((manager, replayed))
}

/// Location source for the CLI: `GYMGATE_LOCATION="lat,lon"` pins a
/// fixed coordinate; otherwise every read reports no fix.
pub fn location_from_env() -> Arc<dyn LocationProvider> {
    match std::env::var("GYMGATE_LOCATION") {
        Ok(value) => match parse_coordinates(&value) {
            Some(coordinates) => Arc::new(FixedLocation::new(coordinates)),
            None => {
                eprintln!("ignoring malformed GYMGATE_LOCATION: {value}");
                Arc::new(NoLocation)
            }
        },
        Err(_) => Arc::new(NoLocation),
    }
}

pub fn parse_coordinates(s: &str) -> Option<Coordinates> {
    let (lat, lon) = s.split_once(',')?;
    let coordinates = Coordinates::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
    coordinates.is_valid().then_some(coordinates)
}

pub fn print_events(events: &[Event]) -> CliResult {
    for event in events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

/// Resolve an explicit session id, or fall back to the sole registered
/// session.
pub fn resolve_session(
    manager: &SessionManager,
    id: Option<String>,
) -> Result<SessionId, Box<dyn std::error::Error>> {
    match id {
        Some(raw) => Ok(raw.parse()?),
        None => {
            let snapshots = manager.snapshots();
            match snapshots.as_slice() {
                [only] => Ok(only.id),
                [] => Err("no sessions; run `gymgate session start` first".into()),
                _ => Err("multiple sessions; pass --id".into()),
            }
        }
    }
}
