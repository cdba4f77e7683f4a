use clap::Subcommand;
use gymgate_core::{Coordinates, SettingsStore};

use super::{open_manager, print_events, resolve_session, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a new verification session using the stored settings
    Start,
    /// Start the next cycle on an existing session (e.g. a new day)
    Restart {
        #[arg(long)]
        id: Option<String>,
    },
    /// Print session state as JSON
    Status {
        /// Session id (optional when only one session exists)
        #[arg(long)]
        id: Option<String>,
    },
    /// List all sessions
    List,
    /// Confirm being awake
    Wake {
        #[arg(long)]
        id: Option<String>,
    },
    /// Deny being awake; the alarm repeats
    Deny {
        #[arg(long)]
        id: Option<String>,
    },
    /// Read the location source and run the geofence check
    Verify {
        #[arg(long)]
        id: Option<String>,
    },
    /// Run the geofence check against an explicit coordinate
    Confirm {
        #[arg(long)]
        id: Option<String>,
        /// Current latitude in degrees
        #[arg(long)]
        lat: f64,
        /// Current longitude in degrees
        #[arg(long)]
        lon: f64,
    },
    /// Cancel the running cycle
    Cancel {
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a session and its persisted state
    Remove {
        #[arg(long)]
        id: Option<String>,
    },
}

pub fn run(action: SessionAction) -> CliResult {
    let (manager, replayed) = open_manager()?;
    print_events(&replayed)?;

    match action {
        SessionAction::Start => {
            let settings = SettingsStore::open_default()?.load()?;
            let (id, events) = manager.start(settings)?;
            println!("session {id}");
            print_events(&events)?;
        }
        SessionAction::Restart { id } => {
            let id = resolve_session(&manager, id)?;
            let settings = SettingsStore::open_default()?.load()?;
            print_events(&manager.restart(id, settings)?)?;
        }
        SessionAction::Status { id } => {
            let id = resolve_session(&manager, id)?;
            let event = gymgate_core::Event::StateSnapshot {
                snapshot: manager.current_state(id)?,
                at: chrono::Utc::now(),
            };
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        SessionAction::List => {
            let mut snapshots = manager.snapshots();
            snapshots.sort_by_key(|s| s.id.to_string());
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        SessionAction::Wake { id } => {
            let id = resolve_session(&manager, id)?;
            print_events(&manager.confirm_wake_up(id)?)?;
        }
        SessionAction::Deny { id } => {
            let id = resolve_session(&manager, id)?;
            print_events(&manager.deny_wake_up(id)?)?;
        }
        SessionAction::Verify { id } => {
            let id = resolve_session(&manager, id)?;
            let (_outcome, events) = manager.verify_location(id)?;
            print_events(&events)?;
        }
        SessionAction::Confirm { id, lat, lon } => {
            let id = resolve_session(&manager, id)?;
            let (_outcome, events) =
                manager.confirm_gym_attendance(id, Coordinates::new(lat, lon))?;
            print_events(&events)?;
        }
        SessionAction::Cancel { id } => {
            let id = resolve_session(&manager, id)?;
            print_events(&manager.cancel(id)?)?;
        }
        SessionAction::Remove { id } => {
            let id = resolve_session(&manager, id)?;
            manager.remove(id)?;
            println!("session {id} removed");
        }
    }

    Ok(())
}
