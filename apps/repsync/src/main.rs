use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use repsync_protocol::{
    DraftStorePort, ExerciseTracking, SessionKey, SessionState, WorkoutDefinition,
    WorkoutExerciseId,
};
use repsync_session::{SessionConfig, WorkoutSession};
use repsync_store::FileDraftStore;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "repsync")]
#[command(about = "Track a workout session with autosaved drafts")]
struct Cli {
    #[arg(long, default_value = ".repsync")]
    root: PathBuf,
    /// Explicit session key; defaults to `<user>:<workout id>` for `run`.
    #[arg(long)]
    session_key: Option<String>,
    #[arg(long, default_value = "local")]
    user: String,
    /// JSON file with loader and autosave settings.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a session for a workout plan, log a few demo edits, and save.
    Run {
        #[arg(long)]
        workout: PathBuf,
    },
    /// Print the stored draft for the session key.
    Show,
    /// Delete the stored draft for the session key.
    Discard,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let store: Arc<dyn DraftStorePort> = Arc::new(FileDraftStore::new(&cli.root));

    match &cli.command {
        Command::Run { workout } => {
            let workout = load_workout(workout)?;
            let key = cli
                .session_key
                .as_deref()
                .map(SessionKey::from)
                .unwrap_or_else(|| SessionKey::for_workout(&cli.user, &workout.workout_id));
            run(store, key, &workout, config).await
        }
        Command::Show => {
            let key = required_key(&cli)?;
            match store.load_draft(&key).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("no draft for {key}"),
            }
            Ok(())
        }
        Command::Discard => {
            let key = required_key(&cli)?;
            let existed = store.discard_draft(&key).await?;
            info!(session_key = %key, existed, "draft discarded");
            Ok(())
        }
    }
}

async fn run(
    store: Arc<dyn DraftStorePort>,
    key: SessionKey,
    workout: &WorkoutDefinition,
    config: SessionConfig,
) -> Result<()> {
    let session = WorkoutSession::open(store, key, &workout.exercises, config).await?;
    info!(
        session_key = %session.key(),
        source = ?session.initial_source(),
        workout = %workout.name,
        "session opened"
    );

    session.edit(log_demo_work);

    if !session.force_save().await {
        warn!("demo save did not complete");
    }
    let telemetry = session.telemetry();
    let progress = session.progress();
    println!("{}", serde_json::to_string_pretty(&telemetry)?);
    println!(
        "progress: {}/{} units, {}/{} exercises",
        progress.completed_units,
        progress.total_units,
        progress.completed_exercises,
        progress.total_exercises
    );

    session.close().await;
    Ok(())
}

/// Logs the next open set of the first set-based exercise and finishes the
/// first timed one.
fn log_demo_work(state: &mut SessionState) {
    let ids: Vec<WorkoutExerciseId> = state.ids().cloned().collect();

    let next_set = ids.iter().find_map(|id| {
        let sets = state.get(id)?.tracking.sets()?;
        let open = sets.iter().find(|set| !set.completed)?;
        Some((id.clone(), open.set_number))
    });
    if let Some((id, set_number)) = next_set {
        if let Ok(set) = state.set_entry_mut(&id, set_number) {
            set.weight = Some(60.0);
            set.reps = set.reps.or(Some(10));
            set.completed = true;
        }
    }

    let timed = ids.iter().find(|id| {
        state.get(id).is_some_and(|exercise| {
            matches!(
                exercise.tracking,
                ExerciseTracking::Cardio { .. }
                    | ExerciseTracking::Run { .. }
                    | ExerciseTracking::Flexibility { .. }
            ) && !exercise.is_completed()
        })
    });
    if let Some(id) = timed {
        if let Err(error) = state.mark_completed(id, true) {
            warn!(%error, "demo edit skipped");
        }
    }
}

fn required_key(cli: &Cli) -> Result<SessionKey> {
    match &cli.session_key {
        Some(raw) => Ok(SessionKey::from(raw.as_str())),
        None => bail!("--session-key is required for this command"),
    }
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn load_workout(path: &Path) -> Result<WorkoutDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading workout {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid workout {}", path.display()))
}
