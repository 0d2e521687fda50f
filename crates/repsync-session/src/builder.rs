use repsync_protocol::{
    CardioEntry, ExerciseKind, ExerciseState, ExerciseTracking, FlexibilityEntry, SessionState,
    SetEntry, WorkoutExerciseDefinition,
};
use tracing::warn;

/// Upper bound on pre-filled sets per exercise.
pub const MAX_INITIAL_SETS: u32 = 100;

/// Builds the initial tracking state for a workout plan.
///
/// Definitions are ordered by `order_index` (stable on ties). Rows without an
/// id are skipped. Pure: identical input always yields identical output.
pub fn build_session_state(defs: &[WorkoutExerciseDefinition]) -> SessionState {
    let mut ordered: Vec<&WorkoutExerciseDefinition> = defs.iter().collect();
    ordered.sort_by_key(|def| def.order_index);

    let mut state = SessionState::new();
    for def in ordered {
        let Some(id) = def.id.clone() else {
            warn!(
                exercise = %def.exercise.id,
                order_index = def.order_index,
                "skipping workout exercise without id"
            );
            continue;
        };
        state.insert(
            id,
            ExerciseState {
                expanded: true,
                exercise_id: def.exercise.id.clone(),
                current_exercise: def.exercise.clone(),
                tracking: initial_tracking(def),
            },
        );
    }
    state
}

fn initial_tracking(def: &WorkoutExerciseDefinition) -> ExerciseTracking {
    match def.kind {
        ExerciseKind::Strength => ExerciseTracking::Strength {
            sets: initial_sets(def),
        },
        ExerciseKind::Bodyweight => ExerciseTracking::Bodyweight {
            sets: initial_sets(def),
        },
        ExerciseKind::Cardio => ExerciseTracking::Cardio {
            cardio: CardioEntry::default(),
        },
        ExerciseKind::Run => ExerciseTracking::Run {
            cardio: CardioEntry::default(),
        },
        ExerciseKind::Flexibility => ExerciseTracking::Flexibility {
            flexibility: FlexibilityEntry::default(),
        },
    }
}

fn initial_sets(def: &WorkoutExerciseDefinition) -> Vec<SetEntry> {
    let count = match def.target_sets {
        Some(sets) if sets > i64::from(MAX_INITIAL_SETS) => {
            warn!(
                exercise = %def.exercise.id,
                target_sets = sets,
                max = MAX_INITIAL_SETS,
                "target sets clamped"
            );
            MAX_INITIAL_SETS
        }
        Some(sets) if sets >= 1 => u32::try_from(sets).unwrap_or(MAX_INITIAL_SETS),
        _ => 1,
    };
    let scheme = def
        .target_reps
        .as_deref()
        .map(str::trim)
        .filter(|reps| !reps.is_empty());
    let default_reps = scheme.and_then(|reps| reps.parse::<u32>().ok());

    (1..=count)
        .map(|set_number| SetEntry {
            reps: default_reps,
            target_reps: scheme.map(str::to_owned),
            ..SetEntry::blank(set_number)
        })
        .collect()
}
