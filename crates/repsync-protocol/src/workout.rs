//! Server-provided workout definitions. Read-only for the session engine.

use crate::ids::{ExerciseId, WorkoutExerciseId, WorkoutId};
use serde::{Deserialize, Serialize};

/// How an exercise is tracked during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    Strength,
    Bodyweight,
    Cardio,
    Flexibility,
    Run,
}

impl ExerciseKind {
    /// Kinds tracked as a list of sets.
    pub fn is_set_based(self) -> bool {
        matches!(self, Self::Strength | Self::Bodyweight)
    }
}

/// Exercise library entry, denormalized into session state for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDescriptor {
    pub id: ExerciseId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muscle_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// One row of a workout plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutExerciseDefinition {
    /// Missing ids come from partially synced plans; such rows are skipped.
    #[serde(default)]
    pub id: Option<WorkoutExerciseId>,
    pub order_index: i64,
    pub kind: ExerciseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sets: Option<i64>,
    /// Rep scheme as authored by the coach, e.g. `"10"` or `"8-12"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_reps: Option<String>,
    pub exercise: ExerciseDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDefinition {
    pub workout_id: WorkoutId,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<WorkoutExerciseDefinition>,
}
