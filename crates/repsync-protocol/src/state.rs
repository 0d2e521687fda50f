//! Live session state: one tracking entry per workout exercise.
//!
//! `SessionState` is an insertion-ordered map; the builder inserts in
//! `order_index` order so iteration follows the plan. Drafts are stored as
//! the JSON form of this type and must round-trip losslessly.

use crate::ids::{ExerciseId, WorkoutExerciseId};
use crate::workout::{ExerciseDescriptor, ExerciseKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One set of a strength or bodyweight exercise. `set_number` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub set_number: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub reps: Option<u32>,
    /// Rep scheme shown as a placeholder, never treated as logged work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_reps: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl SetEntry {
    pub fn blank(set_number: u32) -> Self {
        Self {
            set_number,
            weight: None,
            reps: None,
            target_reps: None,
            completed: false,
        }
    }
}

/// Cardio and run payload. Distance in kilometres, duration in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardioEntry {
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Flexibility payload. Duration in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibilityEntry {
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub completed: bool,
}

/// Kind-specific payload. Exactly one shape exists per exercise and it
/// always matches the kind tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExerciseTracking {
    Strength { sets: Vec<SetEntry> },
    Bodyweight { sets: Vec<SetEntry> },
    Cardio { cardio: CardioEntry },
    Run { cardio: CardioEntry },
    Flexibility { flexibility: FlexibilityEntry },
}

impl ExerciseTracking {
    pub fn kind(&self) -> ExerciseKind {
        match self {
            Self::Strength { .. } => ExerciseKind::Strength,
            Self::Bodyweight { .. } => ExerciseKind::Bodyweight,
            Self::Cardio { .. } => ExerciseKind::Cardio,
            Self::Run { .. } => ExerciseKind::Run,
            Self::Flexibility { .. } => ExerciseKind::Flexibility,
        }
    }

    pub fn sets(&self) -> Option<&[SetEntry]> {
        match self {
            Self::Strength { sets } | Self::Bodyweight { sets } => Some(sets.as_slice()),
            _ => None,
        }
    }

    fn sets_mut(&mut self) -> Option<&mut Vec<SetEntry>> {
        match self {
            Self::Strength { sets } | Self::Bodyweight { sets } => Some(sets),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseState {
    pub expanded: bool,
    pub exercise_id: ExerciseId,
    pub current_exercise: ExerciseDescriptor,
    #[serde(flatten)]
    pub tracking: ExerciseTracking,
}

impl ExerciseState {
    pub fn kind(&self) -> ExerciseKind {
        self.tracking.kind()
    }

    pub fn is_completed(&self) -> bool {
        match &self.tracking {
            ExerciseTracking::Strength { sets } | ExerciseTracking::Bodyweight { sets } => {
                !sets.is_empty() && sets.iter().all(|set| set.completed)
            }
            ExerciseTracking::Cardio { cardio } | ExerciseTracking::Run { cardio } => {
                cardio.completed
            }
            ExerciseTracking::Flexibility { flexibility } => flexibility.completed,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum StateEditError {
    #[error("unknown exercise: {0}")]
    UnknownExercise(String),
    #[error("exercise {0} is not tracked by sets")]
    NotSetBased(String),
    #[error("set {set_number} does not exist on exercise {exercise}")]
    UnknownSet { exercise: String, set_number: u32 },
}

/// Completed vs. total trackable units (sets, or single payloads).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub completed_units: usize,
    pub total_units: usize,
    pub completed_exercises: usize,
    pub total_exercises: usize,
}

/// Mapping from workout-exercise id to tracking state, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState {
    exercises: IndexMap<WorkoutExerciseId, ExerciseState>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    /// Appends an entry. Re-inserting an existing id keeps its position.
    pub fn insert(&mut self, id: WorkoutExerciseId, state: ExerciseState) {
        self.exercises.insert(id, state);
    }

    pub fn get(&self, id: &WorkoutExerciseId) -> Option<&ExerciseState> {
        self.exercises.get(id)
    }

    pub fn get_mut(&mut self, id: &WorkoutExerciseId) -> Option<&mut ExerciseState> {
        self.exercises.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &WorkoutExerciseId> {
        self.exercises.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WorkoutExerciseId, &ExerciseState)> {
        self.exercises.iter()
    }

    pub fn toggle_expanded(&mut self, id: &WorkoutExerciseId) -> Result<bool, StateEditError> {
        let exercise = self.exercise_mut(id)?;
        exercise.expanded = !exercise.expanded;
        Ok(exercise.expanded)
    }

    pub fn set_entry_mut(
        &mut self,
        id: &WorkoutExerciseId,
        set_number: u32,
    ) -> Result<&mut SetEntry, StateEditError> {
        let sets = self.sets_mut(id)?;
        sets.iter_mut()
            .find(|set| set.set_number == set_number)
            .ok_or_else(|| StateEditError::UnknownSet {
                exercise: id.to_string(),
                set_number,
            })
    }

    /// Appends a blank set carrying the previous set's rep placeholder.
    pub fn add_set(&mut self, id: &WorkoutExerciseId) -> Result<u32, StateEditError> {
        let sets = self.sets_mut(id)?;
        let set_number = sets.len() as u32 + 1;
        let mut entry = SetEntry::blank(set_number);
        entry.target_reps = sets.last().and_then(|last| last.target_reps.clone());
        sets.push(entry);
        Ok(set_number)
    }

    /// Removes a set and renumbers the rest so numbering stays contiguous.
    pub fn remove_set(
        &mut self,
        id: &WorkoutExerciseId,
        set_number: u32,
    ) -> Result<SetEntry, StateEditError> {
        let sets = self.sets_mut(id)?;
        let index = sets
            .iter()
            .position(|set| set.set_number == set_number)
            .ok_or_else(|| StateEditError::UnknownSet {
                exercise: id.to_string(),
                set_number,
            })?;
        let removed = sets.remove(index);
        for (offset, set) in sets.iter_mut().enumerate() {
            set.set_number = offset as u32 + 1;
        }
        Ok(removed)
    }

    /// Marks a single-payload exercise, or every set of a set-based one.
    pub fn mark_completed(
        &mut self,
        id: &WorkoutExerciseId,
        completed: bool,
    ) -> Result<(), StateEditError> {
        match &mut self.exercise_mut(id)?.tracking {
            ExerciseTracking::Strength { sets } | ExerciseTracking::Bodyweight { sets } => {
                sets.iter_mut().for_each(|set| set.completed = completed);
            }
            ExerciseTracking::Cardio { cardio } | ExerciseTracking::Run { cardio } => {
                cardio.completed = completed;
            }
            ExerciseTracking::Flexibility { flexibility } => flexibility.completed = completed,
        }
        Ok(())
    }

    pub fn progress(&self) -> SessionProgress {
        let mut progress = SessionProgress {
            total_exercises: self.exercises.len(),
            ..SessionProgress::default()
        };
        for exercise in self.exercises.values() {
            match exercise.tracking.sets() {
                Some(sets) => {
                    progress.total_units += sets.len();
                    progress.completed_units += sets.iter().filter(|set| set.completed).count();
                }
                None => {
                    progress.total_units += 1;
                    if exercise.is_completed() {
                        progress.completed_units += 1;
                    }
                }
            }
            if exercise.is_completed() {
                progress.completed_exercises += 1;
            }
        }
        progress
    }

    fn exercise_mut(&mut self, id: &WorkoutExerciseId) -> Result<&mut ExerciseState, StateEditError> {
        self.exercises
            .get_mut(id)
            .ok_or_else(|| StateEditError::UnknownExercise(id.to_string()))
    }

    fn sets_mut(&mut self, id: &WorkoutExerciseId) -> Result<&mut Vec<SetEntry>, StateEditError> {
        self.exercise_mut(id)?
            .tracking
            .sets_mut()
            .ok_or_else(|| StateEditError::NotSetBased(id.to_string()))
    }
}

impl FromIterator<(WorkoutExerciseId, ExerciseState)> for SessionState {
    fn from_iter<I: IntoIterator<Item = (WorkoutExerciseId, ExerciseState)>>(iter: I) -> Self {
        Self {
            exercises: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> ExerciseDescriptor {
        ExerciseDescriptor {
            id: ExerciseId::from(id),
            name: id.to_owned(),
            muscle_group: None,
            equipment: None,
            instructions: None,
        }
    }

    fn exercise(id: &str, tracking: ExerciseTracking) -> (WorkoutExerciseId, ExerciseState) {
        (
            WorkoutExerciseId::from(id),
            ExerciseState {
                expanded: true,
                exercise_id: ExerciseId::from(format!("lib-{id}")),
                current_exercise: descriptor(id),
                tracking,
            },
        )
    }

    fn sample_state() -> SessionState {
        let mut logged = SetEntry::blank(1);
        logged.weight = Some(62.5);
        logged.reps = Some(8);
        logged.target_reps = Some("8-12".to_owned());
        logged.completed = true;

        [
            exercise(
                "squat",
                ExerciseTracking::Strength {
                    sets: vec![logged, SetEntry::blank(2), SetEntry::blank(3)],
                },
            ),
            exercise("pushup", ExerciseTracking::Bodyweight { sets: vec![] }),
            exercise(
                "bike",
                ExerciseTracking::Cardio {
                    cardio: CardioEntry {
                        distance: Some(12.25),
                        duration: Some(1_800),
                        location: Some("gym".to_owned()),
                        completed: false,
                    },
                },
            ),
            exercise(
                "run",
                ExerciseTracking::Run {
                    cardio: CardioEntry::default(),
                },
            ),
            exercise(
                "stretch",
                ExerciseTracking::Flexibility {
                    flexibility: FlexibilityEntry {
                        duration: Some(90),
                        completed: true,
                    },
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn session_state_serde_roundtrip_covers_every_shape() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        let ids: Vec<_> = back.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["squat", "pushup", "bike", "run", "stretch"]);
    }

    #[test]
    fn tracking_is_tagged_by_kind() {
        let state = sample_state();
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["run"]["kind"], "run");
        assert_eq!(value["squat"]["sets"][0]["weight"], 62.5);
        assert_eq!(value["stretch"]["flexibility"]["duration"], 90);
    }

    #[test]
    fn remove_set_keeps_numbering_contiguous() {
        let mut state = sample_state();
        let squat = WorkoutExerciseId::from("squat");
        let removed = state.remove_set(&squat, 1).unwrap();
        assert!(removed.completed);
        let numbers: Vec<_> = state
            .get(&squat)
            .and_then(|e| e.tracking.sets())
            .unwrap()
            .iter()
            .map(|set| set.set_number)
            .collect();
        assert_eq!(numbers, [1, 2]);
    }

    #[test]
    fn add_set_inherits_rep_placeholder() {
        let mut state = sample_state();
        let squat = WorkoutExerciseId::from("squat");
        state.remove_set(&squat, 3).unwrap();
        state.remove_set(&squat, 2).unwrap();
        assert_eq!(state.add_set(&squat).unwrap(), 2);
        let added = state.set_entry_mut(&squat, 2).unwrap();
        assert_eq!(added.target_reps.as_deref(), Some("8-12"));
        assert!(!added.completed);
    }

    #[test]
    fn set_edits_reject_non_set_exercises() {
        let mut state = sample_state();
        let err = state.add_set(&WorkoutExerciseId::from("bike")).unwrap_err();
        assert_eq!(err, StateEditError::NotSetBased("bike".to_owned()));
        let err = state
            .toggle_expanded(&WorkoutExerciseId::from("missing"))
            .unwrap_err();
        assert!(matches!(err, StateEditError::UnknownExercise(_)));
    }

    #[test]
    fn progress_counts_sets_and_single_payloads() {
        let mut state = sample_state();
        let progress = state.progress();
        assert_eq!(progress.total_units, 6);
        assert_eq!(progress.completed_units, 2);
        assert_eq!(progress.completed_exercises, 1);

        state
            .mark_completed(&WorkoutExerciseId::from("squat"), true)
            .unwrap();
        assert_eq!(state.progress().completed_exercises, 2);
    }
}
