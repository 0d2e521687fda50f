//! Typed ID wrappers.
//!
//! IDs are opaque String wrappers (serde-transparent). The server assigns
//! workout and exercise ids; session keys are derived locally with
//! [`SessionKey::for_workout`] or supplied by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Stable key correlating one workout instance to its persisted draft.
    SessionKey
);
typed_id!(
    /// Identifier of an exercise slot inside a workout (one row of the plan).
    WorkoutExerciseId
);
typed_id!(
    /// Identifier of an exercise descriptor from the exercise library.
    ExerciseId
);
typed_id!(
    /// Identifier of a workout definition.
    WorkoutId
);

impl SessionKey {
    /// Conventional key for a user working through a given workout.
    pub fn for_workout(user: &str, workout_id: &WorkoutId) -> Self {
        Self(format!("{user}:{workout_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_for_workout() {
        let key = SessionKey::for_workout("client-7", &WorkoutId::from("w-42"));
        assert_eq!(key.as_str(), "client-7:w-42");
        assert_eq!(key.to_string(), "client-7:w-42");
    }

    #[test]
    fn typed_id_serde_is_transparent() {
        let id = WorkoutExerciseId::from("e1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"e1\"");
        let back: WorkoutExerciseId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
