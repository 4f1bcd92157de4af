//! Stage names and the transition table.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A named point in a session's workflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stage(String);

impl Stage {
    /// Create a stage from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The stage name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Stage {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Allowed successors per stage, plus the stage new sessions start in.
///
/// The stage set is every stage named anywhere in the table: the initial
/// stage, every key, and every successor. A stage with no entry is
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    initial: Stage,
    successors: BTreeMap<Stage, BTreeSet<Stage>>,
    stages: BTreeSet<Stage>,
}

impl TransitionTable {
    /// Build a table from an initial stage and `(stage, successors)` pairs.
    ///
    /// Repeated entries for one stage are merged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any stage name is empty.
    pub fn new<I, S>(initial: impl Into<Stage>, transitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Stage, S)>,
        S: IntoIterator<Item = Stage>,
    {
        let initial = initial.into();
        let mut successors: BTreeMap<Stage, BTreeSet<Stage>> = BTreeMap::new();
        let mut stages = BTreeSet::from([initial.clone()]);

        for (from, targets) in transitions {
            stages.insert(from.clone());
            let entry = successors.entry(from).or_default();
            for to in targets {
                stages.insert(to.clone());
                entry.insert(to);
            }
        }

        if stages.iter().any(|s| s.as_str().trim().is_empty()) {
            return Err(Error::Config("stage names must not be empty".to_string()));
        }

        Ok(Self {
            initial,
            successors,
            stages,
        })
    }

    /// Stage that unseen sessions start in.
    #[must_use]
    pub fn initial(&self) -> &Stage {
        &self.initial
    }

    /// Whether `stage` belongs to the stage set.
    #[must_use]
    pub fn contains(&self, stage: &Stage) -> bool {
        self.stages.contains(stage)
    }

    /// All stages, sorted by name.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    /// Allowed successors of `stage`, sorted by name.
    pub fn successors(&self, stage: &Stage) -> impl Iterator<Item = &Stage> {
        self.successors.get(stage).into_iter().flatten()
    }

    /// Whether `from -> to` is a legal transition.
    #[must_use]
    pub fn allows(&self, from: &Stage, to: &Stage) -> bool {
        self.successors
            .get(from)
            .is_some_and(|targets| targets.contains(to))
    }

    /// Check `from -> to`, naming both stages on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStage`] if `to` is not in the stage set and
    /// [`Error::IllegalTransition`] if it is not a successor of `from`.
    pub fn check(&self, from: &Stage, to: &Stage) -> Result<()> {
        if !self.contains(to) {
            return Err(Error::UnknownStage(to.to_string()));
        }
        if !self.allows(from, to) {
            return Err(Error::IllegalTransition {
                from: from.clone(),
                to: to.clone(),
            });
        }
        Ok(())
    }
}
