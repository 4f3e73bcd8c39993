//! Class catalogs, candidate classes and belief snapshots

use hbrl_core::{RLError, Result};
use nalgebra::DVector;

use crate::class_model::ClassModel;

/// Whether a candidate belongs to the catalog or was drawn for this
/// iteration only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Member of the catalog; prior weight is its task count
    Permanent,
    /// Fresh draw from the base measure; prior weight is `alpha / m`
    Auxiliary,
}

/// A class offered to the assignment step
#[derive(Debug, Clone)]
pub struct CandidateClass {
    /// Catalog membership
    pub kind: ClassKind,
    /// Distribution over weights
    pub model: ClassModel,
}

impl CandidateClass {
    /// Wrap a catalog class
    #[must_use]
    pub fn permanent(model: ClassModel) -> Self {
        Self {
            kind: ClassKind::Permanent,
            model,
        }
    }

    /// Wrap a freshly drawn class
    #[must_use]
    pub fn auxiliary(model: ClassModel) -> Self {
        Self {
            kind: ClassKind::Auxiliary,
            model,
        }
    }

    /// Prior assignment weight given the class's occupancy
    #[must_use]
    pub fn prior_weight(&self, count: f64, alpha: f64, num_auxiliary: usize) -> f64 {
        match self.kind {
            ClassKind::Permanent => count,
            ClassKind::Auxiliary => alpha / num_auxiliary as f64,
        }
    }
}

/// Catalog left after dropping empty candidates and re-indexing
#[derive(Debug, Clone)]
pub struct Compacted {
    /// Surviving classes; `classes[i].class_id() == i`
    pub classes: Vec<ClassModel>,
    /// Task assignments into `classes`
    pub assignments: Vec<usize>,
    /// Tasks per class
    pub counts: Vec<usize>,
}

/// Drop candidates no task is assigned to and re-index the rest, in their
/// original order. Surviving auxiliaries become catalog members.
pub fn compact(candidates: Vec<CandidateClass>, assignments: &[usize]) -> Result<Compacted> {
    let mut occupancy = vec![0usize; candidates.len()];
    for &a in assignments {
        *occupancy.get_mut(a).ok_or(RLError::InvalidClass {
            index: a,
            classes: candidates.len(),
        })? += 1;
    }

    let mut remap = vec![usize::MAX; candidates.len()];
    let mut classes = Vec::new();
    let mut counts = Vec::new();
    for (old, (candidate, count)) in candidates.into_iter().zip(occupancy).enumerate() {
        if count > 0 {
            remap[old] = classes.len();
            classes.push(candidate.model.with_id(classes.len()));
            counts.push(count);
        }
    }

    Ok(Compacted {
        classes,
        assignments: assignments.iter().map(|&a| remap[a]).collect(),
        counts,
    })
}

/// Accepted global belief: class catalog, per-task assignments and weights
#[derive(Debug, Clone, Default)]
pub struct BeliefState {
    classes: Vec<ClassModel>,
    assignments: Vec<usize>,
    counts: Vec<usize>,
    weights: Vec<DVector<f64>>,
}

impl BeliefState {
    /// Build a snapshot, checking its invariants
    pub fn new(
        classes: Vec<ClassModel>,
        assignments: Vec<usize>,
        counts: Vec<usize>,
        weights: Vec<DVector<f64>>,
    ) -> Result<Self> {
        let state = Self {
            classes,
            assignments,
            counts,
            weights,
        };
        state.validate()?;
        Ok(state)
    }

    /// Snapshot from a compacted catalog plus per-task weights
    pub fn from_compacted(compacted: Compacted, weights: Vec<DVector<f64>>) -> Result<Self> {
        Self::new(
            compacted.classes,
            compacted.assignments,
            compacted.counts,
            weights,
        )
    }

    /// Check ids, assignment bounds, counts and lengths
    pub fn validate(&self) -> Result<()> {
        if self.weights.len() != self.assignments.len() {
            return Err(RLError::AssignmentMismatch {
                assignments: self.assignments.len(),
                tasks: self.weights.len(),
            });
        }
        if self.counts.len() != self.classes.len() {
            return Err(RLError::DimensionMismatch {
                expected: self.classes.len(),
                actual: self.counts.len(),
            });
        }
        if let Some((i, c)) = self
            .classes
            .iter()
            .enumerate()
            .find(|(i, c)| c.class_id() != *i)
        {
            return Err(RLError::Computation(format!(
                "class at position {i} carries id {}",
                c.class_id()
            )));
        }
        let mut occupancy = vec![0usize; self.classes.len()];
        for &a in &self.assignments {
            *occupancy.get_mut(a).ok_or(RLError::InvalidClass {
                index: a,
                classes: self.classes.len(),
            })? += 1;
        }
        if occupancy != self.counts {
            return Err(RLError::Computation(format!(
                "class counts {:?} disagree with assignments {:?}",
                self.counts, self.assignments
            )));
        }
        Ok(())
    }

    /// Catalog classes
    #[must_use]
    pub fn classes(&self) -> &[ClassModel] {
        &self.classes
    }

    /// Class index per task
    #[must_use]
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// Tasks per class
    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Weight vector per task
    #[must_use]
    pub fn weights(&self) -> &[DVector<f64>] {
        &self.weights
    }

    /// Number of tasks covered
    #[must_use]
    pub fn num_tasks(&self) -> usize {
        self.assignments.len()
    }

    /// Class of a task
    #[must_use]
    pub fn class_of(&self, task: usize) -> Option<&ClassModel> {
        self.assignments.get(task).map(|&a| &self.classes[a])
    }

    /// Class occupancy as prior weights
    #[must_use]
    pub fn count_weights(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }
}
