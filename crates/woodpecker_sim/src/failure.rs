//! Failure injection for the simulated collaborators.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// An operation the simulation can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailurePoint {
    /// `CertificateIssuer::issue_precert`
    IssuePrecert,
    /// `CertificateIssuer::issue_final`
    IssueFinal,
    /// `LogSubmitter::add_pre_chain`
    AddPreChain,
    /// `LogSubmitter::add_chain`
    AddChain,
    /// `InclusionVerifier::checkpoint`
    Checkpoint,
    /// `InclusionVerifier::check_inclusion`
    CheckInclusion,
}

/// Which calls fail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureModel {
    /// Calls that fail, by 1-based call number per point
    pub nth: HashMap<FailurePoint, HashSet<u64>>,
    /// Points where every call fails
    pub always: HashSet<FailurePoint>,
    /// Per-call failure probability, applied to every point
    pub probability: f64,
    /// Seed for probabilistic failures
    pub seed: u64,
    /// Issue SCTs without the leaf_index extension
    pub omit_leaf_index: bool,
}

/// Failure model plus the call counters it is evaluated against
#[derive(Debug, Default)]
pub struct FailurePlan {
    model: FailureModel,
    calls: Mutex<HashMap<FailurePoint, u64>>,
    rng: Mutex<Option<SmallRng>>,
}

impl FailurePlan {
    /// A plan that never fails
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a plan from a model
    #[must_use]
    pub fn from_model(model: FailureModel) -> Self {
        let rng = (model.probability > 0.0).then(|| SmallRng::seed_from_u64(model.seed));
        Self {
            model,
            calls: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Fail the `n`th call (1-based) at `point`
    #[must_use]
    pub fn fail_nth(mut self, point: FailurePoint, n: u64) -> Self {
        self.model.nth.entry(point).or_default().insert(n);
        self
    }

    /// Fail every call at `point`
    #[must_use]
    pub fn fail_always(mut self, point: FailurePoint) -> Self {
        self.model.always.insert(point);
        self
    }

    /// Fail each call with `probability`, reproducibly from `seed`
    #[must_use]
    pub fn with_probability(mut self, probability: f64, seed: u64) -> Self {
        self.model.probability = probability;
        self.model.seed = seed;
        self.rng = Mutex::new(Some(SmallRng::seed_from_u64(seed)));
        self
    }

    /// Issue SCTs without the leaf_index extension
    #[must_use]
    pub fn omit_leaf_index(mut self) -> Self {
        self.model.omit_leaf_index = true;
        self
    }

    /// The model this plan evaluates
    #[must_use]
    pub fn model(&self) -> &FailureModel {
        &self.model
    }

    /// Whether SCTs should lack the leaf_index extension
    #[must_use]
    pub fn omits_leaf_index(&self) -> bool {
        self.model.omit_leaf_index
    }

    /// Count a call at `point` and decide whether it fails
    pub fn should_fail(&self, point: FailurePoint) -> bool {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            let count = calls.entry(point).or_insert(0);
            *count += 1;
            *count
        };
        if self.model.always.contains(&point)
            || self
                .model
                .nth
                .get(&point)
                .is_some_and(|calls| calls.contains(&call))
        {
            return true;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.as_mut()
            .is_some_and(|rng| rng.gen_bool(self.model.probability.clamp(0.0, 1.0)))
    }

    /// Calls counted so far at `point`
    #[must_use]
    pub fn calls(&self, point: FailurePoint) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&point)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_failures_by_default() {
        let plan = FailurePlan::none();
        assert!((0..10).all(|_| !plan.should_fail(FailurePoint::AddChain)));
        assert_eq!(plan.calls(FailurePoint::AddChain), 10);
        assert_eq!(plan.calls(FailurePoint::AddPreChain), 0);
    }

    #[test]
    fn test_nth_call_fails() {
        let plan = FailurePlan::none().fail_nth(FailurePoint::CheckInclusion, 2);
        let outcomes: Vec<bool> = (0..4)
            .map(|_| plan.should_fail(FailurePoint::CheckInclusion))
            .collect();
        assert_eq!(outcomes, vec![false, true, false, false]);
        assert!(!plan.should_fail(FailurePoint::Checkpoint));
    }

    #[test]
    fn test_always_fails() {
        let plan = FailurePlan::none().fail_always(FailurePoint::IssueFinal);
        assert!(plan.should_fail(FailurePoint::IssueFinal));
        assert!(plan.should_fail(FailurePoint::IssueFinal));
    }

    #[test]
    fn test_probability_is_reproducible() {
        let run = |seed| {
            let plan = FailurePlan::none().with_probability(0.5, seed);
            (0..64)
                .map(|_| plan.should_fail(FailurePoint::AddChain))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        let failures = run(7).into_iter().filter(|f| *f).count();
        assert!(failures > 0 && failures < 64);
    }

    #[test]
    fn test_from_model() {
        let model = FailureModel {
            always: [FailurePoint::AddPreChain].into_iter().collect(),
            omit_leaf_index: true,
            ..FailureModel::default()
        };
        let plan = FailurePlan::from_model(model.clone());
        assert_eq!(plan.model(), &model);
        assert!(plan.omits_leaf_index());
        assert!(plan.should_fail(FailurePoint::AddPreChain));
    }
}
