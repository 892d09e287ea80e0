//! Per-task solve flow.

use crate::config::EngineConfig;
use rand::Rng;
use recolor_core::{color_map_accuracy, Confidence, Rule, Task, TaskSignature};
use recolor_ensemble::{EnsemblePredictor, Prediction};
use recolor_learning::{blend, correct, Generalizer, RuleLearner, RuleStore};
use recolor_meta::{ReplayMemory, TypeMemoryTracker};
use recolor_storage::{Result, Storage};
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of solving one task.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Task identifier as given
    pub task_id: String,
    /// Rule-store key
    pub signature: TaskSignature,
    /// The rule left in the store
    pub rule: Rule,
    /// Whether self-correction replaced the rule
    pub corrected: bool,
    /// Ensemble output
    pub prediction: Prediction,
}

/// Runs learn → generalize → correct → predict → record for a task.
pub struct Solver {
    config: crate::config::SolverConfig,
    store: RuleStore,
    learner: RuleLearner,
    generalizer: Generalizer,
    predictor: EnsemblePredictor,
    memory: TypeMemoryTracker,
    replay: ReplayMemory,
}

impl Solver {
    /// Build a solver from the engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.solver.clone(),
            store: RuleStore::new(),
            learner: RuleLearner::new().with_config(config.learner.clone()),
            generalizer: Generalizer::new().with_config(config.generalizer.clone()),
            predictor: EnsemblePredictor::with_config(config.ensemble.clone()),
            memory: TypeMemoryTracker::new(),
            replay: ReplayMemory::new(),
        }
    }

    /// Solve one task.
    pub async fn solve<R: Rng + ?Sized>(
        &self,
        storage: &mut dyn Storage,
        task: &Task,
        rng: &mut R,
    ) -> Result<Solution> {
        let signature = task.signature();
        let mut rule = self
            .store
            .get_or_learn(storage, &self.learner, task, rng)
            .await?;

        if self.config.generalize {
            rule = self.generalizer.generalize(storage, &signature, rule).await?;
            self.store.put(storage, &signature, rule.clone()).await?;
        }

        let mut corrected = false;
        if self.config.self_correct {
            if let Some(better) = self.resolve(task, &rule) {
                self.store.put(storage, &signature, better.clone()).await?;
                rule = better;
                corrected = true;
            }
        }

        let prediction = self.predictor.predict(storage, task).await;
        let confidence = Confidence::new(prediction.mean_confidence);
        self.memory
            .update(storage, &self.config.memory_type, confidence, Some(&rule.color_map))
            .await?;
        self.replay
            .record(
                storage,
                self.config.memory_type.clone(),
                rule.color_map.clone(),
                confidence,
            )
            .await?;

        info!(
            "Solved {} ({}): {} rule, confidence {}",
            task.id,
            signature,
            rule.type_tag(),
            confidence
        );
        Ok(Solution {
            task_id: task.id.clone(),
            signature,
            rule,
            corrected,
            prediction,
        })
    }

    /// The blend of `rule` and its fixes, when it scores strictly higher on
    /// the training pairs.
    fn resolve(&self, task: &Task, rule: &Rule) -> Option<Rule> {
        let fixes = correct(&task.train, &rule.color_map);
        if fixes.is_empty() {
            debug!("No fixes for {}", task.id);
            return None;
        }
        let mut rules = Vec::with_capacity(fixes.len() + 1);
        rules.push(rule.clone());
        rules.extend(fixes);
        let blended = blend(&rules);

        let before = color_map_accuracy(&task.train, &rule.color_map);
        let after = color_map_accuracy(&task.train, &blended.color_map);
        debug!("Self-correction for {}: {:.3} -> {:.3}", task.id, before, after);
        (after > before).then_some(blended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use recolor_core::{Grid, TestInput, TrainPair, Transform};
    use recolor_ensemble::CandidatePool;
    use recolor_storage::MemoryStorage;

    fn grid(rows: Vec<Vec<u8>>) -> Grid {
        Grid::new(rows).unwrap()
    }

    fn t1() -> Task {
        Task::new(
            "t1",
            vec![TrainPair {
                input: grid(vec![vec![1]]),
                output: grid(vec![vec![2]]),
            }],
            vec![TestInput {
                input: grid(vec![vec![1]]),
            }],
        )
    }

    #[tokio::test]
    async fn test_t1_end_to_end() {
        let mut storage = MemoryStorage::new();
        let solver = Solver::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        let solution = solver.solve(&mut storage, &t1(), &mut rng).await.unwrap();
        assert_eq!(solution.rule.color_map, [(1, 2)].into_iter().collect());
        assert!(!solution.corrected);
        assert_eq!(
            solution.prediction.attempts,
            vec![vec![grid(vec![vec![2]]), grid(vec![vec![2]])]]
        );
        assert_eq!(solution.prediction.mean_confidence, 1.0);

        let replay = storage.load_replay().await.unwrap().unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay.entries()[0].rule_type, "meta_ensemble");
        let memory = storage.load_type_memory().await.unwrap().unwrap();
        assert_eq!(memory.get("meta_ensemble").unwrap().count, 1);
        assert!(storage.load_rule_bank().await.unwrap().unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_second_solve_reuses_stored_rule() {
        let mut storage = MemoryStorage::new();
        let solver = Solver::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(2);

        let first = solver.solve(&mut storage, &t1(), &mut rng).await.unwrap();
        let second = solver.solve(&mut storage, &t1(), &mut rng).await.unwrap();
        assert_eq!(first.rule, second.rule);
        assert_eq!(storage.load_rule_cache().await.unwrap().unwrap().len(), 1);
        assert_eq!(storage.load_replay().await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fixed_point_task_predicts_its_input() {
        let mut storage = MemoryStorage::new();
        let solver = Solver::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        let g = grid(vec![vec![1, 2, 3], vec![4, 1, 2]]);
        let input = grid(vec![vec![3, 4], vec![2, 1], vec![1, 1]]);
        let task = Task::new(
            "fixed",
            vec![TrainPair {
                input: g.clone(),
                output: g,
            }],
            vec![TestInput {
                input: input.clone(),
            }],
        );

        let solution = solver.solve(&mut storage, &task, &mut rng).await.unwrap();
        assert_eq!(solution.prediction.mean_confidence, 1.0);
        assert_eq!(solution.prediction.attempts.len(), 1);
        assert!(solution.prediction.attempts[0].iter().all(|a| *a == input));

        let candidates = CandidatePool::standard(0.5).gather(&storage, &task).await;
        let top = EnsemblePredictor::new().rank(&task.train, candidates);
        assert_eq!(top[0].transform, Transform::Identity);
        assert_eq!(top[0].score, 1.0);
        for s in 1..=4 {
            assert_eq!(top[0].candidate.rule.color_map.apply(s), s);
        }
    }

    #[test]
    fn test_resolve_keeps_only_strict_improvement() {
        let solver = Solver::new(&EngineConfig::default());
        let task = Task::new(
            "fix",
            vec![TrainPair {
                input: grid(vec![vec![1, 3]]),
                output: grid(vec![vec![2, 4]]),
            }],
            Vec::new(),
        );
        // 1->2 right, 3 unmapped: half the cells wrong
        let weak = Rule::base([(1, 2)].into_iter().collect(), 0.9);
        let better = solver.resolve(&task, &weak).unwrap();
        assert_eq!(better.type_tag(), "color_map_blend");
        assert_eq!(better.color_map.get(3), Some(4));

        let exact = Rule::base([(1, 2), (3, 4)].into_iter().collect(), 0.9);
        assert!(solver.resolve(&task, &exact).is_none());
    }
}
