//! The execution engine - drives solving, evolution and consolidation.

use crate::config::EngineConfig;
use crate::solver::{Solution, Solver};
use rand::rngs::StdRng;
use rand::SeedableRng;
use recolor_core::{MetaWeights, PromotionSummary, Rule, Task};
use recolor_evolution::{
    Amplifier, CacheStatistics, EvolutionReport, Mutator, WeightAdjustment, WeightTuner,
};
use recolor_learning::RuleStore;
use recolor_meta::{
    Diversifier, MetaClusterer, Promoter, Rehearser, ReplayMemory, TypeMemoryTracker,
};
use recolor_storage::{recover, Document, Storage};
use serde::Serialize;
use tracing::{debug, info};

/// The execution engine.
///
/// Runs the learning loop over one storage backend:
/// ```text
/// solve*  →  evolve(last, current)  →  consolidate
/// ```
/// The driver deciding how many rounds to run lives outside the engine.
pub struct ExecutionEngine<S: Storage> {
    storage: S,
    config: EngineConfig,
    solver: Solver,
    rng: StdRng,
    solved: usize,
}

impl<S: Storage> ExecutionEngine<S> {
    /// Create a new execution engine with default configuration.
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    /// Create an engine with the given configuration.
    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            storage,
            solver: Solver::new(&config),
            config,
            rng,
            solved: 0,
        }
    }

    /// Solve one task.
    pub async fn solve(&mut self, task: &Task) -> anyhow::Result<Solution> {
        let solution = self
            .solver
            .solve(&mut self.storage, task, &mut self.rng)
            .await?;
        self.solved += 1;
        Ok(solution)
    }

    /// Solve tasks in order.
    pub async fn solve_all(&mut self, tasks: &[Task]) -> anyhow::Result<Vec<Solution>> {
        info!("Solving {} tasks", tasks.len());
        let mut solutions = Vec::with_capacity(tasks.len());
        for task in tasks {
            solutions.push(self.solve(task).await?);
        }
        Ok(solutions)
    }

    /// Mutate, amplify when `current` stagnates, then decay or recover the
    /// meta weights.
    pub async fn evolve(&mut self, last: f64, current: f64) -> anyhow::Result<EvolutionReport> {
        info!("Evolution pass: last {:.3}, current {:.3}", last, current);
        let mutated = Mutator::new()
            .with_config(self.config.mutation.clone())
            .meta_mutate(&mut self.storage, &mut self.rng)
            .await?;
        let amplified = Amplifier::new()
            .with_config(self.config.amplifier.clone())
            .amplify(&mut self.storage, current, &mut self.rng)
            .await?;
        WeightTuner::new()
            .decay(&mut self.storage, last, current)
            .await?;

        let cache = RuleStore::new().load(&self.storage).await;
        Ok(EvolutionReport {
            mutated,
            amplified,
            cache: CacheStatistics::of(&cache),
        })
    }

    /// Rebuild clustered meta-rules.
    pub async fn cluster(&mut self) -> anyhow::Result<Vec<(String, Rule)>> {
        let built = MetaClusterer::new()
            .with_config(self.config.cluster.clone())
            .build(&mut self.storage)
            .await?;
        Ok(built)
    }

    /// Promote strong replay entries.
    pub async fn promote(&mut self) -> anyhow::Result<PromotionSummary> {
        let summary = Promoter::new()
            .with_config(self.config.promoter.clone())
            .promote(&mut self.storage)
            .await?;
        Ok(summary)
    }

    /// Synthesize meta-rule variants.
    pub async fn diversify(&mut self) -> anyhow::Result<usize> {
        let added = Diversifier::new()
            .with_config(self.config.diversify.clone())
            .diversify(&mut self.storage)
            .await?;
        Ok(added)
    }

    /// Reinject a diverse slice of meta-rules into the cache.
    pub async fn rehearse(&mut self) -> anyhow::Result<usize> {
        let written = Rehearser::new()
            .with_config(self.config.rehearsal.clone())
            .rehearse(&mut self.storage)
            .await?;
        Ok(written)
    }

    /// Cluster, promote, diversify, rehearse, then reinforce the meta weights.
    pub async fn consolidate(&mut self) -> anyhow::Result<ConsolidationReport> {
        info!("Consolidation pass");
        let clustered = self.cluster().await?.len();
        let promotion = self.promote().await?;
        let diversified = self.diversify().await?;
        let rehearsed = self.rehearse().await?;
        let reinforced = WeightTuner::new().reinforce(&mut self.storage).await?;
        debug!("Reinforced: {:?}", reinforced);

        Ok(ConsolidationReport {
            clustered,
            promotion,
            diversified,
            rehearsed,
            reinforced,
        })
    }

    /// Snapshot of every persisted document.
    pub async fn status(&self) -> StatusReport {
        let storage: &dyn Storage = &self.storage;
        let cache = RuleStore::new().load(storage).await;
        let meta = recover(Document::MetaRules, storage.load_meta_rules().await);
        let replay = ReplayMemory::new().load(storage).await;
        let history = recover(
            Document::PromotionHistory,
            storage.load_promotion_history().await,
        );
        StatusReport {
            cache: CacheStatistics::of(&cache),
            meta_rules: meta.len(),
            replay_entries: replay.len(),
            best_replay: replay.best().map(|e| e.confidence.value()),
            type_summary: TypeMemoryTracker::new().summary(storage).await,
            weights: recover(Document::MetaWeights, storage.load_meta_weights().await),
            last_promotion: history.last().cloned(),
        }
    }

    /// Tasks solved by this engine so far.
    pub fn solved(&self) -> usize {
        self.solved
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get a reference to the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Get a mutable reference to the storage.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

/// Result of a consolidation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationReport {
    /// Clustered meta-rules rebuilt
    pub clustered: usize,
    /// Promotion run summary
    pub promotion: PromotionSummary,
    /// Variants admitted
    pub diversified: usize,
    /// Rules written to the rehearsal namespace
    pub rehearsed: usize,
    /// Weight changes from rule-type memory
    pub reinforced: Vec<WeightAdjustment>,
}

/// Overview of the persisted state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Rule cache statistics
    pub cache: CacheStatistics,
    /// Meta population size
    pub meta_rules: usize,
    /// Replay buffer size
    pub replay_entries: usize,
    /// Highest replay confidence
    pub best_replay: Option<f64>,
    /// Mean of the per-type means
    pub type_summary: f64,
    /// Current meta weights
    pub weights: MetaWeights,
    /// Most recent promotion run
    pub last_promotion: Option<PromotionSummary>,
}
