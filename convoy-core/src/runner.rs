// ABOUTME: ScenarioRunner - concurrent logon of all actors, observer wiring, ordered step pipeline
// ABOUTME: Also hosts `terminate`, the single exit path for unrecovered failures

use crate::actor::{Actor, ActorRegistry};
use crate::config::{ActorConfig, Config};
use crate::error::HarnessError;
use crate::metrics;
use crate::observers::ObserverTable;
use crate::state::ScenarioState;
use crate::traits::SessionConnector;
use futures::future::{try_join_all, BoxFuture};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type StepFn = Box<
    dyn Fn(Arc<ActorRegistry>, ScenarioState) -> BoxFuture<'static, anyhow::Result<ScenarioState>>
        + Send
        + Sync,
>;

/// A named unit of work in a scenario pipeline
pub struct ScenarioStep {
    name: String,
    run: StepFn,
}

impl ScenarioStep {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<ActorRegistry>, ScenarioState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ScenarioState>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(
                move |registry: Arc<ActorRegistry>,
                      state: ScenarioState|
                      -> BoxFuture<'static, anyhow::Result<ScenarioState>> {
                    Box::pin(run(registry, state))
                },
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ScenarioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioStep")
            .field("name", &self.name)
            .finish()
    }
}

/// Progress of one scenario run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running { index: usize, step: String },
    Completed,
    Failed { index: usize, step: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed { .. })
    }
}

/// Runner settings derived from the loaded configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Domain for actors that do not name their own
    pub domain: String,
    pub min_logon_interval: Duration,
    /// Upper bound for a single step; `None` waits as long as the step takes
    pub step_timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            min_logon_interval: Duration::from_millis(5000),
            step_timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            domain: config.service.domain.clone(),
            min_logon_interval: config.reconnect.min_logon_interval(),
            step_timeout: config.scenario.step_timeout(),
        }
    }

    pub fn with_min_logon_interval(mut self, interval: Duration) -> Self {
        self.min_logon_interval = interval;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }
}

/// Drives a set of actors through logon, observer registration and one
/// ordered step pipeline.
pub struct ScenarioRunner {
    connector: Arc<dyn SessionConnector>,
    config: RunnerConfig,
    /// Installed on every actor at logon
    observers: ObserverTable,
    /// Per actor name, layered over `observers`
    actor_observers: HashMap<String, ObserverTable>,
    pipeline: Mutex<PipelineState>,
}

impl ScenarioRunner {
    pub fn new(connector: Arc<dyn SessionConnector>, config: RunnerConfig) -> Self {
        Self {
            connector,
            config,
            observers: ObserverTable::new(),
            actor_observers: HashMap::new(),
            pipeline: Mutex::new(PipelineState::Idle),
        }
    }

    /// Observers every actor receives at logon
    pub fn with_observers(mut self, observers: ObserverTable) -> Self {
        self.observers.merge(observers);
        self
    }

    /// Observers only the named actor receives, replacing shared ones per kind
    pub fn with_actor_observers(mut self, name: impl Into<String>, observers: ObserverTable) -> Self {
        self.actor_observers
            .entry(name.into())
            .or_default()
            .merge(observers);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_pipeline_state(&self, state: PipelineState) {
        *self.pipeline.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn observers_for(&self, name: &str) -> ObserverTable {
        let mut table = self.observers.clone();
        if let Some(overlay) = self.actor_observers.get(name) {
            table.merge(overlay.clone());
        }
        table
    }

    /// Log every actor on concurrently. Resolves only when all succeed; each
    /// actor has its observers installed before this returns. On the first
    /// failure the remaining logons are dropped and no registry is produced.
    pub async fn logon_all(&self, configs: &[ActorConfig]) -> Result<ActorRegistry, HarnessError> {
        if configs.is_empty() {
            return Err(HarnessError::NoActors);
        }
        let mut seen = HashSet::new();
        for config in configs {
            if !seen.insert(config.identity()) {
                return Err(HarnessError::DuplicateActor(config.identity().to_string()));
            }
        }

        tracing::info!(count = configs.len(), domain = %self.config.domain, "Logging on actors");
        let actors: Vec<Arc<Actor>> = configs
            .iter()
            .map(|config| {
                Actor::new(
                    config,
                    &self.config.domain,
                    Arc::clone(&self.connector),
                    self.config.min_logon_interval,
                )
            })
            .collect();

        let logons = actors.iter().map(|actor| {
            let observers = self.observers_for(actor.name());
            async move {
                actor
                    .logon_with(Some(observers))
                    .await
                    .map_err(|source| HarnessError::Logon {
                        identity: actor.identity().to_string(),
                        source,
                    })
            }
        });
        try_join_all(logons).await?;

        let mut registry = ActorRegistry::new();
        for actor in actors {
            registry.insert(actor)?;
        }
        tracing::info!(actors = ?registry.identities(), "All actors logged on");
        Ok(registry)
    }

    /// Attach handlers to a logged-on actor; a kind registered again replaces
    /// its earlier handler.
    pub fn register_observers(&self, actor: &Actor, observers: ObserverTable) {
        actor.register_observers(observers);
    }

    /// Run `steps` in order, threading the state through. The first failure
    /// skips every remaining step and is returned with its cause intact.
    pub async fn run_steps(
        &self,
        registry: Arc<ActorRegistry>,
        initial: ScenarioState,
        steps: &[ScenarioStep],
    ) -> Result<ScenarioState, HarnessError> {
        {
            let mut pipeline = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
            if *pipeline != PipelineState::Idle {
                return Err(HarnessError::PipelineFinished);
            }
            if steps.is_empty() {
                *pipeline = PipelineState::Completed;
                return Ok(initial);
            }
            *pipeline = PipelineState::Running {
                index: 0,
                step: steps[0].name.clone(),
            };
        }

        let mut state = initial;
        for (index, step) in steps.iter().enumerate() {
            self.set_pipeline_state(PipelineState::Running {
                index,
                step: step.name.clone(),
            });
            tracing::info!(step = %step.name, index, total = steps.len(), "Running step");

            let started = Instant::now();
            let outcome = self.run_step(step, Arc::clone(&registry), state).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(next) => {
                    metrics::record_step("success", elapsed);
                    tracing::info!(
                        step = %step.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        keys = ?next.keys().collect::<Vec<_>>(),
                        "Step complete"
                    );
                    state = next;
                }
                Err(e) => {
                    let result = match e {
                        HarnessError::StepTimeout { .. } => "timeout",
                        _ => "failure",
                    };
                    metrics::record_step(result, elapsed);
                    tracing::error!(step = %step.name, error = %e, "Step failed, skipping remaining steps");
                    self.set_pipeline_state(PipelineState::Failed {
                        index,
                        step: step.name.clone(),
                    });
                    return Err(e);
                }
            }
        }

        self.set_pipeline_state(PipelineState::Completed);
        tracing::info!(steps = steps.len(), "Scenario completed");
        Ok(state)
    }

    async fn run_step(
        &self,
        step: &ScenarioStep,
        registry: Arc<ActorRegistry>,
        state: ScenarioState,
    ) -> Result<ScenarioState, HarnessError> {
        let work = (step.run)(registry, state);
        let result = match self.config.step_timeout {
            Some(after) => match tokio::time::timeout(after, work).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(HarnessError::StepTimeout {
                        step: step.name.clone(),
                        after,
                    })
                }
            },
            None => work.await,
        };
        result.map_err(|source| HarnessError::Step {
            step: step.name.clone(),
            source,
        })
    }

    /// Log on, run the pipeline from an empty state, then log everyone out
    pub async fn run(
        &self,
        configs: &[ActorConfig],
        steps: &[ScenarioStep],
    ) -> Result<ScenarioState, HarnessError> {
        let registry = Arc::new(self.logon_all(configs).await?);
        let state = self
            .run_steps(Arc::clone(&registry), ScenarioState::new(), steps)
            .await?;
        registry.shutdown().await;
        Ok(state)
    }
}

/// Error chain plus backtrace, when one was captured
pub fn describe_failure(cause: &anyhow::Error) -> String {
    let mut description = format!("{:#}", cause);
    let backtrace = cause.backtrace();
    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        description.push_str("\n\nBacktrace:\n");
        description.push_str(&backtrace.to_string());
    }
    description
}

/// Log the failure and end the process with a non-zero status
pub fn terminate(cause: &anyhow::Error) -> ! {
    let step = cause
        .downcast_ref::<HarnessError>()
        .and_then(|e| e.step_name())
        .unwrap_or("-");
    tracing::error!(step, error = %describe_failure(cause), "Scenario failed");
    std::process::exit(1)
}
