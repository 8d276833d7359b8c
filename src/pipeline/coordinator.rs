//! Pipeline coordinator - drives one run through every stage
//!
//! The run advances one stage per step:
//! Decomposing → Classifying → Executing → Aggregating → Done.
//! Stepping is bounded by a step budget and an overall deadline, so a run
//! always ends in `Done` or `Failed`.

use super::{
    Aggregator, ExecutionResult, PipelineError, PipelineRun, Query, RunState, SubQuery,
    TerminationDetector, TraceMessage, TraceRole,
};
use crate::analysis::{Classifier, Decomposer, Decomposition, LlmAnalyzer};
use crate::config::{Config, PipelineConfig};
use crate::executor::{ExecutionError, TaskExecutor};
use crate::llm;
use crate::routing::RouteTable;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Concurrency and liveness bounds for a run
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    pub max_concurrency: usize,
    pub max_sub_queries: usize,
    pub max_steps: usize,
    pub run_timeout: Duration,
    pub analysis_timeout: Duration,
}

impl From<&PipelineConfig> for PipelineLimits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            max_sub_queries: config.max_sub_queries,
            max_steps: config.max_steps,
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            analysis_timeout: Duration::from_secs(config.analysis_timeout_secs),
        }
    }
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

pub struct PipelineCoordinator {
    decomposer: Arc<dyn Decomposer>,
    classifier: Option<Arc<dyn Classifier>>,
    executor: Arc<TaskExecutor>,
    aggregator: Aggregator,
    termination: TerminationDetector,
    limits: PipelineLimits,
}

impl PipelineCoordinator {
    pub fn new(decomposer: Arc<dyn Decomposer>, executor: Arc<TaskExecutor>) -> Self {
        let limits = PipelineLimits::default();
        Self {
            decomposer,
            classifier: None,
            executor,
            aggregator: Aggregator::new(),
            termination: TerminationDetector::new(limits.max_steps),
            limits,
        }
    }

    /// Wire routes, executor and the language-model analyzer from configuration.
    /// Fails if any category lacks a route or the limits cannot complete a run.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().context("Invalid pipeline configuration")?;
        let routes = Arc::new(
            RouteTable::from_config(&config.model_routes).context("Invalid route configuration")?,
        );
        let executor = Arc::new(TaskExecutor::new(routes, &config.executor)?);

        let provider: Arc<dyn llm::LlmProvider> = Arc::from(llm::create_provider(&config.llm)?);
        let analyzer = Arc::new(
            LlmAnalyzer::new(provider).with_combined(config.pipeline.combined_analysis),
        );

        let mut coordinator = Self::new(analyzer.clone(), executor)
            .with_limits(PipelineLimits::from(&config.pipeline));
        if !config.pipeline.combined_analysis {
            coordinator = coordinator.with_classifier(analyzer);
        }
        Ok(coordinator)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_limits(mut self, limits: PipelineLimits) -> Self {
        self.termination = TerminationDetector::new(limits.max_steps);
        self.limits = limits;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        self.executor.routes()
    }

    /// Run one query to completion. Never fails outward: run-level errors are
    /// recorded on the returned run with `state == Failed`.
    pub async fn run(&self, query: Query) -> PipelineRun {
        let mut run = PipelineRun::new(query);
        tracing::info!(run_id = %run.id, "Starting pipeline run");

        let deadline = tokio::time::Instant::now() + self.limits.run_timeout;
        loop {
            if run.state.is_terminal() || self.termination.should_stop(&run.trace, run.steps) {
                break;
            }
            run.steps += 1;
            // Execution bounds itself so finished sub-queries survive the deadline
            let outcome = if run.state == RunState::Executing {
                Ok(self.step(&mut run, deadline).await)
            } else {
                tokio::time::timeout_at(deadline, self.step(&mut run, deadline)).await
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => run.fail(e),
                Err(_) => run.fail(PipelineError::Deadline(self.limits.run_timeout)),
            }
        }

        if !run.state.is_terminal() {
            run.fail(PipelineError::StepBudgetExceeded(self.termination.max_steps()));
        }

        tracing::info!(
            run_id = %run.id,
            state = ?run.state,
            sub_queries = run.sub_queries.len(),
            failures = run.results.iter().filter(|r| !r.is_success()).count(),
            "Pipeline run finished"
        );
        run
    }

    async fn step(
        &self,
        run: &mut PipelineRun,
        deadline: tokio::time::Instant,
    ) -> Result<(), PipelineError> {
        match run.state {
            RunState::Decomposing => self.decompose(run).await,
            RunState::Classifying => self.classify(run).await,
            RunState::Executing => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(PipelineError::Deadline(self.limits.run_timeout));
                }
                run.results = self.execute_all(&run.sub_queries, deadline).await?;
                run.push_trace(TraceRole::Executor, describe_results(&run.results));
                run.advance(RunState::Aggregating)
            }
            RunState::Aggregating => {
                let answer = self.aggregator.aggregate(&run.results);
                let message = TraceMessage::new(TraceRole::Aggregator, answer.clone());
                if !self.termination.is_terminal(&message) {
                    return Err(PipelineError::Invariant(
                        "aggregated answer is missing the completion sentinel".to_string(),
                    ));
                }
                run.trace.push(message);
                run.final_answer = Some(answer);
                run.advance(RunState::Done)
            }
            RunState::Done | RunState::Failed => Ok(()),
        }
    }

    async fn decompose(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        run.push_trace(TraceRole::User, format!("User query: {}", run.query));

        let timeout = self.limits.analysis_timeout;
        let decomposition = tokio::time::timeout(timeout, self.decomposer.decompose(&run.query))
            .await
            .map_err(|_| crate::analysis::AdapterError::Timeout(timeout))??;

        if decomposition.is_empty() {
            return Err(crate::analysis::AdapterError::Empty.into());
        }
        if decomposition.len() > self.limits.max_sub_queries {
            return Err(PipelineError::TooManySubQueries {
                count: decomposition.len(),
                limit: self.limits.max_sub_queries,
            });
        }

        tracing::info!(
            run_id = %run.id,
            decomposer = self.decomposer.name(),
            sub_queries = decomposition.len(),
            "Query decomposed"
        );
        let listing = decomposition
            .texts()
            .iter()
            .map(|t| format!("query:{}", t))
            .collect::<Vec<_>>()
            .join("\n");
        run.push_trace(TraceRole::Decomposer, listing);
        run.decomposition = Some(decomposition);
        run.advance(RunState::Classifying)
    }

    async fn classify(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        let decomposition = run.decomposition.take().ok_or_else(|| {
            PipelineError::Invariant("classification reached without a decomposition".to_string())
        })?;

        let sub_queries = match decomposition {
            Decomposition::Classified(sub_queries) => sub_queries,
            Decomposition::Unclassified(texts) => {
                let classifier = self
                    .classifier
                    .as_ref()
                    .ok_or(PipelineError::MissingClassifier)?;
                let timeout = self.limits.analysis_timeout;
                let classified = tokio::time::timeout(timeout, classifier.classify(&texts))
                    .await
                    .map_err(|_| crate::analysis::AdapterError::Timeout(timeout))??;
                if classified.len() != texts.len() {
                    return Err(crate::analysis::AdapterError::Mismatch {
                        expected: texts.len(),
                        got: classified.len(),
                    }
                    .into());
                }
                classified
            }
        };

        let listing = sub_queries
            .iter()
            .map(|sq| format!("category:{}, query:{}", sq.category, sq.text))
            .collect::<Vec<_>>()
            .join("\n");
        run.push_trace(TraceRole::Classifier, listing);
        run.sub_queries = sub_queries;
        run.advance(RunState::Executing)
    }

    /// Fan out one task per sub-query and join them all. Results are slotted
    /// by sub-query index; a failure never cancels its siblings. Tasks still
    /// running at `deadline` are aborted and recorded as timeouts.
    async fn execute_all(
        &self,
        sub_queries: &[SubQuery],
        deadline: tokio::time::Instant,
    ) -> Result<Vec<ExecutionResult>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let mut tasks = Vec::with_capacity(sub_queries.len());

        for (index, sub_query) in sub_queries.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let executor = self.executor.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, executor.execute(sub_query).await)
            }));
        }

        let mut slots: Vec<Option<ExecutionResult>> = vec![None; sub_queries.len()];
        let mut tasks = tasks.into_iter().enumerate();
        while let Some((index, mut task)) = tasks.next() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok((slot, result))) => slots[slot] = Some(result),
                Ok(Err(e)) => {
                    for (_, pending) in tasks.by_ref() {
                        pending.abort();
                    }
                    return Err(PipelineError::Invariant(format!(
                        "sub-query task failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    task.abort();
                    tracing::warn!(
                        category = %sub_queries[index].category,
                        "Sub-query still pending at the run deadline"
                    );
                    slots[index] = Some(ExecutionResult::failure(
                        sub_queries[index].clone(),
                        ExecutionError::Transport {
                            detail: format!(
                                "no response before the run deadline ({:?})",
                                self.limits.run_timeout
                            ),
                            timeout: true,
                        },
                    ));
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    PipelineError::Invariant(format!("no result for sub-query {}", index))
                })
            })
            .collect()
    }
}

fn describe_results(results: &[ExecutionResult]) -> String {
    results
        .iter()
        .map(|r| match &r.outcome {
            Ok(payload) => format!("[{}] {}", r.sub_query.category, payload),
            Err(error) => format!("[{}] error: {}", r.sub_query.category, error),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
