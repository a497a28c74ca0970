//! Directory-level driver: trace discovery, the worker pool, cancellation and
//! batch reports for both processing and evaluation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use crossbeam::channel;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::PipelineConfig;
use crate::csv_io::{self, CsvSchema, FILTERED_SUFFIX, FORECAST_SUFFIX};
use crate::error::{PoseError, Result, TraceFailure};
use crate::metrics::{ErrorEvaluator, TraceErrors, TraceSummary};
use crate::pairing::{pair_traces, TracePair};
use crate::retry::RetryPolicy;
use crate::trajectory::{ForecastOutput, TrajectoryProcessor};

/// Regular files in `dir` whose name ends with `suffix`, sorted by file name.
pub fn discover_traces(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PoseError::io(dir, e))? {
        let entry = entry.map_err(|e| PoseError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(suffix) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Input traces: every `.csv` in `dir` except files this crate wrote.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = discover_traces(dir, ".csv")?;
    files.retain(|path| !is_derived_output(path));
    Ok(files)
}

fn is_derived_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.ends_with(FILTERED_SUFFIX) || stem.ends_with(FORECAST_SUFFIX))
        .unwrap_or(false)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Files written for one successfully processed trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceOutcome {
    pub input: PathBuf,
    pub filtered: PathBuf,
    pub forecast: PathBuf,
    pub rows: usize,
    pub forecast_rows: usize,
}

/// Result of one `process_directory` run
#[derive(Debug)]
pub struct BatchReport {
    /// RFC 3339, UTC
    pub generated_at: String,
    pub processed: Vec<TraceOutcome>,
    pub failures: Vec<TraceFailure>,
    /// Traces that were never started
    pub skipped: Vec<PathBuf>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn to_json(&self) -> Value {
        json!({
            "generated_at": self.generated_at,
            "processed": self.processed,
            "failures": self.failures.iter().map(failure_json).collect::<Vec<_>>(),
            "skipped": self.skipped,
            "cancelled": self.cancelled,
        })
    }
}

fn failure_json(failure: &TraceFailure) -> Value {
    json!({
        "path": failure.path,
        "row": failure.row,
        "kind": failure.error.kind(),
        "message": failure.error.to_string(),
    })
}

/// Runs every trace of a directory through its own `TrajectoryProcessor` run
#[derive(Clone, Debug)]
pub struct TraceAggregator {
    processor: TrajectoryProcessor,
    retry: RetryPolicy,
    workers: usize,
    abort_on_first_failure: bool,
}

impl TraceAggregator {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            processor: TrajectoryProcessor::new(config)?,
            retry: RetryPolicy::new(config.io_retries),
            workers: config.workers,
            abort_on_first_failure: config.abort_on_first_failure,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read, filter and forecast one trace, then write both outputs.
    pub fn process_trace(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> std::result::Result<TraceOutcome, TraceFailure> {
        let poses = self.retry.run(&format!("read {}", input.display()), || {
            csv_io::read_trace(input, CsvSchema::Trace)
        })?;
        let processed = self
            .processor
            .process(&poses)
            .map_err(|e| e.in_trace(input))?;

        let filtered = csv_io::filtered_path(output_dir, input);
        let forecast = csv_io::forecast_path(output_dir, input);
        self.retry
            .run(&format!("write {}", filtered.display()), || {
                csv_io::write_trace(&filtered, CsvSchema::Trace, &processed.filtered)
            })
            .map_err(|e| e.in_trace(input, None))?;
        self.retry
            .run(&format!("write {}", forecast.display()), || {
                csv_io::write_trace(
                    &forecast,
                    CsvSchema::Forecast,
                    processed.forecasts.rows(),
                )
            })
            .map_err(|e| e.in_trace(input, None))?;

        Ok(TraceOutcome {
            input: input.to_path_buf(),
            filtered,
            forecast,
            rows: processed.filtered.len(),
            forecast_rows: processed.forecasts.rows().len(),
        })
    }

    /// Process every input trace of `input_dir` into `output_dir`.
    ///
    /// One trace failing never affects the others unless
    /// `abort_on_first_failure` is set, in which case no further traces are
    /// started and the first failure (in file-name order) is returned.
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        cancel: &AtomicBool,
    ) -> std::result::Result<BatchReport, TraceFailure> {
        let files = discover_inputs(input_dir)
            .map_err(|e| e.in_trace(input_dir, None))?;
        fs::create_dir_all(output_dir)
            .map_err(|e| PoseError::io(output_dir, e).in_trace(output_dir, None))?;
        info!(
            "Processing {} trace(s) from {} with {} worker(s)",
            files.len(),
            input_dir.display(),
            self.workers.min(files.len()).max(1)
        );

        let mut results = if self.workers > 1 && files.len() > 1 {
            self.run_parallel(&files, output_dir, cancel)
        } else {
            self.run_sequential(&files, output_dir, cancel)
        };
        results.sort_by_key(|(index, _)| *index);

        let mut started = vec![false; files.len()];
        let mut processed = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in results {
            started[index] = true;
            match result {
                Ok(outcome) => processed.push(outcome),
                Err(failure) => failures.push(failure),
            }
        }
        let skipped: Vec<PathBuf> = files
            .iter()
            .zip(&started)
            .filter(|(_, started)| !**started)
            .map(|(path, _)| path.clone())
            .collect();

        if self.abort_on_first_failure && !failures.is_empty() {
            return Err(failures.swap_remove(0));
        }

        let cancelled = !skipped.is_empty() && cancel.load(Ordering::SeqCst);
        if cancelled {
            warn!("Cancelled with {} trace(s) not started", skipped.len());
        }
        info!(
            "Batch done: {} processed, {} failed",
            processed.len(),
            failures.len()
        );

        Ok(BatchReport {
            generated_at: timestamp(),
            processed,
            failures,
            skipped,
            cancelled,
        })
    }

    fn run_one(
        &self,
        index: usize,
        total: usize,
        input: &Path,
        output_dir: &Path,
    ) -> std::result::Result<TraceOutcome, TraceFailure> {
        let result = self.process_trace(input, output_dir);
        match &result {
            Ok(outcome) => info!(
                "[{}/{}] {}: {} rows, {} forecast rows",
                index + 1,
                total,
                input.display(),
                outcome.rows,
                outcome.forecast_rows
            ),
            Err(failure) => warn!("[{}/{}] failed: {}", index + 1, total, failure),
        }
        result
    }

    fn run_sequential(
        &self,
        files: &[PathBuf],
        output_dir: &Path,
        cancel: &AtomicBool,
    ) -> Vec<(usize, std::result::Result<TraceOutcome, TraceFailure>)> {
        let mut results = Vec::with_capacity(files.len());
        for (index, input) in files.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let result = self.run_one(index, files.len(), input, output_dir);
            let failed = result.is_err();
            results.push((index, result));
            if failed && self.abort_on_first_failure {
                break;
            }
        }
        results
    }

    fn run_parallel(
        &self,
        files: &[PathBuf],
        output_dir: &Path,
        cancel: &AtomicBool,
    ) -> Vec<(usize, std::result::Result<TraceOutcome, TraceFailure>)> {
        let (job_tx, job_rx) = channel::unbounded::<usize>();
        for index in 0..files.len() {
            // receiver is alive until the end of this function
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        let (result_tx, result_rx) = channel::unbounded();
        let aborted = AtomicBool::new(false);
        let workers = self.workers.min(files.len());

        let scoped = crossbeam::scope(|scope| {
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let aborted = &aborted;
                scope.spawn(move |_| {
                    let mut done = 0usize;
                    for index in job_rx.iter() {
                        if cancel.load(Ordering::SeqCst) || aborted.load(Ordering::SeqCst) {
                            break;
                        }
                        let result = self.run_one(index, files.len(), &files[index], output_dir);
                        if result.is_err() && self.abort_on_first_failure {
                            aborted.store(true, Ordering::SeqCst);
                        }
                        done += 1;
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                    debug!("worker {worker} finished after {done} trace(s)");
                });
            }
        });
        drop(result_tx);
        if let Err(panic) = scoped {
            std::panic::resume_unwind(panic);
        }
        result_rx.iter().collect()
    }
}

/// Process a directory with a fresh aggregator built from `config`.
pub fn process_directory(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    cancel: Arc<AtomicBool>,
) -> std::result::Result<BatchReport, TraceFailure> {
    let aggregator = TraceAggregator::new(config)
        .map_err(|e| e.in_trace(input_dir, None))?;
    aggregator.process_directory(input_dir, output_dir, &cancel)
}

/// Which output of the processor is scored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    /// `<id>_future_predictions.csv`, compared at the evaluator's lead
    Forecast,
    /// `<id>_filtered.csv`, compared row for row
    Filtered,
}

impl PredictionKind {
    pub fn file_suffix(self) -> String {
        match self {
            PredictionKind::Forecast => format!("{FORECAST_SUFFIX}.csv"),
            PredictionKind::Filtered => format!("{FILTERED_SUFFIX}.csv"),
        }
    }
}

/// Per-trace errors of one evaluation run
#[derive(Debug)]
pub struct EvaluationReport {
    pub generated_at: String,
    pub traces: Vec<TraceErrors>,
    pub failures: Vec<TraceFailure>,
}

impl EvaluationReport {
    pub fn summaries(&self) -> Vec<TraceSummary> {
        self.traces.iter().map(TraceErrors::summary).collect()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "generated_at": self.generated_at,
            "traces": self.summaries(),
            "failures": self.failures.iter().map(failure_json).collect::<Vec<_>>(),
        })
    }
}

/// Pairs ground truth with processor output and scores each pair
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub evaluator: ErrorEvaluator,
    pub kind: PredictionKind,
    /// Forecast rows per ground-truth row (ignored for filtered output)
    pub rows_per_timestep: usize,
    pub retry: RetryPolicy,
}

impl Evaluation {
    pub fn new(
        evaluator: ErrorEvaluator,
        kind: PredictionKind,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            evaluator,
            kind,
            rows_per_timestep: config.rows_per_timestep()?,
            retry: RetryPolicy::new(config.io_retries),
        })
    }

    /// Score one pair.
    pub fn evaluate_pair(
        &self,
        pair: &TracePair,
    ) -> std::result::Result<TraceErrors, TraceFailure> {
        let truth = self.retry.run(&format!("read {}", pair.truth.display()), || {
            csv_io::read_trace(&pair.truth, CsvSchema::Trace)
        })?;
        let schema = match self.kind {
            PredictionKind::Forecast => CsvSchema::Forecast,
            PredictionKind::Filtered => CsvSchema::Trace,
        };
        let predicted = self.retry.run(&format!("read {}", pair.predicted.display()), || {
            csv_io::read_trace(&pair.predicted, schema)
        })?;

        let records = match self.kind {
            PredictionKind::Filtered => self.evaluator.evaluate_filtered(&truth, &predicted),
            PredictionKind::Forecast => {
                let expected = self.rows_per_timestep * truth.len();
                if predicted.len() != expected {
                    return Err(PoseError::PairingMismatch(format!(
                        "{} forecast rows, expected {} ({} per ground-truth row)",
                        predicted.len(),
                        expected,
                        self.rows_per_timestep
                    ))
                    .in_trace(&pair.predicted, None));
                }
                ForecastOutput::from_rows(self.rows_per_timestep, predicted)
                    .and_then(|forecast| self.evaluator.evaluate_forecast(&truth, &forecast))
            }
        }
        .map_err(|e| e.in_trace(&pair.predicted, None))?;

        debug!("{}: {} scored rows", pair.trace_id, records.len());
        Ok(TraceErrors::from_records(&pair.trace_id, &records))
    }

    /// Pair every ground-truth trace with its output and score it.
    ///
    /// A pairing problem fails the whole run; a trace that cannot be scored
    /// is reported and the rest continue.
    pub fn evaluate_directories(
        &self,
        truth_dir: &Path,
        predicted_dir: &Path,
        cancel: &AtomicBool,
    ) -> Result<EvaluationReport> {
        let truth_files = discover_inputs(truth_dir)?;
        let predicted_files = discover_traces(predicted_dir, &self.kind.file_suffix())?;
        let pairs = pair_traces(&truth_files, &predicted_files)?;
        info!("Evaluating {} trace pair(s)", pairs.len());

        let mut traces = Vec::with_capacity(pairs.len());
        let mut failures = Vec::new();
        for pair in &pairs {
            if cancel.load(Ordering::SeqCst) {
                warn!(
                    "Evaluation cancelled after {} trace(s)",
                    traces.len() + failures.len()
                );
                break;
            }
            match self.evaluate_pair(pair) {
                Ok(errors) => traces.push(errors),
                Err(failure) => {
                    warn!("{}: {}", pair.trace_id, failure);
                    failures.push(failure);
                }
            }
        }

        Ok(EvaluationReport {
            generated_at: timestamp(),
            traces,
            failures,
        })
    }
}
