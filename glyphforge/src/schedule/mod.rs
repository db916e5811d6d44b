//! Task scheduling and streaming parallel execution.
//!
//! The scheduler allocates exact per-spec quotas, emits an interleaved task
//! stream, and drives chunks of tasks through a rayon worker pool. Workers
//! plan and execute; a separate I/O pool saves results in batches. Outputs
//! are keyed by image index, so on-disk results are invariant under worker
//! count and completion order.

pub mod checkpoint;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::{BatchConfig, BatchSpec, ConfigReport, ResourceRoots, validate_config};
use crate::corpus::CorpusReader;
use crate::execute::{GenerationOutput, generate_from_plan};
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::foundation::math::{derive_image_seed, derive_stream_seed};
use crate::health::ResourceHealthTracker;
use crate::label::GenerationRecord;
use crate::plan::{Plan, build_plan};
use crate::shape::FontSource;

pub use checkpoint::{CHECKPOINT_FILENAME, CheckpointManager};

pub const FONT_HEALTH_FILENAME: &str = "font_health.state";
pub const BACKGROUND_SCORES_FILENAME: &str = "background_scores.state";

/// Runtime knobs for one generation run.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub generation_workers: usize,
    pub io_workers: usize,
    pub chunk_size: usize,
    pub io_batch_size: usize,
    pub retry_budget: u32,
    pub resume: bool,
    pub persist_health: bool,
    pub time_budget: Option<Duration>,
    pub seed_override: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            generation_workers: 4,
            io_workers: 2,
            chunk_size: 100,
            io_batch_size: 16,
            retry_budget: 3,
            resume: false,
            persist_health: false,
            time_budget: None,
            seed_override: None,
        }
    }
}

/// One skipped index and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedTask {
    pub index: u64,
    pub spec: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecProgress {
    pub name: String,
    pub target: u64,
    pub generated: u64,
}

/// End-of-run report.
#[derive(Clone, Debug, Default)]
pub struct GenerationSummary {
    pub total_target: u64,
    pub generated: u64,
    /// Indices found complete in the checkpoint when resuming.
    pub already_completed: u64,
    pub skipped: Vec<SkippedTask>,
    pub cancelled: bool,
    pub per_spec: Vec<SpecProgress>,
}

struct SpecRuntime {
    spec: BatchSpec,
    fonts: Vec<(String, f64)>,
    backgrounds: Vec<(String, f64)>,
    corpus: CorpusReader,
    remaining: u64,
    target: u64,
    generated: u64,
}

struct Task {
    index: u64,
    spec_idx: usize,
    text: String,
    font: PathBuf,
    background: Option<PathBuf>,
}

enum TaskOutcome {
    Done(Box<(Plan, GenerationOutput)>),
    Skipped(String),
}

/// Validate, schedule, and generate the whole batch.
pub fn run_generation(
    config: &BatchConfig,
    roots: ResourceRoots<'_>,
    output_dir: &Path,
    fonts: Arc<dyn FontSource>,
    options: &GenerationOptions,
    cancel: &AtomicBool,
) -> Result<GenerationSummary, RunError> {
    validate_config(config, roots).map_err(RunError::Config)?;
    std::fs::create_dir_all(output_dir).map_err(|e| RunError::Fatal(e.into()))?;

    let master_seed = options
        .seed_override
        .or(config.seed)
        .unwrap_or(0);

    let mut specs = build_spec_runtimes(config, roots).map_err(RunError::Fatal)?;

    let font_health = Arc::new(Mutex::new(ResourceHealthTracker::default()));
    let background_health = Arc::new(Mutex::new(ResourceHealthTracker::default()));
    if options.persist_health {
        restore_health(&font_health, &output_dir.join(FONT_HEALTH_FILENAME));
        restore_health(
            &background_health,
            &output_dir.join(BACKGROUND_SCORES_FILENAME),
        );
    }

    let mut ckpt = CheckpointManager::new(output_dir, config);
    if options.resume {
        ckpt.load().map_err(RunError::Fatal)?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.generation_workers.max(1))
        .build()
        .map_err(|e| {
            RunError::Fatal(ForgeError::invariant(format!("worker pool: {e}")))
        })?;

    let started = Instant::now();
    let mut summary = GenerationSummary {
        total_target: config.total_images,
        ..Default::default()
    };

    let ctx = WorkerContext {
        fonts: fonts.clone(),
        font_health: font_health.clone(),
        background_health: background_health.clone(),
        master_seed,
        retry_budget: options.retry_budget,
    };

    let mut next_index = 0u64;
    let chunk_size = options.chunk_size.max(1);

    while next_index < config.total_images {
        if cancel.load(Ordering::Relaxed) {
            summary.cancelled = true;
            break;
        }
        if let Some(budget) = options.time_budget {
            if started.elapsed() >= budget {
                tracing::warn!("wall-clock budget exhausted, stopping submission");
                summary.cancelled = true;
                break;
            }
        }

        // Serial task building keeps corpus cursors and indices deterministic.
        let mut chunk = Vec::with_capacity(chunk_size);
        while chunk.len() < chunk_size && next_index < config.total_images {
            let index = next_index;
            next_index += 1;

            if options.resume && ckpt.is_completed(index) {
                summary.already_completed += 1;
                continue;
            }
            match build_task(index, &mut specs, master_seed, &font_health) {
                Ok(Some(task)) => chunk.push(task),
                Ok(None) => break, // every spec exhausted
                Err((spec_name, reason)) => {
                    tracing::warn!(index, spec = %spec_name, %reason, "task skipped");
                    summary.skipped.push(SkippedTask {
                        index,
                        spec: spec_name,
                        reason,
                    });
                }
            }
        }
        if chunk.is_empty() {
            continue;
        }

        // Workers plan and execute; results come back in index order.
        let results: Vec<(u64, usize, TaskOutcome)> = pool.install(|| {
            chunk
                .par_iter()
                .map(|task| {
                    let spec = &specs[task.spec_idx].spec;
                    (task.index, task.spec_idx, run_task(task, spec, &ctx))
                })
                .collect()
        });

        let mut to_write: Vec<(u64, Box<(Plan, GenerationOutput)>)> = Vec::new();
        for (index, spec_idx, outcome) in results {
            match outcome {
                TaskOutcome::Done(done) => {
                    specs[spec_idx].generated += 1;
                    to_write.push((index, done));
                }
                TaskOutcome::Skipped(reason) => {
                    tracing::warn!(index, spec = %specs[spec_idx].spec.name, %reason, "task skipped");
                    summary.skipped.push(SkippedTask {
                        index,
                        spec: specs[spec_idx].spec.name.clone(),
                        reason,
                    });
                }
            }
        }

        write_chunk(
            output_dir,
            &to_write,
            options.io_workers.max(1),
            options.io_batch_size.max(1),
        )
        .map_err(RunError::Fatal)?;

        for (index, _) in &to_write {
            ckpt.mark_completed(*index);
        }
        summary.generated += to_write.len() as u64;
        ckpt.flush().map_err(RunError::Fatal)?;
    }

    // Final checkpoint flush covers the cancellation path.
    ckpt.flush().map_err(RunError::Fatal)?;

    if options.persist_health {
        persist_health(&font_health, &output_dir.join(FONT_HEALTH_FILENAME));
        persist_health(
            &background_health,
            &output_dir.join(BACKGROUND_SCORES_FILENAME),
        );
    }

    summary.per_spec = specs
        .iter()
        .map(|s| SpecProgress {
            name: s.spec.name.clone(),
            target: s.target,
            generated: s.generated,
        })
        .collect();

    log_summary(&summary, &font_health);
    Ok(summary)
}

/// Errors leaving `run_generation`, separated so the CLI can map exit codes.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigReport),
    Fatal(ForgeError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(report) => write!(f, "{report}"),
            RunError::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {}

struct WorkerContext {
    fonts: Arc<dyn FontSource>,
    font_health: Arc<Mutex<ResourceHealthTracker>>,
    background_health: Arc<Mutex<ResourceHealthTracker>>,
    master_seed: u64,
    retry_budget: u32,
}

/// Plan + execute one task, retrying with a fresh font on retryable errors.
fn run_task(task: &Task, spec: &BatchSpec, ctx: &WorkerContext) -> TaskOutcome {
    let image_seed = derive_image_seed(ctx.master_seed, task.index, &spec.name);
    let mut font = task.font.clone();
    let mut background = task.background.clone();
    let mut attempts = 0u32;

    loop {
        let result = attempt_task(task, spec, ctx, &font, background.clone());
        match result {
            Ok(done) => {
                if let Ok(mut h) = ctx.font_health.lock() {
                    h.record_success(&font.to_string_lossy());
                }
                if let Some(e) = &done.1.background_error {
                    record_background_failure(ctx, e);
                }
                return TaskOutcome::Done(done);
            }
            Err(e) => {
                penalize(ctx, &e);
                if !e.is_retryable() || attempts >= ctx.retry_budget {
                    return TaskOutcome::Skipped(e.to_string());
                }
                attempts += 1;

                if e.implicated_background().is_some() {
                    background = None;
                } else {
                    // Fresh font, steered away from whatever just failed.
                    let mut rng = StdRng::seed_from_u64(
                        derive_stream_seed(image_seed, "retry").wrapping_add(u64::from(attempts)),
                    );
                    let selected = ctx.font_health.lock().ok().and_then(|mut h| {
                        h.select(&font_candidates(spec, &font), &mut rng).ok()
                    });
                    match selected {
                        Some(path) => font = PathBuf::from(path),
                        None => return TaskOutcome::Skipped(e.to_string()),
                    }
                }
            }
        }
    }
}

fn attempt_task(
    task: &Task,
    spec: &BatchSpec,
    ctx: &WorkerContext,
    font: &Path,
    background: Option<PathBuf>,
) -> ForgeResult<Box<(Plan, GenerationOutput)>> {
    let engine = ctx.fonts.open(font)?;
    let plan = build_plan(
        spec,
        &task.text,
        font,
        task.index,
        ctx.master_seed,
        engine.as_ref(),
        background,
    )?;
    let output = generate_from_plan(&plan, ctx.fonts.as_ref())?;
    Ok(Box::new((plan, output)))
}

fn font_candidates(spec: &BatchSpec, exclude: &Path) -> Vec<(String, f64)> {
    // Candidate weights are recomputed from the selector; the failed font is
    // left in (its score just dropped) unless others exist.
    let exclude = exclude.to_string_lossy();
    let mut all: Vec<(String, f64)> = Vec::new();
    if let Ok(files) = crate::config::resolve_glob(&spec.fonts.pattern) {
        for f in files {
            all.push((
                f.to_string_lossy().into_owned(),
                crate::config::selector_weight(&f, &spec.fonts.weights),
            ));
        }
    }
    if all.len() > 1 {
        all.retain(|(p, _)| p.as_str() != exclude);
    }
    all
}

fn penalize(ctx: &WorkerContext, e: &ForgeError) {
    if let Some(font) = e.implicated_font() {
        if let Ok(mut h) = ctx.font_health.lock() {
            h.record_failure(font, e.kind());
        }
    }
    if let Some(bg) = e.implicated_background() {
        if let Ok(mut h) = ctx.background_health.lock() {
            h.record_failure(bg, e.kind());
        }
    }
}

/// Translate a `BackgroundTooSmall` observed during composition into health
/// bookkeeping. The task itself succeeded on the solid fallback, so this
/// never retries or skips.
fn record_background_failure(ctx: &WorkerContext, e: &ForgeError) {
    let Some(bg) = e.implicated_background() else {
        return;
    };
    if let Ok(mut h) = ctx.background_health.lock() {
        h.record_failure(bg, e.kind());
        if matches!(e, ForgeError::BackgroundTooSmall { severe: false, .. }) {
            // Canvas-only shortfalls earn half the usual penalty back.
            for _ in 0..5 {
                h.record_success(bg);
            }
        }
    }
}

/// Exact integer quotas by largest remainder; sums to `total`.
pub(crate) fn allocate_quotas(total: u64, specs: &[BatchSpec]) -> Vec<u64> {
    let mut quotas: Vec<u64> = Vec::with_capacity(specs.len());
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(specs.len());
    let mut assigned = 0u64;

    for (i, spec) in specs.iter().enumerate() {
        let exact = spec.proportion * total as f64;
        let floor = exact.floor() as u64;
        quotas.push(floor);
        assigned += floor;
        remainders.push((i, exact - floor as f64));
    }

    let mut leftover = total.saturating_sub(assigned);
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (i, _) in remainders {
        if leftover == 0 {
            break;
        }
        quotas[i] += 1;
        leftover -= 1;
    }
    quotas
}

fn build_spec_runtimes(
    config: &BatchConfig,
    roots: ResourceRoots<'_>,
) -> ForgeResult<Vec<SpecRuntime>> {
    let quotas = allocate_quotas(config.total_images, &config.specs);
    let mut out = Vec::with_capacity(config.specs.len());

    for (spec, quota) in config.specs.iter().zip(quotas) {
        let font_pattern = crate::config::anchored_pattern(roots.font_dir, &spec.fonts.pattern);
        let fonts: Vec<(String, f64)> = crate::config::resolve_glob(&font_pattern)?
            .into_iter()
            .map(|f| {
                let w = crate::config::selector_weight(&f, &spec.fonts.weights);
                (f.to_string_lossy().into_owned(), w)
            })
            .collect();
        if fonts.is_empty() {
            return Err(ForgeError::resource_missing(format!(
                "spec '{}': no fonts match '{font_pattern}'",
                spec.name
            )));
        }

        let backgrounds = match &spec.background {
            Some(selector) => {
                let pattern =
                    crate::config::anchored_pattern(roots.background_dir, &selector.pattern);
                crate::config::resolve_glob(&pattern)?
                    .into_iter()
                    .map(|f| {
                        let w = crate::config::selector_weight(&f, &selector.weights);
                        (f.to_string_lossy().into_owned(), w)
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        let corpus_pattern =
            crate::config::anchored_pattern(roots.corpus_dir, &spec.corpus.pattern);
        let corpus = CorpusReader::from_pattern(&corpus_pattern, &spec.corpus.weights)?;

        // An anchored clone keeps worker-side re-resolution consistent.
        let mut anchored = spec.clone();
        anchored.fonts.pattern = font_pattern;

        out.push(SpecRuntime {
            spec: anchored,
            fonts,
            backgrounds,
            corpus,
            remaining: quota,
            target: quota,
            generated: 0,
        });
    }
    Ok(out)
}

/// Build the task for `index`: round-robin spec selection, text extraction,
/// health-weighted font and background selection.
fn build_task(
    index: u64,
    specs: &mut [SpecRuntime],
    master_seed: u64,
    font_health: &Arc<Mutex<ResourceHealthTracker>>,
) -> Result<Option<Task>, (String, String)> {
    let n = specs.len();
    let start = (index as usize) % n;
    let spec_idx = (0..n)
        .map(|o| (start + o) % n)
        .find(|&i| specs[i].remaining > 0);
    let Some(spec_idx) = spec_idx else {
        return Ok(None);
    };

    let rt = &mut specs[spec_idx];
    rt.remaining -= 1;
    let spec_name = rt.spec.name.clone();

    let mut rng = StdRng::seed_from_u64(derive_stream_seed(
        derive_image_seed(master_seed, index, &spec_name),
        "task",
    ));

    let text = rt
        .corpus
        .extract_segment(
            rt.spec.min_text_length as usize,
            rt.spec.max_text_length as usize,
            &mut rng,
        )
        .map_err(|e| (spec_name.clone(), e.to_string()))?;

    let font = font_health
        .lock()
        .map_err(|_| (spec_name.clone(), "health mutex poisoned".to_owned()))?
        .select(&rt.fonts, &mut rng)
        .map_err(|e| (spec_name.clone(), e.to_string()))?;

    let background = if rt.backgrounds.is_empty() {
        None
    } else {
        use rand::Rng;
        let total: f64 = rt.backgrounds.iter().map(|(_, w)| w.max(0.0)).sum();
        let mut pick = rng.gen_range(0.0..total.max(1e-9));
        let mut chosen = rt.backgrounds.len() - 1;
        for (i, (_, w)) in rt.backgrounds.iter().enumerate() {
            pick -= w.max(0.0);
            if pick <= 0.0 {
                chosen = i;
                break;
            }
        }
        Some(PathBuf::from(rt.backgrounds[chosen].0.clone()))
    };

    Ok(Some(Task {
        index,
        spec_idx,
        text,
        font: PathBuf::from(font),
        background,
    }))
}

/// Save a chunk's results: images and labels, batched over the I/O pool.
fn write_chunk(
    output_dir: &Path,
    results: &[(u64, Box<(Plan, GenerationOutput)>)],
    io_workers: usize,
    io_batch_size: usize,
) -> ForgeResult<()> {
    if results.is_empty() {
        return Ok(());
    }

    let batches: Vec<&[(u64, Box<(Plan, GenerationOutput)>)]> =
        results.chunks(io_batch_size).collect();
    let errors: Mutex<Vec<ForgeError>> = Mutex::new(Vec::new());
    let next_batch = std::sync::atomic::AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..io_workers.min(batches.len()) {
            scope.spawn(|| {
                loop {
                    let b = next_batch.fetch_add(1, Ordering::Relaxed);
                    let Some(batch) = batches.get(b) else {
                        break;
                    };
                    for (index, done) in batch.iter() {
                        if let Err(e) = write_one(output_dir, *index, done) {
                            if let Ok(mut errs) = errors.lock() {
                                errs.push(e);
                            }
                            return;
                        }
                    }
                }
            });
        }
    });

    match errors.into_inner() {
        Ok(errs) if errs.is_empty() => Ok(()),
        Ok(mut errs) => Err(errs.remove(0)),
        Err(_) => Err(ForgeError::invariant("io error collection poisoned")),
    }
}

fn write_one(
    output_dir: &Path,
    index: u64,
    done: &(Plan, GenerationOutput),
) -> ForgeResult<()> {
    let (plan, output) = done;
    let image_path = output_dir.join(format!("image_{index:05}.png"));
    let label_path = output_dir.join(format!("image_{index:05}.json"));

    // Transient I/O errors get a short retry before becoming fatal.
    let mut last_err = None;
    for _ in 0..3 {
        match output.image.save(&image_path) {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(e) => last_err = Some(ForgeError::invariant(format!("png encode: {e}"))),
        }
    }
    if let Some(e) = last_err {
        return Err(e);
    }

    GenerationRecord::new(plan, output).write_to(&label_path)
}

fn restore_health(tracker: &Arc<Mutex<ResourceHealthTracker>>, path: &Path) {
    if !path.exists() {
        return;
    }
    let snapshot = std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    if let (Some(snap), Ok(mut t)) = (snapshot, tracker.lock()) {
        t.restore(snap);
        tracing::info!(path = %path.display(), "restored health snapshot");
    }
}

fn persist_health(tracker: &Arc<Mutex<ResourceHealthTracker>>, path: &Path) {
    if let Ok(t) = tracker.lock() {
        if let Ok(json) = serde_json::to_string_pretty(&t.snapshot()) {
            if let Err(e) = std::fs::write(path, json) {
                tracing::warn!(path = %path.display(), error = %e, "health snapshot not saved");
            }
        }
    }
}

fn log_summary(summary: &GenerationSummary, font_health: &Arc<Mutex<ResourceHealthTracker>>) {
    for spec in &summary.per_spec {
        tracing::info!(
            spec = %spec.name,
            generated = spec.generated,
            target = spec.target,
            "spec progress"
        );
    }
    for skip in &summary.skipped {
        tracing::warn!(index = skip.index, spec = %skip.spec, reason = %skip.reason, "skipped");
    }
    if let Ok(h) = font_health.lock() {
        let s = h.summary();
        tracing::info!(
            fonts = s.total,
            healthy = s.healthy,
            cooling = s.cooling_down,
            successes = s.successes,
            failures = s.failures,
            "font health"
        );
    }
    tracing::info!(
        generated = summary.generated,
        target = summary.total_target,
        skipped = summary.skipped.len(),
        cancelled = summary.cancelled,
        "generation finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::minimal_spec;

    fn spec_with(name: &str, proportion: f64) -> BatchSpec {
        let mut s = minimal_spec(name);
        s.proportion = proportion;
        s
    }

    #[test]
    fn quotas_sum_exactly_to_total() {
        let specs = vec![
            spec_with("a", 0.333),
            spec_with("b", 0.333),
            spec_with("c", 0.334),
        ];
        let quotas = allocate_quotas(100, &specs);
        assert_eq!(quotas.iter().sum::<u64>(), 100);
        assert_eq!(quotas, vec![33, 33, 34]);
    }

    #[test]
    fn largest_remainder_favors_biggest_fraction() {
        let specs = vec![spec_with("a", 0.5), spec_with("b", 0.5)];
        assert_eq!(allocate_quotas(7, &specs).iter().sum::<u64>(), 7);

        let specs = vec![spec_with("a", 0.7), spec_with("b", 0.3)];
        let q = allocate_quotas(10, &specs);
        assert_eq!(q, vec![7, 3]);
    }

    #[test]
    fn quota_for_single_spec_is_total() {
        let specs = vec![spec_with("only", 1.0)];
        assert_eq!(allocate_quotas(42, &specs), vec![42]);
    }
}
