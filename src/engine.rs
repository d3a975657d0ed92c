// THEORY:
// `MirrorEngine` is the long-running half of the crate. It owns one background tokio
// task (the worker) that repeats a capture -> compute -> apply cycle at the
// configured frame rate until it is stopped.
//
// The design keeps the control surface cheap and the worker self-contained:
// - **Lifecycle** (`start`/`stop`) is serialized by an async mutex holding the
//   worker handle. `stop` clears the running flag, wakes the worker out of its frame
//   sleep and joins it for a bounded time, aborting it if the bound is exceeded.
// - **Configuration** lives in a `SharedConfig`; the worker loads one snapshot per
//   cycle, so a `reconfigure` is picked up at the next cycle boundary.
// - **Status** is an `ArcSwap` for lock-free reads plus a `watch` channel for
//   subscribers. Every worker carries a generation number and may only publish while
//   it is the current one, so a worker from an earlier `start` can never overwrite
//   the status of a newer run.
// - **Collaborators** are blocking trait objects. Every call into them is moved to
//   the blocking thread pool; store reads and fixture writes are bounded by the
//   timeouts in `EngineOptions`, and fixture writes for one cycle run concurrently.
//   A timeout only stops the wait, not the blocking call, so the worker keeps the
//   handle of every abandoned call: a fixture whose last write is still running is
//   skipped, and a store read still running is awaited again instead of being
//   reissued. At most one blocking call per fixture plus one store read can be
//   outstanding, whatever the cycle rate.
//
// Smoothing history lives in the worker's own `WorkerState` and is dropped with the
// worker, so every run starts from a clean slate.

use crate::config::{ConfigPatch, EngineOptions, MirrorConfig, SharedConfig};
use crate::core_modules::color_space::DeviceBrightness;
use crate::core_modules::pixel::Rgb;
use crate::core_modules::region::PositionLabel;
use crate::devices::{CaptureSurface, ColorCommand, FixtureAssignment, LightActuator, PositionStore};
use crate::error::{ActuatorError, CaptureError, ConfigError, EngineError, EngineResult, StoreError};
use crate::pipeline::{MirrorPipeline, group_by_position, sample_positions};
use arc_swap::ArcSwap;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// A point-in-time view of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub fps: u32,
    pub device_brightness: DeviceBrightness,
    /// Completed cycles since the last `start`.
    pub cycles: u64,
    /// Last smoothed color of every fixture mirrored in the latest cycle.
    pub colors: BTreeMap<String, Rgb>,
    /// What each fixture is showing: its last successful write converted back from
    /// chromaticity and brightness.
    pub device_colors: BTreeMap<String, Rgb>,
}

/// Why a cycle produced no update.
#[derive(Debug, Error)]
enum CycleError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("blocking task failed: {0}")]
    Join(#[from] JoinError),
}

type WriteCall = JoinHandle<Result<(), ActuatorError>>;
type ReadCall = JoinHandle<Result<Vec<FixtureAssignment>, StoreError>>;

enum WriteOutcome {
    Finished(Result<(), ActuatorError>),
    /// Timed out; the blocking call is still running.
    Stalled(ActuatorError, WriteCall),
}

/// Everything one worker run owns.
struct WorkerState {
    pipeline: MirrorPipeline,
    device_colors: BTreeMap<String, Rgb>,
    /// Writes abandoned after `actuator_timeout` whose blocking call has not returned.
    stalled_writes: HashMap<String, WriteCall>,
    /// A store read abandoned after `store_timeout`, picked up again next cycle.
    pending_read: Option<ReadCall>,
}

impl WorkerState {
    fn new(options: &EngineOptions) -> Self {
        Self {
            pipeline: MirrorPipeline::new(options),
            device_colors: BTreeMap::new(),
            stalled_writes: HashMap::new(),
            pending_read: None,
        }
    }
}

struct Worker {
    generation: u64,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

struct EngineShared {
    capture: Arc<dyn CaptureSurface>,
    store: Arc<dyn PositionStore>,
    actuator: Arc<dyn LightActuator>,
    options: EngineOptions,
    config: SharedConfig,
    running: AtomicBool,
    generation: AtomicU64,
    status: ArcSwap<EngineStatus>,
    status_tx: watch::Sender<EngineStatus>,
}

/// Mirrors screen regions onto light fixtures.
pub struct MirrorEngine {
    shared: Arc<EngineShared>,
    lifecycle: Mutex<Option<Worker>>,
}

impl MirrorEngine {
    /// Builds a stopped engine with the default `MirrorConfig`.
    pub fn new(
        capture: Arc<dyn CaptureSurface>,
        store: Arc<dyn PositionStore>,
        actuator: Arc<dyn LightActuator>,
        options: EngineOptions,
    ) -> Result<Self, ConfigError> {
        Self::with_config(capture, store, actuator, options, MirrorConfig::default())
    }

    pub fn with_config(
        capture: Arc<dyn CaptureSurface>,
        store: Arc<dyn PositionStore>,
        actuator: Arc<dyn LightActuator>,
        options: EngineOptions,
        config: MirrorConfig,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let config = SharedConfig::new(config)?;
        let snapshot = config.snapshot();
        let initial = EngineStatus {
            fps: snapshot.fps,
            device_brightness: snapshot.device_brightness,
            ..EngineStatus::default()
        };
        let (status_tx, _) = watch::channel(initial.clone());

        Ok(Self {
            shared: Arc::new(EngineShared {
                capture,
                store,
                actuator,
                options,
                config,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                status: ArcSwap::from_pointee(initial),
                status_tx,
            }),
            lifecycle: Mutex::new(None),
        })
    }

    /// Starts mirroring at `fps` with `device_brightness`.
    ///
    /// Returns `Ok(false)` when already running. Invalid values are rejected before
    /// anything changes.
    pub async fn start(&self, fps: u32, device_brightness: DeviceBrightness) -> EngineResult<bool> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Ok(false);
        }

        let config = self
            .shared
            .config
            .apply(&ConfigPatch::default().fps(fps).device_brightness(device_brightness))?;

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.running.store(true, Ordering::Release);
        self.shared.publish(
            generation,
            EngineStatus {
                running: true,
                fps: config.fps,
                device_brightness: config.device_brightness,
                ..EngineStatus::default()
            },
        );

        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(run_worker(Arc::clone(&self.shared), generation, Arc::clone(&wake)));
        *lifecycle = Some(Worker { generation, wake, task });

        info!(generation, fps = config.fps, brightness = config.device_brightness, "mirroring started");
        Ok(true)
    }

    /// Stops mirroring and clears every fixture's color history.
    ///
    /// Returns `Ok(false)` when not running. If the worker does not finish its
    /// current cycle within `stop_timeout` it is aborted; the engine still ends up
    /// stopped and `EngineError::StopTimedOut` is returned.
    pub async fn stop(&self) -> EngineResult<bool> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(mut worker) = lifecycle.take() else {
            return Ok(false);
        };

        self.shared.running.store(false, Ordering::Release);
        worker.wake.notify_one();

        let stop_timeout = self.shared.options.stop_timeout;
        let outcome = match timeout(stop_timeout, &mut worker.task).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(join_error)) => {
                error!(generation = worker.generation, %join_error, "mirroring worker failed");
                Err(EngineError::WorkerFailed(join_error.to_string()))
            }
            Err(_) => {
                error!(generation = worker.generation, ?stop_timeout, "mirroring worker did not stop in time; aborting");
                worker.task.abort();
                let _ = worker.task.await;
                Err(EngineError::StopTimedOut(stop_timeout))
            }
        };

        // Retire the generation before the final publish so nothing can follow it.
        let retired = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let last = self.shared.status.load();
        self.shared.publish(
            retired,
            EngineStatus {
                running: false,
                colors: BTreeMap::new(),
                device_colors: BTreeMap::new(),
                ..(**last).clone()
            },
        );

        info!(generation = worker.generation, "mirroring stopped");
        outcome
    }

    /// Validates and applies a partial configuration update. Takes effect at the
    /// next cycle; legal while stopped.
    pub fn reconfigure(&self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let config = self.shared.config.apply(patch)?;
        self.shared.refresh_settings(&config);
        debug!(?config, "configuration updated");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> EngineStatus {
        (**self.shared.status.load()).clone()
    }

    /// A receiver that observes every published status.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn config(&self) -> MirrorConfig {
        self.shared.config.snapshot()
    }
}

impl Drop for MirrorEngine {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.lifecycle.get_mut().take() {
            worker.task.abort();
        }
    }
}

impl EngineShared {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    fn publish(&self, generation: u64, status: EngineStatus) {
        if self.generation.load(Ordering::Acquire) != generation {
            trace!(generation, "dropping status from a retired worker");
            return;
        }
        self.status.store(Arc::new(status.clone()));
        self.status_tx.send_replace(status);
    }

    fn refresh_settings(&self, config: &MirrorConfig) {
        self.status.rcu(|current| EngineStatus {
            fps: config.fps,
            device_brightness: config.device_brightness,
            ..(**current).clone()
        });
        self.status_tx.send_replace((**self.status.load()).clone());
    }

    /// One capture -> compute -> apply pass. Returns the smoothed color of every
    /// mirrored fixture and records successful writes in `state.device_colors`.
    async fn run_cycle(&self, state: &mut WorkerState, config: &MirrorConfig) -> Result<BTreeMap<String, Rgb>, CycleError> {
        // Stage 1: Grab the frame.
        let capture = Arc::clone(&self.capture);
        let frame = tokio::task::spawn_blocking(move || capture.capture_frame()).await??;

        // Stage 2: Read where every fixture sits right now, reusing a read that is
        // still in flight from an earlier cycle.
        let mut read = match state.pending_read.take() {
            Some(read) => read,
            None => {
                let store = Arc::clone(&self.store);
                tokio::task::spawn_blocking(move || store.current_assignments())
            }
        };
        let store_timeout = self.options.store_timeout;
        let assignments = match timeout(store_timeout, &mut read).await {
            Ok(joined) => joined??,
            Err(_) => {
                state.pending_read = Some(read);
                return Err(StoreError::TimedOut(store_timeout).into());
            }
        };

        state.pipeline.forget_missing(&assignments);
        let groups = group_by_position(&assignments);
        if groups.is_empty() {
            state.device_colors.clear();
            return Ok(BTreeMap::new());
        }

        // Stage 3: One dominant color per placement, off the async threads.
        let extractor = state.pipeline.extractor();
        let positions: Vec<PositionLabel> = groups.keys().copied().collect();
        let saturation_boost = config.saturation_boost;
        let colors = tokio::task::spawn_blocking(move || {
            sample_positions(&extractor, &frame, &positions, saturation_boost)
        })
        .await?;

        // Stage 4: Smooth and gate per fixture.
        let updates = state.pipeline.plan(&groups, &colors, config);

        // Stage 5: Write every fixture that passed the gate, concurrently. A fixture
        // whose previous write is still blocked stays uncommitted and is retried once
        // that call returns.
        state.stalled_writes.retain(|_, call| !call.is_finished());
        let stalled = &state.stalled_writes;
        let writes: Vec<_> = updates
            .iter()
            .filter_map(|update| update.command.map(|command| (update, command)))
            .filter(|(update, _)| {
                let busy = stalled.contains_key(&update.fixture);
                if busy {
                    debug!(fixture = %update.fixture, "previous write still running; skipping");
                }
                !busy
            })
            .map(|(update, command)| async move {
                let outcome = self.actuate(update.fixture.clone(), command).await;
                (update, command, outcome)
            })
            .collect();

        for (update, command, outcome) in join_all(writes).await {
            match outcome {
                WriteOutcome::Finished(Ok(())) => {
                    state.pipeline.mark_committed(&update.fixture, update.smoothed);
                    let shown = self.options.gamut.chroma_to_rgb(command.chromaticity, command.brightness);
                    state.device_colors.insert(update.fixture.clone(), shown);
                }
                WriteOutcome::Finished(Err(error)) => warn!(fixture = %update.fixture, %error, "color write failed"),
                WriteOutcome::Stalled(error, call) => {
                    warn!(fixture = %update.fixture, %error, "color write failed");
                    state.stalled_writes.insert(update.fixture.clone(), call);
                }
            }
        }

        let colors: BTreeMap<String, Rgb> = updates
            .into_iter()
            .map(|update| (update.fixture, update.smoothed))
            .collect();
        state.device_colors.retain(|fixture, _| colors.contains_key(fixture));
        Ok(colors)
    }

    async fn actuate(&self, fixture: String, command: ColorCommand) -> WriteOutcome {
        let actuator = Arc::clone(&self.actuator);
        let actuator_timeout = self.options.actuator_timeout;
        let mut call = tokio::task::spawn_blocking(move || actuator.set_color(&fixture, command));

        match timeout(actuator_timeout, &mut call).await {
            Ok(Ok(result)) => WriteOutcome::Finished(result),
            Ok(Err(join_error)) => WriteOutcome::Finished(Err(ActuatorError::Backend(join_error.to_string()))),
            Err(_) => WriteOutcome::Stalled(ActuatorError::TimedOut(actuator_timeout), call),
        }
    }
}

async fn run_worker(shared: Arc<EngineShared>, generation: u64, wake: Arc<Notify>) {
    let mut state = WorkerState::new(&shared.options);
    let mut cycles = 0u64;

    while shared.is_current(generation) {
        let started = Instant::now();
        let config = shared.config.snapshot();

        match shared.run_cycle(&mut state, &config).await {
            Ok(colors) => {
                cycles += 1;
                trace!(generation, cycles, fixtures = colors.len(), elapsed = ?started.elapsed(), "cycle complete");
                shared.publish(
                    generation,
                    EngineStatus {
                        running: true,
                        fps: config.fps,
                        device_brightness: config.device_brightness,
                        cycles,
                        colors,
                        device_colors: state.device_colors.clone(),
                    },
                );
            }
            Err(CycleError::Capture(error)) => warn!(%error, "frame capture failed; skipping cycle"),
            Err(error) => warn!(%error, "cycle skipped"),
        }

        // Sleep out the rest of the frame; an overrun starts the next cycle at once.
        if let Some(remaining) = config.frame_interval().checked_sub(started.elapsed()) {
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = wake.notified() => {}
            }
        } else {
            tokio::task::yield_now().await;
        }
    }

    state.pipeline.reset();
    debug!(
        generation,
        cycles,
        stalled_writes = state.stalled_writes.len(),
        "mirroring worker exited"
    );
}
