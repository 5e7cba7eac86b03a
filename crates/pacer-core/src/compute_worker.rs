use crate::model::{ActivitySourceData, ActivityStreams, ActivityType, AnalysisData, AthleteModel};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once, mpsc};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeOptions {
    /// Sample index range `[start, end)` to restrict the computation to.
    #[serde(default)]
    pub bounds: Option<(usize, usize)>,
    #[serde(default = "default_return_zones")]
    pub return_zones: bool,
}

fn default_return_zones() -> bool {
    true
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            bounds: None,
            return_zones: true,
        }
    }
}

/// Everything the worker needs to compute one activity.
#[derive(Clone, Debug)]
pub struct ComputeTask {
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub is_trainer: bool,
    pub is_owner: bool,
    pub supports_gap: bool,
    pub has_power_meter: bool,
    pub athlete_model: AthleteModel,
    pub source_data: ActivitySourceData,
    pub streams: ActivityStreams,
    pub options: ComputeOptions,
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("failed to spawn compute worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("compute worker exited without a result")]
    Disconnected,
    #[error("compute worker panicked: {message}")]
    Panicked {
        message: String,
        location: Option<String>,
    },
    #[error("analysis failed: {message}")]
    Analysis { message: String },
}

impl ComputeError {
    pub fn location(&self) -> Option<&str> {
        match self {
            ComputeError::Panicked { location, .. } => location.as_deref(),
            _ => None,
        }
    }

    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, ComputeError::Spawn(_))
    }
}

/// Statistics algorithm executed inside the isolated worker.
pub trait ActivityAnalyzer: Send + Sync {
    fn analyze(&self, task: &ComputeTask) -> anyhow::Result<AnalysisData>;
}

type WorkerReply = Result<AnalysisData, ComputeError>;

/// Runs each computation on a fresh thread that handles exactly one task.
#[derive(Clone)]
pub struct ComputeWorkerBridge {
    analyzer: Arc<dyn ActivityAnalyzer>,
    stack_size: Option<usize>,
}

impl ComputeWorkerBridge {
    pub fn new(analyzer: Arc<dyn ActivityAnalyzer>) -> Self {
        Self {
            analyzer,
            stack_size: None,
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub async fn compute(&self, task: ComputeTask) -> Result<AnalysisData, ComputeError> {
        let mut context =
            WorkerContext::spawn(Arc::clone(&self.analyzer), &task.activity_id, self.stack_size)?;
        context.send(task)?;
        context.finish().await
    }
}

/// A spawned worker thread; released when dropped, whatever the outcome.
struct WorkerContext {
    name: String,
    input: Option<mpsc::Sender<ComputeTask>>,
    output: Option<oneshot::Receiver<WorkerReply>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerContext {
    fn spawn(
        analyzer: Arc<dyn ActivityAnalyzer>,
        activity_id: &str,
        stack_size: Option<usize>,
    ) -> Result<Self, ComputeError> {
        install_location_hook();
        let (input_tx, input_rx) = mpsc::channel::<ComputeTask>();
        let (output_tx, output_rx) = oneshot::channel::<WorkerReply>();
        let name = format!("pacer-compute-{activity_id}");
        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(bytes) = stack_size {
            builder = builder.stack_size(bytes);
        }
        let handle = builder
            .spawn(move || {
                let Ok(task) = input_rx.recv() else {
                    return;
                };
                let reply = run_analyzer(analyzer.as_ref(), &task);
                let _ = output_tx.send(reply);
            })
            .map_err(ComputeError::Spawn)?;
        debug!(worker = %name, "compute worker spawned");
        Ok(Self {
            name,
            input: Some(input_tx),
            output: Some(output_rx),
            handle: Some(handle),
        })
    }

    fn send(&mut self, task: ComputeTask) -> Result<(), ComputeError> {
        let input = self.input.take().ok_or(ComputeError::Disconnected)?;
        input.send(task).map_err(|_| ComputeError::Disconnected)
    }

    async fn finish(mut self) -> WorkerReply {
        let output = self.output.take().ok_or(ComputeError::Disconnected)?;
        output.await.map_err(|_| ComputeError::Disconnected)?
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        self.input.take();
        self.output.take();
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
                debug!(worker = %self.name, "compute worker released");
            } else {
                // The thread exits on its own once its single task returns.
                debug!(worker = %self.name, "compute worker detached");
            }
        }
    }
}

thread_local! {
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

static LOCATION_HOOK: Once = Once::new();

fn install_location_hook() {
    LOCATION_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                let location = location.to_string();
                PANIC_LOCATION.with(|slot| *slot.borrow_mut() = Some(location));
            }
            previous(info);
        }));
    });
}

fn run_analyzer(analyzer: &dyn ActivityAnalyzer, task: &ComputeTask) -> WorkerReply {
    PANIC_LOCATION.with(|slot| slot.borrow_mut().take());
    match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(task))) {
        Ok(Ok(analysis)) => Ok(analysis),
        Ok(Err(err)) => Err(ComputeError::Analysis {
            message: format!("{err:#}"),
        }),
        Err(payload) => Err(ComputeError::Panicked {
            message: panic_message(payload.as_ref()),
            location: PANIC_LOCATION.with(|slot| slot.borrow_mut().take()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
