//! Model pool with lazy loading and idle auto-unloading.
//!
//! Both models load on first use and are dropped again after the
//! configured idle timeout, keeping a mostly-idle service small.

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, Shape, Tensor};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{InferenceConfig, ModelsConfig};

/// OpenVINO `Core` is not `Send`/`Sync` in the Rust bindings even though
/// the underlying runtime object is thread-safe; this wrapper restores
/// the markers so the pool can share it.
pub struct CoreHandle(Core);
unsafe impl Send for CoreHandle {}
unsafe impl Sync for CoreHandle {}

impl Deref for CoreHandle {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for CoreHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Shareable compiled model.
#[derive(Clone)]
pub struct ModelHandle(Arc<CompiledModel>);
unsafe impl Send for ModelHandle {}
unsafe impl Sync for ModelHandle {}

impl ModelHandle {
    /// `CompiledModel::create_infer_request` takes `&mut self` in the
    /// bindings although the runtime call is thread-safe; go through a
    /// raw pointer to keep the handle cloneable.
    pub fn create_infer_request(&self) -> anyhow::Result<openvino::InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(Into::into)
        }
    }
}

struct CachedModel {
    model: ModelHandle,
    last_access: Instant,
}

/// The two models the extractor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Detector,
    Embedder,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Detector => "detector",
            ModelKind::Embedder => "embedder",
        }
    }

    fn index(self) -> usize {
        match self {
            ModelKind::Detector => 0,
            ModelKind::Embedder => 1,
        }
    }
}

struct ModelSlot {
    kind: ModelKind,
    path: String,
    cached: RwLock<Option<CachedModel>>,
}

/// Lazy-loading pool for the detector and embedder models.
pub struct ModelPool {
    core: Arc<RwLock<CoreHandle>>,
    device: String,
    idle_timeout: Duration,
    slots: [ModelSlot; 2],
    shutdown: Notify,
}

impl ModelPool {
    pub fn new(inference: &InferenceConfig, models: &ModelsConfig) -> anyhow::Result<Self> {
        let core = Core::new()?;

        let slot = |kind: ModelKind, path: &std::path::Path| ModelSlot {
            kind,
            path: path.to_string_lossy().into_owned(),
            cached: RwLock::new(None),
        };

        Ok(Self {
            core: Arc::new(RwLock::new(CoreHandle(core))),
            device: inference.device.clone(),
            idle_timeout: Duration::from_secs(inference.model_idle_timeout),
            slots: [
                slot(ModelKind::Detector, &models.detector),
                slot(ModelKind::Embedder, &models.embedder),
            ],
            shutdown: Notify::new(),
        })
    }

    fn slot(&self, kind: ModelKind) -> &ModelSlot {
        &self.slots[kind.index()]
    }

    /// Get a model, loading it on first use.
    pub fn get(&self, kind: ModelKind) -> anyhow::Result<ModelHandle> {
        let slot = self.slot(kind);
        let mut guard = slot.cached.write();

        if let Some(cached) = guard.as_mut() {
            cached.last_access = Instant::now();
            return Ok(cached.model.clone());
        }

        info!(model = kind.as_str(), path = %slot.path, "loading model");
        let start = Instant::now();

        // Core methods require &mut self in the bindings.
        let mut core = self.core.write();
        let model = core.read_model_from_file(&slot.path, "")?;
        let compiled = core.compile_model(&model, self.device.as_str().into())?;
        drop(core);

        let handle = ModelHandle(Arc::new(compiled));
        info!(model = kind.as_str(), elapsed = ?start.elapsed(), "model loaded");

        *guard = Some(CachedModel {
            model: handle.clone(),
            last_access: Instant::now(),
        });
        Ok(handle)
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.slot(kind).cached.read().is_some()
    }

    /// Loaded state of every model, for health reporting.
    pub fn status(&self) -> Vec<(ModelKind, bool)> {
        self.slots
            .iter()
            .map(|slot| (slot.kind, slot.cached.read().is_some()))
            .collect()
    }

    fn cleanup_idle(&self) {
        let now = Instant::now();
        for slot in &self.slots {
            let mut guard = slot.cached.write();
            let expired = guard
                .as_ref()
                .is_some_and(|cached| now.duration_since(cached.last_access) > self.idle_timeout);
            if expired {
                info!(model = slot.kind.as_str(), "unloading idle model");
                *guard = None;
            }
        }
    }

    /// Run the periodic idle check until shutdown is signalled.
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let check_interval = Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    debug!("running model idle check");
                    self.cleanup_idle();
                }
                _ = self.shutdown.notified() => {
                    info!("model pool cleanup task shutting down");
                    break;
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for ModelPool {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Copy an NCHW array into a freshly allocated OpenVINO tensor.
pub fn tensor_from_nchw(array: &Array4<f32>) -> anyhow::Result<Tensor> {
    let dims: Vec<i64> = array.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let data = array.as_slice().unwrap();
    unsafe {
        let dst = tensor.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
        std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }
    Ok(tensor)
}

/// Read a tensor's full contents as f32 values.
pub fn tensor_to_vec(tensor: &Tensor) -> anyhow::Result<Vec<f32>> {
    let shape = tensor.get_shape()?;
    let len: i64 = shape.get_dimensions().iter().product();

    let data = unsafe {
        let ptr = tensor.get_raw_data()?.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    };
    Ok(data)
}
