use std::{fmt, path::Path};

use clap::ValueEnum;
use ort::{
    execution_providers::{
        CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
        ExecutionProviderDispatch,
    },
    session::{builder::SessionBuilder, Session},
};
use tracing::{debug, info, warn};

use crate::errors::{BoxError, CarDamageError, Result};

/// Compute device requested for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Device {
    /// CUDA if present, then CoreML, then CPU
    #[default]
    Auto,
    Cuda,
    #[value(name = "coreml")]
    CoreMl,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Cuda => "cuda",
            Self::CoreMl => "coreml",
            Self::Cpu => "cpu",
        })
    }
}

impl Device {
    /// Turn `Auto` into a concrete device by checking the execution providers
    /// compiled into the runtime. Explicit choices are returned unchanged and
    /// only checked when a session is built.
    pub fn resolve(self, device_id: i32) -> Self {
        match self {
            Self::Auto => {
                let device = if provider_available(&CUDAExecutionProvider::default()) {
                    Self::Cuda
                } else if provider_available(&CoreMLExecutionProvider::default()) {
                    Self::CoreMl
                } else {
                    Self::Cpu
                };
                info!(%device, device_id, "selected compute device");
                device
            }
            other => other,
        }
    }

    fn execution_provider(self, device_id: i32) -> Option<ExecutionProviderDispatch> {
        match self {
            Self::Cuda => Some(
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()
                    .error_on_failure(),
            ),
            Self::CoreMl => Some(
                CoreMLExecutionProvider::default()
                    .with_subgraphs(true)
                    .build()
                    .error_on_failure(),
            ),
            Self::Auto | Self::Cpu => None,
        }
    }
}

fn provider_available(provider: &impl ExecutionProvider) -> bool {
    provider.is_available().unwrap_or(false)
}

/// Build a session on `device`, falling back to CPU when the accelerator cannot
/// take the model.
///
/// `configure` is applied to every attempt, so optimisation settings survive
/// the fallback. Returns the session together with the device it actually runs
/// on. Failure on CPU is fatal.
pub fn build_session<F>(
    model_path: &Path,
    device: Device,
    device_id: i32,
    configure: F,
) -> Result<(Session, Device)>
where
    F: Fn(SessionBuilder) -> ort::Result<SessionBuilder>,
{
    place(model_path, device.resolve(device_id), device_id, |provider| {
        commit(model_path, provider, &configure)
    })
}

/// Run `commit` with the provider for `device`, then once more without one if
/// that attempt fails. `device` must already be resolved.
fn place<T, E, C>(
    model_path: &Path,
    device: Device,
    device_id: i32,
    mut commit: C,
) -> Result<(T, Device)>
where
    C: FnMut(Option<ExecutionProviderDispatch>) -> std::result::Result<T, E>,
    E: fmt::Display + Into<BoxError>,
{
    if let Some(provider) = device.execution_provider(device_id) {
        match commit(Some(provider)) {
            Ok(session) => {
                debug!(%device, path = %model_path.display(), "session ready");
                return Ok((session, device));
            }
            Err(e) => warn!(
                %device,
                path = %model_path.display(),
                error = %e,
                "placing model on accelerator failed, falling back to cpu"
            ),
        }
    }

    let session = commit(None).map_err(|e| {
        CarDamageError::model(format!("load model: {}", model_path.display()), e)
    })?;
    debug!(device = %Device::Cpu, path = %model_path.display(), "session ready");
    Ok((session, Device::Cpu))
}

fn commit<F>(
    model_path: &Path,
    provider: Option<ExecutionProviderDispatch>,
    configure: &F,
) -> ort::Result<Session>
where
    F: Fn(SessionBuilder) -> ort::Result<SessionBuilder>,
{
    let mut builder = Session::builder()?;
    if let Some(provider) = provider {
        builder = builder.with_execution_providers([provider])?;
    }
    configure(builder)?.commit_from_file(model_path)
}
