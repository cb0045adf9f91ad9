use std::path::Path;

use anyhow::Result;
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

use crate::error::VisionError;

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Load the face-mesh landmark model from disk
pub fn mesh_session(path: &Path) -> Result<Session> {
    if !path.exists() {
        return Err(VisionError::SourceUnavailable(format!(
            "landmark model not found at {}",
            path.display()
        ))
        .into());
    }
    session_builder()?.commit_from_file(path).map_err(|e| {
        VisionError::SourceUnavailable(format!("load landmark model {}: {}", path.display(), e))
            .into()
    })
}
