//! Weight file reading for safetensors and `PyTorch` checkpoints.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use safetensors::SafeTensors;
use tracing::debug;

/// Checkpoint entry that wraps the raw state dict when present.
pub const STATE_DICT_KEY: &str = "model_state_dict";

/// Training-only `BatchNorm` counter, never declared by the inference networks.
const BATCHES_TRACKED_SUFFIX: &str = ".num_batches_tracked";

/// Reads a state dict from a `.safetensors` or `.pth`/`.pt`/`.bin` file.
///
/// Tensors are converted to F32 and placed on `device`. A `model_state_dict`
/// wrapper is unwrapped when present.
///
/// # Errors
///
/// Returns an error if:
/// - The extension is not recognised
/// - The file cannot be read or parsed
/// - A tensor has an unsupported dtype
pub fn read_state_dict(path: impl AsRef<Path>, device: &Device) -> Result<HashMap<String, Tensor>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let raw = match ext.as_str() {
        "safetensors" => read_safetensors(path)?,
        "pth" | "pt" | "bin" => read_pickle(path)?,
        other => anyhow::bail!(
            "Unsupported weight file extension '{other}': {}",
            path.display()
        ),
    };

    let mut state = HashMap::with_capacity(raw.len());
    for (name, tensor) in raw {
        if name.ends_with(BATCHES_TRACKED_SUFFIX) {
            continue;
        }
        let tensor = tensor
            .to_dtype(DType::F32)
            .and_then(|t| t.to_device(device))
            .with_context(|| format!("Failed to prepare tensor '{name}'"))?;
        state.insert(name, tensor);
    }

    debug!("Read {} tensors from {}", state.len(), path.display());
    Ok(state)
}

fn read_safetensors(path: &Path) -> Result<Vec<(String, Tensor)>> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read weight file: {}", path.display()))?;

    let tensors = SafeTensors::deserialize(&data)
        .with_context(|| format!("Failed to parse safetensors: {}", path.display()))?;

    let prefix = format!("{STATE_DICT_KEY}.");
    let mut out = Vec::new();

    for name in tensors.names() {
        let view = tensors
            .tensor(name)
            .with_context(|| format!("Failed to get tensor '{name}'"))?;

        let dtype = safetensors_dtype_to_candle(view.dtype())?;
        let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), &Device::Cpu)
            .with_context(|| format!("Failed to create tensor '{name}'"))?;

        let key = name
            .strip_prefix(prefix.as_str())
            .unwrap_or(name.as_str())
            .to_string();
        out.push((key, tensor));
    }

    Ok(out)
}

fn read_pickle(path: &Path) -> Result<Vec<(String, Tensor)>> {
    match candle_core::pickle::read_all_with_key(path, Some(STATE_DICT_KEY)) {
        Ok(tensors) if !tensors.is_empty() => {
            debug!("Unwrapped '{STATE_DICT_KEY}' from {}", path.display());
            Ok(tensors)
        }
        _ => candle_core::pickle::read_all(path)
            .with_context(|| format!("Failed to parse checkpoint: {}", path.display())),
    }
}

/// Converts safetensors dtype to candle dtype.
fn safetensors_dtype_to_candle(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype as S;
    match dtype {
        S::F32 => Ok(DType::F32),
        S::F64 => Ok(DType::F64),
        S::F16 => Ok(DType::F16),
        S::BF16 => Ok(DType::BF16),
        S::I64 => Ok(DType::I64),
        S::U8 => Ok(DType::U8),
        S::U32 => Ok(DType::U32),
        other => anyhow::bail!("Unsupported dtype: {other:?}"),
    }
}
