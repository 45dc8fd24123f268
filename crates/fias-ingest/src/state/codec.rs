//! JSON wire format for handing a [`PipelineState`] to a worker process
//!
//! The payload is a flat object keyed by [`ParamKey::as_str`]. Each key has a
//! fixed value shape; anything else is rejected instead of guessed at.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::{ParamKey, ParamValue, PipelineState};
use crate::error::{IngestError, Result};
use crate::models::{RemoteVersionInfo, SelectedFile, UpdateMode};

/// Encode a state into its JSON object form
pub fn encode_state(state: &PipelineState) -> Result<Value> {
    let mut object = Map::new();
    for (key, value) in state.iter() {
        object.insert(key.as_str().to_string(), encode_value(key, value)?);
    }
    Ok(Value::Object(object))
}

pub fn encode_state_string(state: &PipelineState) -> Result<String> {
    Ok(serde_json::to_string(&encode_state(state)?)?)
}

/// Decode a state previously produced by [`encode_state`]
pub fn decode_state(value: &Value) -> Result<PipelineState> {
    let object = value
        .as_object()
        .ok_or_else(|| IngestError::Codec("state payload must be a JSON object".to_string()))?;

    let mut pairs = Vec::with_capacity(object.len());
    for (name, raw) in object {
        let key = ParamKey::parse(name)
            .ok_or_else(|| IngestError::Codec(format!("unknown state parameter '{}'", name)))?;
        pairs.push((key, decode_value(key, raw)?));
    }
    Ok(PipelineState::new().with_list(pairs))
}

pub fn decode_state_str(raw: &str) -> Result<PipelineState> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| IngestError::Codec(format!("state payload is not valid JSON: {}", e)))?;
    decode_state(&value)
}

/// Paths travel as JSON strings, so they must be valid UTF-8
fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| IngestError::Codec(format!("path {} is not valid UTF-8", path.display())))
}

pub fn encode_file(file: &SelectedFile) -> Result<Value> {
    Ok(json!({
        "path": path_str(file.path())?,
        "size": file.size(),
        "pathToArchive": file.archive_path().map(path_str).transpose()?,
    }))
}

pub fn decode_file(value: &Value) -> Result<SelectedFile> {
    let path = value
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::Codec("selected file is missing 'path'".to_string()))?;
    let size = value
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| IngestError::Codec(format!("selected file {} has no valid 'size'", path)))?;
    let archive = match value.get("pathToArchive") {
        None | Some(Value::Null) => None,
        Some(Value::String(p)) => Some(PathBuf::from(p)),
        Some(other) => {
            return Err(IngestError::Codec(format!(
                "selected file {} has invalid 'pathToArchive': {}",
                path, other
            )))
        },
    };

    SelectedFile::new(path, size, archive).map_err(|e| IngestError::Codec(e.to_string()))
}

fn encode_value(key: ParamKey, value: &ParamValue) -> Result<Value> {
    let encoded = match (key, value) {
        (ParamKey::InterruptPipeline, ParamValue::Flag(flag)) => Value::Bool(*flag),
        (ParamKey::FiasVersion | ParamKey::WorkerIndex, ParamValue::Int(v)) => json!(v),
        (
            ParamKey::ExtractToFolder | ParamKey::DownloadTargetFile,
            ParamValue::Path(path),
        ) => Value::String(path_str(path)?.to_string()),
        (ParamKey::FilesToProcess, ParamValue::Files(files)) => {
            Value::Array(files.iter().map(encode_file).collect::<Result<_>>()?)
        },
        (ParamKey::RemoteSourceInfo, ParamValue::Remote(info)) => json!({
            "version": info.version(),
            "fullUrl": info.full_url(),
            "deltaUrl": info.delta_url(),
        }),
        (ParamKey::UpdateMode, ParamValue::Mode(mode)) => Value::String(mode.as_str().to_string()),
        (key, value) => {
            return Err(IngestError::Codec(format!(
                "parameter '{}' cannot hold {:?}",
                key, value
            )))
        },
    };
    Ok(encoded)
}

fn decode_value(key: ParamKey, raw: &Value) -> Result<ParamValue> {
    let mismatch = || IngestError::Codec(format!("parameter '{}' has unexpected value {}", key, raw));

    let decoded = match key {
        ParamKey::InterruptPipeline => ParamValue::Flag(raw.as_bool().ok_or_else(mismatch)?),
        ParamKey::FiasVersion | ParamKey::WorkerIndex => {
            ParamValue::Int(raw.as_i64().ok_or_else(mismatch)?)
        },
        ParamKey::ExtractToFolder | ParamKey::DownloadTargetFile => {
            ParamValue::Path(PathBuf::from(raw.as_str().ok_or_else(mismatch)?))
        },
        ParamKey::FilesToProcess => {
            let files = raw
                .as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(decode_file)
                .collect::<Result<Vec<_>>>()?;
            ParamValue::from(files)
        },
        ParamKey::RemoteSourceInfo => {
            let version = raw.get("version").and_then(Value::as_i64).ok_or_else(mismatch)?;
            let url = |name: &str| raw.get(name).and_then(Value::as_str).map(str::to_string);
            let info = RemoteVersionInfo::new(version, url("fullUrl"), url("deltaUrl"))
                .map_err(|e| IngestError::Codec(e.to_string()))?;
            ParamValue::Remote(info)
        },
        ParamKey::UpdateMode => {
            ParamValue::Mode(raw.as_str().and_then(UpdateMode::parse).ok_or_else(mismatch)?)
        },
    };
    Ok(decoded)
}
