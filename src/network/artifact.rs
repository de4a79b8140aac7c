use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::image::InputShape;
use crate::network::{LayerSpec, ModelMetadata, Network, NetworkError};

pub const MODEL_FILE: &str = "model.json";
pub const WEIGHTS_FILE: &str = "weights.bin";

const FORMAT: &str = "ferrite-layers-model";

#[derive(Debug, Serialize, Deserialize)]
struct ModelDocument {
    format: String,
    generated_by: String,
    model_topology: ModelTopology,
    weights_manifest: Vec<WeightGroup>,
    user_defined_metadata: ModelMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    training_config: Option<TrainingDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelTopology {
    input_shape: InputShape,
    layers: Vec<LayerSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WeightGroup {
    paths: Vec<String>,
    weights: Vec<WeightEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WeightEntry {
    name: String,
    shape: Vec<usize>,
    dtype: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrainingDescriptor {
    loss: String,
    optimizer: String,
    learning_rate: f32,
    metrics: Vec<String>,
}

/// Files written by `save_artifact`.
#[derive(Debug, Clone)]
pub struct ArtifactFiles {
    pub descriptor: PathBuf,
    pub shards: Vec<PathBuf>,
}

/// Writes `network` to `dir` as `model.json` plus one `weights.bin` shard.
///
/// The shard is written first so a readable descriptor always points at
/// complete weights. Both files go through a temp file and a rename, so a
/// concurrent reader sees either the old file or the new one.
pub fn save_artifact(
    network: &Network,
    metadata: &ModelMetadata,
    learning_rate: f32,
    dir: &Path,
) -> Result<ArtifactFiles, NetworkError> {
    if network.output_dim() != metadata.class_names.len() {
        return Err(NetworkError::Artifact(format!(
            "network has {} outputs but {} class names were given",
            network.output_dim(),
            metadata.class_names.len()
        )));
    }
    fs::create_dir_all(dir)?;

    let shard = dir.join(WEIGHTS_FILE);
    let shard_tmp = temp_path(&shard);
    let mut entries = Vec::new();
    let mut writer = BufWriter::new(fs::File::create(&shard_tmp)?);
    for (i, layer) in network.layers.iter().enumerate() {
        for (role, tensor) in layer.weights() {
            for v in &tensor.data {
                writer.write_all(&v.to_le_bytes())?;
            }
            entries.push(WeightEntry {
                name: format!("layer_{i}/{role}"),
                shape: tensor.shape.clone(),
                dtype: "float32".into(),
            });
        }
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);
    fs::rename(&shard_tmp, &shard)?;

    let document = ModelDocument {
        format: FORMAT.into(),
        generated_by: concat!("ferrite-trainer ", env!("CARGO_PKG_VERSION")).into(),
        model_topology: ModelTopology {
            input_shape: network.input_shape,
            layers: network.topology.clone(),
        },
        weights_manifest: vec![WeightGroup { paths: vec![WEIGHTS_FILE.into()], weights: entries }],
        user_defined_metadata: metadata.clone(),
        training_config: Some(TrainingDescriptor {
            loss: "categorical_crossentropy".into(),
            optimizer: "adam".into(),
            learning_rate,
            metrics: vec!["accuracy".into()],
        }),
    };
    let descriptor = dir.join(MODEL_FILE);
    replace_file(&descriptor, &serde_json::to_vec_pretty(&document)?)?;

    Ok(ArtifactFiles { descriptor, shards: vec![shard] })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write-to-temp, fsync, rename.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), NetworkError> {
    let tmp = temp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads only the metadata block of `dir/model.json`.
pub fn read_metadata(dir: &Path) -> Result<ModelMetadata, NetworkError> {
    Ok(read_document(dir)?.user_defined_metadata)
}

/// Rebuilds the network stored in `dir` and returns it with its metadata.
pub fn load_artifact(dir: &Path) -> Result<(Network, ModelMetadata), NetworkError> {
    let document = read_document(dir)?;
    let mut network = Network::from_topology(
        document.model_topology.input_shape,
        document.model_topology.layers,
        0,
    )?;

    let mut values: Vec<f32> = Vec::new();
    let mut manifest: Vec<WeightEntry> = Vec::new();
    for group in document.weights_manifest {
        let mut bytes = Vec::new();
        for rel in &group.paths {
            bytes.extend(fs::read(dir.join(checked_relative(rel)?))?);
        }
        let expected: usize = group.weights.iter().map(|w| w.shape.iter().product::<usize>()).sum();
        if bytes.len() != expected * 4 {
            return Err(NetworkError::Artifact(format!(
                "weight shards {:?} hold {} bytes, manifest needs {}",
                group.paths,
                bytes.len(),
                expected * 4
            )));
        }
        values.extend(bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])));
        manifest.extend(group.weights);
    }

    let targets: Vec<_> = network.layers.iter_mut().flat_map(|l| l.weights_mut()).collect();
    if targets.len() != manifest.len() {
        return Err(NetworkError::Artifact(format!(
            "manifest lists {} tensors, topology needs {}",
            manifest.len(),
            targets.len()
        )));
    }
    let mut offset = 0;
    for (target, entry) in targets.into_iter().zip(&manifest) {
        if entry.dtype != "float32" || entry.shape != target.shape {
            return Err(NetworkError::Artifact(format!(
                "{}: expected float32 {:?}, manifest has {} {:?}",
                entry.name, target.shape, entry.dtype, entry.shape
            )));
        }
        let n = target.len();
        target.data.copy_from_slice(&values[offset..offset + n]);
        offset += n;
    }

    let metadata = document.user_defined_metadata;
    if network.output_dim() != metadata.class_names.len() {
        return Err(NetworkError::Artifact(format!(
            "network has {} outputs but metadata names {} classes",
            network.output_dim(),
            metadata.class_names.len()
        )));
    }
    Ok((network, metadata))
}

fn read_document(dir: &Path) -> Result<ModelDocument, NetworkError> {
    let raw = fs::read(dir.join(MODEL_FILE))?;
    let document: ModelDocument = serde_json::from_slice(&raw)?;
    if document.format != FORMAT {
        return Err(NetworkError::Artifact(format!("unsupported model format {:?}", document.format)));
    }
    Ok(document)
}

/// Shard paths must stay inside the artifact directory.
fn checked_relative(rel: &str) -> Result<&Path, NetworkError> {
    let path = Path::new(rel);
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(path)
    } else {
        Err(NetworkError::Artifact(format!("shard path {rel:?} escapes the artifact directory")))
    }
}
