//! Where model files come from: a local directory or a hub repository.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;

use hfchat_common::Credential;

pub enum ModelSource {
    Local(PathBuf),
    Hub { id: String, repo: ApiRepo },
}

/// `model.safetensors.index.json`, as written by sharded checkpoints.
#[derive(Debug, Deserialize)]
struct ShardIndex {
    weight_map: std::collections::HashMap<String, String>,
}

impl ModelSource {
    /// An existing directory is used as-is; anything else is a hub repo id.
    pub fn resolve(
        identifier: &str,
        revision: &str,
        credential: &Credential,
    ) -> anyhow::Result<Self> {
        let path = PathBuf::from(identifier);
        if path.is_dir() {
            tracing::info!(path = %path.display(), "using local model directory");
            return Ok(Self::Local(path));
        }
        let api = ApiBuilder::new()
            .with_token(Some(credential.expose().to_string()))
            .with_progress(false)
            .build()
            .context("unable to create hub client")?;
        let repo = api.repo(Repo::with_revision(
            identifier.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        tracing::info!(repo = identifier, revision, "using hub repository");
        Ok(Self::Hub {
            id: identifier.to_string(),
            repo,
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Local(dir) => dir.display().to_string(),
            Self::Hub { id, .. } => id.clone(),
        }
    }

    /// Local path of `file`, downloading it first when the source is remote.
    pub fn get(&self, file: &str) -> anyhow::Result<PathBuf> {
        match self {
            Self::Local(dir) => {
                let path = dir.join(file);
                if !path.is_file() {
                    bail!("{file} not found in {}", dir.display());
                }
                Ok(path)
            }
            Self::Hub { id, repo } => repo
                .get(file)
                .with_context(|| format!("fetch {file} from {id}")),
        }
    }

    /// File names available in the source.
    pub fn files(&self) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Local(dir) => {
                let mut names = Vec::new();
                for entry in std::fs::read_dir(dir)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names.sort();
                Ok(names)
            }
            Self::Hub { id, repo } => {
                let info = repo.info().with_context(|| format!("list files of {id}"))?;
                Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
            }
        }
    }

    /// Safetensors weight files: a single `model.safetensors`, or every shard
    /// named in `model.safetensors.index.json`.
    pub fn safetensors(&self) -> anyhow::Result<Vec<PathBuf>> {
        if let Ok(single) = self.get("model.safetensors") {
            return Ok(vec![single]);
        }
        let index_path = self
            .get("model.safetensors.index.json")
            .context("no model.safetensors or model.safetensors.index.json")?;
        let index: ShardIndex = serde_json::from_slice(&std::fs::read(&index_path)?)
            .with_context(|| format!("parse {}", index_path.display()))?;
        let shards: BTreeSet<String> = index.weight_map.into_values().collect();
        shards.iter().map(|name| self.get(name)).collect()
    }
}
