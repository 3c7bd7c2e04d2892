//! GPU device and MIG profile model
//!
//! A MIG-capable GPU is carved into named profiles (`1g.5gb`, `3g.20gb`, ...)
//! drawn from a per-model capability table: each model exposes a fixed budget
//! of compute slices and a maximum instance count per profile. The built-in
//! table covers the common Ampere parts and can be extended from a YAML file
//! at startup.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;

/// A named MIG slice configuration, e.g. `1g.5gb`.
///
/// Ordering is lexical over the profile string, which gives tests and
/// tie-breaking a stable key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigProfileName(String);

impl MigProfileName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compute-slice weight of the profile, taken from the leading `<n>g`
    /// segment. Unparsable names weigh one slice.
    pub fn slices(&self) -> u32 {
        self.0
            .split('g')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(1)
    }

    /// The extended resource name pods use to request this profile.
    pub fn resource_name(&self) -> String {
        format!("{}{}", api_types::RESOURCE_MIG_PREFIX, self.0)
    }
}

impl std::fmt::Display for MigProfileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MigProfileName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// GPU product name as exposed by GPU feature discovery,
/// e.g. `NVIDIA-A100-SXM4-40GB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuModel(String);

impl GpuModel {
    pub fn new(model: impl Into<String>) -> Self {
        Self(model.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GpuModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GpuModel {
    fn from(model: &str) -> Self {
        Self(model.to_string())
    }
}

/// MIG capability of one GPU model: the total compute-slice budget and the
/// maximum instance count per profile. A profile absent from `max_counts`
/// cannot be carved on that model at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigCapability {
    pub total_slices: u32,
    pub max_counts: BTreeMap<MigProfileName, u32>,
}

impl MigCapability {
    pub fn supports(&self, profile: &MigProfileName) -> bool {
        self.max_counts.contains_key(profile)
    }

    pub fn max_count(&self, profile: &MigProfileName) -> u32 {
        self.max_counts.get(profile).copied().unwrap_or(0)
    }
}

/// A physical GPU on a node together with the profiles currently carved out
/// of it, as reported through the node's status annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuDevice {
    pub index: u32,
    pub model: GpuModel,
    pub profiles: BTreeMap<MigProfileName, u32>,
}

/// Creation request handed to the device client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigProfileSpec {
    pub gpu_index: u32,
    pub profile: MigProfileName,
}

/// A carved profile instance reported by the device client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigDeviceResource {
    pub gpu_index: u32,
    pub profile: MigProfileName,
    pub device_id: String,
}

fn capability(total_slices: u32, profiles: &[(&str, u32)]) -> MigCapability {
    MigCapability {
        total_slices,
        max_counts: profiles
            .iter()
            .map(|(name, count)| (MigProfileName::from(*name), *count))
            .collect(),
    }
}

/// Built-in capability table keyed by GPU product name.
static BUILTIN_CAPABILITIES: Lazy<HashMap<GpuModel, MigCapability>> = Lazy::new(|| {
    let a100_40gb = capability(
        7,
        &[
            ("1g.5gb", 7),
            ("2g.10gb", 3),
            ("3g.20gb", 2),
            ("4g.20gb", 1),
            ("7g.40gb", 1),
        ],
    );
    let a100_80gb = capability(
        7,
        &[
            ("1g.10gb", 7),
            ("2g.20gb", 3),
            ("3g.40gb", 2),
            ("4g.40gb", 1),
            ("7g.80gb", 1),
        ],
    );
    let a30 = capability(4, &[("1g.6gb", 4), ("2g.12gb", 2), ("4g.24gb", 1)]);

    HashMap::from([
        (GpuModel::from("NVIDIA-A100-SXM4-40GB"), a100_40gb.clone()),
        (GpuModel::from("NVIDIA-A100-PCIE-40GB"), a100_40gb),
        (GpuModel::from("NVIDIA-A100-SXM4-80GB"), a100_80gb.clone()),
        (GpuModel::from("NVIDIA-A100-PCIE-80GB"), a100_80gb),
        (GpuModel::from("NVIDIA-A30"), a30),
    ])
});

/// One entry of the YAML capability file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuMigInfo {
    /// GPU product name, matching the `nvidia.com/gpu.product` label.
    pub model: String,
    /// Total compute-slice budget of the model.
    #[serde(rename = "totalSlices")]
    pub total_slices: u32,
    /// Maximum instance count per profile name.
    pub profiles: BTreeMap<String, u32>,
}

/// Lookup of MIG capabilities by GPU model: built-in entries plus any loaded
/// from a capability file. Loaded entries shadow built-in ones.
#[derive(Debug, Default)]
pub struct MigCapabilityRegistry {
    extra: HashMap<GpuModel, MigCapability>,
}

impl MigCapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &GpuModel) -> Option<&MigCapability> {
        self.extra.get(model).or_else(|| BUILTIN_CAPABILITIES.get(model))
    }

    /// Extend the table from a YAML capability file. Returns the number of
    /// entries loaded.
    pub async fn load_extra(&mut self, path: &Path) -> anyhow::Result<usize> {
        tracing::info!("Loading GPU capability file from {:?}", path);

        let yaml_content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read capability file {}", path.display()))?;
        let entries: Vec<GpuMigInfo> = serde_yaml::from_str(&yaml_content)
            .with_context(|| format!("failed to parse capability file {}", path.display()))?;

        let loaded = entries.len();
        for entry in entries {
            let max_counts = entry
                .profiles
                .into_iter()
                .map(|(name, count)| (MigProfileName::new(name), count))
                .collect();
            self.extra.insert(
                GpuModel::new(entry.model),
                MigCapability {
                    total_slices: entry.total_slices,
                    max_counts,
                },
            );
        }

        tracing::info!("Loaded {} GPU capability entries", loaded);
        Ok(loaded)
    }
}
