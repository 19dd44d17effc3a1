//! RG-010: Directory record types and their lifecycle states.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Key identifying one record of each kind.
///
/// An empty `foundation` addresses the infrastructure's own root record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lookup {
    /// Application type, e.g. "go"
    #[serde(default)]
    pub app: String,

    /// Infrastructure type, e.g. "aws"
    #[serde(default)]
    pub infra: String,

    /// Infrastructure flavor, e.g. "vpc-public-private"
    #[serde(default)]
    pub infra_flavor: String,

    /// Foundation name, e.g. "consul"
    #[serde(default)]
    pub foundation: String,
}

impl Lookup {
    pub fn infra(infra: impl Into<String>) -> Self {
        Self {
            infra: infra.into(),
            ..Self::default()
        }
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        self.infra_flavor = flavor.into();
        self
    }

    pub fn with_foundation(mut self, foundation: impl Into<String>) -> Self {
        self.foundation = foundation.into();
        self
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.infra)?;
        if !self.infra_flavor.is_empty() {
            write!(f, "/{}", self.infra_flavor)?;
        }
        if !self.foundation.is_empty() {
            write!(f, " (foundation {})", self.foundation)?;
        }
        if !self.app.is_empty() {
            write!(f, " [app {}]", self.app)?;
        }
        Ok(())
    }
}

// ============================================================================
// Applications
// ============================================================================

/// Key identifying one version of one application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppLookup {
    /// Generated application identity
    #[serde(default)]
    pub app_id: String,

    /// Application version, e.g. "1.2.3"
    #[serde(default)]
    pub version: String,

    /// Hash of the application configuration
    #[serde(default)]
    pub config_hash: u64,
}

impl AppLookup {
    pub fn new(app_id: impl Into<String>, version: impl Into<String>, config_hash: u64) -> Self {
        Self {
            app_id: app_id.into(),
            version: version.into(),
            config_hash,
        }
    }
}

/// An application known to the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// Filled in from the storage key on read.
    #[serde(default)]
    pub lookup: AppLookup,

    pub name: String,

    /// Application type, e.g. "go"
    #[serde(default, rename = "type")]
    pub app_type: String,

    #[serde(default)]
    pub dependencies: Vec<AppLookup>,
}

/// Ordering used when listing applications: name, then identity, then
/// version compared by numeric dot-separated segments.
pub fn app_order(a: &App, b: &App) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.lookup.app_id.cmp(&b.lookup.app_id))
        .then_with(|| version_cmp(&a.lookup.version, &b.lookup.version))
}

fn version_cmp(a: &str, b: &str) -> Ordering {
    let segments = |v: &str| -> Vec<u64> {
        v.split(['.', '-', '+'])
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    let (sa, sb) = (segments(a), segments(b));
    let len = sa.len().max(sb.len());
    (0..len)
        .map(|i| {
            let x = sa.get(i).copied().unwrap_or(0);
            let y = sb.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.cmp(b))
}

// ============================================================================
// Infrastructure
// ============================================================================

/// Infrastructure state. Creation is not binary: it can be absent,
/// partially created, or fully created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraState {
    #[default]
    Invalid,
    Partial,
    Ready,
}

impl fmt::Display for InfraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "INVALID"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

/// An infrastructure record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Infra {
    pub lookup: Lookup,

    #[serde(default)]
    pub state: InfraState,

    /// Opaque outputs of the provisioning step
    #[serde(default)]
    pub outputs: IndexMap<String, String>,

    /// Version of the most recent deploy onto this infrastructure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_version: Option<String>,

    /// Assigned on first put. Do not modify.
    #[serde(default)]
    pub id: String,
}

impl Infra {
    pub fn new(lookup: Lookup) -> Self {
        Self {
            lookup,
            ..Self::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == InfraState::Ready
    }

    pub fn is_partial(&self) -> bool {
        self.state == InfraState::Partial
    }
}

// ============================================================================
// Deploys
// ============================================================================

/// Deploy state. A deploy is entered as `New` before it is attempted so
/// blobs stored with it stay addressable even if it fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    #[default]
    Invalid,
    New,
    Fail,
    Success,
}

/// A deploy of an application onto an infrastructure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub lookup: Lookup,

    #[serde(default)]
    pub state: DeployState,

    /// Opaque deploy information
    #[serde(default)]
    pub deploy: IndexMap<String, String>,

    /// Assigned on first put. Do not modify.
    #[serde(default)]
    pub id: String,
}

impl Deploy {
    /// A fresh deploy record in the `New` state.
    pub fn new(lookup: Lookup) -> Self {
        Self {
            lookup,
            state: DeployState::New,
            ..Self::default()
        }
    }

    /// Freshly created and not yet run.
    pub fn is_new(&self) -> bool {
        self.state == DeployState::New
    }

    pub fn mark_failed(&mut self) {
        self.state = DeployState::Fail;
    }

    pub fn mark_successful(&mut self) {
        self.state = DeployState::Success;
    }

    /// Reset to `New`, e.g. after the deployed resources were destroyed.
    pub fn mark_gone(&mut self) {
        self.state = DeployState::New;
    }
}

// ============================================================================
// Dev environments
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevState {
    #[default]
    Invalid,
    New,
    Ready,
}

/// A locally-built development environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dev {
    pub lookup: Lookup,

    #[serde(default)]
    pub state: DevState,

    /// Assigned on first put. Do not modify.
    #[serde(default)]
    pub id: String,
}

impl Dev {
    pub fn new(lookup: Lookup) -> Self {
        Self {
            lookup,
            state: DevState::New,
            id: String::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == DevState::Ready
    }

    pub fn mark_ready(&mut self) {
        self.state = DevState::Ready;
    }
}

// ============================================================================
// Builds
// ============================================================================

/// The result of a build. Existence implies completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub app: String,
    pub infra: String,
    pub infra_flavor: String,

    /// Resulting artifact from the build
    #[serde(default)]
    pub artifact: IndexMap<String, String>,
}

impl Build {
    pub fn lookup(&self) -> Lookup {
        Lookup {
            app: self.app.clone(),
            infra: self.infra.clone(),
            infra_flavor: self.infra_flavor.clone(),
            foundation: String::new(),
        }
    }
}
