//! RG-008: Shared execution context handed to every task.

use super::config::ProvisionerConfig;
use crate::directory::Backend;
use indexmap::IndexMap;
use std::io::Write;

/// User-facing message sink.
pub trait Ui {
    /// A section heading.
    fn header(&self, msg: &str);

    /// A normal status line.
    fn message(&self, msg: &str);

    /// Unformatted output, e.g. from an external tool.
    fn raw(&self, msg: &str);
}

/// Writes to stdout with a light prefix per message kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn header(&self, msg: &str) {
        println!("==> {}", msg);
    }

    fn message(&self, msg: &str) {
        println!("    {}", msg);
    }

    fn raw(&self, msg: &str) {
        print!("{}", msg);
        let _ = std::io::stdout().flush();
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUi;

impl Ui for NullUi {
    fn header(&self, _msg: &str) {}
    fn message(&self, _msg: &str) {}
    fn raw(&self, _msg: &str) {}
}

/// Long-lived resources shared by every task in a run.
pub struct SharedContext {
    /// Provider credentials by name
    pub infra_creds: IndexMap<String, String>,

    pub ui: Box<dyn Ui>,

    pub directory: Box<dyn Backend>,

    /// How to invoke the external provisioner
    pub provisioner: ProvisionerConfig,
}

impl SharedContext {
    pub fn new(directory: Box<dyn Backend>, ui: Box<dyn Ui>) -> Self {
        Self {
            infra_creds: IndexMap::new(),
            ui,
            directory,
            provisioner: ProvisionerConfig::default(),
        }
    }

    pub fn with_creds(mut self, creds: IndexMap<String, String>) -> Self {
        self.infra_creds = creds;
        self
    }

    pub fn with_provisioner(mut self, provisioner: ProvisionerConfig) -> Self {
        self.provisioner = provisioner;
        self
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credential values stay out of debug output.
        f.debug_struct("SharedContext")
            .field("infra_creds", &self.infra_creds.keys().collect::<Vec<_>>())
            .field("provisioner", &self.provisioner)
            .finish_non_exhaustive()
    }
}

/// A context backed by a fresh SQLite directory under `dir`.
#[cfg(test)]
pub(crate) fn test_context(dir: &std::path::Path) -> SharedContext {
    let backend = crate::directory::SqliteBackend::open(dir.join("directory")).unwrap();
    SharedContext::new(Box::new(backend), Box::new(NullUi))
}
