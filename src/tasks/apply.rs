//! `apply`: run the external provisioner and reconcile the result into the
//! directory.
//!
//! Arguments:
//! - `pwd` (required): working directory for the provisioner
//! - `infra` (required): infrastructure type
//! - `flavor`, `foundation`, `app`: remaining lookup parts
//! - `state`, `state_out`: state file paths (default: scratch directory)
//! - `binary`: provisioner executable (default: configured binary)
//!
//! The provisioner is idempotent, so the task can be re-run. Even when it
//! fails, a state file it left behind is stored and the record is marked
//! partial before the failure is returned.
//!
//! One state snapshot is kept per infrastructure record, keyed like the
//! record by `(infra, root|foundation-<name>)`. Before the run the snapshot
//! is written to `state`, replacing whatever a caller-supplied path held.

use crate::core::context::SharedContext;
use crate::core::error::TaskError;
use crate::core::executor::{ExecArgs, TaskExecutor};
use crate::core::types::ExecResult;
use crate::directory::sqlite::infra_key;
use crate::directory::{Infra, InfraState, Lookup};
use crate::transport::{exec_command, CommandSpec};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

const KNOWN_ARGS: &[&str] = &[
    "pwd",
    "infra",
    "flavor",
    "foundation",
    "app",
    "state",
    "state_out",
    "binary",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyTask;

#[derive(Debug)]
struct ApplyArgs {
    pwd: PathBuf,
    lookup: Lookup,
    state: Option<PathBuf>,
    state_out: Option<PathBuf>,
    binary: Option<String>,
}

impl ApplyArgs {
    fn parse(args: &ExecArgs<'_>) -> Result<Self, TaskError> {
        args.check_known(KNOWN_ARGS)?;
        let text = |name: &str| -> Result<String, TaskError> {
            Ok(args.optional_text(name)?.unwrap_or_default().to_string())
        };
        let path = |name: &str| -> Result<Option<PathBuf>, TaskError> {
            Ok(args.optional_text(name)?.map(PathBuf::from))
        };

        Ok(Self {
            pwd: PathBuf::from(args.text("pwd")?),
            lookup: Lookup {
                app: text("app")?,
                infra: args.text("infra")?.to_string(),
                infra_flavor: text("flavor")?,
                foundation: text("foundation")?,
            },
            state: path("state")?,
            state_out: path("state_out")?,
            binary: args.optional_text("binary")?.map(str::to_string),
        })
    }
}

/// Blob key holding the raw provisioner state for an infrastructure.
/// Scoped exactly like the infra record it belongs to.
pub fn state_blob_key(lookup: &Lookup) -> String {
    format!("infra-state/{}/{}", lookup.infra, infra_key(lookup))
}

/// Extract outputs from a provisioner state document.
///
/// Accepts a top-level `outputs` object or, for older state formats, the
/// `outputs` of the root entry in `modules`. Each output is either a bare
/// value or `{"value": ...}`. Non-text values are rendered as JSON.
pub fn read_outputs(data: &[u8]) -> Result<IndexMap<String, String>, String> {
    let doc: JsonValue =
        serde_json::from_slice(data).map_err(|e| format!("invalid state JSON: {}", e))?;

    let outputs = match doc.get("outputs") {
        Some(outputs) => Some(outputs),
        None => root_module(&doc).and_then(|m| m.get("outputs")),
    };

    let mut result = IndexMap::new();
    let Some(outputs) = outputs else {
        return Ok(result);
    };
    let outputs = outputs
        .as_object()
        .ok_or_else(|| "outputs must be an object".to_string())?;

    for (name, raw) in outputs {
        let value = match raw {
            JsonValue::Object(obj) if obj.contains_key("value") => &obj["value"],
            other => other,
        };
        let text = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            JsonValue::Bool(_) | JsonValue::Number(_) => value.to_string(),
            nested => serde_json::to_string(nested).map_err(|e| e.to_string())?,
        };
        result.insert(name.clone(), text);
    }
    Ok(result)
}

fn root_module(doc: &JsonValue) -> Option<&JsonValue> {
    let modules = doc.get("modules")?.as_array()?;
    let is_root = |m: &&JsonValue| {
        m.get("path")
            .and_then(JsonValue::as_array)
            .is_some_and(|p| p.len() == 1 && p[0] == "root")
    };
    modules.iter().find(is_root).or_else(|| modules.first())
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, TaskError> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TaskError::Io(e)),
    }
}

/// Store the snapshot and write the infra record.
fn persist(
    ctx: &SharedContext,
    lookup: &Lookup,
    snapshot: &[u8],
    state: InfraState,
    outputs: Option<IndexMap<String, String>>,
) -> Result<(), TaskError> {
    ctx.directory.put_blob(&state_blob_key(lookup), snapshot)?;

    let mut infra = ctx
        .directory
        .get_infra(lookup)?
        .unwrap_or_else(|| Infra::new(lookup.clone()));
    infra.lookup = lookup.clone();
    infra.state = state;
    if let Some(outputs) = outputs {
        infra.outputs = outputs;
    }
    ctx.directory.put_infra(&mut infra)?;
    Ok(())
}

/// Persist a snapshot as partial progress. The caller is already returning
/// an error, so a failure here is only logged.
fn store_partial(
    ctx: &SharedContext,
    lookup: &Lookup,
    snapshot: &[u8],
    outputs: Option<IndexMap<String, String>>,
    state_out: &Path,
) {
    match persist(ctx, lookup, snapshot, InfraState::Partial, outputs) {
        Ok(()) => ctx.ui.message("Infrastructure partially created"),
        Err(save) => tracing::error!(
            error = %save,
            path = %state_out.display(),
            "failed to store partial state"
        ),
    }
}

impl TaskExecutor for ApplyTask {
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        ApplyArgs::parse(args)?;
        Ok(ExecResult::default())
    }

    fn execute(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        let parsed = ApplyArgs::parse(args)?;
        let ctx = args.context()?;

        let scratch = tempfile::tempdir()?;
        let state = parsed
            .state
            .clone()
            .unwrap_or_else(|| scratch.path().join("state.in"));
        let state_out = parsed
            .state_out
            .clone()
            .unwrap_or_else(|| scratch.path().join("state.out"));

        // Restore the last known state so the run picks up where it left off.
        let key = state_blob_key(&parsed.lookup);
        if let Some(prior) = ctx.directory.get_blob(&key)? {
            if !prior.is_empty() {
                if parsed.state.is_some() && state.exists() {
                    tracing::warn!(
                        path = %state.display(),
                        "replacing state file with the stored snapshot"
                    );
                }
                std::fs::write(&state, &prior)?;
            }
        }
        // A stale output file would be mistaken for this run's result.
        if state_out.exists() {
            std::fs::remove_file(&state_out)?;
        }

        let binary = parsed
            .binary
            .clone()
            .unwrap_or_else(|| ctx.provisioner.binary.clone());
        let mut spec = CommandSpec::new(binary)
            .arg("apply")
            .arg("-state")
            .arg(state.display().to_string())
            .arg("-state-out")
            .arg(state_out.display().to_string())
            .cwd(&parsed.pwd);
        for (name, value) in &ctx.infra_creds {
            spec = spec.env(format!("{}{}", ctx.provisioner.env_prefix, name), value.as_str());
        }

        ctx.ui.header(&format!("Applying infrastructure {}", parsed.lookup));
        tracing::info!(command = %spec, pwd = %parsed.pwd.display(), "running provisioner");

        let failure = match exec_command(&spec) {
            Err(e) => Some(TaskError::Transport(e)),
            Ok(out) => {
                let combined = out.combined();
                args.output.write_all(combined.as_bytes())?;
                if out.success() {
                    None
                } else {
                    Some(TaskError::Provision {
                        exit_code: out.exit_code,
                        output: combined,
                    })
                }
            }
        };

        let snapshot = read_if_exists(&state_out)?;
        match (failure, snapshot) {
            (None, Some(data)) => match read_outputs(&data) {
                Ok(outputs) => {
                    persist(ctx, &parsed.lookup, &data, InfraState::Ready, Some(outputs))?;
                    ctx.ui.message("Infrastructure ready");
                    Ok(ExecResult::default())
                }
                Err(message) => {
                    tracing::warn!(lookup = %parsed.lookup, "unreadable state, storing it as partial");
                    store_partial(ctx, &parsed.lookup, &data, None, &state_out);
                    Err(TaskError::State {
                        path: state_out,
                        message,
                    })
                }
            },
            (None, None) => Err(TaskError::State {
                path: state_out,
                message: "provisioner succeeded but wrote no state".to_string(),
            }),
            (Some(err), Some(data)) => {
                tracing::warn!(lookup = %parsed.lookup, "provisioner failed, storing partial state");
                let outputs = read_outputs(&data).ok();
                store_partial(ctx, &parsed.lookup, &data, outputs, &state_out);
                Err(err)
            }
            (Some(err), None) => Err(err),
        }
    }
}
