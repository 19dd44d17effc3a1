//! `deploy-version`: record the deployed version on an infrastructure.

use crate::core::error::TaskError;
use crate::core::executor::{ExecArgs, TaskExecutor};
use crate::core::types::ExecResult;
use crate::directory::Lookup;

const KNOWN_ARGS: &[&str] = &["infra", "deploy_version", "flavor", "foundation", "app"];

/// Read-mutate-write of an existing infrastructure record's deploy version.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeployVersionTask;

fn lookup(args: &ExecArgs<'_>) -> Result<Lookup, TaskError> {
    let optional = |name: &str| -> Result<String, TaskError> {
        Ok(args.optional_text(name)?.unwrap_or_default().to_string())
    };
    Ok(Lookup {
        app: optional("app")?,
        infra: args.text("infra")?.to_string(),
        infra_flavor: optional("flavor")?,
        foundation: optional("foundation")?,
    })
}

impl TaskExecutor for DeployVersionTask {
    fn validate(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        args.check_known(KNOWN_ARGS)?;
        lookup(args)?;
        args.text("deploy_version")?;
        Ok(ExecResult::default())
    }

    fn execute(&self, args: &mut ExecArgs<'_>) -> Result<ExecResult, TaskError> {
        let lookup = lookup(args)?;
        let version = args.text("deploy_version")?.to_string();
        let ctx = args.context()?;

        let mut infra = ctx
            .directory
            .get_infra(&lookup)?
            .ok_or_else(|| TaskError::InfraNotFound(lookup.infra.clone()))?;
        infra.deploy_version = Some(version.clone());
        ctx.directory.put_infra(&mut infra)?;

        tracing::info!(lookup = %lookup, version = %version, "deploy version updated");
        Ok(ExecResult::default())
    }
}
