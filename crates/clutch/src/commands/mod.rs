pub mod bind;
pub mod interfaces;
pub mod restart;
pub mod status;

use anyhow::{Context, Result};
use clutch_core::{system, ClutchConfig, CommitStage, Error, InterfaceBinder, Rebind};
use std::path::Path;
use tracing::debug;

/// Load the configuration and wire a binder against the local host
pub async fn connect(config_path: Option<&Path>) -> Result<InterfaceBinder> {
    let config = match config_path {
        Some(path) => ClutchConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => match ClutchConfig::default_path() {
            Some(path) => ClutchConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => ClutchConfig::default(),
        },
    };

    debug!("Supervising {} ({})", config.app.bundle_id, config.app.process_name);
    system::connect(&config)
        .await
        .context("Failed to open binding store")
}

/// Turn a protocol error into an operator-facing message
pub fn explain(error: Error) -> anyhow::Error {
    let hint = match &error {
        Error::StoreCommitFailed { stage, .. } => Some(commit_hint(*stage)),
        e if e.needs_permission() => Some(
            "run clutch as the user that owns the application, or with elevated privileges",
        ),
        e if e.needs_relaunch() => Some("the new binding is saved; start the application by hand"),
        e if e.is_retryable() => Some("nothing was changed past the failed step; try again"),
        _ => None,
    };
    let Some(hint) = hint else {
        return error.into();
    };
    anyhow::Error::new(error).context(format!("Rebind failed ({hint})"))
}

fn commit_hint(stage: CommitStage) -> &'static str {
    match stage {
        CommitStage::Target => {
            "the previous binding is still in effect but the application may have been stopped; \
             try again or start it by hand"
        }
        CommitStage::Applied => {
            "the application was relaunched on the new binding but that could not be recorded; try again"
        }
        CommitStage::Setting => "the setting was not changed; try again",
    }
}

/// Print the outcome of a rebind
pub fn report(binder: &InterfaceBinder, outcome: Rebind, what: &str) {
    let bundle_id = &binder.app().bundle_id;
    match outcome {
        Rebind::Unchanged => println!("{bundle_id} is already {what}"),
        Rebind::Applied {
            pid: Some(pid), ..
        } => println!("{bundle_id} {what}, relaunched as pid {pid}"),
        Rebind::Applied { pid: None, .. } => {
            println!("{bundle_id} {what}; it will pick this up at its next start")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_hints_name_what_survived() {
        assert!(commit_hint(CommitStage::Target).contains("previous binding"));
        assert!(commit_hint(CommitStage::Applied).contains("relaunched"));
        assert!(commit_hint(CommitStage::Setting).contains("not changed"));
    }

    #[test]
    fn test_explain_permission_error() {
        let error = explain(Error::PermissionDenied {
            bundle_id: "com.example.app".to_string(),
        });
        assert!(error.to_string().contains("elevated privileges"));
    }

    #[test]
    fn test_explain_passes_through_other_errors() {
        let error = explain(Error::InterfaceNotFound("utun9".to_string()));
        assert_eq!(error.to_string(), "Interface not found: utun9");
    }
}
