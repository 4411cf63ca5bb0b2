use std::future::Future;
use std::sync::Arc;

use contentdeck::{ContentError, MonitorOutcome};

use crate::DeployAction;
use crate::commands::shared::{Context, success, warning};
use crate::progress::ProgressReporter;
use crate::shutdown::is_shutdown_requested;

/// Handle `contentdeck deploy`.
pub(crate) async fn handle_deploy(
    action: DeployAction,
    ctx: &Context,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        DeployAction::Version => {
            let version = ctx.monitor.site_version().await?;
            if version.is_empty() {
                warning("The live site carries no version marker");
            } else {
                println!("{}", version);
            }
        }
        DeployAction::Watch { since } => {
            let reporter = Arc::new(ProgressReporter::new());
            let callback = reporter.as_callback();
            let result = ctx
                .publisher
                .deploy(&since, ctx.lock_metadata(), Some(&callback))
                .await;
            reporter.finish();
            report_outcome(result?)?;
        }
    }

    Ok(())
}

/// Run a content save, optionally followed by deploy monitoring.
///
/// With `deploy` the live version is captured before `save` runs so the
/// rebuild can be recognized.
pub(crate) async fn commit<T, F>(
    ctx: &Context,
    save: F,
    deploy: bool,
) -> Result<T, Box<dyn std::error::Error>>
where
    F: Future<Output = Result<T, ContentError>>,
{
    if !deploy {
        return Ok(save.await?);
    }

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let result = ctx
        .publisher
        .save_and_deploy(save, ctx.lock_metadata(), Some(&callback))
        .await;
    reporter.finish();

    let (saved, outcome) = result?;
    report_outcome(outcome)?;
    Ok(saved)
}

fn report_outcome(outcome: MonitorOutcome) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        MonitorOutcome::Succeeded(version) => {
            tracing::debug!(version = %version, "Deploy confirmed");
            Ok(())
        }
        MonitorOutcome::Failed(error) if error.is_unconfirmed() => {
            warning(format!("{error}; the change is committed and may still go live"));
            Ok(())
        }
        MonitorOutcome::Failed(error) => Err(error.into()),
        MonitorOutcome::Stopped => {
            if is_shutdown_requested() {
                warning("Stopped watching; the deploy continues on the host");
            }
            Ok(())
        }
        MonitorOutcome::AlreadyRunning => {
            Err("Another deploy is already being watched by this process".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use contentdeck::MonitorError;

    use super::*;

    #[test]
    fn unconfirmed_outcomes_are_not_errors() {
        assert!(report_outcome(MonitorOutcome::Succeeded("v2".into())).is_ok());
        assert!(report_outcome(MonitorOutcome::Stopped).is_ok());
        assert!(
            report_outcome(MonitorOutcome::Failed(MonitorError::MaxAttempts(30))).is_ok()
        );
    }

    #[test]
    fn failed_deploys_are_errors() {
        let err = report_outcome(MonitorOutcome::Failed(MonitorError::DeployFailed(
            "build broke".into(),
        )))
        .expect_err("failed deploy");
        assert!(err.to_string().contains("build broke"));
        assert!(report_outcome(MonitorOutcome::AlreadyRunning).is_err());
    }
}
