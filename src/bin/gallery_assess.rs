use env_logger::{Builder, Env};
use gallery_audit::GalleryAuditBuilder;
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    drop(Builder::from_env(Env::default().filter_or("RUST_LOG", "info")).try_init());
    let audit = match GalleryAuditBuilder::from_env().build() {
        Ok(audit) => audit,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };
    match audit.assess_once() {
        Ok(run) => {
            let needing = run.assessments.iter().filter(|a| a.needs_improvement).count();
            info!(
                "{} page(s) assessed, {} need improvement, {} skipped",
                run.assessments.len(),
                needing,
                run.skipped.len()
            );
            if needing == 0 && run.skipped.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            error!("assessment failed: {err}");
            ExitCode::from(2)
        }
    }
}
