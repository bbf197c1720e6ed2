use env_logger::{Builder, Env};
use gallery_audit::{GalleryAuditBuilder, RunStatus};
use log::error;
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
    match audit.run() {
        Ok(summary) if summary.status == RunStatus::Success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            error!("audit aborted: {err}");
            ExitCode::from(2)
        }
    }
}
