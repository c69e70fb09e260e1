//! The restart loop driving one development session.

use tracing::{info, info_span, warn, Instrument};

use super::ProcessSupervisor;
use crate::{AppError, Result};

/// Run the server until the session ends.
///
/// Each iteration starts the server and waits for it to exit:
///
/// - an exit requested through `terminate` (a class change, an `ERROR` line)
///   relaunches the server unless `stop_after_start` is set;
/// - a non-zero exit nobody asked for terminates and, unless
///   `stop_after_start` is set, fails the session;
/// - a handle still present at the top of the loop means the previous
///   process ended without being terminated, which stops the loop with a
///   warning.
///
/// # Errors
///
/// Returns `AppError::Startup` when the server dies right after spawn and
/// `AppError::ServerExit` on a runtime failure.
pub async fn run_session(supervisor: &ProcessSupervisor, stop_after_start: bool) -> Result<()> {
    let span = info_span!(
        "session",
        server = supervisor.server_name(),
        stop_after_start
    );

    async {
        let mut runs = 0_u32;
        loop {
            if supervisor.has_process() {
                warn!("server process was not terminated cleanly before reloading");
                break;
            }

            if !supervisor.start(stop_after_start).await? {
                warn!("server start refused; ending session");
                break;
            }
            runs += 1;

            let Some(exit) = supervisor.wait_for_exit().await else {
                break;
            };
            info!(
                code = exit.code_or_signal(),
                requested = exit.requested,
                runs,
                "server process exited"
            );

            if exit.is_failure() {
                supervisor.terminate();
                if !stop_after_start {
                    return Err(supervisor.runtime_failure(exit));
                }
            }

            if stop_after_start {
                break;
            }

            info!("reloading server");
        }
        Ok::<_, AppError>(())
    }
    .instrument(span)
    .await
}
