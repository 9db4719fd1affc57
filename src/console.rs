//! Console channel — reads lines from stdin and forwards each one as an
//! observed change of the linked input value.
//!
//! The reply rendering lives in the input watcher, not here; this loop only
//! produces input changes. Runs until the `shutdown` token is cancelled
//! (Ctrl-C) or stdin is closed.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Run the console loop until shutdown or EOF.
pub async fn run(
    input_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!("console started — type a prompt and press Enter. Ctrl-C to quit.");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("console shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("console read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("console stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim().to_string();
                        if input.is_empty() { continue; }

                        debug!(input = %input, "console received line");

                        if input_tx.send(input).await.is_err() {
                            warn!("input watcher gone, console exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
