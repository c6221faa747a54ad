//! Terminal reporting of session milestones and transfer progress.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use peershift_session::{SessionEvent, TransferProgress, Verdict};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Prints session events until the session drops its sender.
pub async fn report_events(mut events: mpsc::Receiver<SessionEvent>, announce_id: bool) {
    let mut observer: Option<JoinHandle<()>> = None;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::SessionId(id) if announce_id => {
                println!("Session id: {id}");
                println!("Share it with the uploader: peershift upload {id} <file>");
            }
            SessionEvent::SessionId(_) => {}
            SessionEvent::Listening { port } => {
                println!("Waiting for the peer on port {port}...");
            }
            SessionEvent::Connected { peer } => {
                println!("Connected to {peer}");
            }
            SessionEvent::Transferring { info, progress } => {
                println!("{} ({} bytes)", info.name(), info.size());
                observer = Some(spawn_progress_bar(progress));
            }
            SessionEvent::Verifying => {
                if let Some(task) = observer.take() {
                    let _ = task.await;
                }
                println!("Verifying checksum...");
            }
            SessionEvent::Finished(Verdict::Match) => println!("Checksum verified"),
            SessionEvent::Finished(Verdict::Mismatch) => println!("Checksum mismatch"),
        }
    }

    // The session ended mid-transfer; stop redrawing.
    if let Some(task) = observer {
        task.abort();
    }
}

/// Polls the shared counter and redraws a byte progress bar on stdout.
fn spawn_progress_bar(progress: Arc<TransferProgress>) -> JoinHandle<()> {
    let bar = ProgressBar::with_draw_target(Some(progress.total()), ProgressDrawTarget::stdout());
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            bar.set_position(progress.transferred());
            if progress.is_complete() {
                break;
            }
        }
        bar.finish();
    })
}
