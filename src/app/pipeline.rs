// MedScan - app/pipeline.rs
//
// Staged progress synchronised with the real remote call.
//
// Two timelines run concurrently on the same task:
//   (a) the remote call, finishing whenever it finishes;
//   (b) the lead-in stages 0..N-1, each held in progress for its minimum
//       dwell, then completed before the next one starts.
// The last stage is entered only after BOTH have finished, and its own
// dwell is honoured before the outcome is reported. Progress never claims
// completion before the work is done, and no stage flashes by.

use crate::app::service::AnalysisService;
use crate::core::model::{EncodedImage, ScanProgress, StageSpec};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Drive `stages` alongside `remote` and return the remote outcome once the
/// final stage has completed. Progress goes to `tx`; a dropped receiver is
/// not an error.
pub async fn run_stages<F, T>(
    stages: &[StageSpec],
    remote: F,
    tx: &UnboundedSender<ScanProgress>,
) -> T
where
    F: Future<Output = T>,
{
    let Some((last, lead_in)) = stages.split_last() else {
        return remote.await;
    };
    let last_index = lead_in.len();

    let progression = async {
        for (index, stage) in lead_in.iter().enumerate() {
            let _ = tx.send(ScanProgress::StepStarted { index });
            tokio::time::sleep(stage.min_duration).await;
            let _ = tx.send(ScanProgress::StepCompleted { index });
        }
    };

    // Barrier: remote call AND every lead-in stage.
    let (outcome, ()) = tokio::join!(remote, progression);

    let _ = tx.send(ScanProgress::StepStarted { index: last_index });
    tokio::time::sleep(last.min_duration).await;
    let _ = tx.send(ScanProgress::StepCompleted { index: last_index });

    outcome
}

/// Spawn the analysis of `image` on the current runtime. The task is
/// detached and ends by sending exactly one `ScanProgress::Finished`.
pub fn spawn_analysis(
    service: Arc<dyn AnalysisService>,
    image: EncodedImage,
    stages: Vec<StageSpec>,
    tx: UnboundedSender<ScanProgress>,
) {
    tokio::spawn(async move {
        let outcome = run_stages(&stages, service.analyze(&image), &tx).await;
        match &outcome {
            Ok(_) => tracing::debug!(image = %image.label, "Remote analysis resolved"),
            Err(e) => tracing::warn!(image = %image.label, error = %e, "Remote analysis failed"),
        }
        let _ = tx.send(ScanProgress::Finished { outcome });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::UnifiedAnalysisResult;
    use crate::util::error::AnalysisError;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn stages(dwells_ms: &[u64]) -> Vec<StageSpec> {
        dwells_ms
            .iter()
            .enumerate()
            .map(|(i, &ms)| StageSpec::new(format!("stage {i}"), Duration::from_millis(ms)))
            .collect()
    }

    fn label(msg: &ScanProgress) -> String {
        match msg {
            ScanProgress::StepStarted { index } => format!("start {index}"),
            ScanProgress::StepCompleted { index } => format!("done {index}"),
            ScanProgress::Finished { outcome } => format!("finished ok={}", outcome.is_ok()),
        }
    }

    /// Run the pipeline in a task and collect (event, ms since start).
    async fn record(
        specs: Vec<StageSpec>,
        remote_latency: Duration,
        remote_ok: bool,
    ) -> Vec<(String, u128)> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = Instant::now();

        tokio::spawn(async move {
            let remote = async move {
                tokio::time::sleep(remote_latency).await;
                if remote_ok {
                    Ok(UnifiedAnalysisResult::default())
                } else {
                    Err(AnalysisError::Rejected {
                        reason: "offline".to_string(),
                    })
                }
            };
            let outcome = run_stages(&specs, remote, &tx).await;
            let _ = tx.send(ScanProgress::Finished { outcome });
        });

        let mut events = Vec::new();
        while let Some(msg) = rx.recv().await {
            events.push((label(&msg), start.elapsed().as_millis()));
        }
        events
    }

    /// Labels must match exactly; times within a couple of timer ticks.
    fn assert_timeline(events: &[(String, u128)], expected: &[(&str, u128)]) {
        let labels: Vec<&str> = events.iter().map(|(l, _)| l.as_str()).collect();
        let expected_labels: Vec<&str> = expected.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, expected_labels);
        for ((label, got), (_, want)) in events.iter().zip(expected) {
            assert!(
                *got >= *want && *got <= *want + 3,
                "{label}: at {got} ms, expected {want} ms"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_remote_still_honours_every_dwell() {
        let events = record(stages(&[100, 200, 300]), Duration::ZERO, true).await;

        assert_timeline(
            &events,
            &[
                ("start 0", 0),
                ("done 0", 100),
                ("start 1", 100),
                ("done 1", 300),
                ("start 2", 300),
                ("done 2", 600),
                ("finished ok=true", 600),
            ],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_stage_waits_for_slow_remote() {
        let events = record(stages(&[100, 200, 300]), Duration::from_secs(5), true).await;

        // Lead-in pacing is unaffected by the slow network; the final stage
        // starts only once the remote call resolved, then dwells in full.
        assert_timeline(
            &events,
            &[
                ("start 0", 0),
                ("done 0", 100),
                ("start 1", 100),
                ("done 1", 300),
                ("start 2", 5_000),
                ("done 2", 5_300),
                ("finished ok=true", 5_300),
            ],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_still_runs_final_stage() {
        let events = record(stages(&[50, 50]), Duration::from_millis(10), false).await;
        let labels: Vec<&str> = events.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            ["start 0", "done 0", "start 1", "done 1", "finished ok=false"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_stage_is_the_barrier_stage() {
        let events = record(stages(&[400]), Duration::from_secs(1), true).await;
        assert_timeline(
            &events,
            &[("start 0", 1_000), ("done 0", 1_400), ("finished ok=true", 1_400)],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_stages_returns_remote_outcome() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let out = run_stages(&[], async { 7 }, &tx).await;
        assert_eq!(out, 7);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
