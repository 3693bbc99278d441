//! The `proctor observe` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::Table;
use futures::StreamExt;
use uuid::Uuid;

use proctor_backend::{create_backend, load_config_from};
use proctor_core::engine::{SessionEngine, SessionEngineConfig};
use proctor_core::model::{EvaluationReport, EvaluationStatus};
use proctor_core::observer::Observation;

pub async fn execute(submission_id: String, config_path: Option<PathBuf>) -> Result<()> {
    let submission_id: Uuid = submission_id.parse().context("invalid --submission-id")?;
    let config = load_config_from(config_path.as_deref())?;
    let handles = create_backend(&config.backend)?;
    let engine = SessionEngine::new(
        handles.topics,
        handles.accounts,
        handles.store,
        handles.queue,
        SessionEngineConfig {
            call_timeout: config.call_timeout(),
            ..SessionEngineConfig::default()
        },
    );

    if let Some(submission) = engine.load_submission(submission_id).await? {
        println!(
            "{} submission by {} — \"{}\", {} words",
            submission.test_kind.display_name(),
            submission.user_id,
            submission.selection,
            submission.metric.word_count
        );
    } else {
        println!("Submission {submission_id} not found locally; observing anyway.");
    }

    watch_evaluation(&engine, submission_id).await
}

/// Print status transitions until the evaluation terminates, then render
/// the report. Shared with `run`.
pub async fn watch_evaluation(engine: &SessionEngine, submission_id: Uuid) -> Result<()> {
    println!("\nObserving evaluation {submission_id}...");
    let mut stream = engine.observe_result(submission_id).await?;

    while let Some(item) = stream.next().await {
        match item {
            Ok(Observation::Status(status)) => {
                println!("  status: {status}");
                if status == EvaluationStatus::Failed {
                    anyhow::bail!("evaluation failed for {submission_id}");
                }
            }
            Ok(Observation::Report(report)) => {
                print_report(&report);
                return Ok(());
            }
            Err(e) => eprintln!("  warning: {e}"),
        }
    }

    println!("Evaluation did not complete; re-run `proctor observe` to keep watching.");
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    println!("\nEvaluation completed at {}", report.computed_at);
    if let Some(summary) = &report.summary {
        println!("{summary}");
    }

    if let Some(scores) = report.scores.as_object() {
        let mut table = Table::new();
        table.set_header(vec!["Score", "Value"]);
        for (name, value) in scores {
            table.add_row(vec![name.clone(), value.to_string()]);
        }
        println!("{table}");
    } else {
        println!("Scores: {}", report.scores);
    }
}
