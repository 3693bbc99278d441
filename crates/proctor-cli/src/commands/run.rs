//! The `proctor run` command.
//!
//! Drives one session end to end: eligibility, selection, response
//! capture, review, submit, then (unless `--no-watch`) observes the
//! evaluation until it reaches a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use proctor_backend::{create_backend, load_config_from};
use proctor_core::engine::{SessionEngine, SessionEngineConfig, StartOutcome};
use proctor_core::gate::EligibilityOutcome;
use proctor_core::model::TestKind;

use crate::commands::observe::watch_evaluation;
use crate::topics::TopicsFile;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    kind: String,
    choice: usize,
    response: Option<String>,
    response_file: Option<PathBuf>,
    topics: Option<PathBuf>,
    user: Option<String>,
    config_path: Option<PathBuf>,
    no_watch: bool,
) -> Result<()> {
    let kind: TestKind = kind
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("invalid --kind")?;

    let response_text = match (response, response_file) {
        (Some(text), None) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read response file: {}", path.display()))?,
        (Some(_), Some(_)) => bail!("pass either --response or --response-file, not both"),
        (None, None) => bail!("a response is required: --response or --response-file"),
    };

    let config = load_config_from(config_path.as_deref())?;
    let user_id = user.unwrap_or_else(|| config.user_id.clone());

    let mut handles = create_backend(&config.backend)?;
    if let Some(path) = topics {
        let file = TopicsFile::load(&path)?;
        let problems = file.problems();
        if !problems.is_empty() {
            bail!("topic bank problems: {}", problems.join("; "));
        }
        handles.topics = Arc::new(file.into_source());
    }

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

    println!("Starting {} session for {user_id}...", kind.display_name());
    let mut active = match engine.start_session(kind, &user_id).await? {
        StartOutcome::Started(active) => active,
        StartOutcome::Refused(outcome) => match outcome {
            EligibilityOutcome::QuotaExceeded(message) => bail!("quota exceeded: {message}"),
            EligibilityOutcome::PrerequisiteNotMet(message) => bail!("locked: {message}"),
            EligibilityOutcome::TransientError(reason) => bail!("backend unavailable: {reason}"),
            EligibilityOutcome::Eligible { .. } => unreachable!("eligible outcomes start sessions"),
        },
    };

    active.begin_selection()?;
    println!("\nOptions:");
    for (index, option) in active.session().choices().iter().enumerate() {
        println!("  [{index}] {option}");
    }

    active.select_choice(choice)?;
    println!(
        "\nSelected [{choice}] \"{}\" — {} on the clock",
        active.session().selection().unwrap_or_default(),
        active.session().formatted_remaining()
    );

    active.update_response(&response_text)?;
    let metric = active.session().metric();
    println!(
        "Captured {} words ({} chars)",
        metric.word_count, metric.char_count
    );

    active.advance().context("response rejected at review")?;

    let submission_id = active.submit().await?;
    println!("\nSubmitted: {submission_id}");

    if no_watch {
        println!("Check later with: proctor observe --submission-id {submission_id}");
        return Ok(());
    }

    watch_evaluation(&engine, submission_id).await
}
