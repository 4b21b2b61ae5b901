//! `vidscribe submit`: convert, upload and request a transcription.

use anyhow::Result;
use dialoguer::{Input, theme::ColorfulTheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use vidscribe_core::http::get_http_client;
use vidscribe_core::{
    CancellationToken, HttpVideoApi, PipelineState, Settings, SubmissionPipeline, transcoder,
};

use crate::app;
use crate::args::SubmitArgs;
use crate::form::FormView;

/// How long to let the status renderer catch up after the pipeline returns
const RENDER_GRACE: Duration = Duration::from_millis(500);

pub async fn run(args: SubmitArgs) -> Result<()> {
    let mut settings = Settings::load();
    if let Some(url) = args.api_url {
        settings.api_url = url;
    }

    let api = HttpVideoApi::new(
        get_http_client(settings.timeout_secs)?.clone(),
        settings.api_base_url()?,
    );
    let pipeline = Arc::new(SubmissionPipeline::new(
        transcoder::shared(settings.engine_resources()),
        Arc::new(api),
    ));

    let mut form = FormView::new(pipeline.clone());
    form.select_file(&args.video).await?;
    if let Some(preview) = form.preview() {
        eprintln!("Selected {preview}");
    }

    let (token, handle) = CancellationToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let render = tokio::spawn(render_status(
        pipeline.subscribe(),
        pipeline.transcoder().subscribe_progress(),
    ));

    let prompt = args.prompt;
    let interactive = args.interactive;
    let result = form
        .submit(
            move || read_prompt(prompt, interactive),
            &token,
            |id| println!("{id}"),
        )
        .await;

    let _ = tokio::time::timeout(RENDER_GRACE, render).await;
    // The shared engine outlives main(); remove its scratch directory now.
    pipeline.transcoder().release();

    if let Err(e) = result {
        app::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}

/// Prompt from the command line, or asked for interactively.
fn read_prompt(prompt: Option<String>, interactive: bool) -> Result<Option<String>> {
    if !interactive {
        return Ok(prompt);
    }

    let text: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Transcription prompt (keywords, comma separated)")
        .allow_empty(true)
        .interact_text()?;
    Ok(Some(text))
}

enum Event {
    State(Result<PipelineState, broadcast::error::RecvError>),
    Progress(bool),
}

/// Print one status line per transition, with conversion percentage.
async fn render_status(
    mut transitions: broadcast::Receiver<PipelineState>,
    mut progress: watch::Receiver<f32>,
) {
    let mut state = PipelineState::Idle;
    let mut progress_alive = true;

    loop {
        let event = {
            let changed = async {
                if progress_alive {
                    progress.changed().await.is_ok()
                } else {
                    std::future::pending::<bool>().await
                }
            };
            tokio::select! {
                next = transitions.recv() => Event::State(next),
                alive = changed => Event::Progress(alive),
            }
        };

        match event {
            // Back to idle means the submission failed; the error is printed
            // by the caller.
            Event::State(Ok(PipelineState::Idle)) => break,
            Event::State(Ok(next)) => {
                state = next;
                app::print_state(next, None);
                if next == PipelineState::Succeeded {
                    break;
                }
            }
            Event::State(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Event::State(Err(broadcast::error::RecvError::Closed)) => break,
            Event::Progress(true) => {
                if state == PipelineState::Converting {
                    let ratio = *progress.borrow_and_update();
                    app::print_state(state, Some(ratio));
                }
            }
            Event::Progress(false) => progress_alive = false,
        }
    }
}
