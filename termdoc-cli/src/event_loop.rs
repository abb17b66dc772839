//! The viewer's single consumer loop.
//!
//! Key events, control-file page requests and reload results are produced on
//! their own tasks and delivered over capacity-1 channels. Only the loop
//! below touches the [`Viewer`].

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event};
use termdoc_core::{
    check_for_reload, parse_page_number, Command, ControlChannel, DocumentProvider, Outcome, ReloadCheck,
    ReloadConfig, Viewer, VisualSampling,
};
use termdoc_render::{compose_frame, current_status, ClearMode, FrameRequest, Overlay};
use termdoc_tty::{EventMapper, GeometryProbe, KittyRenderer, PromptKind, UiEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerExit {
    Quit,
    /// The user asked to go back to file selection.
    Back,
}

/// What handling one input means for the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Status,
    Paint(ClearMode),
    Exit(ViewerExit),
}

pub struct EventLoop<W: Write> {
    viewer: Viewer,
    probe: GeometryProbe,
    renderer: KittyRenderer<W>,
    mapper: EventMapper,
    overlay: Option<Overlay>,
}

impl<W: Write> EventLoop<W> {
    pub fn new(viewer: Viewer, probe: GeometryProbe, renderer: KittyRenderer<W>) -> Self {
        Self {
            viewer,
            probe,
            renderer,
            mapper: EventMapper::new(),
            overlay: None,
        }
    }

    pub async fn run(
        mut self,
        provider: Arc<dyn DocumentProvider>,
        control: Option<ControlChannel>,
    ) -> Result<ViewerExit> {
        // measure while nothing else reads from the terminal
        self.probe.geometry();
        self.probe.disable_queries();
        self.paint(ClearMode::Full)?;

        let (stop_tx, stop_rx) = watch::channel(());
        let (key_tx, mut key_rx) = mpsc::channel(1);
        let (control_tx, mut control_rx) = mpsc::channel(1);
        let (reload_tx, mut reload_rx) = mpsc::channel(1);

        let mut tasks = vec![
            spawn_input(key_tx, stop_rx.clone()),
            spawn_reload_watcher(
                self.viewer.document().info().path.clone(),
                self.viewer.state().last_modified,
                provider,
                self.viewer.config().sampling,
                self.viewer.config().reload,
                reload_tx,
                stop_rx.clone(),
            ),
        ];
        if let Some(control) = control {
            tasks.push(spawn_control_poller(
                control,
                self.viewer.config().reload.control_interval,
                control_tx,
                stop_rx,
            ));
        } else {
            drop(control_tx);
        }

        let result = loop {
            let step = tokio::select! {
                event = key_rx.recv() => match event {
                    Some(event) => self.handle_key(event),
                    None => Step::Exit(ViewerExit::Quit),
                },
                Some(page) = control_rx.recv() => {
                    info!(page, "control channel requested page");
                    let outcome = self.viewer.jump_to_document_page(page);
                    self.after_change(outcome)
                }
                Some(check) = reload_rx.recv() => {
                    let outcome = self.viewer.apply_reload(check);
                    self.after_change(outcome)
                }
            };

            let painted = match step {
                Step::Exit(exit) => break Ok(exit),
                Step::Paint(clear) => self.paint(clear),
                Step::Status => self.paint_status(),
            };
            if let Err(err) = painted {
                break Err(err);
            }
        };

        drop(stop_tx);
        drop(key_rx);
        drop(control_rx);
        drop(reload_rx);
        for task in tasks {
            if let Err(err) = task.await {
                warn!(?err, "background task ended abnormally");
            }
        }
        result
    }

    fn handle_key(&mut self, event: Event) -> Step {
        let ui_event = self.mapper.map_event(event);
        match ui_event {
            UiEvent::Command(command) => self.run_command(command),
            UiEvent::OpenPrompt(_) | UiEvent::PromptChanged { .. } | UiEvent::PromptCancel => Step::Status,
            UiEvent::PromptSubmit { kind, input } => {
                let command = match kind {
                    PromptKind::Search if input.trim().is_empty() => Some(Command::ClearSearch),
                    PromptKind::Search => Some(Command::Search { query: input.clone() }),
                    PromptKind::GotoPage => parse_page_number(&input).map(|number| Command::GotoPage { number }),
                };
                match command {
                    Some(command) => self.run_command(command),
                    None => {
                        debug!(%input, "ignoring malformed page number");
                        Step::Status
                    }
                }
            }
            UiEvent::ShowHelp => {
                self.overlay = Some(Overlay::Help);
                Step::Paint(ClearMode::Full)
            }
            UiEvent::ShowDebug => {
                self.overlay = Some(Overlay::Debug(self.probe.diagnostics()));
                Step::Paint(ClearMode::Full)
            }
            UiEvent::CloseOverlay => {
                self.overlay = None;
                Step::Paint(ClearMode::Full)
            }
            UiEvent::Refresh => {
                self.probe.refresh();
                Step::Paint(ClearMode::Full)
            }
            UiEvent::Resize => Step::Paint(ClearMode::Full),
            UiEvent::Quit => Step::Exit(ViewerExit::Quit),
            UiEvent::Back => Step::Exit(ViewerExit::Back),
            UiEvent::None => Step::Status,
        }
    }

    fn run_command(&mut self, command: Command) -> Step {
        let outcome = self.viewer.apply(command);
        self.after_change(outcome)
    }

    fn after_change(&self, outcome: Outcome) -> Step {
        match outcome {
            _ if self.overlay.is_some() => Step::Status,
            Outcome::Unchanged => Step::Status,
            Outcome::Redraw => Step::Paint(ClearMode::Full),
            Outcome::Reloaded => Step::Paint(ClearMode::Overwrite),
        }
    }

    fn paint(&mut self, clear: ClearMode) -> Result<()> {
        let geometry = self.probe.geometry();
        let prompt = self.mapper.pending_input();
        let frame = compose_frame(&FrameRequest {
            viewer: &self.viewer,
            geometry,
            prompt: prompt.as_deref(),
            overlay: self.overlay.as_ref(),
            clear,
        });
        self.renderer.paint(&frame)
    }

    fn paint_status(&mut self) -> Result<()> {
        if self.overlay.is_some() {
            return Ok(());
        }
        let geometry = self.probe.geometry();
        let prompt = self.mapper.pending_input();
        let status = current_status(&self.viewer, prompt.as_deref(), geometry.columns);
        self.renderer.paint_status(geometry.rows.saturating_sub(1), &status)
    }
}

fn spawn_input(tx: mpsc::Sender<Event>, stop: watch::Receiver<()>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || loop {
        if stop.has_changed().is_err() {
            break;
        }
        match event::poll(INPUT_POLL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                warn!(?err, "terminal input poll failed");
                break;
            }
        }
        let event = match event::read() {
            Ok(event) => event,
            Err(err) => {
                warn!(?err, "terminal input read failed");
                break;
            }
        };
        if tx.blocking_send(event).is_err() {
            break;
        }
    })
}

fn spawn_reload_watcher(
    path: PathBuf,
    mut last_modified: Option<std::time::SystemTime>,
    provider: Arc<dyn DocumentProvider>,
    sampling: VisualSampling,
    config: ReloadConfig,
    tx: mpsc::Sender<ReloadCheck>,
    mut stop: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            let check = check_for_reload(&path, last_modified, provider.as_ref(), &sampling, &config).await;
            match &check {
                ReloadCheck::Unchanged => continue,
                ReloadCheck::Rejected { modified, .. } => last_modified = Some(*modified),
                ReloadCheck::Reloaded(document) => last_modified = document.modified.or(last_modified),
            }
            if tx.send(check).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_control_poller(
    mut control: ControlChannel,
    interval: Duration,
    tx: mpsc::Sender<usize>,
    mut stop: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            if let Some(page) = control.poll() {
                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(page) {
                    break;
                }
            }
        }
        debug!(path = %control.path().display(), "control channel closed");
    })
}
