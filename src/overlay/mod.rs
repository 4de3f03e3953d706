//! Intercept overlay lifecycle.
//!
//! Overlay surfaces are UI objects and must never be touched from the
//! background polling context, so the controller runs a dedicated worker
//! thread that owns the surface outright (the same shape as the database
//! worker owning its connection). `show`/`dismiss` hand commands across a
//! channel; `is_showing` reads an atomic mirror that only the worker
//! writes.
//!
//! The overlay is independent of any host screen: it can appear while the
//! blocking app itself is backgrounded, which is why it carries its own
//! minimal lifecycle instead of borrowing one.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::platform::OverlaySurface;

enum OverlayCommand {
    Show(String),
    Dismiss,
    Shutdown,
}

struct OverlayInner {
    sender: mpsc::Sender<OverlayCommand>,
    showing: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for OverlayInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(OverlayCommand::Shutdown) {
                error!("Failed to send shutdown to overlay thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join overlay thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the single always-on-top intercept overlay. Clones share the
/// same surface; at most one overlay instance is ever attached.
#[derive(Clone)]
pub struct OverlayController {
    inner: Arc<OverlayInner>,
}

impl OverlayController {
    /// Spawn the UI worker and build the surface on it. The factory runs
    /// on the worker thread, so the surface itself never crosses threads.
    pub fn new<F>(surface_factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn OverlaySurface>> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<OverlayCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let showing = Arc::new(AtomicBool::new(false));
        let showing_for_thread = Arc::clone(&showing);

        let worker = thread::Builder::new()
            .name("appfence-overlay".into())
            .spawn(move || {
                let mut surface = match surface_factory() {
                    Ok(surface) => {
                        let _ = ready_tx.send(Ok(()));
                        surface
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.context("failed to build overlay surface")));
                        return;
                    }
                };

                run_worker(&mut *surface, &command_rx, &showing_for_thread);
            })
            .with_context(|| "failed to spawn overlay worker thread")?;

        ready_rx
            .recv()
            .context("overlay worker exited before signaling readiness")??;

        Ok(Self {
            inner: Arc::new(OverlayInner {
                sender: command_tx,
                showing,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Request the overlay for a blocked app. No-op while already showing.
    pub fn show(&self, blocked_package: &str) {
        if self
            .inner
            .sender
            .send(OverlayCommand::Show(blocked_package.to_string()))
            .is_err()
        {
            error!("Overlay worker gone; cannot show overlay for {blocked_package}");
        }
    }

    /// Request the overlay be torn down. Safe to call when not showing.
    pub fn dismiss(&self) {
        if self.inner.sender.send(OverlayCommand::Dismiss).is_err() {
            error!("Overlay worker gone; cannot dismiss overlay");
        }
    }

    pub fn is_showing(&self) -> bool {
        self.inner.showing.load(Ordering::SeqCst)
    }
}

fn run_worker(
    surface: &mut dyn OverlaySurface,
    commands: &mpsc::Receiver<OverlayCommand>,
    showing: &AtomicBool,
) {
    while let Ok(command) = commands.recv() {
        match command {
            OverlayCommand::Show(package) => {
                if showing.load(Ordering::SeqCst) {
                    continue;
                }
                match surface.attach(&package) {
                    Ok(()) => {
                        showing.store(true, Ordering::SeqCst);
                        info!("Overlay shown for {package}");
                    }
                    Err(err) => {
                        // Never believe an overlay is present when attach
                        // failed; the next cycle may retry.
                        showing.store(false, Ordering::SeqCst);
                        error!("Failed to attach overlay for {package}: {err:#}");
                    }
                }
            }
            OverlayCommand::Dismiss => {
                if !showing.load(Ordering::SeqCst) {
                    continue;
                }
                if let Err(err) = surface.detach() {
                    warn!("Overlay detach raced or failed: {err:#}");
                }
                showing.store(false, Ordering::SeqCst);
            }
            OverlayCommand::Shutdown => {
                if showing.load(Ordering::SeqCst) {
                    if let Err(err) = surface.detach() {
                        warn!("Overlay detach on shutdown failed: {err:#}");
                    }
                    showing.store(false, Ordering::SeqCst);
                }
                break;
            }
        }
    }

    info!("Overlay thread shutting down");
}
