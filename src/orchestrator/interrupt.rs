//! Operator interruption.
//!
//! Ctrl-C raises a shared flag instead of killing the process. The
//! orchestrator looks at the flag only at its checkpoints and pauses the
//! session there.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Raise the flag on every Ctrl-C until the runtime shuts down.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !flag.is_raised() {
                    tracing::warn!("interrupt received; pausing at the next checkpoint");
                }
                flag.raise();
            }
        })
    }
}
