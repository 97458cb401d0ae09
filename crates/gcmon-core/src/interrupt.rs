//! Ctrl+C handling.
//!
//! The first Ctrl+C only raises a flag; the monitor notices it and shuts
//! down in order. A second one force-exits after running the restore hook.

use std::process;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INTERRUPT_NOTIFY: OnceLock<Notify> = OnceLock::new();
static RESTORE_HOOK: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();

/// Exit code used after an interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("Interrupted")]
pub struct InterruptedError;

/// Installs the Ctrl+C handler.
///
/// The handler never prints; whoever owns the terminal reports the
/// interruption.
///
/// # Errors
/// Returns an error if a handler is already installed.
pub fn init() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(trigger_ctrl_c)
}

fn notify() -> &'static Notify {
    INTERRUPT_NOTIFY.get_or_init(Notify::new)
}

/// Raises the interrupt flag, force-exiting if it was already raised.
pub fn trigger_ctrl_c() {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        // process::exit skips destructors.
        if let Some(hook) = RESTORE_HOOK.get() {
            hook();
        }
        process::exit(INTERRUPTED_EXIT_CODE);
    }
    notify().notify_waiters();
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Resolves once Ctrl+C has been pressed.
pub async fn wait_for_interrupt() {
    loop {
        let notified = notify().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if is_interrupted() {
            return;
        }
        notified.await;
    }
}

/// Clears the flag.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Registers the hook run on the second Ctrl+C before exiting.
///
/// Only the first registration sticks.
pub fn set_restore_hook<F>(hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let _ = RESTORE_HOOK.set(Box::new(hook));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    // Both cases share the process-wide flag, so they run as one test.
    #[tokio::test]
    async fn test_wait_for_interrupt_wakes_on_trigger() {
        reset();
        assert!(!is_interrupted());

        let waiter = tokio::spawn(wait_for_interrupt());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        trigger_ctrl_c();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(is_interrupted());

        // Already raised: returns immediately.
        tokio::time::timeout(Duration::from_secs(1), wait_for_interrupt())
            .await
            .unwrap();
        reset();
    }
}
