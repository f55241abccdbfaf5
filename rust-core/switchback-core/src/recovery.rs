//! # Panic Isolation
//!
//! Catches panics raised while a handler chain runs so that one bad request
//! never takes down the serving task.
//!
//! A caught panic is classified:
//!
//! - peer disconnected (broken pipe, reset, short read, unexpected EOF,
//!   timeout): the context is aborted and nothing more is written
//! - anything else: logged with a backtrace, then answered with a 500 via
//!   `Context::fail`; the backtrace never reaches the response body
//!
//! The backtrace is taken by a panic hook while the panicking frames are
//! still on the stack. Inside a guarded section that hook replaces the
//! default stderr report; everywhere else the previous hook still runs.

use crate::context::Context;
use crate::handler::Handler;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use tracing::{debug, error};

/// Message fragments that mark a dead peer connection
const DISCONNECT_MARKERS: [&str; 7] = [
    "broken pipe",
    "connection reset",
    "reset by peer",
    "small read buffer",
    "unexpected eof",
    "unexpected end of file",
    "i/o timeout",
];

/// Where a guarded panic was raised
#[derive(Debug)]
pub struct PanicSite {
    /// `file:line:column` of the panic, when known
    pub location: Option<String>,
    /// Stack captured before unwinding started
    pub backtrace: Backtrace,
}

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_SITE: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the panic hook used by guarded sections
///
/// Safe to call any number of times; the hook is installed once per process
/// and chains to whatever hook was active before.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.try_with(Cell::get).unwrap_or(0) == 0 {
                previous(info);
                return;
            }
            let site = PanicSite {
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture(),
            };
            let _ = LAST_SITE.try_with(|slot| *slot.borrow_mut() = Some(site));
        }));
    });
}

/// Middleware that runs the rest of the chain under the panic guard
///
/// Middleware placed before it still runs its post-processing and sees the
/// 500 written for a panicking handler.
pub fn recovery() -> Handler {
    Handler::named("recovery", |c| run_guarded(c, Context::next))
}

/// Run `f` against `c`, converting a panic into an aborted or failed context
pub fn run_guarded<F>(c: &mut Context, f: F)
where
    F: FnOnce(&mut Context),
{
    if let Err((payload, site)) = catch(|| f(c)) {
        handle_panic(c, payload.as_ref(), site);
    }
}

type Caught = (Box<dyn Any + Send>, Option<PanicSite>);

fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Caught> {
    install_panic_hook();
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    LAST_SITE.with(|slot| slot.borrow_mut().take());

    let result = panic::catch_unwind(AssertUnwindSafe(f));

    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));
    result.map_err(|payload| (payload, LAST_SITE.with(|slot| slot.borrow_mut().take())))
}

fn handle_panic(c: &mut Context, payload: &(dyn Any + Send), site: Option<PanicSite>) {
    let message = panic_message(payload);
    let location = site
        .as_ref()
        .and_then(|s| s.location.clone())
        .unwrap_or_else(|| "unknown".to_string());

    if is_broken_connection(payload) {
        debug!(
            method = %c.request.method,
            path = %c.request.path,
            error = %message,
            location = %location,
            "peer disconnected during handler, aborting"
        );
        c.abort();
        return;
    }

    let backtrace = site.map_or_else(Backtrace::force_capture, |s| s.backtrace);
    error!(
        method = %c.request.method,
        path = %c.request.path,
        panic = %message,
        location = %location,
        backtrace = %backtrace,
        "handler panicked"
    );
    c.fail(500, "Internal Server Error");
}

/// Best-effort text of a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<io::Error>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<hyper::Error>() {
        e.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

/// Whether a panic payload describes a peer that already went away
#[must_use]
pub fn is_broken_connection(payload: &(dyn Any + Send)) -> bool {
    if let Some(e) = payload.downcast_ref::<io::Error>() {
        return matches!(
            e.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::TimedOut
        ) || has_disconnect_marker(&e.to_string());
    }
    if let Some(e) = payload.downcast_ref::<hyper::Error>() {
        return e.is_incomplete_message() || e.is_closed() || e.is_canceled() || e.is_timeout();
    }
    let text = if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        return false;
    };
    has_disconnect_marker(text)
}

fn has_disconnect_marker(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    DISCONNECT_MARKERS.iter().any(|m| lower.contains(m))
}
