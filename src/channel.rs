//! Single-flight background parsing.
//!
//! A [`ParseChannel`] runs at most one parse at a time on tokio's blocking
//! pool so large exports never stall interactive callers. Posting while a
//! parse is in flight is refused with [`ChannelError::Blocked`]; the
//! request is not queued and the in-flight parse is unaffected.
//!
//! The channel is a two-state machine:
//!
//! ```text
//!   Idle --post--> Busy { generation } --job finished/failed/panicked--> Idle
//!                  Busy --post--> Blocked (state unchanged)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entry::{BibFormat, RawRecord};
use crate::refs::{self, RefsError};

/// A request to decode raw export text.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub raw_data: String,
    pub format: BibFormat,
}

impl ParseRequest {
    pub fn new(raw_data: impl Into<String>, format: BibFormat) -> Self {
        Self {
            raw_data: raw_data.into(),
            format,
        }
    }
}

/// Failure of a dispatched parse.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Decode(#[from] RefsError),

    #[error("parse worker failed: {0}")]
    WorkerFailed(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("a parse is already in flight (generation {in_flight})")]
    Blocked { in_flight: u64 },
}

/// The function run on the worker for each request.
pub type ParseFn = dyn Fn(&ParseRequest) -> Result<Vec<RawRecord>, ParseError> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Busy { generation: u64 },
}

/// Single-flight dispatcher for parse jobs.
pub struct ParseChannel {
    state: Arc<Mutex<ChannelState>>,
    next_generation: AtomicU64,
    parser: Arc<ParseFn>,
}

impl Default for ParseChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseChannel {
    /// A channel that decodes with [`refs::decode`].
    pub fn new() -> Self {
        Self::with_parser(|request: &ParseRequest| {
            Ok(refs::decode(&request.raw_data, request.format)?)
        })
    }

    /// A channel running a custom parse function.
    pub fn with_parser<F>(parser: F) -> Self
    where
        F: Fn(&ParseRequest) -> Result<Vec<RawRecord>, ParseError> + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(ChannelState::Idle)),
            next_generation: AtomicU64::new(1),
            parser: Arc::new(parser),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Generation of the parse currently in flight.
    pub fn in_flight(&self) -> Option<u64> {
        match *lock(&self.state) {
            ChannelState::Busy { generation } => Some(generation),
            ChannelState::Idle => None,
        }
    }

    /// Dispatches `request` if the channel is idle.
    ///
    /// Must be called from within a tokio runtime. The returned
    /// [`PendingParse`] may be dropped; the job still runs to completion
    /// and the channel still returns to idle.
    pub fn post(&self, request: ParseRequest) -> Result<PendingParse, ChannelError> {
        let generation = {
            let mut state = lock(&self.state);
            if let ChannelState::Busy { generation } = *state {
                debug!(in_flight = generation, "parse request blocked");
                return Err(ChannelError::Blocked {
                    in_flight: generation,
                });
            }
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            *state = ChannelState::Busy { generation };
            generation
        };

        debug!(
            generation,
            format = %request.format,
            bytes = request.raw_data.len(),
            "parse dispatched"
        );

        let guard = IdleOnDrop {
            state: Arc::clone(&self.state),
            generation,
        };
        let parser = Arc::clone(&self.parser);
        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            parser(&request)
        });

        Ok(PendingParse { generation, handle })
    }
}

/// Returns the channel to idle when the job ends, including by panic.
struct IdleOnDrop {
    state: Arc<Mutex<ChannelState>>,
    generation: u64,
}

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if *state == (ChannelState::Busy { generation: self.generation }) {
            *state = ChannelState::Idle;
        }
        debug!(generation = self.generation, "parse channel idle");
    }
}

fn lock(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Future resolving to the outcome of one dispatched parse.
#[derive(Debug)]
pub struct PendingParse {
    generation: u64,
    handle: JoinHandle<Result<Vec<RawRecord>, ParseError>>,
}

impl PendingParse {
    /// Monotonic number identifying this parse.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Future for PendingParse {
    type Output = Result<Vec<RawRecord>, ParseError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_error)) => {
                warn!(generation = self.generation, error = %join_error, "parse worker crashed");
                Poll::Ready(Err(ParseError::WorkerFailed(join_error.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
