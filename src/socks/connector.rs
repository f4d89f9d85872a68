//! Races one connection attempt per candidate endpoint and keeps the first
//! one that succeeds.
//!
//! When the candidates mix IPv4 and IPv6, IPv4 attempts are held back by
//! [`ConnectorConfig::happy_eyeballs_delay`] and skipped entirely if a winner
//! already exists when their timer fires. Every losing transport is dropped
//! (and so closed) before [`Connector::connect`] returns.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::socks::{Result, SocksError};

pub const DEFAULT_HAPPY_EYEBALLS_DELAY: Duration = Duration::from_millis(200);

#[async_trait]
/// Opens one transport to one endpoint.
///
/// Dropping the returned future abandons the connect; dropping the returned
/// stream closes it.
pub trait Dial: Send + Sync + 'static {
    type Stream: Send + 'static;

    async fn dial(&self, endpoint: SocketAddr) -> io::Result<Self::Stream>;
}

/// Plain TCP transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDial;

#[async_trait]
impl Dial for TcpDial {
    type Stream = TcpStream;

    async fn dial(&self, endpoint: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(endpoint).await
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// How long IPv4 attempts wait when IPv6 candidates are present too.
    pub happy_eyeballs_delay: Duration,
    /// Cancels all attempts once elapsed.
    pub connect_timeout: Option<Duration>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            happy_eyeballs_delay: DEFAULT_HAPPY_EYEBALLS_DELAY,
            connect_timeout: None,
        }
    }
}

/// The transport that won the race and the endpoint it reached.
#[derive(Debug)]
pub struct Connected<S> {
    pub stream: S,
    pub endpoint: SocketAddr,
}

/// Cancels every in-flight attempt of the connector it came from.
///
/// Cancellation is sticky: later `connect` calls on that connector fail
/// with [`SocksError::Canceled`].
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    /// Signals cancellation without waiting for attempts to wind down.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.0.is_cancelled()
    }
}

pub struct Connector<D> {
    dialer: Arc<D>,
    config: ConnectorConfig,
    cancel: CancellationToken,
}

impl Connector<TcpDial> {
    pub fn tcp() -> Self {
        Self::new(TcpDial, ConnectorConfig::default())
    }
}

impl<D> Connector<D>
where
    D: Dial,
{
    pub fn new(dialer: D, config: ConnectorConfig) -> Self {
        Self {
            dialer: Arc::new(dialer),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Races every endpoint and returns the first transport to connect.
    pub async fn connect(&self, endpoints: &[SocketAddr]) -> Result<Connected<D::Stream>> {
        self.connect_filtered(endpoints, |_| true).await
    }

    /// Like [`connect`](Self::connect), but only dials endpoints `accept` approves.
    ///
    /// Fails with [`SocksError::NoCandidates`] for an empty list and with
    /// [`SocksError::AllRejected`] when `accept` turns every endpoint down.
    /// Otherwise, if nothing connects, the error of the last attempt to fail
    /// is returned.
    pub async fn connect_filtered<F>(
        &self,
        endpoints: &[SocketAddr],
        mut accept: F,
    ) -> Result<Connected<D::Stream>>
    where
        F: FnMut(&SocketAddr) -> bool,
    {
        if endpoints.is_empty() {
            return Err(SocksError::NoCandidates);
        }

        let eyeballs = endpoints.iter().any(SocketAddr::is_ipv4)
            && endpoints.iter().any(SocketAddr::is_ipv6);

        let accepted: Vec<SocketAddr> = endpoints
            .iter()
            .copied()
            .filter(|endpoint| {
                let ok = accept(endpoint);
                if !ok {
                    debug!(%endpoint, "candidate rejected");
                }
                ok
            })
            .collect();
        if accepted.is_empty() {
            return Err(SocksError::AllRejected);
        }

        let race = Arc::new(RaceContext {
            winner: AtomicBool::new(false),
            remaining: AtomicUsize::new(accepted.len()),
            cancel: self.cancel.child_token(),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut attempts = JoinSet::new();

        for endpoint in accepted {
            let delay = if eyeballs && endpoint.is_ipv4() {
                Some(self.config.happy_eyeballs_delay)
            } else {
                None
            };
            let attempt = Attempt {
                endpoint,
                delay,
                race: race.clone(),
                dialer: self.dialer.clone(),
                events: tx.clone(),
            };
            attempts.spawn(attempt.run());
        }
        drop(tx);

        let deadline = self.config.connect_timeout.map(|t| Instant::now() + t);
        let mut timed_out = false;
        let mut last_error = None;

        let outcome = loop {
            let event = tokio::select! {
                event = rx.recv() => event,
                _ = sleep_until_deadline(deadline), if !timed_out => {
                    warn!("connect timed out, canceling attempts");
                    timed_out = true;
                    race.cancel.cancel();
                    continue;
                }
            };

            match event {
                Some(AttemptEvent::Won { stream, endpoint }) => {
                    debug!(%endpoint, "attempt won");
                    break Ok(Connected { stream, endpoint });
                }
                Some(AttemptEvent::Failed {
                    endpoint,
                    error,
                    last,
                }) => {
                    debug!(%endpoint, %error, "attempt failed");
                    last_error = Some(error);
                    if last && !race.has_winner() {
                        break Err(());
                    }
                }
                // Every attempt is gone without a winner or a final failure.
                None => break Err(()),
            }
        };

        // Losers must be closed before the caller sees the result.
        race.cancel.cancel();
        while let Some(joined) = attempts.join_next().await {
            if let Err(error) = joined {
                warn!(%error, "connect attempt task failed");
            }
        }
        rx.close();
        while rx.try_recv().is_ok() {}

        match outcome {
            Ok(connected) => Ok(connected),
            Err(()) if timed_out => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timed out",
            )
            .into()),
            Err(()) => Err(last_error.unwrap_or(SocksError::Canceled)),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// State shared by every attempt of one `connect` call.
struct RaceContext {
    winner: AtomicBool,
    remaining: AtomicUsize,
    cancel: CancellationToken,
}

impl RaceContext {
    /// Returns true for exactly one caller.
    fn claim(&self) -> bool {
        self.winner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn has_winner(&self) -> bool {
        self.winner.load(Ordering::Acquire)
    }

    /// Returns true if the caller was the last outstanding attempt.
    fn finish(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

enum AttemptEvent<S> {
    Won {
        stream: S,
        endpoint: SocketAddr,
    },
    Failed {
        endpoint: SocketAddr,
        error: SocksError,
        last: bool,
    },
}

struct Attempt<D: Dial> {
    endpoint: SocketAddr,
    delay: Option<Duration>,
    race: Arc<RaceContext>,
    dialer: Arc<D>,
    events: mpsc::UnboundedSender<AttemptEvent<D::Stream>>,
}

impl<D> Attempt<D>
where
    D: Dial,
{
    async fn run(self) {
        let endpoint = self.endpoint;

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.race.cancel.cancelled() => {
                    return self.fail(SocksError::Canceled);
                }
            }
            if self.race.has_winner() {
                trace!(%endpoint, "winner exists, delayed attempt skipped");
                self.race.finish();
                return;
            }
        }

        trace!(%endpoint, "dialing");
        let result = tokio::select! {
            result = self.dialer.dial(endpoint) => result,
            _ = self.race.cancel.cancelled() => {
                return self.fail(SocksError::Canceled);
            }
        };

        match result {
            Ok(stream) => {
                if self.race.claim() {
                    // A send error means the caller is gone; the stream drops here.
                    let _ = self.events.send(AttemptEvent::Won { stream, endpoint });
                } else {
                    trace!(%endpoint, "connected after winner, closing");
                    drop(stream);
                }
            }
            Err(error) => self.fail(error.into()),
        }
    }

    fn fail(&self, error: SocksError) {
        let last = self.race.finish();
        let _ = self.events.send(AttemptEvent::Failed {
            endpoint: self.endpoint,
            error,
            last,
        });
    }
}
