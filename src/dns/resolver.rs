//! Stub resolver context: server association, synchronous queries and the
//! asynchronous lookup table.

use crate::config::ResolverConfig;
use crate::dns::name::Hostname;
use crate::dns::query::{build_hostname_query, build_query};
use crate::dns::response::Response;
use crate::dns::table::{EntryState, ResolutionTable, TABLE_SIZE};
pub use crate::dns::table::SYNC_QUERY_ID;
use crate::dns::transport::{Transport, UdpTransport};
use crate::dns::wire::{RecordType, CLASS_IN};
use crate::error::DnsError;
use crate::helpers::hexdump;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

// Roughly 30 years, as tokio uses for timers that never fire
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + budget`, clamped for budgets too large to represent
fn query_deadline(now: Instant, budget: Duration) -> Instant {
    now.checked_add(budget.min(FAR_FUTURE)).unwrap_or(now)
}

/// Outcome of [`Resolver::resolve_host`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveResult {
    /// The address is known now; the callback is not called
    Complete(Ipv4Addr),
    /// A lookup is in flight; the callback reports its outcome
    Queued,
    /// The name cannot be looked up, or the table has no free slot
    Invalid,
}

enum Event {
    Tick,
    Datagram(Option<Vec<u8>>),
}

/// A stub resolver bound to at most one DNS server
pub struct Resolver<T: Transport> {
    transport: Option<T>,
    inbound: Option<mpsc::Receiver<Vec<u8>>>,
    table: ResolutionTable,
    config: ResolverConfig,
}

impl Resolver<UdpTransport> {
    /// Associate with `server` over UDP
    pub async fn init(server: SocketAddr, config: ResolverConfig) -> io::Result<Self> {
        let (transport, inbound) = UdpTransport::connect(server).await?;
        info!(server = %server, "DNS resolver initialized");
        Ok(Resolver::with_transport(transport, inbound, config))
    }

    /// Replace the server association. The table keeps its entries; replies
    /// still owed by the old server are lost and those entries retry.
    pub async fn reconfigure(&mut self, server: SocketAddr) -> io::Result<()> {
        let (transport, inbound) = UdpTransport::connect(server).await?;
        info!(server = %server, "DNS server changed");
        self.transport = Some(transport);
        self.inbound = Some(inbound);
        Ok(())
    }
}

impl<T: Transport> Resolver<T> {
    pub fn with_transport(
        transport: T,
        inbound: mpsc::Receiver<Vec<u8>>,
        config: ResolverConfig,
    ) -> Self {
        let table = ResolutionTable::new(config.max_retries, config.retry_interval_ticks);
        Resolver {
            transport: Some(transport),
            inbound: Some(inbound),
            table,
            config,
        }
    }

    /// Drop the server association. Returns `false` if there was none.
    pub fn shutdown(&mut self) -> bool {
        self.inbound = None;
        match self.transport.take() {
            Some(transport) => {
                info!(server = %transport.peer(), "DNS resolver shut down");
                true
            }
            None => false,
        }
    }

    /// Address of the configured server, if any
    pub fn server(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(|t| t.peer())
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn table(&self) -> &ResolutionTable {
        &self.table
    }

    /// Send one query and wait for its answer.
    ///
    /// Returns exactly the answer's span (header, questions and answer
    /// records), whatever its response code. Gives up with
    /// [`DnsError::Timeout`] once the poll budget is spent; datagrams for
    /// table lookups that arrive meanwhile are applied to the table.
    pub async fn query(
        &mut self,
        name: &str,
        class: u16,
        rtype: RecordType,
    ) -> Result<Vec<u8>, DnsError> {
        if self.transport.is_none() {
            return Err(DnsError::TransportUnavailable);
        }
        let datagram = build_query(name, class, rtype, SYNC_QUERY_ID)?;

        // Late answers to an earlier query must not be taken for this one
        self.poll_inbound();

        debug!(host = name, rtype = %rtype, bytes = datagram.len(), "DNS query");
        self.send(&datagram).await.map_err(|e| {
            warn!(host = name, error = %e, "DNS query send failed");
            DnsError::Timeout
        })?;

        let deadline = query_deadline(Instant::now(), self.config.query_budget());
        loop {
            let Some(inbound) = self.inbound.as_mut() else {
                return Err(DnsError::TransportUnavailable);
            };

            let mut datagram = match time::timeout_at(deadline, inbound.recv()).await {
                Ok(Some(datagram)) => datagram,
                Ok(None) | Err(_) => break,
            };

            if let Some(span) = self.dispatch(&datagram, true) {
                datagram.truncate(span);
                debug!(host = name, bytes = span, "DNS answer");
                return Ok(datagram);
            }
        }

        debug!(
            host = name,
            attempts = self.config.query_attempts,
            "DNS query timed out"
        );
        Err(DnsError::Timeout)
    }

    /// Enter an asynchronous A lookup whose outcome is reported to `callback`.
    ///
    /// `Ok(false)` means the name is already in flight or the table is full.
    pub fn register<F>(&mut self, name: &str, callback: F) -> Result<bool, DnsError>
    where
        F: FnMut(&str, Option<Ipv4Addr>) + Send + 'static,
    {
        let name = Hostname::new(name)?;
        Ok(self.table.register(name, Some(Box::new(callback))))
    }

    /// Resolve `name` without waiting: an IPv4 literal or a resolved name
    /// completes at once, anything else is entered into the table.
    pub fn resolve_host<F>(&mut self, name: &str, callback: F) -> ResolveResult
    where
        F: FnMut(&str, Option<Ipv4Addr>) + Send + 'static,
    {
        if let Ok(addr) = name.parse::<Ipv4Addr>() {
            return ResolveResult::Complete(addr);
        }
        if let Some(addr) = self.lookup(name) {
            return ResolveResult::Complete(addr);
        }
        let in_flight = matches!(
            self.state_of(name),
            Some(EntryState::New | EntryState::Asking)
        );
        match self.register(name, callback) {
            Ok(true) => ResolveResult::Queued,
            Ok(false) if in_flight => ResolveResult::Queued,
            Ok(false) => ResolveResult::Invalid,
            Err(e) => {
                debug!(host = name, error = %e, "DNS lookup rejected");
                ResolveResult::Invalid
            }
        }
    }

    /// Enter an asynchronous A lookup without a completion callback
    pub fn register_quiet(&mut self, name: &str) -> Result<bool, DnsError> {
        let name = Hostname::new(name)?;
        Ok(self.table.register(name, None))
    }

    /// Drive the table one step: apply datagrams that have arrived, then
    /// (re)send the query of the next slot that needs it.
    pub async fn tick(&mut self) -> Result<(), DnsError> {
        if self.transport.is_none() {
            return Err(DnsError::TransportUnavailable);
        }
        self.poll_inbound();

        let Some(pending) = self.table.tick() else {
            return Ok(());
        };
        let datagram = build_hostname_query(&pending.name, CLASS_IN, RecordType::A, pending.id);
        debug!(name = %pending.name, id = pending.id, "DNS lookup query");

        // A lost send is covered by the entry's retries
        if let Err(e) = self.send(&datagram).await {
            warn!(name = %pending.name, error = %e, "DNS lookup send failed");
        }
        Ok(())
    }

    /// Apply every datagram already received. Returns how many there were.
    pub fn poll_inbound(&mut self) -> usize {
        let mut handled = 0;
        while let Some(datagram) = self.inbound.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.dispatch(&datagram, false);
            handled += 1;
        }
        handled
    }

    /// Address of a resolved name; never issues a query
    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.table.lookup(name)
    }

    pub fn state_of(&self, name: &str) -> Option<EntryState> {
        self.table.state_of(name)
    }

    /// Free the slot of a finished lookup
    pub fn release(&mut self, name: &str) -> bool {
        self.table.release(name)
    }

    /// Tick at the configured interval, applying answers as they arrive,
    /// until no lookup is pending.
    pub async fn settle(&mut self) -> Result<(), DnsError> {
        let mut interval = time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.table.has_pending() {
            let event = {
                let Some(inbound) = self.inbound.as_mut() else {
                    return Err(DnsError::TransportUnavailable);
                };
                tokio::select! {
                    _ = interval.tick() => Event::Tick,
                    datagram = inbound.recv() => Event::Datagram(datagram),
                }
            };

            match event {
                Event::Tick => self.tick().await?,
                Event::Datagram(Some(datagram)) => {
                    self.dispatch(&datagram, false);
                }
                Event::Datagram(None) => return Err(DnsError::TransportUnavailable),
            }
        }

        trace!(states = ?self.table.states(), capacity = TABLE_SIZE, "DNS table settled");
        Ok(())
    }

    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        match self.transport.as_ref() {
            Some(transport) => transport.send(datagram).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no DNS server association",
            )),
        }
    }

    /// Route a received datagram. Returns the answer span when it is the
    /// synchronous answer being waited for.
    fn dispatch(&mut self, datagram: &[u8], awaiting_sync: bool) -> Option<usize> {
        trace!(bytes = datagram.len(), dump = %hexdump(datagram), "DNS datagram");

        let response = match Response::parse(datagram) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "DNS datagram discarded");
                return None;
            }
        };

        if response.id() != SYNC_QUERY_ID {
            self.table.handle_response(&response);
            return None;
        }

        if !awaiting_sync {
            debug!("DNS late synchronous answer discarded");
            return None;
        }

        match response.span() {
            Ok(span) => Some(span),
            Err(e) => {
                debug!(error = %e, "DNS malformed synchronous answer discarded");
                None
            }
        }
    }
}
