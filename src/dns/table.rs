//! Fixed-capacity resolution table driving asynchronous lookups.
//!
//! Each slot walks `Unused -> New -> Asking -> Done | Error`. The table never
//! touches the network itself: [`ResolutionTable::tick`] hands back the query
//! that should be (re)sent and the owner transmits it.

use crate::dns::name::Hostname;
use crate::dns::response::Response;
use crate::dns::wire::ResponseCode;
use crate::error::DnsError;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Number of lookups the table can hold
pub const TABLE_SIZE: usize = 4;

/// Default attempt budget of an entry
pub const MAX_RETRIES: u8 = 8;

/// Completion callback: hostname plus the address, or `None` on failure
pub type LookupCallback = Box<dyn FnMut(&str, Option<Ipv4Addr>) + Send>;

/// Lifecycle state of a table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    #[default]
    Unused,
    New,
    Asking,
    Done,
    Error,
}

/// Query the table wants transmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub id: u16,
    pub name: Hostname,
}

/// Transaction id reserved for synchronous queries; never issued to a table entry
pub const SYNC_QUERY_ID: u16 = 99;

// Slot in the low bits of an id, registration sequence number above it
const SLOT_BITS: u32 = 2;
const SLOT_MASK: u16 = (1 << SLOT_BITS) - 1;
const SEQNO_MASK: u16 = u16::MAX >> SLOT_BITS;

const _: () = assert!(TABLE_SIZE == 1 << SLOT_BITS);

/// Transaction id of a table query: 14-bit sequence number above a 2-bit slot
pub fn entry_id(slot: usize, seqno: u16) -> u16 {
    ((seqno & SEQNO_MASK) << SLOT_BITS) | (slot as u16 & SLOT_MASK)
}

fn split_id(id: u16) -> (u16, usize) {
    (id >> SLOT_BITS, (id & SLOT_MASK) as usize)
}

#[derive(Default)]
struct Entry {
    state: EntryState,
    name: Option<Hostname>,
    addr: Option<Ipv4Addr>,
    error: Option<DnsError>,
    retries: u8,
    countdown: u8,
    seqno: u16,
    callback: Option<LookupCallback>,
}

impl Entry {
    fn is_named(&self, name: &str) -> bool {
        self.state != EntryState::Unused && self.name.as_ref().is_some_and(|n| n.matches(name))
    }

    fn notify(&mut self) {
        if let (Some(name), Some(callback)) = (self.name.as_ref(), self.callback.as_mut()) {
            callback(name.as_str(), self.addr);
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("state", &self.state)
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("retries", &self.retries)
            .field("countdown", &self.countdown)
            .field("seqno", &self.seqno)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// The set of in-flight and completed lookups
#[derive(Debug)]
pub struct ResolutionTable {
    entries: [Entry; TABLE_SIZE],
    next_seqno: u16,
    cursor: usize,
    max_retries: u8,
    retry_interval: u8,
}

impl Default for ResolutionTable {
    fn default() -> Self {
        ResolutionTable::new(MAX_RETRIES, 1)
    }
}

impl ResolutionTable {
    /// `retry_interval` is the number of ticks an entry waits between sends
    pub fn new(max_retries: u8, retry_interval: u8) -> Self {
        ResolutionTable {
            entries: std::array::from_fn(|_| Entry::default()),
            next_seqno: 0,
            cursor: 0,
            max_retries: max_retries.max(1),
            retry_interval: retry_interval.max(1),
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.is_named(name))
    }

    /// Enter a lookup. Returns `false` and changes nothing if the name is
    /// already in flight or no slot is free.
    ///
    /// A name sitting in a `Done` or `Error` slot re-arms that slot.
    pub fn register(&mut self, name: Hostname, callback: Option<LookupCallback>) -> bool {
        let slot = match self.find(name.as_str()) {
            Some(slot) => match self.entries[slot].state {
                EntryState::New | EntryState::Asking => {
                    debug!(name = %name, slot, "DNS lookup already in flight");
                    return false;
                }
                _ => slot,
            },
            None => match self
                .entries
                .iter()
                .position(|e| e.state == EntryState::Unused)
            {
                Some(slot) => slot,
                None => {
                    warn!(name = %name, capacity = TABLE_SIZE, "DNS table full, lookup not registered");
                    return false;
                }
            },
        };

        let seqno = self.take_seqno(slot);

        debug!(name = %name, slot, seqno, "DNS lookup registered");
        self.entries[slot] = Entry {
            state: EntryState::New,
            name: Some(name),
            seqno,
            callback,
            ..Entry::default()
        };
        true
    }

    /// Next sequence number for `slot`, skipping the one whose id would be
    /// [`SYNC_QUERY_ID`]
    fn take_seqno(&mut self, slot: usize) -> u16 {
        let mut seqno = self.next_seqno;
        if entry_id(slot, seqno) == SYNC_QUERY_ID {
            seqno = (seqno + 1) & SEQNO_MASK;
        }
        self.next_seqno = (seqno + 1) & SEQNO_MASK;
        seqno
    }

    /// Advance one slot and return the query to send, if any.
    ///
    /// Scanning starts after the slot advanced last time and stops at the
    /// first `New` or `Asking` entry. A `New` entry is sent immediately; an
    /// `Asking` entry counts down and is re-sent when its countdown expires,
    /// or fails once its attempt budget is used up.
    pub fn tick(&mut self) -> Option<PendingQuery> {
        for step in 0..TABLE_SIZE {
            let slot = (self.cursor + step) % TABLE_SIZE;
            let entry = &mut self.entries[slot];

            match entry.state {
                EntryState::New => {
                    entry.state = EntryState::Asking;
                    entry.retries = 1;
                    entry.countdown = self.retry_interval;
                }
                EntryState::Asking => {
                    entry.countdown = entry.countdown.saturating_sub(1);
                    if entry.countdown > 0 {
                        self.cursor = (slot + 1) % TABLE_SIZE;
                        return None;
                    }

                    entry.retries += 1;
                    if entry.retries >= self.max_retries {
                        self.cursor = (slot + 1) % TABLE_SIZE;
                        self.fail(slot, DnsError::RetriesExhausted);
                        return None;
                    }
                    entry.countdown = self.retry_interval;
                    debug!(slot, retries = entry.retries, "DNS retry");
                }
                _ => continue,
            }

            self.cursor = (slot + 1) % TABLE_SIZE;
            let entry = &self.entries[slot];
            return Some(PendingQuery {
                id: entry_id(slot, entry.seqno),
                name: entry.name.clone()?,
            });
        }

        None
    }

    fn fail(&mut self, slot: usize, error: DnsError) {
        let entry = &mut self.entries[slot];
        warn!(name = ?entry.name, error = %error, "DNS lookup failed");
        entry.state = EntryState::Error;
        entry.addr = None;
        entry.error = Some(error);
        entry.notify();
    }

    /// Apply a response to the slot its id names.
    ///
    /// Returns `true` if an entry changed state. Responses for slots that are
    /// not `Asking` under the same sequence number are stale and ignored, as
    /// are malformed responses and answers without an address record.
    pub fn handle_response(&mut self, response: &Response<'_>) -> bool {
        let (seqno, slot) = split_id(response.id());
        let entry = &mut self.entries[slot];

        if entry.state != EntryState::Asking || entry.seqno != seqno {
            debug!(id = response.id(), slot, state = ?entry.state, "DNS stale response discarded");
            return false;
        }

        let rcode = response.header().response_code();
        if rcode != ResponseCode::NoError {
            self.fail(slot, DnsError::ServerError(rcode));
            return true;
        }

        match response.first_ipv4() {
            Ok(Some(addr)) => {
                debug!(name = ?entry.name, addr = %addr, "DNS lookup resolved");
                entry.state = EntryState::Done;
                entry.addr = Some(addr);
                entry.notify();
                true
            }
            Ok(None) => {
                debug!(name = ?entry.name, "DNS response carried no address record");
                false
            }
            Err(e) => {
                debug!(name = ?entry.name, error = %e, "DNS malformed response discarded");
                false
            }
        }
    }

    /// Address of a resolved name; never issues a query
    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.entries
            .iter()
            .find(|e| e.state == EntryState::Done && e.is_named(name))
            .and_then(|e| e.addr)
    }

    pub fn state_of(&self, name: &str) -> Option<EntryState> {
        self.find(name).map(|slot| self.entries[slot].state)
    }

    /// Why a name ended in `Error`
    pub fn failure(&self, name: &str) -> Option<DnsError> {
        self.find(name).and_then(|slot| self.entries[slot].error)
    }

    /// States of every slot, in slot order
    pub fn states(&self) -> [EntryState; TABLE_SIZE] {
        std::array::from_fn(|slot| self.entries[slot].state)
    }

    /// Return a finished (`Done`/`Error`) slot to `Unused`
    pub fn release(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(slot)
                if matches!(
                    self.entries[slot].state,
                    EntryState::Done | EntryState::Error
                ) =>
            {
                self.entries[slot] = Entry::default();
                true
            }
            _ => false,
        }
    }

    /// Whether any entry still needs ticks
    pub fn has_pending(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.state, EntryState::New | EntryState::Asking))
    }
}
