//! DNS stub resolver: wire codec, query building, response parsing and the
//! asynchronous lookup table.

pub mod name;
pub mod query;
pub mod resolver;
pub mod response;
pub mod table;
pub mod transport;
pub mod wire;

pub use name::{encode_name, span_len, Hostname, MAX_NAME_LEN};
pub use query::build_query;
pub use resolver::{ResolveResult, Resolver};
pub use response::{Response, SrvRecord};
pub use table::{EntryState, LookupCallback, ResolutionTable, SYNC_QUERY_ID};
pub use transport::{Transport, UdpTransport};
pub use wire::{RecordType, ResponseCode, CLASS_IN};
