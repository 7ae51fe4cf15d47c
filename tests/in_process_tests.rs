//! In-process integration tests for the resolver.
//!
//! These tests run a fake DNS server on 127.0.0.1 and drive the real UDP
//! transport against it.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

// Import the crate's modules
use stubresolv::config::ResolverConfig;
use stubresolv::dns::name::{encode, read_name};
use stubresolv::dns::wire::{read_u16, HEADER_SIZE};
use stubresolv::dns::{
    EntryState, RecordType, Resolver, Response, ResponseCode, SrvRecord, CLASS_IN,
    SYNC_QUERY_ID,
};
use stubresolv::error::DnsError;

const EXAMPLE_IP: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);
const SRV_NAME: &str = "_xmpp-client._tcp.dismail.de";

/// Fast timings so tests finish quickly
fn test_resolver_config() -> ResolverConfig {
    ResolverConfig {
        max_retries: 8,
        retry_interval_ticks: 1,
        tick_interval_ms: 10,
        query_attempts: 10,
        poll_interval_ms: 50,
    }
}

/// Fake DNS server answering from a fixed zone
struct FakeServer {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn start_fake_server(a_record: Ipv4Addr) -> FakeServer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&queries);

    let task = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                continue;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(response) = answer_query(&buf[..len], a_record) {
                let _ = socket.send_to(&response, from).await;
            }
        }
    });

    FakeServer {
        addr,
        queries,
        task,
    }
}

/// Build the zone's answer to a query, or `None` to stay silent
fn answer_query(query: &[u8], a_record: Ipv4Addr) -> Option<Vec<u8>> {
    let (name, question_end) = read_name(query, HEADER_SIZE).ok()?;
    let qtype = read_u16(query, question_end)?;

    match (name.as_str(), qtype) {
        ("silent.example", _) => None,
        ("nx.invalid", _) => Some(build_response(query, question_end + 4, 3, &[])),
        (SRV_NAME, 33) => {
            let mut rdata = Vec::new();
            rdata.extend_from_slice(&0u16.to_be_bytes());
            rdata.extend_from_slice(&5u16.to_be_bytes());
            rdata.extend_from_slice(&5222u16.to_be_bytes());
            rdata.extend_from_slice(&encode("xmpp.dismail.de").ok()?);
            Some(build_response(query, question_end + 4, 0, &[(33, rdata)]))
        }
        (_, 1) => Some(build_response(
            query,
            question_end + 4,
            0,
            &[(1, a_record.octets().to_vec())],
        )),
        _ => Some(build_response(query, question_end + 4, 0, &[])),
    }
}

/// Echo header and question, then append answers named by a pointer to the question
fn build_response(query: &[u8], question_len: usize, rcode: u8, answers: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut packet = query[..question_len].to_vec();
    packet[2] = 0x81; // QR + RD
    packet[3] = 0x80 | rcode; // RA + RCODE
    packet[6..8].copy_from_slice(&(answers.len() as u16).to_be_bytes());

    for (rtype, rdata) in answers {
        packet.extend_from_slice(&[0xC0, HEADER_SIZE as u8]);
        packet.extend_from_slice(&rtype.to_be_bytes());
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());
        packet.extend_from_slice(&300u32.to_be_bytes());
        packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        packet.extend_from_slice(rdata);
    }
    packet
}

type Calls = Arc<Mutex<Vec<(String, Option<Ipv4Addr>)>>>;

fn recorder() -> (Calls, impl FnMut(&str, Option<Ipv4Addr>) + Send + 'static) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let callback = move |name: &str, addr: Option<Ipv4Addr>| {
        sink.lock().unwrap().push((name.to_string(), addr));
    };
    (calls, callback)
}

// ============== Synchronous Queries ==============

#[tokio::test]
async fn test_sync_a_query() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();
    assert_eq!(resolver.server(), Some(server.addr));

    let answer = resolver
        .query("example.com", CLASS_IN, RecordType::A)
        .await
        .unwrap();

    let response = Response::parse(&answer).unwrap();
    assert_eq!(response.id(), SYNC_QUERY_ID);
    assert_eq!(response.answer_count(), 1);
    assert_eq!(response.first_ipv4().unwrap(), Some(EXAMPLE_IP));
    // Header + question + one compressed A record
    assert_eq!(answer.len(), 12 + 13 + 4 + 2 + 10 + 4);
}

#[tokio::test]
async fn test_sync_srv_query() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();

    let answer = resolver
        .query(SRV_NAME, CLASS_IN, RecordType::SRV)
        .await
        .unwrap();

    let records = Response::parse(&answer).unwrap().srv_records().unwrap();
    assert_eq!(
        records,
        vec![SrvRecord {
            priority: 0,
            weight: 5,
            port: 5222,
            target: "xmpp.dismail.de".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_sync_query_nxdomain_is_returned() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();

    let answer = resolver
        .query("nx.invalid", CLASS_IN, RecordType::A)
        .await
        .unwrap();
    let response = Response::parse(&answer).unwrap();
    assert_eq!(response.header().response_code(), ResponseCode::NxDomain);
    assert_eq!(response.first_ipv4().unwrap(), None);
}

#[tokio::test]
async fn test_sync_query_timeout() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let config = ResolverConfig {
        query_attempts: 3,
        poll_interval_ms: 20,
        ..test_resolver_config()
    };
    let mut resolver = Resolver::init(server.addr, config).await.unwrap();

    let err = resolver
        .query("silent.example", CLASS_IN, RecordType::A)
        .await
        .unwrap_err();
    assert_eq!(err, DnsError::Timeout);
    assert_eq!(server.queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sync_query_rejects_oversized_name() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();

    let err = resolver
        .query("a-rather-long-hostname.example.org", CLASS_IN, RecordType::A)
        .await
        .unwrap_err();
    assert_eq!(err, DnsError::EncodingOverflow);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.queries.load(Ordering::SeqCst), 0);
}

// ============== Asynchronous Lookups ==============

#[tokio::test]
async fn test_register_settle_lookup() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();
    let (calls, callback) = recorder();

    assert_eq!(resolver.lookup("example.com"), None);
    assert!(resolver.register("example.com", callback).unwrap());
    assert!(resolver.register_quiet("www.example.org").unwrap());

    tokio::time::timeout(Duration::from_secs(5), resolver.settle())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolver.lookup("example.com"), Some(EXAMPLE_IP));
    assert_eq!(resolver.lookup("www.example.org"), Some(EXAMPLE_IP));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("example.com".to_string(), Some(EXAMPLE_IP))]
    );
}

#[tokio::test]
async fn test_register_nxdomain_reports_failure() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();
    let (calls, callback) = recorder();

    resolver.register("nx.invalid", callback).unwrap();
    tokio::time::timeout(Duration::from_secs(5), resolver.settle())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolver.state_of("nx.invalid"), Some(EntryState::Error));
    assert_eq!(resolver.lookup("nx.invalid"), None);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("nx.invalid".to_string(), None)]
    );
}

#[tokio::test]
async fn test_register_silent_server_exhausts_retries() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();
    let (calls, callback) = recorder();

    resolver.register("silent.example", callback).unwrap();
    tokio::time::timeout(Duration::from_secs(5), resolver.settle())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolver.state_of("silent.example"), Some(EntryState::Error));
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(calls.lock().unwrap()[0].1, None);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.queries.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_table_capacity() {
    let server = start_fake_server(EXAMPLE_IP).await;
    let mut resolver = Resolver::init(server.addr, test_resolver_config())
        .await
        .unwrap();

    for host in ["a.example", "b.example", "c.example", "d.example"] {
        assert!(resolver.register_quiet(host).unwrap());
    }
    assert!(!resolver.register_quiet("e.example").unwrap());
    assert_eq!(resolver.state_of("e.example"), None);

    tokio::time::timeout(Duration::from_secs(5), resolver.settle())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(server.queries.load(Ordering::SeqCst), 4);

    // A finished slot can be released and reused
    assert!(resolver.release("a.example"));
    assert!(resolver.register_quiet("e.example").unwrap());
}

// ============== Server Association ==============

#[tokio::test]
async fn test_reconfigure_and_shutdown() {
    let first = start_fake_server(EXAMPLE_IP).await;
    let second_ip = Ipv4Addr::new(198, 51, 100, 7);
    let second = start_fake_server(second_ip).await;

    let mut resolver = Resolver::init(first.addr, test_resolver_config())
        .await
        .unwrap();
    resolver.reconfigure(second.addr).await.unwrap();
    assert_eq!(resolver.server(), Some(second.addr));

    let answer = resolver
        .query("example.com", CLASS_IN, RecordType::A)
        .await
        .unwrap();
    assert_eq!(
        Response::parse(&answer).unwrap().first_ipv4().unwrap(),
        Some(second_ip)
    );
    assert_eq!(first.queries.load(Ordering::SeqCst), 0);

    assert!(resolver.shutdown());
    assert_eq!(resolver.server(), None);
    assert_eq!(
        resolver.query("example.com", CLASS_IN, RecordType::A).await,
        Err(DnsError::TransportUnavailable)
    );
}
