//! Stubresolv - A minimal stub DNS resolver
//!
//! Demo client: resolves hosts synchronously and through the lookup table,
//! and fetches SRV records, against a single DNS server over UDP.

use stubresolv::config::{load_config, parse_server_addr};
use stubresolv::dns::{RecordType, ResolveResult, Resolver, Response, CLASS_IN};
use stubresolv::logging::init_logging;

use std::env;
use std::net::Ipv4Addr;
use tracing::warn;

const DEFAULT_HOST: &str = "example.com";
const DEFAULT_SRV_NAME: &str = "_xmpp-client._tcp.dismail.de";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = env::args().collect();

    // Parse command line arguments
    let mut config_path: Option<&str> = None;
    let mut cli_server: Option<String> = None;
    let mut srv_name: Option<String> = None;
    let mut hosts: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                config_path = args.get(i).map(|s| s.as_str());
            }
            "--server" => {
                i += 1;
                cli_server = args.get(i).cloned();
            }
            "--srv" => {
                i += 1;
                srv_name = args.get(i).cloned();
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                return Ok(());
            }
            arg if !arg.starts_with('-') => {
                hosts.push(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // Load config from file
    let mut config = load_config(config_path)?;

    // CLI arguments override config file
    if let Some(server) = cli_server {
        config.server = server;
    }
    if hosts.is_empty() {
        hosts.push(DEFAULT_HOST.to_string());
    }
    let srv_name = srv_name.unwrap_or_else(|| DEFAULT_SRV_NAME.to_string());

    // Initialize logging system
    let _log_guard = init_logging(&config.logging);

    let server = parse_server_addr(&config.server)?;
    let mut resolver = Resolver::init(server, config.resolver.clone()).await?;
    if let Some(server) = resolver.server() {
        println!("DNS server: {}", server);
    }

    for host in &hosts {
        match resolver.lookup(host) {
            Some(addr) => println!("{}: cached {}", host, addr),
            None => println!("{}: not cached", host),
        }

        match resolver.query(host, CLASS_IN, RecordType::A).await {
            Ok(answer) => print_a_answer(host, &answer),
            Err(e) => eprintln!("{}: A query failed: {}", host, e),
        }
    }

    match resolver.query(&srv_name, CLASS_IN, RecordType::SRV).await {
        Ok(answer) => print_srv_answer(&srv_name, &answer),
        Err(e) => eprintln!("{}: SRV query failed: {}", srv_name, e),
    }

    for host in &hosts {
        let registered = resolver.register(host, |name: &str, addr: Option<Ipv4Addr>| match addr {
            Some(addr) => println!("{}: resolved {}", name, addr),
            None => println!("{}: lookup failed", name),
        });
        match registered {
            Ok(true) => {}
            Ok(false) => warn!(host = %host, "Lookup not registered"),
            Err(e) => eprintln!("{}: cannot register: {}", host, e),
        }
    }
    resolver.settle().await?;

    for host in &hosts {
        match resolver.lookup(host) {
            Some(addr) => println!("{}: cached {}", host, addr),
            None => println!("{}: not cached", host),
        }
    }

    for host in &hosts {
        let result = resolver.resolve_host(host, |name: &str, addr: Option<Ipv4Addr>| {
            if let Some(addr) = addr {
                println!("{}: resolved {}", name, addr);
            }
        });
        match result {
            ResolveResult::Complete(addr) => println!("{}: {}", host, addr),
            ResolveResult::Queued => println!("{}: queued", host),
            ResolveResult::Invalid => println!("{}: cannot resolve", host),
        }
    }

    resolver.shutdown();
    Ok(())
}

fn print_a_answer(host: &str, answer: &[u8]) {
    let response = match Response::parse(answer) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("{}: {}", host, e);
            return;
        }
    };
    println!(
        "{}: {:?} ({} answers, {} bytes)",
        host,
        response.header().response_code(),
        response.answer_count(),
        answer.len()
    );
    for record in response.answers().flatten() {
        if let Some(addr) = record.ipv4() {
            println!("  A {} ttl={}", addr, record.ttl);
        }
    }
}

fn print_srv_answer(name: &str, answer: &[u8]) {
    let records = Response::parse(answer).and_then(|r| r.srv_records());
    match records {
        Ok(records) if records.is_empty() => println!("{}: no SRV records", name),
        Ok(records) => {
            println!("{}:", name);
            for srv in records {
                println!(
                    "  SRV {} {} {} {}",
                    srv.priority, srv.weight, srv.port, srv.target
                );
            }
        }
        Err(e) => eprintln!("{}: {}", name, e),
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [options] [host...]", program);
    eprintln!();
    eprintln!("Minimal stub DNS resolver for A and SRV records.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  host                    Hostname to resolve (default: {})", DEFAULT_HOST);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <path>     Load config from YAML file");
    eprintln!("  --server <addr>         DNS server (default: 8.8.8.8:53)");
    eprintln!("  --srv <name>            SRV name to query (default: {})", DEFAULT_SRV_NAME);
    eprintln!("  -h, --help              Show this help message");
    eprintln!();
    eprintln!("Config file (stubresolv.yaml):");
    eprintln!("  server: \"8.8.8.8:53\"");
    eprintln!("  resolver:");
    eprintln!("    max_retries: 8");
    eprintln!("    tick_interval_ms: 1000");
    eprintln!("    query_attempts: 10");
    eprintln!("    poll_interval_ms: 200");
    eprintln!("  logging:");
    eprintln!("    format: text             # or json");
}
