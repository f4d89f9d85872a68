use std::env;
use std::process;

use tokio::net::TcpStream;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use socks_connect::socks::{ProxyUrl, Result, SocksError, SocksStream};

fn usage() -> ! {
    eprintln!("usage: socks-connect <socks5://[user[:pass]@]proxy[:port]> <host:port>");
    process::exit(2);
}

fn split_target(target: &str) -> Result<(String, u16)> {
    let invalid = || SocksError::InvalidTargetAddress;
    let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

async fn run(proxy: &str, target: &str) -> Result<()> {
    let proxy: ProxyUrl = proxy.parse()?;
    let (host, port) = split_target(target)?;

    let stream = SocksStream::<TcpStream>::connect(&proxy, &host, port).await?;
    match (stream.proxy_addr(), stream.bound_addr()) {
        (Some(via), Some(bound)) => info!(%via, %bound, "connected to {}:{}", host, port),
        (Some(via), None) => info!(%via, "connected to {}:{}", host, port),
        _ => info!("connected to {}:{}", host, port),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 2 {
        usage();
    }

    if let Err(e) = run(&args[0], &args[1]).await {
        error!("{}", e);
        process::exit(1);
    }
}
