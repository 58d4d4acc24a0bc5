use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use flashsync_proxy::{bind, ProxyConfig, ProxyState};
use flashsync_store::MemoryDocumentStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("flashsync-proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Origin-checked proxy for the flashcard rating store")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .env("FLASHSYNC_PROXY_LISTEN")
                .value_parser(value_parser!(SocketAddr))
                .help("Address to listen on"),
        )
        .arg(
            Arg::new("bin-id")
                .long("bin-id")
                .env("FLASHSYNC_BIN_ID")
                .help("Upstream bin holding the document"),
        )
        .arg(
            Arg::new("master-key")
                .long("master-key")
                .env("FLASHSYNC_MASTER_KEY")
                .hide_env_values(true)
                .help("Upstream credential"),
        )
        .arg(
            Arg::new("upstream")
                .long("upstream")
                .env("FLASHSYNC_UPSTREAM")
                .help("Upstream API base"),
        )
        .arg(
            Arg::new("allow-origin")
                .long("allow-origin")
                .action(ArgAction::Append)
                .help("Allowed browser origin; repeat to allow several"),
        )
        .arg(
            Arg::new("require-origin")
                .long("require-origin")
                .action(ArgAction::SetTrue)
                .help("Reject requests without an Origin header"),
        )
        .arg(
            Arg::new("in-memory")
                .long("in-memory")
                .action(ArgAction::SetTrue)
                .help("Serve an in-process document instead of the upstream"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ProxyConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ProxyConfig::default(),
    };
    if let Some(listen) = matches.get_one::<SocketAddr>("listen") {
        config.listen = *listen;
    }
    if let Some(bin_id) = matches.get_one::<String>("bin-id") {
        config.bin_id.clone_from(bin_id);
    }
    if let Some(key) = matches.get_one::<String>("master-key") {
        config.master_key.clone_from(key);
    }
    if let Some(upstream) = matches.get_one::<String>("upstream") {
        config.upstream_base.clone_from(upstream);
    }
    if let Some(origins) = matches.get_many::<String>("allow-origin") {
        config.allowed_origins = origins.cloned().collect();
    }
    if matches.get_flag("require-origin") {
        config.allow_missing_origin = false;
    }
    info!(?config, "Starting proxy");

    let (addr, server) = if matches.get_flag("in-memory") {
        let state = ProxyState::new(config, Arc::new(MemoryDocumentStore::new()));
        let (addr, server) = bind(Arc::new(state), shutdown_signal())?;
        (addr, tokio::spawn(server))
    } else {
        let store = config.upstream_store().context("configuring upstream")?;
        let state = ProxyState::new(config, Arc::new(store));
        let (addr, server) = bind(Arc::new(state), shutdown_signal())?;
        (addr, tokio::spawn(server))
    };
    info!(%addr, "Listening");

    server.await.context("proxy server task")?;
    Ok(())
}
