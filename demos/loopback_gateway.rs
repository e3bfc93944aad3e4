// ABOUTME: Runs the dispatch core against the loopback session to show a full send and receipt cycle
// ABOUTME: Queues outbound messages, lets the gateway drain them, then feeds back delivery receipts

//! # Loopback Gateway
//!
//! Starts a [`Gateway`] over a [`LoopbackSession`] and a SQLite store, queues
//! a few outbound messages, waits for them to drain and answers each accepted
//! submit with a `DELIVRD` receipt.
//!
//! ## Usage
//!
//! ```bash
//! # In-memory store, defaults everywhere
//! cargo run --example loopback_gateway
//!
//! # Ten long messages, debug logging, configuration from a file
//! cargo run --example loopback_gateway -- -d \
//!   --config gateway.toml --messages 10 --text-length 400
//! ```

use argh::FromArgs;
use smpp_dispatch::config::EndpointConfig;
use smpp_dispatch::datatypes::tlv::{MESSAGE_STATE, RECEIPTED_MESSAGE_ID};
use smpp_dispatch::datatypes::{InboundUnit, MessageState, Tlv};
use smpp_dispatch::store::OutboundToken;
use smpp_dispatch::{
    Gateway, GatewayConfig, LoopbackSession, SqliteQueueStore, StoreOptions, StorePaths,
    load_config_from_path,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Loopback run of the SMS dispatch core
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// gateway configuration file (TOML)
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of outbound messages to queue (default: 5)
    #[argh(option, short = 'n')]
    messages: Option<i64>,

    /// characters per message (default: 20)
    #[argh(option)]
    text_length: Option<usize>,

    /// the telephone number that the messages will be from (default: 7000)
    #[argh(option, short = 'f')]
    from: Option<String>,

    /// how long to let the gateway run in seconds (default: 3)
    #[argh(option)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli_args.config {
        Some(path) => load_config_from_path(path)?,
        None => GatewayConfig::default(),
    };
    if config.endpoints.is_empty() {
        config.endpoints.push(EndpointConfig {
            address: "127.0.0.1:2775".to_string(),
            field_name: "loopback".to_string(),
        });
    }
    config.reports.report_all = true;
    config.dispatch.interval_ms = config.dispatch.interval_ms.min(250);

    let options = StoreOptions::from(&config);
    let store = Arc::new(match &config.store.dir {
        Some(dir) => SqliteQueueStore::open(&StorePaths::in_dir(dir), options)?,
        None => SqliteQueueStore::open_in_memory(options)?,
    });
    let session = Arc::new(LoopbackSession::new(
        config.endpoints.iter().map(|e| e.address.clone()),
    ));

    let count = cli_args.messages.unwrap_or(5);
    let text = "x".repeat(cli_args.text_length.unwrap_or(20));
    let from = cli_args.from.unwrap_or_else(|| "7000".to_owned());
    let message_type = config
        .out_queue_message_types
        .first()
        .cloned()
        .unwrap_or_else(|| "SMS".to_owned());
    for id in 1..=count {
        store.push_outbound(&OutboundToken::text(
            id,
            message_type.as_str(),
            from.as_str(),
            format!("1555{id:04}"),
            text.as_str(),
        ))?;
    }
    info!("Queued {count} outbound messages");

    let field_names: Vec<String> = config.endpoints.iter().map(|e| e.field_name.clone()).collect();
    let session_name = config.session_name.clone();
    let mut gateway = Gateway::builder(store.clone(), session.clone(), config).build()?;
    gateway.start().await?;

    tokio::time::sleep(Duration::from_secs(cli_args.run_duration.unwrap_or(3))).await;

    for (seq, message_id) in session.accepted_ids().into_iter().enumerate() {
        let body = format!(
            "id:{message_id} sub:001 dlvrd:001 submit date:2601011200 done date:2601011201 stat:DELIVRD err:000 text:"
        );
        let receipt = InboundUnit::new(format!("1555{:04}", seq + 1), from.as_str(), body)
            .as_delivery_receipt()
            .with_tlv(Tlv::new(RECEIPTED_MESSAGE_ID, format!("{message_id}\0").into_bytes()))
            .with_tlv(Tlv::new(MESSAGE_STATE, vec![u8::from(MessageState::Delivered)]));
        if session.deliver(receipt).await != Some(true) {
            warn!("Receipt for {message_id} was not handled");
        }
    }

    gateway.stop().await?;

    let log = store.outbound_log()?;
    let delivered = session
        .accepted_ids()
        .iter()
        .filter_map(|id| store.report(id, &session_name).ok().flatten())
        .filter(|r| r.status == Some(u8::from(MessageState::Delivered)))
        .count();
    info!("Units sent: {}", session.submitted().len());
    info!("Log rows: {}", log.len());
    info!("Receipts correlated: {delivered}");
    for field in field_names {
        if let Some(status) = store.connection_status(&field)? {
            info!("Endpoint {field}: {}", status.status);
        }
    }

    Ok(())
}
