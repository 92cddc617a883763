//! The impls and functions
//!
use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::{Context, Result};
use chrono::Local;
use log::*;
use tokio::{io::{AsyncRead, AsyncWrite}, net::TcpListener, sync::watch, task::JoinSet};
use crate::config::{ConfigStore, GlobalConfig};
use crate::registry::{NodeEntry, Registry};
use crate::server::{Server, ServerContext, ServerSettings};
use crate::store::RecordStore;
use crate::transport::Connection;
use crate::utility::{epoch_seconds, time2str};
use crate::wire::{Command, DataUpload, HelloGreeting, NodeInfo, PlanetlabGreeting};

impl ServerContext {
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Server {
    /// Load the configuration, prepare the data directory and bind the listener.
    pub async fn bind(
        settings: &ServerSettings,
    ) -> Result<Server>
    {
        let store = RecordStore::new(&settings.data_dir)?;
        let config = ConfigStore::new(settings.hosts_file.clone(), settings.requests_file.clone(), settings.interval).await;
        let listener = TcpListener::bind(&settings.bind)
            .await
            .with_context(|| format!("Cannot bind to {}", settings.bind))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let context = ServerContext {
            registry: Registry::new(settings.table_size, settings.interval),
            config,
            store,
            started: Local::now(),
            dead_interval: settings.dead_interval,
            shutdown: shutdown_tx,
        };
        Ok(Server {
            listener,
            context: Arc::new(context),
            sweep_interval: settings.sweep_interval,
            shutdown: shutdown_rx,
        })
    }
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
    /// Accept connections until SHUTDOWN, then wait for the running sessions to finish.
    pub async fn run(mut self) -> Result<()> {
        info!("starting pingfleet server on {}", self.local_addr()?);
        let sweeper = tokio::spawn(sweep_loop(self.context.clone(), self.sweep_interval));
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let context = self.context.clone();
                        sessions.spawn(handle_session(Connection::accepted(stream, peer), context));
                    },
                    Err(e) => warn!("accept failed: {}", e),
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        error!("session task failed: {}", e);
                    }
                },
                _ = self.shutdown.changed() => break,
            }
        }

        info!("shutting down, waiting for {} running sessions", sessions.len());
        drop(self.listener);
        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                error!("session task failed: {}", e);
            }
        }
        sweeper.abort();
        info!("server stopped");
        Ok(())
    }
}

async fn sweep_loop(
    context: Arc<ServerContext>,
    every: Duration,
)
{
    let dead_interval = chrono::Duration::seconds(context.dead_interval as i64);
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        context.registry.sweep_dead(dead_interval).await;
    }
}

/// The reply to HELLO and PLANETLAB.
pub fn node_info(
    entry: &NodeEntry,
    config: &GlobalConfig,
) -> NodeInfo
{
    NodeInfo {
        id: entry.id.clone(),
        slot: entry.slot,
        delta: entry.delta,
        interval: config.interval,
        now: epoch_seconds(Local::now()),
        targets: config.targets.clone(),
        request_paths: config.request_paths.clone(),
    }
}

/// Handle exactly one command on a connection. The connection is always closed on return.
pub async fn handle_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut connection: Connection<S>,
    context: Arc<ServerContext>,
)
{
    let Some(command) = connection.recv_command().await else { return };
    debug!("received {} from {}", command, connection.peer);

    match command {
        Command::Refresh => {
            connection.send_command(Command::Ok).await;
            connection.close().await;
            context.config.reload().await;
        },
        Command::Shutdown => {
            connection.send_command(Command::Ok).await;
            connection.close().await;
            info!("shutdown requested by {}", connection.peer);
            context.request_shutdown();
        },
        Command::Status => {
            connection.send_command(Command::Ok).await;
            connection.close().await;
            info!("{}", status_report(&context).await);
        },
        Command::Hello => hello(&mut connection, &context).await,
        Command::Planetlab => planetlab(&mut connection, &context).await,
        Command::Ok | Command::Error => warn!("unexpected {} from {} as first command", command, connection.peer),
    }
    connection.close().await;
}

async fn hello<S: AsyncRead + AsyncWrite + Unpin>(
    connection: &mut Connection<S>,
    context: &ServerContext,
)
{
    let Some(greeting) = connection.recv_object::<HelloGreeting>().await else {
        debug!("HELLO from {}: no greeting", connection.peer);
        return;
    };
    match context.registry.hello(greeting.hostname, &connection.peer).await {
        Some(entry) => {
            let config = context.config.snapshot().await;
            let reply = node_info(&entry, &config);
            connection.send_command(Command::Ok).await;
            connection.send_object(&reply).await;
        },
        None => connection.send_command(Command::Error).await,
    }
}

async fn planetlab<S: AsyncRead + AsyncWrite + Unpin>(
    connection: &mut Connection<S>,
    context: &ServerContext,
)
{
    let Some(greeting) = connection.recv_object::<PlanetlabGreeting>().await else {
        debug!("PLANETLAB from {}: no greeting", connection.peer);
        return;
    };
    // known id, restored slot or a new slot; ERROR only when the table is full.
    let Some(admission) = context.registry.admit(&greeting, &connection.peer).await else {
        connection.send_command(Command::Error).await;
        return;
    };
    let entry = admission.entry().clone();
    let config = context.config.snapshot().await;
    let reply = node_info(&entry, &config);
    connection.send_command(Command::Ok).await;
    connection.send_object(&reply).await;

    // the node sends its pending records, possibly none.
    let Some(upload) = connection.recv_object::<DataUpload>().await else {
        debug!("PLANETLAB from {}: no data after greeting", connection.peer);
        return;
    };
    connection.send_command(Command::Ok).await;
    connection.close().await;

    // file i/o stays off the runtime threads.
    let store = context.store.clone();
    let count = upload.records.len();
    let id = entry.id.clone();
    let stored = tokio::task::spawn_blocking(move || store.store(&entry, &upload.records)).await;
    match stored {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!("storing {} records of node {} ({}) failed: {:#}", count, id, connection.peer, e),
        Err(e) => error!("storing {} records of node {} ({}) failed: {}", count, id, connection.peer, e),
    }
}

/// The human readable listing of all known nodes, emitted on STATUS.
pub async fn status_report(context: &ServerContext) -> String {
    let nodes = context.registry.snapshot().await;
    let interval = context.config.snapshot().await.interval;
    let now = Local::now();

    let mut report = format!("\n {:<3} {:<45} {:<4} {:<7} {:<8} {}\n", "#", "HOSTNAME", "SLOT", "DELTA", "SEEN", "ADDR");
    for (number, node) in nodes.iter().enumerate() {
        let seen = (now - node.last_seen).num_milliseconds() as f64 / 1000.0;
        report.push_str(&format!(" {:>2}. {:<45} {:>4} {:>7.3} {} {}\n",
                                 number + 1,
                                 node.hostname.as_deref().unwrap_or("-"),
                                 node.slot,
                                 node.delta,
                                 time2str(seen),
                                 node.address,
        ));
    }

    let uptime = now - context.started;
    let interval_millis = (interval.max(1) * 1000) as i64;
    let next_delta = (interval_millis - now.timestamp_millis().rem_euclid(interval_millis)) as f64 / 1000.0;
    let next_cycle = now + chrono::Duration::milliseconds((next_delta * 1000.0) as i64);
    report.push_str(&format!("\nServer started on:            {} ({} ago)\n", context.started.format("%a %b %e %T %Y"), format_uptime(uptime)));
    report.push_str(&format!("Current server time:          {}\n", now.format("%a %b %e %T %Y")));
    report.push_str(&format!("Next synchronization cycle:   {} (in {})\n", next_cycle.format("%a %b %e %T %Y"), time2str(next_delta)));
    // slots are probing in phase order; show where in the table the interval is now.
    let offset = now.timestamp_millis().rem_euclid(interval_millis) as f64 / 1000.0;
    report.push_str(&format!("Slot in progress:             {:.1}\n", context.registry.slot_at(offset).await));
    report.push_str(&format!("Known nodes:                  {}\n", nodes.len()));
    report
}

fn format_uptime(uptime: chrono::Duration) -> String {
    let seconds = uptime.num_seconds().max(0);
    let days = seconds / 86_400;
    let rest = seconds % 86_400;
    format!("{} days, {:02}:{:02}:{:02}", days, rest / 3600, (rest % 3600) / 60, rest % 60)
}
