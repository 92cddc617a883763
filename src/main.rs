use std::{collections::HashMap, path::PathBuf, process, sync::Arc};
use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::*;

use pingfleet::{command, utility};
use pingfleet::config::DEFAULT_INTERVAL;
use pingfleet::node::{Node, DEFAULT_RETRY_DELAY};
use pingfleet::probe::Tracepath;
use pingfleet::registry::DEFAULT_TABLE_SIZE;
use pingfleet::server::{Server, ServerSettings, DEFAULT_DEAD_INTERVAL, DEFAULT_SWEEP_INTERVAL};

const DEFAULT_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_SERVER_ADDRESS: &str = "localhost";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_HOSTS_FILE: &str = "targets.txt";
const DEFAULT_REQUESTS_FILE: &str = "requests.txt";
const DEFAULT_DATA_DIR: &str = "data";

/// Distributed HTTP latency and network path measurement.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Opts {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Run the coordinating server
    Server {
        /// address to listen on
        #[arg(short, long)]
        address: Option<String>,
        /// port to listen on
        #[arg(short, long)]
        port: Option<String>,
        /// file with one target (host[:port][|label]) per line
        #[arg(long)]
        hosts_file: Option<String>,
        /// file with one request path per line
        #[arg(long)]
        requests_file: Option<String>,
        /// directory for the record files
        #[arg(long)]
        data_dir: Option<String>,
        /// measurement interval in seconds
        #[arg(short, long)]
        interval: Option<String>,
        /// write the effective settings to .env
        #[arg(long)]
        write_dotenv: bool,
    },
    /// Run a probe node
    Node {
        /// server address
        #[arg(short, long)]
        address: Option<String>,
        /// server port
        #[arg(short, long)]
        port: Option<String>,
        /// write the effective settings to .env
        #[arg(long)]
        write_dotenv: bool,
    },
    /// Send an admin command (REFRESH, SHUTDOWN or STATUS) to the server
    Command {
        /// REFRESH, SHUTDOWN or STATUS
        name: String,
        /// server address
        #[arg(short, long)]
        address: Option<String>,
        /// server port
        #[arg(short, long)]
        port: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let options = Opts::parse();

    let result = match options.action {
        Action::Server { address, port, hosts_file, requests_file, data_dir, interval, write_dotenv } => {
            run_server(address, port, hosts_file, requests_file, data_dir, interval, write_dotenv).await
        },
        Action::Node { address, port, write_dotenv } => run_node(address, port, write_dotenv).await,
        Action::Command { name, address, port } => {
            let mut changed_options = HashMap::new();
            let address = utility::set_option(&address, "PINGFLEET_SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS, &mut changed_options);
            let port = utility::set_option(&port, "PINGFLEET_PORT", DEFAULT_PORT, &mut changed_options);
            command::admin_command(&name, &format!("{}:{}", address, port)).await
        },
    };
    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run_server(
    address: Option<String>,
    port: Option<String>,
    hosts_file: Option<String>,
    requests_file: Option<String>,
    data_dir: Option<String>,
    interval: Option<String>,
    write_dotenv: bool,
) -> Result<()>
{
    let mut changed_options = HashMap::new();
    let address = utility::set_option(&address, "PINGFLEET_SERVER_ADDRESS", DEFAULT_SERVER_BIND_ADDRESS, &mut changed_options);
    let port = utility::set_option(&port, "PINGFLEET_PORT", DEFAULT_PORT, &mut changed_options);
    let hosts_file = utility::set_option(&hosts_file, "PINGFLEET_HOSTS_FILE", DEFAULT_HOSTS_FILE, &mut changed_options);
    let requests_file = utility::set_option(&requests_file, "PINGFLEET_REQUESTS_FILE", DEFAULT_REQUESTS_FILE, &mut changed_options);
    let data_dir = utility::set_option(&data_dir, "PINGFLEET_DATA_DIR", DEFAULT_DATA_DIR, &mut changed_options);
    let interval = utility::set_number_option(&interval, "PINGFLEET_INTERVAL", DEFAULT_INTERVAL, &mut changed_options)?;
    utility::dotenv_writer(write_dotenv, changed_options)?;

    let settings = ServerSettings {
        bind: format!("{}:{}", address, port),
        hosts_file: PathBuf::from(hosts_file),
        requests_file: PathBuf::from(requests_file),
        data_dir: PathBuf::from(data_dir),
        interval,
        dead_interval: DEFAULT_DEAD_INTERVAL,
        table_size: DEFAULT_TABLE_SIZE,
        sweep_interval: DEFAULT_SWEEP_INTERVAL,
    };
    Server::bind(&settings).await?.run().await
}

async fn run_node(
    address: Option<String>,
    port: Option<String>,
    write_dotenv: bool,
) -> Result<()>
{
    let mut changed_options = HashMap::new();
    let address = utility::set_option(&address, "PINGFLEET_SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS, &mut changed_options);
    let port = utility::set_option(&port, "PINGFLEET_PORT", DEFAULT_PORT, &mut changed_options);
    utility::dotenv_writer(write_dotenv, changed_options)?;

    let node = Arc::new(Node::new(&format!("{}:{}", address, port), utility::local_hostname(), Arc::new(Tracepath))?);
    tokio::select! {
        _ = node.register(DEFAULT_RETRY_DELAY) => {},
        interrupted = tokio::signal::ctrl_c() => {
            interrupted?;
            info!("interrupted before registration");
            return Ok(());
        },
    }
    let scheduler = node.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping measurements");
    scheduler.stop().await;
    if !node.exchange().await {
        warn!("final exchange failed, {} records lost", node.pending_records().await.len());
    }
    Ok(())
}
