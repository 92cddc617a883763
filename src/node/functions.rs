//! The impls and functions
//!
use std::{sync::{atomic::AtomicBool, Arc}, time::Duration};
use chrono::Local;
use log::*;
use tokio::sync::Mutex;
use crate::node::{Assignment, Node};
use anyhow::Result;
use crate::probe::{probe_client, Tracer};
use crate::transport::Connection;
use crate::utility::epoch_seconds;
use crate::wire::{Command, DataUpload, HelloGreeting, NodeInfo, PlanetlabGreeting, Record};

impl Assignment {
    /// Take over a server reply; the clock offset is measured on arrival.
    pub fn from_reply(info: NodeInfo) -> Self {
        let clock_offset = epoch_seconds(Local::now()) - info.now;
        Assignment { info, clock_offset }
    }
    /// The current time on the server clock, in epoch seconds.
    pub fn server_now(&self) -> f64 {
        epoch_seconds(Local::now()) - self.clock_offset
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("server", &self.server)
            .field("hostname", &self.hostname)
            .field("assignment", &self.assignment)
            .finish()
    }
}

impl Node {
    pub fn new(
        server: &str,
        hostname: Option<String>,
        tracer: Arc<dyn Tracer>,
    ) -> Result<Self>
    {
        Ok(Node {
            server: server.to_string(),
            hostname,
            assignment: Mutex::new(None),
            records: Mutex::new(Vec::new()),
            exchange_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            tracer,
            client: probe_client()?,
        })
    }
    pub async fn assignment(&self) -> Option<Assignment> {
        self.assignment.lock().await.clone()
    }
    pub async fn id(&self) -> Option<String> {
        self.assignment.lock().await.as_ref().map(|assignment| assignment.info.id.clone())
    }
    pub async fn pending_records(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }
    pub async fn push_record(&self, record: Record) {
        self.records.lock().await.push(record);
    }
    /// Register with the server (HELLO).
    ///
    /// Any previous assignment is dropped first, so after a refused or failed registration the node has no id.
    pub async fn hello(&self) -> bool {
        debug!("attempting to register at server at {}", self.server);
        *self.assignment.lock().await = None;

        let mut connection = Connection::connect(&self.server).await;
        if !connection.is_connected() {
            return false;
        }
        connection.send_command(Command::Hello).await;
        connection.send_object(&HelloGreeting { hostname: self.hostname.clone() }).await;
        let registered = match connection.recv_command().await {
            Some(Command::Ok) => match connection.recv_object::<NodeInfo>().await {
                Some(reply) => {
                    debug!("received {:?}", reply);
                    info!("registered as {} in slot {} (delta {:.3}s)", reply.id, reply.slot, reply.delta);
                    *self.assignment.lock().await = Some(Assignment::from_reply(reply));
                    true
                },
                None => false,
            },
            Some(Command::Error) => {
                warn!("server {} returned ERROR after HELLO", self.server);
                false
            },
            Some(other) => {
                warn!("server {} returned unexpected {} after HELLO", self.server, other);
                false
            },
            None => false,
        };
        connection.close().await;
        registered
    }
    /// Repeat HELLO until the server assigned an id.
    pub async fn register(&self, retry_delay: Duration) {
        while !self.hello().await {
            info!("registration at {} failed, retrying in {:?}", self.server, retry_delay);
            tokio::time::sleep(retry_delay).await;
        }
    }
    /// Upload the pending records (PLANETLAB) and take over the fresh configuration.
    ///
    /// Only the records that were sent are removed, and only after the server acknowledged them.
    /// Returns whether the server acknowledged.
    pub async fn exchange(&self) -> bool {
        let _exclusive = self.exchange_lock.lock().await;
        let Some(assignment) = self.assignment().await else {
            warn!("exchange with {} skipped: node is not registered", self.server);
            return false;
        };
        debug!("starting update protocol with {}", self.server);

        let mut connection = Connection::connect(&self.server).await;
        if !connection.is_connected() {
            return false;
        }
        // greet with the id and slot we remember, the server may have restarted since.
        connection.send_command(Command::Planetlab).await;
        connection.send_object(&PlanetlabGreeting {
            id: assignment.info.id.clone(),
            slot: assignment.info.slot,
            hostname: self.hostname.clone(),
        }).await;

        let acknowledged = match connection.recv_command().await {
            Some(Command::Ok) => match connection.recv_object::<NodeInfo>().await {
                Some(reply) => {
                    debug!("received {:?}", reply);
                    if reply.slot != assignment.info.slot {
                        info!("moved from slot {} to slot {} (delta {:.3}s)", assignment.info.slot, reply.slot, reply.delta);
                    }
                    *self.assignment.lock().await = Some(Assignment::from_reply(reply));
                    self.upload(&mut connection).await
                },
                None => false,
            },
            Some(Command::Error) => {
                warn!("server {} returned ERROR after PLANETLAB greeting", self.server);
                false
            },
            Some(other) => {
                warn!("server {} returned unexpected {} after PLANETLAB greeting", self.server, other);
                false
            },
            None => false,
        };
        connection.close().await;
        acknowledged
    }
    async fn upload(
        &self,
        connection: &mut Connection,
    ) -> bool
    {
        let records = self.pending_records().await;
        let sent = records.len();
        connection.send_object(&DataUpload { records }).await;
        match connection.recv_command().await {
            Some(Command::Ok) => {
                let mut pending = self.records.lock().await;
                let sent = sent.min(pending.len());
                pending.drain(..sent);
                debug!("{} records acknowledged, {} pending", sent, pending.len());
                true
            },
            Some(Command::Error) => {
                warn!("server {} returned ERROR after data", self.server);
                false
            },
            Some(other) => {
                warn!("server {} returned unexpected {} after data", self.server, other);
                false
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::server::{Server, ServerSettings};
    use crate::utility::testing::FixedTracer;
    use crate::wire::ProbeResult;

    async fn start_server(dir: &Path, table_size: usize) -> (String, Arc<crate::server::ServerContext>) {
        std::fs::write(dir.join("targets.txt"), "t1\nt2\n").unwrap();
        std::fs::write(dir.join("requests.txt"), "/1k\n").unwrap();
        let settings = ServerSettings {
            bind: "127.0.0.1:0".to_string(),
            hosts_file: dir.join("targets.txt"),
            requests_file: dir.join("requests.txt"),
            data_dir: dir.join("data"),
            interval: 60,
            dead_interval: 3600,
            table_size,
            sweep_interval: Duration::from_secs(60),
        };
        let server = Server::bind(&settings).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        let context = server.context.clone();
        tokio::spawn(server.run());
        (address, context)
    }

    fn record(target: &str) -> Record {
        let mut record = Record::new();
        record.insert(target.to_string(), ProbeResult::default());
        record
    }

    #[tokio::test]
    async fn unit_hello_sets_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let (address, _context) = start_server(dir.path(), 4).await;
        let node = Node::new(&address, Some("node-a".to_string()), Arc::new(FixedTracer)).unwrap();

        assert!(node.hello().await);
        let assignment = node.assignment().await.unwrap();
        assert_eq!(assignment.info.slot, 2);
        assert_eq!(assignment.info.delta, 30.0);
        assert_eq!(assignment.info.targets, vec!["t1", "t2"]);
        // same machine, same clock.
        assert!(assignment.clock_offset.abs() < 5.0);
    }

    #[tokio::test]
    async fn unit_hello_refused_when_table_full() {
        let dir = tempfile::tempdir().unwrap();
        let (address, context) = start_server(dir.path(), 1).await;
        context.registry.hello(None, "occupant").await.unwrap();
        let node = Arc::new(Node::new(&address, None, Arc::new(FixedTracer)).unwrap());

        assert!(!node.hello().await);
        assert!(node.id().await.is_none());
        assert!(node.start().await.is_err());
    }

    #[tokio::test]
    async fn unit_hello_without_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        let node = Node::new(&address, None, Arc::new(FixedTracer)).unwrap();
        assert!(!node.hello().await);
        assert!(!node.exchange().await);
    }

    #[tokio::test]
    async fn unit_exchange_clears_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let (address, _context) = start_server(dir.path(), 16).await;
        let node = Node::new(&address, Some("node-b".to_string()), Arc::new(FixedTracer)).unwrap();
        assert!(node.hello().await);

        node.push_record(record("t1")).await;
        assert!(node.exchange().await);
        assert!(node.pending_records().await.is_empty());
        // a second exchange uploads an empty list.
        assert!(node.exchange().await);

        let content = std::fs::read_to_string(dir.path().join("data").join("node-b.txt")).unwrap();
        assert_eq!(content.lines().count(), 4);
    }

    #[tokio::test]
    async fn unit_exchange_failure_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let (address, context) = start_server(dir.path(), 16).await;
        let node = Node::new(&address, None, Arc::new(FixedTracer)).unwrap();
        assert!(node.hello().await);
        node.push_record(record("t1")).await;

        context.request_shutdown();
        // wait until the listener is gone.
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(&address).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!node.exchange().await);
        assert_eq!(node.pending_records().await.len(), 1);
    }

    #[tokio::test]
    async fn unit_exchange_after_server_restart_restores_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (address, _context) = start_server(dir.path(), 16).await;
        let node = Node::new(&address, Some("node-c".to_string()), Arc::new(FixedTracer)).unwrap();
        assert!(node.hello().await);
        let before = node.assignment().await.unwrap().info;

        // a second server instance knows nothing about the node.
        let other_dir = tempfile::tempdir().unwrap();
        let (other_address, other_context) = start_server(other_dir.path(), 16).await;
        let moved = Node {
            server: other_address,
            ..Node::new("unused", Some("node-c".to_string()), Arc::new(FixedTracer)).unwrap()
        };
        *moved.assignment.lock().await = Some(Assignment { info: before.clone(), clock_offset: 0.0 });
        assert!(moved.exchange().await);

        let after = moved.assignment().await.unwrap().info;
        assert_eq!(after.id, before.id);
        assert_eq!(after.slot, before.slot);
        assert_eq!(other_context.registry.snapshot().await[0].id, before.id);
    }
}
