//! The impls and functions
//!
use chrono::{DateTime, Duration, Local};
use log::*;
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::registry::{Admission, NodeEntry, Registry, SlotTable};
use crate::wire::PlanetlabGreeting;

impl Admission {
    pub fn entry(&self) -> &NodeEntry {
        match self {
            Admission::Known(entry) | Admission::Restored(entry) | Admission::Reassigned(entry) => entry,
        }
    }
}

impl SlotTable {
    pub fn new(
        size: usize,
        interval: u64,
    ) -> Self
    {
        SlotTable { slots: vec![None; size], interval }
    }
    pub fn size(&self) -> usize {
        self.slots.len()
    }
    /// Phase offset in seconds for a slot.
    pub fn slot2time(&self, slot: usize) -> f64 {
        slot as f64 * self.interval as f64 / self.size() as f64
    }
    /// Inverse of [SlotTable::slot2time]; fractional for offsets between slots.
    pub fn time2slot(&self, time: f64) -> f64 {
        time * self.size() as f64 / self.interval as f64
    }
    /// Find an empty slot.
    ///
    /// The table is scanned with a halving stride: first the middle, then the quarters, then the eighths, and
    /// so on. New nodes are spread over the table, which spreads their phase offsets over the interval.
    pub fn find_free_slot(&self) -> Option<usize> {
        let size = self.size();
        let mut step = size as f64;
        loop {
            let mut current = 0_f64;
            loop {
                let index = (current + step / 2.0) as usize;
                if index >= size {
                    break;
                }
                if self.slots[index].is_none() {
                    return Some(index);
                }
                current += step;
            }
            if step <= 1.0 {
                return None;
            }
            step /= 2.0;
        }
    }
    /// Allocate a free slot for a new node with a fresh id.
    /// Returns `None` when the table is full.
    pub fn assign_slot(
        &mut self,
        hostname: Option<String>,
        address: &str,
        now: DateTime<Local>,
    ) -> Option<NodeEntry>
    {
        let slot = self.find_free_slot()?;
        let entry = NodeEntry {
            id: Uuid::new_v4().to_string(),
            address: address.to_string(),
            last_seen: now,
            slot,
            delta: self.slot2time(slot),
            hostname,
        };
        self.slots[slot] = Some(entry.clone());
        Some(entry)
    }
    pub fn find_by_id(&self, id: &str) -> Option<&NodeEntry> {
        self.slots.iter().flatten().find(|entry| entry.id == id)
    }
    fn find_by_id_mut(&mut self, id: &str) -> Option<&mut NodeEntry> {
        self.slots.iter_mut().flatten().find(|entry| entry.id == id)
    }
    /// Find or (re)create the entry for a node presenting itself with PLANETLAB.
    ///
    /// An unknown node is put back into the slot it remembers when that slot is empty,
    /// otherwise it gets a new slot but keeps its id.
    /// Returns `None` only when a new slot is needed and the table is full.
    pub fn admit(
        &mut self,
        greeting: &PlanetlabGreeting,
        address: &str,
        now: DateTime<Local>,
    ) -> Option<Admission>
    {
        if let Some(entry) = self.find_by_id_mut(&greeting.id) {
            entry.last_seen = now;
            entry.address = address.to_string();
            return Some(Admission::Known(entry.clone()));
        }
        let remembered = greeting.slot;
        if remembered < self.size() && self.slots[remembered].is_none() {
            let entry = NodeEntry {
                id: greeting.id.clone(),
                address: address.to_string(),
                last_seen: now,
                slot: remembered,
                delta: self.slot2time(remembered),
                hostname: greeting.hostname.clone(),
            };
            self.slots[remembered] = Some(entry.clone());
            return Some(Admission::Restored(entry));
        }
        let slot = self.assign_slot(greeting.hostname.clone(), address, now)?.slot;
        let entry = self.slots[slot].as_mut()?;
        entry.id = greeting.id.clone();
        Some(Admission::Reassigned(entry.clone()))
    }
    /// Evict every entry not seen for `dead_interval` or longer.
    pub fn sweep_dead(
        &mut self,
        now: DateTime<Local>,
        dead_interval: Duration,
    ) -> Vec<NodeEntry>
    {
        let mut evicted = Vec::new();
        for slot in self.slots.iter_mut() {
            if slot.as_ref().map_or(false, |entry| now - entry.last_seen >= dead_interval) {
                if let Some(entry) = slot.take() {
                    evicted.push(entry);
                }
            }
        }
        evicted
    }
    pub fn occupied(&self) -> impl Iterator<Item = &NodeEntry> {
        self.slots.iter().flatten()
    }
}

impl Registry {
    pub fn new(
        size: usize,
        interval: u64,
    ) -> Self
    {
        Registry { table: Mutex::new(SlotTable::new(size, interval)) }
    }
    /// Register a node saying HELLO.
    pub async fn hello(
        &self,
        hostname: Option<String>,
        address: &str,
    ) -> Option<NodeEntry>
    {
        let mut table = self.table.lock().await;
        let entry = table.assign_slot(hostname, address, Local::now());
        match &entry {
            Some(entry) => info!("assigned slot {} (delta {:.3}s) to {} ({})", entry.slot, entry.delta, entry.hostname.as_deref().unwrap_or("-"), address),
            None => warn!("no free slot for {}, table of {} slots is full", address, table.size()),
        }
        entry
    }
    /// Find or (re)create a node saying PLANETLAB; lookup and creation happen under one lock.
    pub async fn admit(
        &self,
        greeting: &PlanetlabGreeting,
        address: &str,
    ) -> Option<Admission>
    {
        let mut table = self.table.lock().await;
        let admission = table.admit(greeting, address, Local::now());
        match &admission {
            Some(Admission::Known(_)) => {},
            Some(Admission::Restored(entry)) => info!("restored node {} to slot {}", entry.id, entry.slot),
            Some(Admission::Reassigned(entry)) => info!("node {} lost slot {}, reassigned to slot {}", entry.id, greeting.slot, entry.slot),
            None => warn!("no free slot for node {} at {}, table of {} slots is full", greeting.id, address, table.size()),
        }
        admission
    }
    pub async fn sweep_dead(
        &self,
        dead_interval: Duration,
    ) -> Vec<NodeEntry>
    {
        debug!("filtering dead nodes");
        let evicted = self.table.lock().await.sweep_dead(Local::now(), dead_interval);
        for entry in &evicted {
            info!("evicted dead node {} ({}) from slot {}, last seen {}", entry.id, entry.hostname.as_deref().unwrap_or("-"), entry.slot, entry.last_seen);
        }
        evicted
    }
    /// A copy of all occupied slots, in slot order.
    pub async fn snapshot(&self) -> Vec<NodeEntry> {
        self.table.lock().await.occupied().cloned().collect()
    }
    /// The (fractional) slot whose phase offset is `offset` seconds into the interval.
    pub async fn slot_at(&self, offset: f64) -> f64 {
        self.table.lock().await.time2slot(offset)
    }
}
