use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::model::messages::{decode_response, encode_response, RejectReason};
use crate::model::neighbor::NeighborSet;
use crate::model::route::RoutingTable;
use crate::runtime::config::RouterConfig;
use crate::runtime::transport::{RipTransport, TransportError};

const LOOP_SLEEP: Duration = Duration::from_millis(10);

/// Datagram counters. Rejects never reach peers; these are the only place
/// a dropped packet is visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketStats {
    pub accepted: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub bad_command: u64,
    pub bad_version: u64,
    pub self_loop: u64,
    pub nonzero_reserved: u64,
    pub bad_metric: u64,
    pub truncated: u64,
    pub encode_overflow: u64,
}

impl PacketStats {
    fn record_reject(&mut self, reason: RejectReason) {
        let slot = match reason {
            RejectReason::BadCommand => &mut self.bad_command,
            RejectReason::BadVersion => &mut self.bad_version,
            RejectReason::SelfLoop => &mut self.self_loop,
            RejectReason::NonzeroReserved => &mut self.nonzero_reserved,
            RejectReason::BadMetric => &mut self.bad_metric,
            RejectReason::Truncated => &mut self.truncated,
            RejectReason::EncodeOverflow => &mut self.encode_overflow,
        };
        *slot += 1;
    }

    pub fn rejected_total(&self) -> u64 {
        self.bad_command
            + self.bad_version
            + self.self_loop
            + self.nonzero_reserved
            + self.bad_metric
            + self.truncated
            + self.encode_overflow
    }
}

/// Single-threaded cooperative event loop. The daemon is the only mutator
/// of the routing table; all suspension happens in the sleep at the bottom
/// of each iteration.
pub struct RouterDaemon {
    cfg: RouterConfig,
    transport: RipTransport,
    neighbors: NeighborSet,
    table: RoutingTable,
    stats: PacketStats,
    next_periodic: f64,
    running: Arc<AtomicBool>,
    epoch: Instant,
}

impl RouterDaemon {
    pub fn new(cfg: RouterConfig) -> Result<Self, TransportError> {
        let transport = RipTransport::bind(&cfg.input_ports)?;
        let neighbors = NeighborSet::new(cfg.neighbors.clone());
        let mut table = RoutingTable::new(cfg.router_id);
        table.seed(&cfg.neighbors, 0.0);

        let mut daemon = Self {
            cfg,
            transport,
            neighbors,
            table,
            stats: PacketStats::default(),
            next_periodic: 0.0,
            running: Arc::new(AtomicBool::new(true)),
            epoch: Instant::now(),
        };
        daemon.next_periodic = daemon.jitter();
        Ok(daemon)
    }

    pub fn run_forever(&mut self) -> Result<()> {
        self.install_signal_handler()?;

        info!(
            "ripd start: router_id={} input_ports={:?} neighbors={:?} periodic={}s timeout={}s",
            self.cfg.router_id,
            self.cfg.input_ports,
            self.neighbors
                .iter()
                .map(|neighbor| neighbor.router_id)
                .collect::<Vec<u16>>(),
            self.cfg.periodic_interval,
            self.cfg.timeout_interval
        );
        info!("initial table:\n{}", self.table.render(self.now_secs()));

        while self.running.load(Ordering::Relaxed) {
            let now = self.now_secs();
            self.step(now);
            thread::sleep(LOOP_SLEEP);
        }

        info!("ripd stopped");
        Ok(())
    }

    /// One loop iteration at monotonic time `now`: periodic advertisement,
    /// table aging with triggered withdrawals, then the receive sweep.
    pub fn step(&mut self, now: f64) {
        if now >= self.next_periodic {
            debug!("periodic advertisement at {now:.3}s");
            self.advertise_all();
            self.next_periodic = now + self.jitter();
        }

        let withdrawn = self.table.tick(now, self.cfg.timeout_interval);
        if !withdrawn.is_empty() {
            info!("routes expired: {withdrawn:?}");
            self.advertise_all();
        }

        for frame in self.transport.recv_ready() {
            self.handle_datagram(&frame, now);
        }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn stats(&self) -> &PacketStats {
        &self.stats
    }

    fn handle_datagram(&mut self, frame: &[u8], now: f64) {
        let update = match decode_response(frame, self.cfg.router_id) {
            Ok(update) => update,
            Err(reason) => {
                self.stats.record_reject(reason);
                debug!("drop datagram: {reason}");
                return;
            }
        };
        self.stats.accepted += 1;

        let outcome = self.table.relax(&update, now);
        if !outcome.withdrawn.is_empty() {
            info!(
                "routes withdrawn by router {}: {:?}",
                update.sender_id, outcome.withdrawn
            );
        }
        if outcome.changed {
            debug!(
                "table changed by update from router {}:\n{}",
                update.sender_id,
                self.table.render(now)
            );
            self.advertise_all();
        }
    }

    /// Full-table advertisement to every neighbor, one frame each so
    /// poisoned reverse applies per recipient. Used for both periodic and
    /// triggered updates.
    fn advertise_all(&mut self) {
        for neighbor in self.neighbors.iter() {
            let (routes, metric_to_recipient) = self.table.snapshot_for(neighbor.router_id);
            let frame = match encode_response(
                &routes,
                self.cfg.router_id,
                neighbor.router_id,
                metric_to_recipient,
            ) {
                Ok(frame) => frame,
                Err(reason) => {
                    self.stats.record_reject(reason);
                    warn!("skip advertisement to router {}: {reason}", neighbor.router_id);
                    continue;
                }
            };
            match self.transport.send(&frame, neighbor.port) {
                Ok(_) => self.stats.sent += 1,
                Err(err) => {
                    self.stats.send_failures += 1;
                    warn!("send to port {} failed: {err}", neighbor.port);
                }
            }
        }
    }

    /// Uniform perturbation of the periodic interval, drawn fresh for each
    /// tick so peers do not synchronize.
    fn jitter(&self) -> f64 {
        let factor = rand::thread_rng().gen_range(8..=12) as f64 / 10.0;
        self.cfg.periodic_interval * factor
    }

    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn install_signal_handler(&self) -> Result<()> {
        let running = Arc::clone(&self.running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })?;
        Ok(())
    }
}
