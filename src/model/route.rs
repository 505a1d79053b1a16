use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::model::messages::{AdvertisedRoute, DecodedUpdate};
use crate::model::neighbor::Neighbor;

/// Hop count treated as unreachable.
pub const INFINITY_METRIC: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Active,
    /// Advertised at the infinity metric until the garbage timer elapses,
    /// then removed.
    ExpiredGarbage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub destination: u16,
    pub next_hop: u16,
    pub metric: u16,
    pub learned_from: u16,
    pub last_updated: f64,
    pub state: RouteState,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelaxOutcome {
    pub changed: bool,
    pub withdrawn: Vec<u16>,
}

/// Distance-vector table keyed by destination router id.
///
/// Mutated only by `seed`, `relax` and `tick`; the event loop is the sole
/// caller of all three.
#[derive(Debug)]
pub struct RoutingTable {
    self_id: u16,
    routes: BTreeMap<u16, RouteEntry>,
}

impl RoutingTable {
    pub fn new(self_id: u16) -> Self {
        Self {
            self_id,
            routes: BTreeMap::new(),
        }
    }

    /// Installs one Active entry per configured neighbor. Seeded routes are
    /// marked as learned from this router and never expire by aging.
    pub fn seed<'a>(&mut self, neighbors: impl IntoIterator<Item = &'a Neighbor>, now: f64) {
        for neighbor in neighbors {
            self.routes.insert(
                neighbor.router_id,
                RouteEntry {
                    destination: neighbor.router_id,
                    next_hop: neighbor.router_id,
                    metric: neighbor.link_metric,
                    learned_from: self.self_id,
                    last_updated: now,
                    state: RouteState::Active,
                },
            );
        }
    }

    /// Applies one decoded update. The whole update is discarded when there
    /// is no live route to the sender, since its advertised costs cannot be
    /// anchored to a link cost.
    pub fn relax(&mut self, update: &DecodedUpdate, now: f64) -> RelaxOutcome {
        let mut outcome = RelaxOutcome::default();
        let Some(cost) = self.live_metric_to(update.sender_id) else {
            return outcome;
        };

        for advert in &update.entries {
            if advert.destination == self.self_id {
                continue;
            }
            let offered = advert.metric.saturating_add(cost).min(INFINITY_METRIC);

            match self.routes.entry(advert.destination) {
                Entry::Vacant(slot) => {
                    slot.insert(RouteEntry {
                        destination: advert.destination,
                        next_hop: update.sender_id,
                        metric: offered,
                        learned_from: update.sender_id,
                        last_updated: now,
                        state: RouteState::Active,
                    });
                    outcome.changed = true;
                }
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    if entry.learned_from == update.sender_id {
                        // Trust your source: the upstream that installed
                        // this route is authoritative for both better and
                        // worse news.
                        if entry.metric != offered {
                            outcome.changed = true;
                        }
                        entry.metric = offered;
                        entry.last_updated = now;
                        if offered >= INFINITY_METRIC {
                            if entry.state != RouteState::ExpiredGarbage {
                                entry.state = RouteState::ExpiredGarbage;
                                outcome.changed = true;
                                outcome.withdrawn.push(advert.destination);
                            }
                        } else {
                            entry.state = RouteState::Active;
                        }
                    } else if offered < entry.metric {
                        entry.next_hop = update.sender_id;
                        entry.learned_from = update.sender_id;
                        entry.metric = offered;
                        entry.last_updated = now;
                        entry.state = RouteState::Active;
                        outcome.changed = true;
                    }
                    // Equal-cost ties are ignored; the first installer wins.
                }
            }
        }

        outcome
    }

    /// Ages the table. Active routes silent for longer than `timeout` move
    /// to ExpiredGarbage at the infinity metric and are returned so the
    /// caller can emit a triggered withdrawal; garbage older than `timeout`
    /// is deleted. Directly seeded routes are exempt from aging.
    pub fn tick(&mut self, now: f64, timeout: f64) -> Vec<u16> {
        let mut withdrawn = Vec::new();
        for entry in self.routes.values_mut() {
            if entry.state == RouteState::Active
                && entry.learned_from != self.self_id
                && now - entry.last_updated > timeout
            {
                entry.state = RouteState::ExpiredGarbage;
                entry.metric = INFINITY_METRIC;
                entry.last_updated = now;
                withdrawn.push(entry.destination);
            }
        }
        self.routes.retain(|_, entry| {
            entry.state != RouteState::ExpiredGarbage || now - entry.last_updated <= timeout
        });
        withdrawn
    }

    /// Advertisement view for one recipient: every entry (garbage included,
    /// already at the infinity metric) plus the metric toward the recipient
    /// for the response header. Poisoned reverse is the codec's job.
    pub fn snapshot_for(&self, recipient_id: u16) -> (Vec<AdvertisedRoute>, u16) {
        let routes = self
            .routes
            .values()
            .map(|entry| AdvertisedRoute {
                destination: entry.destination,
                next_hop: entry.next_hop,
                metric: entry.metric,
                learned_from: entry.learned_from,
            })
            .collect();
        let metric_to_recipient = self
            .routes
            .get(&recipient_id)
            .map(|entry| entry.metric)
            .unwrap_or(INFINITY_METRIC);
        (routes, metric_to_recipient)
    }

    pub fn get(&self, destination: u16) -> Option<&RouteEntry> {
        self.routes.get(&destination)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn render(&self, now: f64) -> String {
        let mut lines = Vec::with_capacity(self.routes.len() + 1);
        lines.push(format!(
            "router={} now={:.3}s routes={}",
            self.self_id,
            now,
            self.routes.len()
        ));
        for entry in self.routes.values() {
            let state = match entry.state {
                RouteState::Active => "active",
                RouteState::ExpiredGarbage => "garbage",
            };
            lines.push(format!(
                "dst={} via={} metric={} learned_from={} state={} age={:.1}s",
                entry.destination,
                entry.next_hop,
                entry.metric,
                entry.learned_from,
                state,
                now - entry.last_updated
            ));
        }
        lines.join("\n")
    }

    fn live_metric_to(&self, router_id: u16) -> Option<u16> {
        let entry = self.routes.get(&router_id)?;
        if entry.state != RouteState::Active || entry.metric >= INFINITY_METRIC {
            return None;
        }
        Some(entry.metric)
    }
}
