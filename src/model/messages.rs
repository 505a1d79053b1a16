use thiserror::Error;

use crate::model::route::INFINITY_METRIC;

/// Frames are padded or truncated to this length on the wire.
pub const FRAME_LEN: usize = 512;
pub const HEADER_LEN: usize = 25;
pub const ENTRY_LEN: usize = 8;
/// Largest entry list that fits one frame: 25 + 56 * 8 = 473 bytes.
pub const MAX_ROUTE_ENTRIES: usize = 56;

const RESPONSE_COMMAND: u8 = 2;
const RIP_VERSION: u8 = 2;

/// Why a datagram was dropped (or an advertisement skipped). Rejects are
/// absorbed locally and counted; nothing is signaled back to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("command byte is not a response")]
    BadCommand,
    #[error("unsupported protocol version")]
    BadVersion,
    #[error("sender router id matches local router id")]
    SelfLoop,
    #[error("reserved header field is nonzero")]
    NonzeroReserved,
    #[error("header metric out of range")]
    BadMetric,
    #[error("frame too short for declared contents")]
    Truncated,
    #[error("routing table does not fit in one frame")]
    EncodeOverflow,
}

/// One route as carried in a response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedRoute {
    pub destination: u16,
    pub next_hop: u16,
    pub metric: u16,
    pub learned_from: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUpdate {
    pub sender_id: u16,
    pub entries: Vec<AdvertisedRoute>,
}

/// Encodes a full-table response addressed to `recipient_id`.
///
/// Poisoned reverse is applied here: a route whose next hop is the
/// recipient is advertised at the infinity metric. The header metric field
/// carries this router's current metric to the recipient; peers treat it as
/// informational only.
pub fn encode_response(
    routes: &[AdvertisedRoute],
    self_id: u16,
    recipient_id: u16,
    metric_to_recipient: u16,
) -> Result<Vec<u8>, RejectReason> {
    if routes.len() > MAX_ROUTE_ENTRIES {
        return Err(RejectReason::EncodeOverflow);
    }

    let mut frame = vec![0_u8; FRAME_LEN];
    frame[0] = RESPONSE_COMMAND;
    frame[1] = RIP_VERSION;
    frame[2..4].copy_from_slice(&self_id.to_be_bytes());
    // Bytes 4..6 are the address-family identifier, 6..20 the four reserved
    // fields; all stay zero.
    frame[20..24].copy_from_slice(&u32::from(metric_to_recipient).to_be_bytes());
    frame[24] = routes.len() as u8;

    for (index, route) in routes.iter().enumerate() {
        let at = HEADER_LEN + index * ENTRY_LEN;
        let advertised = if route.next_hop == recipient_id {
            INFINITY_METRIC
        } else {
            route.metric.min(INFINITY_METRIC)
        };
        frame[at] = route.destination as u8;
        // at+1..at+3 is the reserved per-entry address field, kept zero.
        frame[at + 3..at + 5].copy_from_slice(&route.next_hop.to_be_bytes());
        frame[at + 5..at + 7].copy_from_slice(&advertised.to_be_bytes());
        frame[at + 7] = route.learned_from as u8;
    }

    Ok(frame)
}

/// Validates and unpacks a response frame received on an input socket.
///
/// The header metric is rejected only at 17 and above so that peers can
/// still transport infinity (16) for withdrawn routes.
pub fn decode_response(frame: &[u8], self_id: u16) -> Result<DecodedUpdate, RejectReason> {
    if frame.len() < HEADER_LEN {
        return Err(RejectReason::Truncated);
    }
    if frame[0] != RESPONSE_COMMAND {
        return Err(RejectReason::BadCommand);
    }
    if frame[1] != RIP_VERSION {
        return Err(RejectReason::BadVersion);
    }

    let sender_id = u16::from_be_bytes([frame[2], frame[3]]);
    if sender_id == self_id {
        return Err(RejectReason::SelfLoop);
    }
    if frame[6..20].iter().any(|byte| *byte != 0) {
        return Err(RejectReason::NonzeroReserved);
    }

    let header_metric = u32::from_be_bytes([frame[20], frame[21], frame[22], frame[23]]);
    if header_metric > u32::from(INFINITY_METRIC) {
        return Err(RejectReason::BadMetric);
    }

    let count = frame[24] as usize;
    if count > MAX_ROUTE_ENTRIES || frame.len() < HEADER_LEN + count * ENTRY_LEN {
        return Err(RejectReason::Truncated);
    }

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let at = HEADER_LEN + index * ENTRY_LEN;
        entries.push(AdvertisedRoute {
            destination: u16::from(frame[at]),
            next_hop: u16::from_be_bytes([frame[at + 3], frame[at + 4]]),
            metric: u16::from_be_bytes([frame[at + 5], frame[at + 6]]),
            learned_from: u16::from(frame[at + 7]),
        });
    }

    Ok(DecodedUpdate { sender_id, entries })
}
