//! Broadcast routing.
//!
//! | Origin         | Recipients (in this order)                         |
//! |----------------|----------------------------------------------------|
//! | operator       | every client, slot order                           |
//! | client *k*     | operator, then every client except *k*, slot order |
//!
//! Delivery is best-effort and not transactional: a failure on one recipient
//! is recorded and the remaining recipients are still attempted. Deliveries
//! already made are never rolled back. The caller decides what to do with
//! the failed recipients.

use chatmux_core::{Origin, ParticipantError, ParticipantId};
use tracing::debug;

use crate::registry::Registry;

/// A participant the router can deliver to.
pub trait Endpoint {
    fn id(&self) -> ParticipantId;

    /// Delivers the whole payload or fails. Short writes are completed
    /// internally, never reported as success.
    fn send(&mut self, payload: &[u8]) -> Result<(), ParticipantError>;
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteReport {
    /// Recipients that accepted the payload, in delivery order.
    pub delivered: Vec<ParticipantId>,

    /// Clients whose delivery failed.
    pub failed: Vec<(ParticipantId, ParticipantError)>,

    /// Set when mirroring to the operator channel failed.
    pub operator_failure: Option<ParticipantError>,
}

/// Fans `payload` out to everyone who should see a message from `origin`.
pub fn route<L, O, C>(registry: &mut Registry<L, O, C>, origin: Origin, payload: &[u8]) -> RouteReport
where
    O: Endpoint,
    C: Endpoint,
{
    let mut report = RouteReport::default();
    let (operator, clients) = registry.split_mut();

    let skip = match origin {
        Origin::Operator => None,
        Origin::Client(id) => {
            match operator.send(payload) {
                Ok(()) => report.delivered.push(operator.id()),
                Err(e) => {
                    debug!(error = %e, "Failed to mirror message to operator");
                    report.operator_failure = Some(e);
                }
            }
            Some(id)
        }
    };

    for client in clients.iter_mut() {
        let id = client.id();
        if Some(id) == skip {
            continue;
        }
        match client.send(payload) {
            Ok(()) => report.delivered.push(id),
            Err(e) => {
                debug!(recipient = %id, error = %e, "Failed to deliver message");
                report.failed.push((id, e));
            }
        }
    }

    report
}
