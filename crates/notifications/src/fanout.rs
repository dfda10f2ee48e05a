//! Turns order transition events into per-recipient notifications.

use common::NotificationId;
use domain::{Actor, DomainEvent, OrderEvent, OrderStatus};

use crate::{NotificationKind, NotificationRecord, NotificationStore, Recipient, Result};

/// Outcome of one fan-out. Failures are already logged when this is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub written: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for FanoutReport {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.failed += rhs.failed;
    }
}

/// Writes one notification per interested recipient of an order event.
///
/// The owner is always notified, staff only when involved, and the customer
/// only when the order belongs to a session. Write failures are absorbed.
#[derive(Clone)]
pub struct NotificationFanout<S> {
    store: S,
}

impl<S: NotificationStore> NotificationFanout<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Writes every record for `event` before returning.
    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type()))]
    pub async fn fan_out(&self, event: &OrderEvent) -> FanoutReport {
        let mut report = FanoutReport::default();
        for record in notifications_for(event) {
            let recipient = record.recipient;
            let kind = record.kind.as_str();
            match self.store.insert(record).await {
                Ok(()) => {
                    report.written += 1;
                    metrics::counter!("notifications_written_total", "kind" => kind).increment(1);
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("notifications_failed_total", "kind" => kind).increment(1);
                    tracing::warn!(
                        order_id = ?event.order().map(|o| o.order_id),
                        %recipient,
                        kind,
                        error = %e,
                        "Failed to write notification"
                    );
                }
            }
        }
        report
    }

    pub async fn list(
        &self,
        recipient: Recipient,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationRecord>> {
        self.store.list(recipient, limit).await
    }

    pub async fn unread_count(&self, recipient: Recipient) -> Result<usize> {
        self.store.unread_count(recipient).await
    }

    pub async fn mark_read(&self, id: NotificationId) -> Result<NotificationRecord> {
        self.store.mark_read(id).await
    }

    pub async fn mark_all_read(&self, recipient: Recipient) -> Result<usize> {
        self.store.mark_all_read(recipient).await
    }
}

/// Builds the records an event produces, without writing them.
pub fn notifications_for(event: &OrderEvent) -> Vec<NotificationRecord> {
    let owner = Recipient::Owner(event.restaurant_id());
    let customer = event.session_id().map(Recipient::Customer);
    let order_id = event.order().map(|o| o.order_id);
    let mut out: Vec<(Recipient, NotificationKind)> = Vec::new();

    match event {
        OrderEvent::OrderCreated(d) => {
            out.push((
                owner,
                NotificationKind::NewOrder {
                    order_number: d.order.order_number.clone(),
                    table_id: d.order.table_id,
                    total: d.total,
                    item_count: d.item_count,
                },
            ));
            if let Some(customer) = customer {
                out.push((
                    customer,
                    NotificationKind::OrderStatusUpdate {
                        order_number: d.order.order_number.clone(),
                        status: d.order.status,
                        previous: None,
                    },
                ));
            }
        }
        OrderEvent::OrderAssigned(d) => {
            let staff_assigned = NotificationKind::StaffAssigned {
                order_number: d.order.order_number.clone(),
                staff_id: d.staff_id,
                reassignment: d.reassignment,
            };
            out.push((owner, staff_assigned.clone()));
            out.push((
                Recipient::Staff(d.staff_id),
                NotificationKind::OrderAssigned {
                    order_number: d.order.order_number.clone(),
                    table_id: d.order.table_id,
                    reassignment: d.reassignment,
                },
            ));
            if let Some(customer) = customer {
                out.push((customer, staff_assigned));
            }
        }
        OrderEvent::NoStaffAvailable(d) => {
            out.push((
                owner,
                NotificationKind::NoStaffAvailable {
                    order_number: d.order.order_number.clone(),
                    table_id: d.order.table_id,
                },
            ));
        }
        OrderEvent::OrderAccepted(d) => {
            out.push((
                owner,
                NotificationKind::OrderAccepted {
                    order_number: d.order.order_number.clone(),
                    staff_id: d.staff_id,
                },
            ));
            if let Some(customer) = customer {
                out.push((
                    customer,
                    NotificationKind::OrderStatusUpdate {
                        order_number: d.order.order_number.clone(),
                        status: OrderStatus::Accepted,
                        previous: Some(OrderStatus::Assigned),
                    },
                ));
            }
        }
        OrderEvent::OrderRejected(d) => {
            out.push((
                owner,
                NotificationKind::OrderRejected {
                    order_number: d.order.order_number.clone(),
                    staff_id: d.staff_id,
                    reason: d.reason.clone(),
                },
            ));
        }
        OrderEvent::OrderStatusChanged(d) => {
            let update = NotificationKind::OrderStatusUpdate {
                order_number: d.order.order_number.clone(),
                status: d.to,
                previous: Some(d.from),
            };
            out.push((owner, update.clone()));
            if let Some(staff_id) = d.order.assigned_staff_id {
                if d.updated_by != Actor::Staff(staff_id) {
                    out.push((Recipient::Staff(staff_id), update.clone()));
                }
            }
            if let Some(customer) = customer {
                out.push((customer, update));
            }
        }
        OrderEvent::OrderCancelled(d) => {
            let cancelled = NotificationKind::OrderCancelled {
                order_number: d.order.order_number.clone(),
                reason: d.reason.clone(),
            };
            out.push((owner, cancelled.clone()));
            if let Some(staff_id) = d.order.assigned_staff_id {
                out.push((Recipient::Staff(staff_id), cancelled.clone()));
            }
            if let Some(customer) = customer {
                out.push((customer, cancelled));
            }
        }
        OrderEvent::TableReleased(d) => {
            let released = NotificationKind::TableReleased {
                table_id: d.table_id,
                session_id: d.session_id,
            };
            out.push((owner, released.clone()));
            if let Some(customer) = customer {
                out.push((customer, released));
            }
        }
    }

    out.into_iter()
        .map(|(recipient, kind)| NotificationRecord::new(recipient, order_id, kind))
        .collect()
}
