//! The mutating command flow.
//!
//! One handler object serves every command type. The flow is the same
//! for all of them:
//!
//! 1. load the aggregate by replaying its stream,
//! 2. let the aggregate decide (events or a domain error),
//! 3. append with the loaded version as the expected version, retrying
//!    the whole flow once on a concurrency conflict,
//! 4. apply each persisted event through the kernel adapter; a failure
//!    appends a compensating `*ApplyFailed` event and surfaces an error
//!    while the intent events stay persisted,
//! 5. publish everything on the event bus regardless of kernel outcome,
//!    so projections reflect intended state plus the failure.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::bus::{CommandHandler, EventBus};
use crate::command::{
    ChangeClassBandwidth, ChangeClassPriority, CreateFilter, CreateFqCodelQdisc, CreateHtbClass,
    CreateHtbQdisc, CreatePrioQdisc, CreateTbfQdisc, DEFAULT_R2Q, DeleteClass, DeleteFilter,
    DeleteQdisc,
};
use crate::domain::{Filter, HtbClassParams, Qdisc, QdiscKind, TrafficControlAggregate};
use crate::error::{Error, Result};
use crate::event::{EventRecord, TcEvent};
use crate::kernel::KernelAdapter;
use crate::store::EventStore;
use crate::types::DeviceName;

/// Shared handler for every traffic-control command.
pub struct TcCommandHandler {
    store: Arc<dyn EventStore>,
    adapter: Arc<dyn KernelAdapter>,
    bus: Arc<EventBus>,
}

impl TcCommandHandler {
    /// Wire a handler over its collaborators.
    pub fn new(
        store: Arc<dyn EventStore>,
        adapter: Arc<dyn KernelAdapter>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            adapter,
            bus,
        }
    }

    /// Run the common flow with an aggregate-specific decide step.
    async fn execute<F>(&self, device: &DeviceName, decide: F) -> Result<()>
    where
        F: Fn(&TrafficControlAggregate) -> Result<Vec<TcEvent>> + Send + Sync,
    {
        let aggregate_id = device.aggregate_id();
        let mut retried = false;
        let (mut aggregate, records) = loop {
            let history = self.store.events_for(&aggregate_id).await?;
            let expected = history.len() as u64;
            let aggregate = TrafficControlAggregate::from_events(device.clone(), &history);
            let events = decide(&aggregate)?;
            if events.is_empty() {
                return Ok(());
            }
            match self.store.append(&aggregate_id, expected, events).await {
                Ok(records) => break (aggregate, records),
                Err(err) if err.is_conflict() && !retried => {
                    debug!(%aggregate_id, "append conflicted, retrying once");
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        };

        // Kernel apply. The first failure stops further applies; events
        // already persisted stay (retries are expected, kernel state is
        // best-effort).
        let mut kernel_failure = None;
        let last_version = records.last().map_or(0, |r| r.version);
        for record in &records {
            aggregate.apply(&record.payload);
            if let Err(err) = self.apply_to_kernel(&aggregate, &record.payload).await {
                warn!(%aggregate_id, kind = record.kind(), %err, "kernel apply failed");
                kernel_failure = Some((compensation_for(&record.payload, &err), err));
                break;
            }
        }

        // Publish persisted intent regardless of kernel outcome.
        let fanout = self.bus.publish_all(&records).await;

        if let Some((compensation, err)) = kernel_failure {
            if let Some(event) = compensation {
                let record = match self
                    .store
                    .append(&aggregate_id, last_version, vec![event.clone()])
                    .await
                {
                    Ok(mut appended) => appended.remove(0),
                    Err(append_err) => {
                        // A concurrent writer moved the stream on; the
                        // failure still reaches projections as a
                        // notification.
                        warn!(%aggregate_id, %append_err, "could not persist apply-failure event");
                        EventRecord::notification(event)
                    }
                };
                if let Err(publish_err) = self.bus.publish(&record).await {
                    warn!(%aggregate_id, %publish_err, "apply-failure event fan-out failed");
                }
            }
            return Err(err);
        }

        fanout
    }

    /// Translate one persisted event into the corresponding kernel call.
    ///
    /// `aggregate` has the event already applied, so modified entities
    /// are read back in their post-event shape.
    async fn apply_to_kernel(
        &self,
        aggregate: &TrafficControlAggregate,
        event: &TcEvent,
    ) -> Result<()> {
        match event {
            TcEvent::HtbQdiscCreated {
                device,
                handle,
                default_class,
                r2q,
                link_bandwidth,
            } => {
                let qdisc = Qdisc {
                    device: device.clone(),
                    handle: *handle,
                    parent: None,
                    kind: QdiscKind::Htb {
                        default_class: *default_class,
                        r2q: *r2q,
                    },
                    link_bandwidth: *link_bandwidth,
                };
                self.adapter.apply_qdisc(&qdisc).await
            }
            TcEvent::TbfQdiscCreated {
                device,
                handle,
                rate,
                burst,
                limit,
            } => {
                let qdisc = Qdisc {
                    device: device.clone(),
                    handle: *handle,
                    parent: None,
                    kind: QdiscKind::Tbf {
                        rate: *rate,
                        burst: *burst,
                        limit: *limit,
                    },
                    link_bandwidth: None,
                };
                self.adapter.apply_qdisc(&qdisc).await
            }
            TcEvent::PrioQdiscCreated {
                device,
                handle,
                bands,
                priomap,
            } => {
                let qdisc = Qdisc {
                    device: device.clone(),
                    handle: *handle,
                    parent: None,
                    kind: QdiscKind::Prio {
                        bands: *bands,
                        priomap: *priomap,
                    },
                    link_bandwidth: None,
                };
                self.adapter.apply_qdisc(&qdisc).await
            }
            TcEvent::FqCodelQdiscCreated {
                device,
                handle,
                params,
            } => {
                let qdisc = Qdisc {
                    device: device.clone(),
                    handle: *handle,
                    parent: None,
                    kind: QdiscKind::FqCodel(*params),
                    link_bandwidth: None,
                };
                self.adapter.apply_qdisc(&qdisc).await
            }
            TcEvent::QdiscDeleted { device, handle } => {
                self.adapter.delete_qdisc(device, *handle).await
            }
            TcEvent::HtbClassCreated { device, handle, .. }
            | TcEvent::ClassModified { device, handle, .. }
            | TcEvent::ClassPriorityChanged { device, handle, .. } => {
                let class = aggregate.class(*handle).ok_or_else(|| {
                    Error::NotFound(format!("class {handle} on {device} after apply"))
                })?;
                self.adapter.apply_class(class).await
            }
            TcEvent::ClassDeleted { device, handle } => {
                self.adapter.delete_class(device, *handle).await
            }
            TcEvent::FilterCreated {
                device,
                parent,
                priority,
                handle,
                protocol,
                flow_id,
                matches,
            } => {
                let filter = Filter {
                    device: device.clone(),
                    parent: *parent,
                    priority: *priority,
                    handle: *handle,
                    protocol: *protocol,
                    flow_id: *flow_id,
                    matches: matches.clone(),
                };
                self.adapter.apply_filter(&filter).await
            }
            TcEvent::FilterDeleted {
                device,
                parent,
                priority,
                handle,
            } => {
                self.adapter
                    .delete_filter(device, *parent, *priority, *handle)
                    .await
            }
            // Nothing to push to the kernel.
            TcEvent::QdiscApplyFailed { .. }
            | TcEvent::ClassApplyFailed { .. }
            | TcEvent::FilterApplyFailed { .. }
            | TcEvent::StatisticsSampled { .. } => Ok(()),
        }
    }
}

/// Build the `*ApplyFailed` compensation for a refused event.
fn compensation_for(event: &TcEvent, err: &Error) -> Option<TcEvent> {
    let reason = err.to_string();
    match event {
        TcEvent::HtbQdiscCreated { device, handle, .. }
        | TcEvent::TbfQdiscCreated { device, handle, .. }
        | TcEvent::PrioQdiscCreated { device, handle, .. }
        | TcEvent::FqCodelQdiscCreated { device, handle, .. }
        | TcEvent::QdiscDeleted { device, handle } => Some(TcEvent::QdiscApplyFailed {
            device: device.clone(),
            handle: *handle,
            reason,
        }),
        TcEvent::HtbClassCreated { device, handle, .. }
        | TcEvent::ClassModified { device, handle, .. }
        | TcEvent::ClassPriorityChanged { device, handle, .. }
        | TcEvent::ClassDeleted { device, handle } => Some(TcEvent::ClassApplyFailed {
            device: device.clone(),
            handle: *handle,
            reason,
        }),
        TcEvent::FilterCreated {
            device,
            parent,
            priority,
            handle,
            ..
        }
        | TcEvent::FilterDeleted {
            device,
            parent,
            priority,
            handle,
        } => Some(TcEvent::FilterApplyFailed {
            device: device.clone(),
            parent: *parent,
            priority: *priority,
            handle: *handle,
            reason,
        }),
        TcEvent::QdiscApplyFailed { .. }
        | TcEvent::ClassApplyFailed { .. }
        | TcEvent::FilterApplyFailed { .. }
        | TcEvent::StatisticsSampled { .. } => None,
    }
}

#[async_trait]
impl CommandHandler<CreateHtbQdisc> for TcCommandHandler {
    async fn handle(&self, command: CreateHtbQdisc) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.create_htb_qdisc(
                command.handle,
                command.default_class,
                command.r2q.unwrap_or(DEFAULT_R2Q),
                command.link_bandwidth,
            )
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<CreateTbfQdisc> for TcCommandHandler {
    async fn handle(&self, command: CreateTbfQdisc) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.create_tbf_qdisc(command.handle, command.rate, command.burst, command.limit)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<CreatePrioQdisc> for TcCommandHandler {
    async fn handle(&self, command: CreatePrioQdisc) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.create_prio_qdisc(command.handle, command.bands, command.priomap)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<CreateFqCodelQdisc> for TcCommandHandler {
    async fn handle(&self, command: CreateFqCodelQdisc) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.create_fq_codel_qdisc(command.handle, command.params)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<CreateHtbClass> for TcCommandHandler {
    async fn handle(&self, command: CreateHtbClass) -> Result<()> {
        let device = command.device.clone();
        let params = HtbClassParams {
            rate: command.rate,
            ceil: command.ceil,
            burst: command.burst,
            cburst: command.cburst,
            quantum: command.quantum,
            overhead: command.overhead,
            mpu: command.mpu,
            mtu: command.mtu,
        };
        self.execute(&device, |agg| {
            agg.create_htb_class(
                command.parent,
                command.handle,
                command.name.clone(),
                command.priority,
                params.clone(),
            )
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<ChangeClassBandwidth> for TcCommandHandler {
    async fn handle(&self, command: ChangeClassBandwidth) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.change_class_bandwidth(command.handle, command.rate, command.ceil)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<ChangeClassPriority> for TcCommandHandler {
    async fn handle(&self, command: ChangeClassPriority) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.change_class_priority(command.handle, command.priority)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<DeleteClass> for TcCommandHandler {
    async fn handle(&self, command: DeleteClass) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| agg.delete_class(command.handle))
            .await
    }
}

#[async_trait]
impl CommandHandler<CreateFilter> for TcCommandHandler {
    async fn handle(&self, command: CreateFilter) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.create_filter(
                command.parent,
                command.priority,
                command.protocol,
                command.flow_id,
                command.matches.clone(),
            )
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<DeleteFilter> for TcCommandHandler {
    async fn handle(&self, command: DeleteFilter) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| {
            agg.delete_filter(command.parent, command.priority, command.handle)
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<DeleteQdisc> for TcCommandHandler {
    async fn handle(&self, command: DeleteQdisc) -> Result<()> {
        let device = command.device.clone();
        self.execute(&device, |agg| agg.delete_qdisc(command.handle))
            .await
    }
}
