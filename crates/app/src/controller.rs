//! Controller — the rule engine for one partition of units.
//!
//! A controller receives the sensor messages the dispatcher routes to it,
//! keeps per-unit derived state (last motion, latest light level, last
//! commanded device status), reacts to motion immediately, and runs the
//! lighting rules on a fixed period.
//!
//! The message path and the evaluation path share one async mutex per
//! controller. Decisions, command publishing, and cache updates happen under
//! it, so a "check idle, then clear motion" step never interleaves with a
//! concurrent motion update, and commands reach the bus in cache order.
//!
//! Registry writes are queued to a per-controller writer task in the same
//! order, so a slow registry never holds up message handling.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homewatch_domain::error::HomeWatchError;
use homewatch_domain::id::ControllerId;
use homewatch_domain::message::{Command, Reading, SenMlMessage, SensorKind};
use homewatch_domain::rules::{LIGHT_SWITCH, LightingRules, REASON_MOTION, UnitSnapshot};
use homewatch_domain::time::{self, Timestamp};
use homewatch_domain::topic::{self, SensorTopic};
use homewatch_domain::topology::{DeviceLocation, Topology};
use homewatch_domain::unit::UnitKey;

use crate::periodic::{self, FirstRun};
use crate::ports::{BusClient, ControllerStatus, Registry};
use crate::snapshot::Snapshot;

/// Per-unit state owned by one controller.
#[derive(Debug, Default)]
struct ControllerState {
    last_motion: HashMap<UnitKey, Timestamp>,
    light_levels: HashMap<UnitKey, f64>,
    device_status: HashMap<UnitKey, HashMap<String, Command>>,
    /// `None` until the first assignment.
    assigned: Option<BTreeSet<UnitKey>>,
}

impl ControllerState {
    /// Units seen through a light reading or a command that are still
    /// routed here.
    fn known_units(&self) -> BTreeSet<UnitKey> {
        self.light_levels
            .keys()
            .chain(self.device_status.keys())
            .copied()
            .filter(|unit| self.owns(*unit))
            .collect()
    }

    /// Every unit is owned until the first assignment.
    fn owns(&self, unit: UnitKey) -> bool {
        self.assigned
            .as_ref()
            .is_none_or(|units| units.contains(&unit))
    }

    /// Install a new assignment and drop state for units routed elsewhere.
    /// Returns how many units were forgotten.
    fn reassign(&mut self, units: BTreeSet<UnitKey>) -> usize {
        let before = self.held_units();
        self.last_motion.retain(|unit, _| units.contains(unit));
        self.light_levels.retain(|unit, _| units.contains(unit));
        self.device_status.retain(|unit, _| units.contains(unit));
        self.assigned = Some(units);
        before - self.held_units()
    }

    /// Number of units any state is held for.
    fn held_units(&self) -> usize {
        self.light_levels
            .keys()
            .chain(self.device_status.keys())
            .chain(self.last_motion.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn snapshot(&self, unit: UnitKey) -> UnitSnapshot {
        UnitSnapshot {
            light_on: self.status(unit, LIGHT_SWITCH) == Some(Command::On),
            light_level: self.light_levels.get(&unit).copied(),
            last_motion: self.last_motion.get(&unit).copied(),
        }
    }

    fn status(&self, unit: UnitKey, device_name: &str) -> Option<Command> {
        self.device_status
            .get(&unit)
            .and_then(|devices| devices.get(device_name))
            .copied()
    }

    /// Cache `command` as the device status; `true` if it changed.
    fn record_status(&mut self, unit: UnitKey, device_name: &str, command: Command) -> bool {
        let devices = self.device_status.entry(unit).or_default();
        if devices.get(device_name) == Some(&command) {
            return false;
        }
        devices.insert(device_name.to_string(), command);
        true
    }
}

/// A status change to push to the registry.
#[derive(Debug)]
struct StatusWrite {
    unit: UnitKey,
    device_name: String,
    command: Command,
    reason: &'static str,
    at: Timestamp,
}

#[derive(Debug)]
enum WriteOp {
    Status(StatusWrite),
    /// Answered once every earlier write has been attempted.
    Flush(oneshot::Sender<()>),
}

/// Pushes status changes to the registry, one at a time, in queue order.
struct StatusWriter<R> {
    controller: ControllerId,
    registry: Arc<R>,
    topology: Arc<Snapshot<Topology>>,
}

impl<R: Registry> StatusWriter<R> {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<WriteOp>) {
        while let Some(op) = queue.recv().await {
            match op {
                WriteOp::Status(write) => self.write(write).await,
                WriteOp::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!(controller = %self.controller, "status writer stopped");
    }

    /// Upsert the device's new status into the registry. Best effort.
    async fn write(&self, write: StatusWrite) {
        let topology = self.topology.load();
        let Some(device) = topology.device(write.unit, &write.device_name) else {
            tracing::debug!(
                controller = %self.controller,
                unit = %write.unit,
                device = %write.device_name,
                "device not in registry topology, skipping status write"
            );
            return;
        };
        if device.device_id.is_none() {
            tracing::warn!(
                controller = %self.controller,
                unit = %write.unit,
                device = %write.device_name,
                "device has no registry id, skipping status write"
            );
            return;
        }

        let mut record = device.clone();
        record.device_status = Some(write.command.to_string());
        record.last_update = Some(time::registry_stamp(write.at));
        record.last_command_reason = Some(write.reason.to_string());
        record
            .device_location
            .get_or_insert_with(|| DeviceLocation::from(write.unit));

        if let Err(err) = self.registry.put_device(&record).await {
            tracing::warn!(
                controller = %self.controller,
                unit = %write.unit,
                device = %write.device_name,
                error = %err,
                "registry status write failed"
            );
        }
    }
}

/// Rule engine for a partition of units.
pub struct Controller<B> {
    id: ControllerId,
    base_topic: Arc<str>,
    bus: Arc<B>,
    rules: LightingRules,
    state: Mutex<ControllerState>,
    writes: mpsc::UnboundedSender<WriteOp>,
}

impl<B> Controller<B>
where
    B: BusClient + Send + Sync + 'static,
{
    /// Create a controller bound to the shared bus and registry, and spawn
    /// its status writer. Must be called inside a tokio runtime.
    ///
    /// `topology` is the latest registry snapshot; it is consulted to find
    /// the device record to update on a status change.
    pub fn new<R>(
        id: ControllerId,
        base_topic: Arc<str>,
        bus: Arc<B>,
        registry: Arc<R>,
        topology: Arc<Snapshot<Topology>>,
        rules: LightingRules,
    ) -> Self
    where
        R: Registry + Send + Sync + 'static,
    {
        let (writes, queue) = mpsc::unbounded_channel();
        let writer = StatusWriter {
            controller: id,
            registry,
            topology,
        };
        tokio::spawn(writer.run(queue));
        Self {
            id,
            base_topic,
            bus,
            rules,
            state: Mutex::new(ControllerState::default()),
            writes,
        }
    }

    #[must_use]
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Handle one routed sensor message. Never fails; bad input is logged
    /// and dropped.
    pub async fn process_message(&self, topic: &str, payload: &[u8]) {
        if let Err(err) = self.handle_message(topic, payload, time::now()).await {
            tracing::warn!(controller = %self.id, topic, error = %err, "dropping sensor message");
        }
    }

    async fn handle_message(
        &self,
        topic: &str,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<(), HomeWatchError> {
        let topic = SensorTopic::parse(topic)?;
        let kind = SensorKind::from_segment(topic.sensor_type)?;
        let message = SenMlMessage::from_slice(payload)?;
        let unit = topic.unit;

        match Reading::decode(kind, &message)? {
            Reading::Motion(true) => {
                tracing::info!(controller = %self.id, unit = %unit, "motion detected");
                let mut state = self.state.lock().await;
                state.last_motion.insert(unit, now);
                self.emit(&mut state, unit, LIGHT_SWITCH, Command::On, REASON_MOTION, now)
                    .await;
            }
            Reading::Motion(false) => {
                tracing::trace!(controller = %self.id, unit = %unit, "no motion");
            }
            Reading::Light(lux) => {
                tracing::debug!(controller = %self.id, unit = %unit, lux, "light level");
                self.state.lock().await.light_levels.insert(unit, lux);
            }
        }
        Ok(())
    }

    /// Run one evaluation pass over every assigned unit this controller has
    /// seen.
    ///
    /// Returns the number of commands issued.
    pub async fn evaluate(&self) -> usize {
        self.evaluate_at(time::now()).await
    }

    async fn evaluate_at(&self, now: Timestamp) -> usize {
        let mut issued = 0;
        let mut state = self.state.lock().await;
        for unit in state.known_units() {
            let Some(decision) = self.rules.decide(&state.snapshot(unit), now) else {
                continue;
            };
            tracing::info!(
                controller = %self.id,
                unit = %unit,
                command = %decision.command,
                reason = decision.reason,
                "rule fired"
            );
            self.emit(
                &mut state,
                unit,
                LIGHT_SWITCH,
                decision.command,
                decision.reason,
                now,
            )
            .await;
            if decision.clear_motion {
                state.last_motion.remove(&unit);
            }
            issued += 1;
        }
        issued
    }

    /// Publish a command, cache the new device status, and queue a registry
    /// write if it changed.
    #[tracing::instrument(skip(self), fields(controller = %self.id, unit = %unit))]
    pub async fn send_command(
        &self,
        unit: UnitKey,
        device_name: &str,
        command: Command,
        reason: &'static str,
    ) {
        let mut state = self.state.lock().await;
        self.emit(&mut state, unit, device_name, command, reason, time::now())
            .await;
    }

    /// Publish under the state lock. The cache is updated whether or not the
    /// publish succeeded.
    async fn emit(
        &self,
        state: &mut ControllerState,
        unit: UnitKey,
        device_name: &str,
        command: Command,
        reason: &'static str,
        now: Timestamp,
    ) {
        let topic = topic::command_topic(&self.base_topic, unit, device_name);
        let message = SenMlMessage::command(&topic, command, now);
        match self.bus.publish(&topic, &message).await {
            Ok(()) => tracing::info!(%topic, %command, reason, "command sent"),
            Err(err) => tracing::warn!(%topic, %command, error = %err, "command publish failed"),
        }

        if !state.record_status(unit, device_name, command) {
            return;
        }
        let write = StatusWrite {
            unit,
            device_name: device_name.to_string(),
            command,
            reason,
            at: now,
        };
        if self.writes.send(WriteOp::Status(write)).is_err() {
            tracing::warn!(controller = %self.id, unit = %unit, "status writer gone, dropping registry write");
        }
    }

    /// Wait until every registry write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        if self.writes.send(WriteOp::Flush(done)).is_ok() {
            let _ = finished.await;
        }
    }

    /// Record which units are routed here.
    ///
    /// State held for units that moved to another controller is dropped, and
    /// the evaluator only considers assigned units from now on.
    pub async fn assign(&self, units: Vec<UnitKey>) {
        let forgotten = self
            .state
            .lock()
            .await
            .reassign(units.into_iter().collect());
        if forgotten > 0 {
            tracing::debug!(controller = %self.id, forgotten, "dropped state of reassigned units");
        }
    }

    /// Snapshot of this controller for the status API.
    pub async fn status(&self) -> ControllerStatus {
        let state = self.state.lock().await;
        ControllerStatus {
            id: self.id,
            assigned_units: state.assigned.iter().flatten().copied().collect(),
            tracked_units: state.known_units().len(),
        }
    }

    /// Spawn the periodic evaluation loop. The first pass runs one period
    /// after spawning.
    pub fn spawn_evaluator(self: Arc<Self>, period: Duration, token: CancellationToken) -> JoinHandle<()> {
        let name = format!("{} evaluator", self.id);
        periodic::spawn(name, period, FirstRun::AfterPeriod, token, move || {
            let controller = Arc::clone(&self);
            async move {
                let issued = controller.evaluate().await;
                tracing::debug!(controller = %controller.id, issued, "evaluation pass done");
            }
        })
    }
}
