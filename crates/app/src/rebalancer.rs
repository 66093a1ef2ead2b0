//! Rebalancer — sizes the controller pool to the registry topology and
//! dispatches every inbound sensor message to the controller that owns it.
//!
//! The rebalancer is the only subscriber on the bus. It keeps three pieces of
//! shared state:
//!
//! - the **topology snapshot**, swapped on every successful fetch and read by
//!   controllers when they write device status back to the registry;
//! - the **routing table**, rebuilt from scratch and swapped as a whole, so a
//!   concurrent dispatch sees either the old or the new table;
//! - the **controller pool**, which only grows.
//!
//! No lock is held across network I/O on the dispatch path.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homewatch_domain::error::HomeWatchError;
use homewatch_domain::id::ControllerId;
use homewatch_domain::rules::LightingRules;
use homewatch_domain::topic;
use homewatch_domain::topology::Topology;
use homewatch_domain::unit::UnitKey;

use crate::controller::Controller;
use crate::periodic::{self, FirstRun};
use crate::pool::ControllerPool;
use crate::ports::{BusClient, MessageHandler, Registry, StatusProvider, SystemStatus};
use crate::routing::{self, RoutingTable};
use crate::snapshot::Snapshot;

/// Default number of units per controller.
pub const DEFAULT_PARTITION_SIZE: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(size) => size,
    None => unreachable!(),
};

/// Tuning for the rebalancer and the controllers it creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceConfig {
    /// Maximum number of units per controller.
    pub partition_size: NonZeroUsize,
    /// Time between registry refreshes.
    pub refresh_interval: Duration,
    /// Time between evaluation passes in each controller.
    pub evaluation_interval: Duration,
    /// Rules every controller runs.
    pub rules: LightingRules,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            partition_size: DEFAULT_PARTITION_SIZE,
            refresh_interval: Duration::from_secs(60),
            evaluation_interval: Duration::from_secs(15),
            rules: LightingRules::default(),
        }
    }
}

/// Result of one refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Same unit set as the last refresh; nothing was touched.
    Unchanged,
    /// A new routing table was installed.
    Rebalanced {
        units: usize,
        controllers: usize,
        /// Controllers created by this refresh.
        created: usize,
    },
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the owning controller.
    Delivered(ControllerId),
    /// Topic could not be parsed into a unit.
    Malformed,
    /// Unit is not in the routing table yet.
    RoutingMiss(UnitKey),
    /// Routing table names a controller the pool does not hold.
    MissingController(ControllerId),
}

/// Root component of the controller core.
pub struct Rebalancer<B, R> {
    config: RebalanceConfig,
    base_topic: Arc<str>,
    bus: Arc<B>,
    registry: Arc<R>,
    topology: Arc<Snapshot<Topology>>,
    routing: Snapshot<RoutingTable>,
    pool: ControllerPool<Controller<B>>,
    /// Unit set of the last applied rebalance. Also serializes refreshes.
    applied: tokio::sync::Mutex<Option<BTreeSet<UnitKey>>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
}

impl<B, R> Rebalancer<B, R>
where
    B: BusClient + Send + Sync + 'static,
    R: Registry + Send + Sync + 'static,
{
    /// Create a rebalancer with an empty pool and routing table.
    ///
    /// Background tasks it spawns stop when `token` is cancelled.
    pub fn new(
        config: RebalanceConfig,
        base_topic: impl Into<Arc<str>>,
        bus: Arc<B>,
        registry: Arc<R>,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            base_topic: base_topic.into(),
            bus,
            registry,
            topology: Arc::new(Snapshot::default()),
            routing: Snapshot::default(),
            pool: ControllerPool::new(),
            applied: tokio::sync::Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
            token,
        }
    }

    /// Run the first refresh, then schedule the periodic one.
    ///
    /// The periodic task is scheduled even when the first refresh fails, so
    /// a registry that is down at startup is picked up on a later tick.
    ///
    /// # Errors
    ///
    /// Returns the first refresh's error.
    pub async fn start(self: &Arc<Self>) -> Result<RebalanceOutcome, HomeWatchError> {
        let first = self.refresh_topology().await;

        let this = Arc::clone(self);
        let handle = periodic::spawn(
            "topology refresh".to_string(),
            self.config.refresh_interval,
            FirstRun::AfterPeriod,
            self.token.child_token(),
            move || {
                let this = Arc::clone(&this);
                async move {
                    if let Err(err) = this.refresh_topology().await {
                        tracing::warn!(error = %err, "topology refresh failed, keeping previous routing");
                    }
                }
            },
        );
        self.track(handle);

        first
    }

    /// Fetch the topology and rebalance if the unit set changed.
    ///
    /// # Errors
    ///
    /// Returns [`HomeWatchError::RegistryUnavailable`] if the fetch fails, in
    /// which case routing and the pool are left untouched, or a bus error if
    /// the sensor subscription could not be issued (the new routing stays in
    /// effect and the next refresh retries).
    #[tracing::instrument(skip(self), fields(base_topic = %self.base_topic))]
    pub async fn refresh_topology(&self) -> Result<RebalanceOutcome, HomeWatchError> {
        let mut applied = self.applied.lock().await;

        let topology = self.registry.fetch_topology().await?;
        let units = topology.unit_keys();
        self.topology.store(Arc::new(topology));

        if applied.as_ref() == Some(&units) && !self.pool.is_empty() {
            tracing::debug!(units = units.len(), "unit set unchanged, skipping rebalance");
            return Ok(RebalanceOutcome::Unchanged);
        }

        let table = RoutingTable::plan(&units, self.config.partition_size);
        let needed = routing::controllers_needed(units.len(), self.config.partition_size);

        let mut created = 0;
        for index in 0..needed {
            let id = ControllerId::from_index(index);
            let (controller, inserted) = self
                .pool
                .get_or_insert_with(id, || self.create_controller(id));
            if inserted {
                created += 1;
                let handle = Arc::clone(&controller)
                    .spawn_evaluator(self.config.evaluation_interval, self.token.child_token());
                self.track(handle);
                tracing::info!(controller = %id, "controller created");
            }
        }
        for controller in self.pool.all() {
            controller.assign(table.units_of(controller.id())).await;
        }

        self.routing.store(Arc::new(table));
        tracing::info!(
            units = units.len(),
            controllers = needed,
            created,
            "routing table replaced"
        );

        let filter = topic::sensors_filter(&self.base_topic);
        self.bus.subscribe(&filter).await?;
        tracing::debug!(%filter, "sensor subscription issued");

        let outcome = RebalanceOutcome::Rebalanced {
            units: units.len(),
            controllers: needed,
            created,
        };
        *applied = Some(units);
        Ok(outcome)
    }

    fn create_controller(&self, id: ControllerId) -> Controller<B> {
        Controller::new(
            id,
            Arc::clone(&self.base_topic),
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
            Arc::clone(&self.topology),
            self.config.rules,
        )
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Route one inbound message to its controller.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let unit = match topic::unit_key(topic) {
            Ok(unit) => unit,
            Err(err) => {
                tracing::warn!(topic, error = %err, "dropping message on malformed topic");
                return DispatchOutcome::Malformed;
            }
        };

        let Some(id) = self.routing.load().controller_for(&unit) else {
            let err = HomeWatchError::RoutingMiss(unit);
            tracing::warn!(topic, error = %err, "dropping message");
            return DispatchOutcome::RoutingMiss(unit);
        };

        let Some(controller) = self.pool.get(id) else {
            tracing::error!(topic, controller = %id, "routing table names a missing controller");
            return DispatchOutcome::MissingController(id);
        };

        tracing::debug!(topic, unit = %unit, controller = %id, "dispatching");
        controller.process_message(topic, payload).await;
        DispatchOutcome::Delivered(id)
    }

    /// Number of controllers in the pool.
    pub fn controller_count(&self) -> usize {
        self.pool.len()
    }

    /// Latest topology fetched from the registry.
    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load()
    }

    /// Stop the refresh task and every evaluator, wait for them, then drain
    /// the registry writes still queued.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "background task ended abnormally");
            }
        }
        for controller in self.pool.all() {
            controller.flush().await;
        }
        tracing::info!("rebalancer stopped");
    }
}

impl<B, R> MessageHandler for Rebalancer<B, R>
where
    B: BusClient + Send + Sync + 'static,
    R: Registry + Send + Sync + 'static,
{
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        self.dispatch(topic, payload).await;
    }
}

impl<B, R> StatusProvider for Rebalancer<B, R>
where
    B: BusClient + Send + Sync + 'static,
    R: Registry + Send + Sync + 'static,
{
    async fn status(&self) -> SystemStatus {
        let mut controllers = Vec::new();
        for controller in self.pool.all() {
            controllers.push(controller.status().await);
        }
        SystemStatus {
            base_topic: self.base_topic.to_string(),
            partition_size: self.config.partition_size.get(),
            units: self.routing.load().len(),
            controllers,
        }
    }

    fn routing(&self) -> Arc<RoutingTable> {
        self.routing.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homewatch_domain::broker::BrokerAddress;
    use homewatch_domain::message::SenMlMessage;
    use homewatch_domain::topology::DeviceRecord;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    // ── Fakes ──────────────────────────────────────────────────────

    #[derive(Default)]
    struct SpyBus {
        published: StdMutex<Vec<String>>,
        subscriptions: StdMutex<Vec<String>>,
    }

    impl BusClient for SpyBus {
        async fn publish(&self, topic: &str, _message: &SenMlMessage) -> Result<(), HomeWatchError> {
            self.published.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn subscribe(&self, filter: &str) -> Result<(), HomeWatchError> {
            self.subscriptions.lock().unwrap().push(filter.to_string());
            Ok(())
        }
    }

    /// Registry whose topology can be swapped or made to fail.
    #[derive(Default)]
    struct FakeRegistry {
        topology: StdMutex<Topology>,
        down: AtomicBool,
    }

    impl FakeRegistry {
        fn with_units(units: &[(u32, u32, u32)]) -> Self {
            let registry = Self::default();
            registry.set_units(units);
            registry
        }

        fn set_units(&self, units: &[(u32, u32, u32)]) {
            let houses: Vec<_> = units
                .iter()
                .map(|(h, f, u)| {
                    serde_json::json!({"houseID": h, "floors": [{"floorID": f, "units": [
                        {"unitID": u, "devicesList": [{"deviceID": format!("{h}{f}{u}"), "deviceName": "light_switch"}]}
                    ]}]})
                })
                .collect();
            *self.topology.lock().unwrap() =
                serde_json::from_value(serde_json::Value::Array(houses)).unwrap();
        }
    }

    impl Registry for FakeRegistry {
        async fn fetch_topology(&self) -> Result<Topology, HomeWatchError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(HomeWatchError::RegistryUnavailable("connection refused".into()));
            }
            Ok(self.topology.lock().unwrap().clone())
        }

        async fn fetch_broker(&self) -> Result<BrokerAddress, HomeWatchError> {
            Ok(BrokerAddress {
                host: "localhost".to_string(),
                port: 1883,
            })
        }

        async fn fetch_base_topic(&self) -> Result<String, HomeWatchError> {
            Ok("base".to_string())
        }

        async fn put_device(&self, _device: &DeviceRecord) -> Result<(), HomeWatchError> {
            Ok(())
        }
    }

    fn units(count: u32) -> Vec<(u32, u32, u32)> {
        (1..=count).map(|u| (1, 1, u)).collect()
    }

    fn make_rebalancer(
        registry: FakeRegistry,
    ) -> (Arc<Rebalancer<SpyBus, FakeRegistry>>, Arc<SpyBus>, Arc<FakeRegistry>) {
        let bus = Arc::new(SpyBus::default());
        let registry = Arc::new(registry);
        let rebalancer = Arc::new(Rebalancer::new(
            RebalanceConfig::default(),
            "base",
            Arc::clone(&bus),
            Arc::clone(&registry),
            CancellationToken::new(),
        ));
        (rebalancer, bus, registry)
    }

    fn motion() -> Vec<u8> {
        br#"{"bn": "x", "e": [{"n": "motion", "u": "bool", "t": "1", "v": "Detected"}]}"#.to_vec()
    }

    // ── Refresh ────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_create_ceil_units_over_partition_size_controllers() {
        let (rebalancer, bus, _) = make_rebalancer(FakeRegistry::with_units(&units(12)));

        let outcome = rebalancer.refresh_topology().await.unwrap();

        assert_eq!(
            outcome,
            RebalanceOutcome::Rebalanced {
                units: 12,
                controllers: 3,
                created: 3
            }
        );
        assert_eq!(rebalancer.controller_count(), 3);
        assert_eq!(
            *bus.subscriptions.lock().unwrap(),
            vec!["base/sensors/#".to_string()]
        );
        let routing = rebalancer.routing();
        assert_eq!(
            routing.controller_for(&UnitKey::new(1, 1, 11)),
            Some(ControllerId::from_index(2))
        );
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_skip_rebalance_when_unit_set_is_unchanged() {
        let (rebalancer, bus, _) = make_rebalancer(FakeRegistry::with_units(&units(7)));
        rebalancer.refresh_topology().await.unwrap();
        let before = rebalancer.routing();

        let outcome = rebalancer.refresh_topology().await.unwrap();

        assert_eq!(outcome, RebalanceOutcome::Unchanged);
        assert!(Arc::ptr_eq(&before, &rebalancer.routing()));
        assert_eq!(rebalancer.controller_count(), 2);
        assert_eq!(bus.subscriptions.lock().unwrap().len(), 1);
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_keep_pool_when_units_shrink() {
        let (rebalancer, _, registry) = make_rebalancer(FakeRegistry::with_units(&units(11)));
        rebalancer.refresh_topology().await.unwrap();

        registry.set_units(&units(3));
        let outcome = rebalancer.refresh_topology().await.unwrap();

        assert_eq!(
            outcome,
            RebalanceOutcome::Rebalanced {
                units: 3,
                controllers: 1,
                created: 0
            }
        );
        assert_eq!(rebalancer.controller_count(), 3);
        assert_eq!(rebalancer.routing().controller_count(), 1);
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_only_create_missing_controllers_when_units_grow() {
        let (rebalancer, _, registry) = make_rebalancer(FakeRegistry::with_units(&units(5)));
        rebalancer.refresh_topology().await.unwrap();

        registry.set_units(&units(6));
        let outcome = rebalancer.refresh_topology().await.unwrap();

        assert_eq!(
            outcome,
            RebalanceOutcome::Rebalanced {
                units: 6,
                controllers: 2,
                created: 1
            }
        );
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_leave_state_untouched_when_registry_is_down() {
        let (rebalancer, _, registry) = make_rebalancer(FakeRegistry::with_units(&units(4)));
        rebalancer.refresh_topology().await.unwrap();
        let before = rebalancer.routing();

        registry.down.store(true, Ordering::SeqCst);
        registry.set_units(&units(20));
        let result = rebalancer.refresh_topology().await;

        assert!(matches!(result, Err(HomeWatchError::RegistryUnavailable(_))));
        assert!(Arc::ptr_eq(&before, &rebalancer.routing()));
        assert_eq!(rebalancer.controller_count(), 1);
        assert_eq!(rebalancer.topology().unit_keys().len(), 4);
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_create_no_controllers_for_empty_topology() {
        let (rebalancer, _, _) = make_rebalancer(FakeRegistry::default());

        let outcome = rebalancer.refresh_topology().await.unwrap();

        assert_eq!(
            outcome,
            RebalanceOutcome::Rebalanced {
                units: 0,
                controllers: 0,
                created: 0
            }
        );
        assert_eq!(rebalancer.controller_count(), 0);
        assert!(rebalancer.routing().is_empty());
    }

    #[tokio::test]
    async fn should_return_first_refresh_error_from_start_and_keep_running() {
        let registry = FakeRegistry::with_units(&units(2));
        registry.down.store(true, Ordering::SeqCst);
        let (rebalancer, _, _) = make_rebalancer(registry);

        let result = rebalancer.start().await;

        assert!(result.is_err());
        assert_eq!(rebalancer.tasks.lock().unwrap().len(), 1);
        rebalancer.shutdown().await;
        assert!(rebalancer.tasks.lock().unwrap().is_empty());
    }

    // ── Dispatch ───────────────────────────────────────────────────

    #[tokio::test]
    async fn should_deliver_to_owning_controller() {
        let (rebalancer, bus, _) = make_rebalancer(FakeRegistry::with_units(&units(7)));
        rebalancer.refresh_topology().await.unwrap();

        let outcome = rebalancer
            .dispatch("base/sensors/1/1/6/motion_sensor", &motion())
            .await;

        assert_eq!(outcome, DispatchOutcome::Delivered(ControllerId::from_index(1)));
        assert_eq!(
            *bus.published.lock().unwrap(),
            vec!["base/commands/1/1/6/light_switch".to_string()]
        );
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_drop_message_for_unknown_unit() {
        let (rebalancer, bus, _) = make_rebalancer(FakeRegistry::with_units(&units(2)));
        rebalancer.refresh_topology().await.unwrap();

        let outcome = rebalancer
            .dispatch("base/sensors/9/9/9/motion_sensor", &motion())
            .await;

        assert_eq!(outcome, DispatchOutcome::RoutingMiss(UnitKey::new(9, 9, 9)));
        assert!(bus.published.lock().unwrap().is_empty());
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_drop_message_on_short_topic() {
        let (rebalancer, bus, _) = make_rebalancer(FakeRegistry::with_units(&units(2)));
        rebalancer.refresh_topology().await.unwrap();

        let outcome = rebalancer.dispatch("base/sensors/1/1", &motion()).await;

        assert_eq!(outcome, DispatchOutcome::Malformed);
        assert!(bus.published.lock().unwrap().is_empty());
        for status in rebalancer.status().await.controllers {
            assert_eq!(status.tracked_units, 0);
        }
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_drop_everything_before_first_refresh() {
        let (rebalancer, _, _) = make_rebalancer(FakeRegistry::with_units(&units(2)));

        let outcome = rebalancer
            .dispatch("base/sensors/1/1/1/light_sensor", &motion())
            .await;

        assert_eq!(outcome, DispatchOutcome::RoutingMiss(UnitKey::new(1, 1, 1)));
    }

    #[tokio::test]
    async fn should_dispatch_while_routing_is_swapped() {
        let (rebalancer, _, registry) = make_rebalancer(FakeRegistry::with_units(&units(10)));
        rebalancer.refresh_topology().await.unwrap();

        let refresher = {
            let rebalancer = Arc::clone(&rebalancer);
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for round in 0..20 {
                    registry.set_units(&units(10 + round % 3));
                    rebalancer.refresh_topology().await.unwrap();
                }
            })
        };
        for _ in 0..50 {
            let outcome = rebalancer
                .dispatch("base/sensors/1/1/3/light_sensor", &motion())
                .await;
            assert_eq!(outcome, DispatchOutcome::Delivered(ControllerId::from_index(0)));
        }
        refresher.await.unwrap();
        rebalancer.shutdown().await;
    }

    #[tokio::test]
    async fn should_stop_previous_owner_commanding_a_moved_unit() {
        let (rebalancer, bus, registry) = make_rebalancer(FakeRegistry::with_units(&units(5)));
        rebalancer.refresh_topology().await.unwrap();
        let dark = br#"{"bn": "x", "e": [{"n": "light", "u": "lux", "t": "1", "v": 100}]}"#;
        let outcome = rebalancer
            .dispatch("base/sensors/1/1/5/light_sensor", dark)
            .await;
        assert_eq!(outcome, DispatchOutcome::Delivered(ControllerId::from_index(0)));

        let mut grown = units(5);
        grown.insert(0, (1, 1, 0));
        registry.set_units(&grown);
        rebalancer.refresh_topology().await.unwrap();

        assert_eq!(
            rebalancer.routing().controller_for(&UnitKey::new(1, 1, 5)),
            Some(ControllerId::from_index(1))
        );
        let previous = rebalancer.pool.get(ControllerId::from_index(0)).unwrap();
        assert_eq!(previous.evaluate().await, 0);
        assert!(bus.published.lock().unwrap().is_empty());
        assert_eq!(previous.status().await.tracked_units, 0);
        rebalancer.shutdown().await;
    }

    // ── Status ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn should_report_controllers_and_assignments() {
        let (rebalancer, _, _) = make_rebalancer(FakeRegistry::with_units(&units(6)));
        rebalancer.refresh_topology().await.unwrap();

        let status = rebalancer.status().await;

        assert_eq!(status.base_topic, "base");
        assert_eq!(status.partition_size, 5);
        assert_eq!(status.units, 6);
        assert_eq!(status.controllers.len(), 2);
        assert_eq!(status.controllers[0].assigned_units.len(), 5);
        assert_eq!(
            status.controllers[1].assigned_units,
            vec![UnitKey::new(1, 1, 6)]
        );
        rebalancer.shutdown().await;
    }
}
