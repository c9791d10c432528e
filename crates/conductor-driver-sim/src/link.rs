//! Simulated device link and provider.

use crate::fault::{Access, FaultConfig};
use crate::mode::SimMode;
use async_trait::async_trait;
use conductor_core::{CmdResult, DeviceLink, LinkProvider};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// =============================================================================
// Connect Behavior
// =============================================================================

/// How a simulated link answers connection waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    /// Channels are connected from the start
    #[default]
    Immediate,
    /// Channels never connect; in Realistic mode the full wait timeout is
    /// consumed before reporting failure
    Never,
    /// Channels connect the given duration after link creation
    After(Duration),
}

// =============================================================================
// Field Storage
// =============================================================================

#[derive(Debug, Clone)]
struct FieldSlot {
    /// Value currently visible to reads
    current: Value,
    /// Written value not yet visible (settle delay still running)
    pending: Option<(Value, Instant)>,
}

impl FieldSlot {
    fn new(value: Value) -> Self {
        Self {
            current: value,
            pending: None,
        }
    }

    fn settle(&mut self) {
        if let Some((value, visible_at)) = self.pending.take() {
            if Instant::now() >= visible_at {
                self.current = value;
            } else {
                self.pending = Some((value, visible_at));
            }
        }
    }
}

// =============================================================================
// SimLink
// =============================================================================

/// In-memory device link with hardware-like behavior.
///
/// Writes land in the field map after a configurable settle delay, so a
/// check loop really has to poll for confirmation. Connect behavior and
/// fault injection cover the unreachable-device and flaky-transport
/// cases; put/get counters support call-count-spy assertions.
///
/// # Example
///
/// ```rust,ignore
/// let link = SimLink::builder("LI-01:PS-QF1")
///     .field("pwrstate", json!("off"))
///     .settle(Duration::from_millis(50))
///     .build();
///
/// link.put("pwrstate", json!("on")).await?;
/// // reads report "off" until the settle delay elapses
/// ```
pub struct SimLink {
    name: String,
    mode: SimMode,
    connect: ConnectBehavior,
    settle: Duration,
    faults: FaultConfig,
    fields: RwLock<HashMap<String, FieldSlot>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    put_counts: RwLock<HashMap<String, usize>>,
    created: Instant,
}

impl SimLink {
    /// Create a builder for configuring a SimLink
    pub fn builder(name: impl Into<String>) -> SimLinkBuilder {
        SimLinkBuilder::new(name)
    }

    /// Channel name this link serves
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of puts dispatched through this link
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Total number of gets served by this link
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of puts dispatched to one named field
    pub fn puts_for(&self, field: &str) -> usize {
        self.put_counts.read().get(field).copied().unwrap_or(0)
    }

    /// Overwrite a field immediately, bypassing settle delay and counters.
    ///
    /// Simulates state changed by something other than the pipeline
    /// (operator action, another application).
    pub fn force(&self, field: &str, value: Value) {
        let mut fields = self.fields.write();
        fields.insert(field.to_string(), FieldSlot::new(value));
    }

    /// Current visible value of a field (test inspection)
    pub fn value_of(&self, field: &str) -> Value {
        let mut fields = self.fields.write();
        match fields.get_mut(field) {
            Some(slot) => {
                slot.settle();
                slot.current.clone()
            }
            None => Value::Null,
        }
    }
}

#[async_trait]
impl DeviceLink for SimLink {
    async fn wait_connected(&self, timeout: Duration) -> bool {
        match self.connect {
            ConnectBehavior::Immediate => true,
            ConnectBehavior::Never => {
                if self.mode == SimMode::Realistic {
                    sleep(timeout).await;
                }
                false
            }
            ConnectBehavior::After(delay) => {
                let ready_at = self.created + delay;
                let now = Instant::now();
                if now >= ready_at {
                    return true;
                }
                let remaining = ready_at - now;
                if remaining <= timeout {
                    sleep(remaining).await;
                    true
                } else {
                    if self.mode == SimMode::Realistic {
                        sleep(timeout).await;
                    }
                    false
                }
            }
        }
    }

    async fn put(&self, field: &str, value: Value) -> CmdResult<()> {
        self.faults.check(&self.name, Access::Put, field)?;

        self.puts.fetch_add(1, Ordering::SeqCst);
        *self
            .put_counts
            .write()
            .entry(field.to_string())
            .or_insert(0) += 1;

        tracing::debug!(link = %self.name, field = %field, value = %value, "sim put");

        let visible_at = Instant::now() + self.settle;
        let mut fields = self.fields.write();
        let slot = fields
            .entry(field.to_string())
            .or_insert_with(|| FieldSlot::new(Value::Null));
        if self.settle.is_zero() {
            slot.current = value;
            slot.pending = None;
        } else {
            slot.pending = Some((value, visible_at));
        }
        Ok(())
    }

    async fn get(&self, field: &str) -> CmdResult<Value> {
        self.faults.check(&self.name, Access::Get, field)?;

        self.gets.fetch_add(1, Ordering::SeqCst);

        let mut fields = self.fields.write();
        Ok(match fields.get_mut(field) {
            Some(slot) => {
                slot.settle();
                slot.current.clone()
            }
            None => Value::Null,
        })
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SimLink`] with fluent API
pub struct SimLinkBuilder {
    name: String,
    mode: SimMode,
    connect: ConnectBehavior,
    settle: Option<Duration>,
    faults: FaultConfig,
    fields: HashMap<String, Value>,
}

impl SimLinkBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: SimMode::Instant,
            connect: ConnectBehavior::Immediate,
            settle: None,
            faults: FaultConfig::none(),
            fields: HashMap::new(),
        }
    }

    /// Set operational mode
    pub fn mode(mut self, mode: SimMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set connect behavior
    pub fn connect(mut self, connect: ConnectBehavior) -> Self {
        self.connect = connect;
        self
    }

    /// Set settle delay between a put and its visibility to gets.
    ///
    /// Defaults to zero in Instant mode and 50 ms in Realistic mode.
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Set fault injection configuration
    pub fn faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    /// Preset a field's initial value
    pub fn field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Build the SimLink
    pub fn build(self) -> SimLink {
        let settle = self.settle.unwrap_or(match self.mode {
            SimMode::Instant => Duration::ZERO,
            SimMode::Realistic => Duration::from_millis(50),
        });

        SimLink {
            name: self.name,
            mode: self.mode,
            connect: self.connect,
            settle,
            faults: self.faults,
            fields: RwLock::new(
                self.fields
                    .into_iter()
                    .map(|(k, v)| (k, FieldSlot::new(v)))
                    .collect(),
            ),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            put_counts: RwLock::new(HashMap::new()),
            created: Instant::now(),
        }
    }
}

// =============================================================================
// Provider
// =============================================================================

/// [`LinkProvider`] over a set of simulated links.
///
/// Links registered up front keep their configured behavior; unknown
/// names are served an Instant-mode link with no preset fields, so tests
/// only configure the devices they care about.
#[derive(Default)]
pub struct SimLinkProvider {
    links: RwLock<HashMap<String, Arc<SimLink>>>,
}

impl SimLinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configured link, returning a handle for test inspection
    pub fn insert(&self, link: SimLink) -> Arc<SimLink> {
        let link = Arc::new(link);
        self.links
            .write()
            .insert(link.name().to_string(), link.clone());
        link
    }

    /// Look up a registered link by name
    pub fn get(&self, name: &str) -> Option<Arc<SimLink>> {
        self.links.read().get(name).cloned()
    }

    /// Total puts dispatched across every link (call-count spy)
    pub fn total_puts(&self) -> usize {
        self.links.read().values().map(|l| l.put_count()).sum()
    }
}

impl LinkProvider for SimLinkProvider {
    fn link(&self, name: &str) -> Arc<dyn DeviceLink> {
        let mut links = self.links.write();
        links
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SimLink::builder(name).build()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultScenario;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_get_instant() {
        let link = SimLink::builder("PS-A").build();

        assert_eq!(link.get("pwrstate").await.unwrap(), Value::Null);

        link.put("pwrstate", json!("on")).await.unwrap();
        assert_eq!(link.get("pwrstate").await.unwrap(), json!("on"));
        assert_eq!(link.put_count(), 1);
        assert_eq!(link.puts_for("pwrstate"), 1);
    }

    #[tokio::test]
    async fn test_settle_delays_visibility() {
        let link = SimLink::builder("PS-A")
            .field("current", json!(0.0))
            .settle(Duration::from_millis(50))
            .build();

        link.put("current", json!(2.5)).await.unwrap();

        // Immediately after the put, the old value is still visible.
        assert_eq!(link.get("current").await.unwrap(), json!(0.0));

        sleep(Duration::from_millis(80)).await;
        assert_eq!(link.get("current").await.unwrap(), json!(2.5));
    }

    #[tokio::test]
    async fn test_never_connects() {
        let link = SimLink::builder("PS-B")
            .connect(ConnectBehavior::Never)
            .build();

        assert!(!link.wait_connected(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_connect_after_delay() {
        let link = SimLink::builder("PS-A")
            .connect(ConnectBehavior::After(Duration::from_millis(30)))
            .build();

        // Not reachable within a shorter wait...
        assert!(!link.wait_connected(Duration::from_millis(5)).await);
        // ...but reachable within a longer one.
        assert!(link.wait_connected(Duration::from_millis(100)).await);
        // And stays connected afterwards.
        assert!(link.wait_connected(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_fault_injection_surfaces_as_link_error() {
        let link = SimLink::builder("PS-A")
            .faults(FaultConfig::scenario(FaultScenario::PutFailure {
                field: "pwrstate",
            }))
            .build();

        let err = link.put("pwrstate", json!("on")).await.unwrap_err();
        assert!(!err.is_fatal());
        // Failed puts do not count as dispatched.
        assert_eq!(link.put_count(), 0);
    }

    #[tokio::test]
    async fn test_force_bypasses_counters() {
        let link = SimLink::builder("TRG-FAM").build();

        link.force("state", json!(1));
        assert_eq!(link.value_of("state"), json!(1));
        assert_eq!(link.put_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_shares_links_and_autocreates() {
        let provider = SimLinkProvider::new();
        let seeded = provider.insert(SimLink::builder("PS-A").field("pwrstate", json!("off")).build());

        // The provider hands out the seeded link, not a fresh one.
        let handle = provider.link("PS-A");
        handle.put("pwrstate", json!("on")).await.unwrap();
        assert_eq!(seeded.put_count(), 1);

        // Unknown names are auto-created and remembered.
        let auto = provider.link("PS-UNSEEN");
        assert!(auto.wait_connected(Duration::from_millis(1)).await);
        assert!(provider.get("PS-UNSEEN").is_some());
        assert_eq!(provider.total_puts(), 1);
    }
}
