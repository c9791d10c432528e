//! Process-wide tester registry.
//!
//! The registry owns every capability object: one tester per device,
//! created on first request and cached for the process lifetime. Callers
//! only borrow `Arc` handles. The cache is append-only — entries are
//! never evicted or replaced — so concurrent pipelines always observe
//! the same tester for a given device.
//!
//! Classification happens at most once per device: a device whose kind
//! the classifier does not recognize is a fatal configuration error
//! ([`CommandError::UnknownDeviceKind`]), raised instead of degrading
//! silently.

use crate::classify::DeviceClassifier;
use crate::testers::{DcLinkTester, PowerSupplyTester, PulsedMagnetTester, TimingTriggerTester};
use conductor_core::{
    CommandError, DeviceId, DeviceKind, DeviceTester, LinkProvider, TriggerId, TriggerTester,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Central registry mapping device identifiers to live testers.
pub struct TesterRegistry {
    classifier: Box<dyn DeviceClassifier>,
    links: Arc<dyn LinkProvider>,
    devices: RwLock<HashMap<DeviceId, Arc<dyn DeviceTester>>>,
    triggers: RwLock<HashMap<TriggerId, Arc<dyn TriggerTester>>>,
}

impl TesterRegistry {
    /// Create a registry over the given classifier and transport.
    ///
    /// Both collaborators are injected so tests can substitute fakes.
    pub fn new(classifier: impl DeviceClassifier + 'static, links: Arc<dyn LinkProvider>) -> Self {
        Self {
            classifier: Box::new(classifier),
            links,
            devices: RwLock::new(HashMap::new()),
            triggers: RwLock::new(HashMap::new()),
        }
    }

    /// The tester for a device, creating and caching it on first request.
    ///
    /// Subsequent calls return the identical instance (reference
    /// equality); the classifier runs at most once per device.
    pub fn get_or_create(
        &self,
        device: &DeviceId,
    ) -> Result<Arc<dyn DeviceTester>, CommandError> {
        if let Some(tester) = self.devices.read().get(device) {
            return Ok(tester.clone());
        }

        let mut devices = self.devices.write();
        // Re-check under the write lock: another pipeline may have won the
        // race, and its tester must be the one every caller sees.
        if let Some(tester) = devices.get(device) {
            return Ok(tester.clone());
        }

        let kind = self
            .classifier
            .classify(device)
            .ok_or_else(|| CommandError::UnknownDeviceKind {
                device: device.clone(),
            })?;

        let link = self.links.link(device.as_str());
        let tester: Arc<dyn DeviceTester> = match kind {
            DeviceKind::PowerSupply => Arc::new(PowerSupplyTester::new(device.clone(), link)),
            DeviceKind::PulsedMagnet => Arc::new(PulsedMagnetTester::new(device.clone(), link)),
            DeviceKind::DcLink => Arc::new(DcLinkTester::new(device.clone(), link)),
            // Trigger channels are served through `trigger()`; a trigger
            // name arriving on the device path has no device-tester
            // mapping, which is a configuration defect.
            DeviceKind::TimingTrigger => {
                return Err(CommandError::UnknownDeviceKind {
                    device: device.clone(),
                })
            }
        };

        debug!(device = %device, kind = %kind, "created tester");
        devices.insert(device.clone(), tester.clone());
        Ok(tester)
    }

    /// The tester for a shared timing trigger, created and cached on
    /// first request. Trigger testers are uniform, so this never fails.
    pub fn trigger(&self, trigger: &TriggerId) -> Arc<dyn TriggerTester> {
        if let Some(tester) = self.triggers.read().get(trigger) {
            return tester.clone();
        }

        let mut triggers = self.triggers.write();
        if let Some(tester) = triggers.get(trigger) {
            return tester.clone();
        }

        let link = self.links.link(trigger.as_str());
        let tester: Arc<dyn TriggerTester> =
            Arc::new(TimingTriggerTester::new(trigger.clone(), link));

        debug!(trigger = %trigger, "created trigger tester");
        triggers.insert(trigger.clone(), tester.clone());
        tester
    }

    /// Number of cached device testers
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::NameClassifier;
    use conductor_driver_sim::SimLinkProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Classifier wrapper counting invocations per device
    struct CountingClassifier {
        inner: NameClassifier,
        calls: Arc<AtomicUsize>,
    }

    impl DeviceClassifier for CountingClassifier {
        fn classify(&self, device: &DeviceId) -> Option<DeviceKind> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.classify(device)
        }
    }

    fn counting_registry() -> (TesterRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = TesterRegistry::new(
            CountingClassifier {
                inner: NameClassifier,
                calls: calls.clone(),
            },
            Arc::new(SimLinkProvider::new()),
        );
        (registry, calls)
    }

    #[test]
    fn test_repeated_calls_return_identical_instance() {
        let (registry, calls) = counting_registry();
        let device = DeviceId::new("LI-01:PS-QF1");

        let first = registry.get_or_create(&device).unwrap();
        for _ in 0..10 {
            let again = registry.get_or_create(&device).unwrap();
            assert!(
                Arc::ptr_eq(&first, &again),
                "registry must serve the cached tester"
            );
        }

        // Classification ran exactly once despite eleven lookups.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_kind_selects_concrete_tester() {
        let (registry, _) = counting_registry();

        let ps = registry.get_or_create(&DeviceId::new("PS-A")).unwrap();
        assert_eq!(ps.kind(), DeviceKind::PowerSupply);

        let dcl = registry.get_or_create(&DeviceId::new("DCL-1")).unwrap();
        assert_eq!(dcl.kind(), DeviceKind::DcLink);

        let pm = registry
            .get_or_create(&DeviceId::new("BO-48D:PU-EjeKckr"))
            .unwrap();
        assert_eq!(pm.kind(), DeviceKind::PulsedMagnet);
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let (registry, _) = counting_registry();

        let err = registry
            .get_or_create(&DeviceId::new("SI-01:XX-Thing"))
            .err()
            .unwrap();
        assert!(matches!(err, CommandError::UnknownDeviceKind { .. }));
        assert!(err.is_fatal());
        assert!(registry.is_empty(), "failed lookups must not populate the cache");
    }

    #[test]
    fn test_trigger_testers_are_cached_too() {
        let (registry, _) = counting_registry();
        let trigger = TriggerId::new("SI-Glob:TI-Mags");

        let first = registry.trigger(&trigger);
        let again = registry.trigger(&trigger);
        assert!(Arc::ptr_eq(&first, &again));
    }
}
