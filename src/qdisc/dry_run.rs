// Actuator that only reports what it would do
// (c) 2024 Ross Younger

use std::time::Duration;

use tracing::info;

use super::Actuator;
use crate::util::HumanDuration;

/// An [`Actuator`] that logs the change it would have made, and always succeeds.
///
/// Useful for watching the controller's decisions without the privileges to act on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator {
    applied: u64,
}

impl DryRunActuator {
    /// How many changes this actuator has been asked to make
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl Actuator for DryRunActuator {
    async fn apply_target(&mut self, interface: &str, target: Duration) -> anyhow::Result<()> {
        self.applied += 1;
        info!(
            "dry run: would set {interface} target to {}",
            HumanDuration::new(target)
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::DryRunActuator;
    use crate::qdisc::Actuator as _;

    #[tokio::test]
    async fn always_succeeds() {
        let mut uut = DryRunActuator::default();
        uut.apply_target("eth0", Duration::from_millis(3))
            .await
            .unwrap();
        uut.apply_target("eth0", Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(uut.applied(), 2);
    }
}
