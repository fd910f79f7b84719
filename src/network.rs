use crate::{
    errors::{
        DashboardError,
        Result,
    },
    notify::{
        Notice,
        Notifier,
    },
};
use tracing::warn;

pub const WRONG_NETWORK_MESSAGE: &str =
    "Please switch to the correct network to use this dApp.";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkGuard {
    required_chain_id: u64,
}

impl NetworkGuard {
    pub fn new(required_chain_id: u64) -> Self {
        Self { required_chain_id }
    }

    pub fn required_chain_id(&self) -> u64 {
        self.required_chain_id
    }

    pub fn matches(&self, chain_id: u64) -> bool {
        chain_id == self.required_chain_id
    }

    /// Rejects a mismatched chain with a single user-facing warning.
    pub fn enforce(&self, chain_id: u64, notifier: &dyn Notifier) -> Result<()> {
        if self.matches(chain_id) {
            return Ok(());
        }
        warn!(
            expected = self.required_chain_id,
            actual = chain_id,
            "connected to the wrong network"
        );
        notifier.notify(Notice::warning(WRONG_NETWORK_MESSAGE));
        Err(DashboardError::NetworkMismatch {
            expected: self.required_chain_id,
            actual: chain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        notify::NoticeLevel,
        test_helpers::RecordingNotifier,
    };
    use proptest::prelude::*;

    #[test]
    fn enforce__accepts_required_chain_silently() {
        // given
        let guard = NetworkGuard::new(80001);
        let notifier = RecordingNotifier::default();

        // when
        let result = guard.enforce(80001, &notifier);

        // then
        assert_eq!(result, Ok(()));
        assert!(notifier.notices().is_empty());
    }

    #[test]
    fn enforce__warns_once_on_mismatch() {
        // given
        let guard = NetworkGuard::new(80001);
        let notifier = RecordingNotifier::default();

        // when
        let result = guard.enforce(1, &notifier);

        // then
        assert_eq!(
            result,
            Err(DashboardError::NetworkMismatch {
                expected: 80001,
                actual: 1,
            })
        );
        assert_eq!(
            notifier.notices(),
            vec![Notice {
                level: NoticeLevel::Warning,
                message: WRONG_NETWORK_MESSAGE.to_string(),
            }]
        );
    }

    proptest! {
        #[test]
        fn matches__only_the_required_chain(required in any::<u64>(), actual in any::<u64>()) {
            let guard = NetworkGuard::new(required);
            prop_assert_eq!(guard.matches(actual), actual == required);
            prop_assert!(guard.matches(required));
        }
    }
}
