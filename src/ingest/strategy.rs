#[cfg(test)]
use mockall::automock;

use super::SegmentBundle;

/// The two upload protocols a bundle may travel through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// Bundle bytes sent inline as the upload body
    DirectPayload,
    /// Bundle left on local storage; only a file-reference URI is sent
    MetadataReference,
}

/// Decides, per bundle, which upload protocol to use.
///
/// Evaluated independently for every bundle at the moment of dispatch. The
/// contract of the default selector is "effectively random per-bundle choice,
/// independent across bundles"; tests that need determinism inject a
/// [`FixedSelector`].
#[cfg_attr(test, automock)]
pub trait StrategySelector: Send + Sync + 'static {
    fn select(&self, bundle: &SegmentBundle) -> UploadStrategy;
}

/// Default selection policy: an independent coin flip per bundle.
pub struct RandomSelector;

impl StrategySelector for RandomSelector {
    fn select(&self, _bundle: &SegmentBundle) -> UploadStrategy {
        if rand::random::<bool>() {
            UploadStrategy::DirectPayload
        } else {
            UploadStrategy::MetadataReference
        }
    }
}

/// Pins every bundle to one strategy.
pub struct FixedSelector(pub UploadStrategy);

impl StrategySelector for FixedSelector {
    fn select(&self, _bundle: &SegmentBundle) -> UploadStrategy {
        self.0
    }
}
