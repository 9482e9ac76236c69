use crate::conduits::ConduitBundle;

/// The host-side owner of one bundle: the authoritative copy the simulation mutates and the
/// detached presentation copy observers read.
#[derive(Debug)]
pub struct ConduitEndpoint {
    bundle: ConduitBundle,
    presentation: ConduitBundle,
}

impl ConduitEndpoint {
    pub fn new(bundle: ConduitBundle) -> Self {
        let presentation = bundle.deep_copy();
        Self {
            bundle,
            presentation,
        }
    }

    pub fn bundle(&self) -> &ConduitBundle {
        &self.bundle
    }

    /// Callers refresh the presentation copy with [`update_client`](Self::update_client) once
    /// they are done mutating.
    pub(crate) fn bundle_mut(&mut self) -> &mut ConduitBundle {
        &mut self.bundle
    }

    pub fn presentation(&self) -> &ConduitBundle {
        &self.presentation
    }

    /// Re-copies the authoritative bundle for observers.
    pub fn update_client(&mut self) {
        self.presentation = self.bundle.deep_copy();
    }

    pub fn into_bundle(self) -> ConduitBundle {
        self.bundle
    }
}
