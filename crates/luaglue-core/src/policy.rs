//! Ownership policy applied to class instances returned to a script.

/// Decides whether the VM takes ownership of instances a binding returns.
///
/// The policy is fixed when a member is bound; plain members retain,
/// operators and custom constructors collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnPolicy {
    /// Native code keeps ownership; the VM never finalizes the instance.
    #[default]
    Retain,
    /// Ownership moves to the VM, which finalizes the instance when the
    /// handle is collected.
    Collect,
}

impl ReturnPolicy {
    /// Whether pushing under this policy transfers ownership to the VM.
    pub fn transfers(self) -> bool {
        matches!(self, ReturnPolicy::Collect)
    }
}
