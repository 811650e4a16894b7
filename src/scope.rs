/// Sharing policy of an instance source, ordered by sharing breadth.
///
/// The discriminant doubles as the priority: a wider-shared scope compares
/// greater than a narrower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Scope {
    /// A new instance at every consumption site; never memoized.
    InstancePerDependency,
    /// One instance per top-level resolution (or per delegate invocation),
    /// shared by every consumer inside that boundary.
    InstancePerResolution,
    /// One instance for the container lifetime, shared across all
    /// resolutions and delegate invocations. Initialization is lazy and
    /// idempotent under races: concurrent creators all run, the first to
    /// finish wins the shared slot.
    SingleInstance,
}

impl Default for Scope {
    #[inline]
    fn default() -> Self {
        Scope::InstancePerResolution
    }
}

impl Scope {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Scope::InstancePerDependency => "instance per dependency",
            Scope::InstancePerResolution => "instance per resolution",
            Scope::SingleInstance => "single instance",
        }
    }

    #[inline]
    #[must_use]
    pub fn priority(&self) -> u8 {
        *self as u8
    }

    /// Whether a value of this scope is reused within its boundary.
    #[inline]
    #[must_use]
    pub fn is_memoized(&self) -> bool {
        !matches!(self, Scope::InstancePerDependency)
    }

    #[inline]
    #[must_use]
    pub fn all() -> [Scope; 3] {
        use Scope::{InstancePerDependency, InstancePerResolution, SingleInstance};

        [InstancePerDependency, InstancePerResolution, SingleInstance]
    }
}

#[cfg(test)]
mod tests {
    use super::Scope;

    #[test]
    fn test_priority_order() {
        let [dep, res, single] = Scope::all();
        assert!(dep < res && res < single);
        assert_eq!(dep.priority(), 0);
        assert_eq!(single.priority(), 2);
    }

    #[test]
    fn test_memoized() {
        assert!(!Scope::InstancePerDependency.is_memoized());
        assert!(Scope::InstancePerResolution.is_memoized());
        assert!(Scope::SingleInstance.is_memoized());
        assert_eq!(Scope::default(), Scope::InstancePerResolution);
    }
}
