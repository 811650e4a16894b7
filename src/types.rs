use alloc::sync::Arc;
use core::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

/// Host-assigned symbol identifier.
///
/// The planner never inspects types itself; the host type system hands out
/// stable ids and answers queries about them (see [`crate::TypeQueries`]).
/// Every map in the crate is keyed by this id, so iteration order is total
/// and independent of any hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u64);

/// Type identity plus its display name.
///
/// Equality and ordering consider the id only: two `TypeInfo`s with the same
/// id denote the same type even if the host rendered their names differently.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: Arc<str>,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn new(id: TypeId, name: impl AsRef<str>) -> Self {
        Self {
            id,
            name: Arc::from(name.as_ref()),
        }
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.rsplit_once("::").map_or(&*self.name, |(_, name)| name)
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
