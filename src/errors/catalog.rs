use alloc::sync::Arc;

use crate::types::TypeInfo;

/// Shape errors of the registration catalog. Each is fatal for the affected
/// catalog entry only; planning proceeds with the rest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogErrorKind {
    #[error("`{ty}` is an open generic type definition and cannot be registered")]
    OpenGeneric { ty: TypeInfo },
    #[error("`{ty}` is not visible at the container's accessibility boundary")]
    NotReachable { ty: TypeInfo },
    #[error("`{ty}` cannot be registered as `{as_ty}`: not one of its base types or implemented interfaces")]
    NotRegisterableAs { ty: TypeInfo, as_ty: TypeInfo },
    #[error("`{ty}` has no public constructor")]
    NoPublicConstructor { ty: TypeInfo },
    #[error("`{ty}` has {count} public constructors, none of which is an unambiguous choice")]
    MultiplePublicConstructors { ty: TypeInfo, count: usize },
    #[error("`{ty}` is a value type and cannot be registered as single instance")]
    SingleInstanceValueType { ty: TypeInfo },
    #[error("`{ty}` is registered more than once in module `{module}`")]
    DuplicateRegistration { ty: TypeInfo, module: Arc<str> },
    #[error(
        "imported module `{module}` provides `{ty}`, which another imported module also provides; \
         exclude the type from one of the imports"
    )]
    ConflictingImport { ty: TypeInfo, module: Arc<str> },
    #[error("decorator `{ty}` does not accept the decorated `{expected}` at parameter slot {slot}")]
    InvalidDecoratedParameter { ty: TypeInfo, expected: TypeInfo, slot: usize },
}

impl CatalogErrorKind {
    /// Stable machine-readable diagnostic code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            CatalogErrorKind::OpenGeneric { .. } => "WP0101",
            CatalogErrorKind::NotReachable { .. } => "WP0102",
            CatalogErrorKind::NotRegisterableAs { .. } => "WP0103",
            CatalogErrorKind::NoPublicConstructor { .. } => "WP0104",
            CatalogErrorKind::MultiplePublicConstructors { .. } => "WP0105",
            CatalogErrorKind::SingleInstanceValueType { .. } => "WP0106",
            CatalogErrorKind::DuplicateRegistration { .. } => "WP0107",
            CatalogErrorKind::ConflictingImport { .. } => "WP0108",
            CatalogErrorKind::InvalidDecoratedParameter { .. } => "WP0109",
        }
    }
}
