use alloc::sync::Arc;

use crate::types::TypeInfo;

/// Graph errors found while validating a resolution root. Fatal for that
/// root only; sibling roots are unaffected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveErrorKind {
    #[error("no source registered for `{ty}`")]
    NoSource { ty: TypeInfo },
    #[error("ambiguous source for `{ty}`: {count} equally eligible candidates remain")]
    AmbiguousSource { ty: TypeInfo, count: usize },
    #[error("cyclic dependency: `{ty}` is reached again while it is still being resolved")]
    CyclicDependency { ty: TypeInfo },
    #[error("resolution exceeded the maximum depth of {limit}")]
    DepthExceeded { limit: usize },
    #[error("`{ty}` requires awaiting, but the enclosing resolution boundary is synchronous")]
    AsyncSourceInSyncResolution { ty: TypeInfo },
    #[error("single-instance `{ty}` requires awaiting, but no enclosing resolution boundary is asynchronous")]
    AsyncSingleInstanceWithoutAsyncBoundary { ty: TypeInfo },
    #[error("delegate `{delegate}` declares more than one parameter of type `{ty}`")]
    DuplicateDelegateParameters { delegate: TypeInfo, ty: TypeInfo },
    #[error("delegate `{delegate}` parameter `{parameter}` is passed by reference and cannot be captured")]
    ByRefDelegateParameter { delegate: TypeInfo, parameter: Arc<str> },
}

impl ResolveErrorKind {
    /// Stable machine-readable diagnostic code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ResolveErrorKind::NoSource { .. } => "WP0201",
            ResolveErrorKind::AmbiguousSource { .. } => "WP0202",
            ResolveErrorKind::CyclicDependency { .. } => "WP0203",
            ResolveErrorKind::DepthExceeded { .. } => "WP0204",
            ResolveErrorKind::AsyncSourceInSyncResolution { .. } => "WP0205",
            ResolveErrorKind::AsyncSingleInstanceWithoutAsyncBoundary { .. } => "WP0206",
            ResolveErrorKind::DuplicateDelegateParameters { .. } => "WP0207",
            ResolveErrorKind::ByRefDelegateParameter { .. } => "WP0208",
        }
    }
}

/// Non-fatal findings; a plan is still produced.
///
/// The three constant-return warnings describe one phenomenon (the
/// delegate's output cannot change between invocations) but are kept as
/// three codes, matching the distinct shapes they are detected in.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveWarningKind {
    #[error("delegate `{delegate}` parameter `{parameter}` is never used while resolving its return type")]
    UnusedDelegateParameter { delegate: TypeInfo, parameter: Arc<str> },
    #[error("delegate `{delegate}` returns one of its own parameters; its result will not change between invocations")]
    ReturnsOwnParameter { delegate: TypeInfo },
    #[error("delegate `{delegate}` returns a parameter of an enclosing delegate; its result will not change between invocations")]
    ReturnsEnclosingParameter { delegate: TypeInfo },
    #[error("delegate `{delegate}` returns a single-instance value; its result will not change between invocations")]
    ReturnsSingleInstance { delegate: TypeInfo },
    #[error("no registered sources contribute to the collection of `{element}`")]
    EmptyCollection { element: TypeInfo },
}

impl ResolveWarningKind {
    /// Stable machine-readable diagnostic code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ResolveWarningKind::UnusedDelegateParameter { .. } => "WP0301",
            ResolveWarningKind::ReturnsOwnParameter { .. } => "WP0302",
            ResolveWarningKind::ReturnsEnclosingParameter { .. } => "WP0303",
            ResolveWarningKind::ReturnsSingleInstance { .. } => "WP0304",
            ResolveWarningKind::EmptyCollection { .. } => "WP0305",
        }
    }
}

/// Purely advisory findings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveNoteKind {
    #[error("no source registered for optional parameter `{parameter}` of type `{ty}`; its default value is used")]
    OptionalParameterDefaulted { ty: TypeInfo, parameter: Arc<str> },
}

impl ResolveNoteKind {
    /// Stable machine-readable diagnostic code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ResolveNoteKind::OptionalParameterDefaulted { .. } => "WP0401",
        }
    }
}
