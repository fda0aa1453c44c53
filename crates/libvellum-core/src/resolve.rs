use crate::error::VellumError;
use crate::hash::PATH_PREFIX;

/// Turns a human reference (e.g. `nasim/world_bank`) into the concrete path
/// of its current snapshot.
pub trait AliasResolver {
    fn canonicalize(&self, reference: &str) -> Result<String, VellumError>;
}

/// Whether a reference is already a concrete snapshot path
pub fn is_concrete_path(reference: &str) -> bool {
    reference.starts_with(PATH_PREFIX)
}

/// Resolver that only accepts concrete snapshot paths
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcretePaths;

impl AliasResolver for ConcretePaths {
    fn canonicalize(&self, reference: &str) -> Result<String, VellumError> {
        if is_concrete_path(reference) {
            Ok(reference.to_string())
        } else {
            Err(VellumError::UnknownLineage(reference.to_string()))
        }
    }
}

impl<R: AliasResolver + ?Sized> AliasResolver for &R {
    fn canonicalize(&self, reference: &str) -> Result<String, VellumError> {
        (**self).canonicalize(reference)
    }
}
