use std::path::PathBuf;

/// Predicate deciding whether the wrapped binary can be launched
///
/// Called by the executor before anything is spawned. Implementations must
/// not have side effects.
pub trait BinaryCheck: Send + Sync + std::fmt::Debug {
    fn is_available(&self, program: &str) -> bool;
}

/// Resolves programs the way a shell would, using `which`
#[derive(Debug, Default, Clone, Copy)]
pub struct WhichCheck;

impl BinaryCheck for WhichCheck {
    fn is_available(&self, program: &str) -> bool {
        resolve(program).is_some()
    }
}

/// Full path of `program`, looked up on PATH for bare names
pub fn resolve(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}
