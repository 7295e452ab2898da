//! Poison-tolerant access to the server's shared state.
//!
//! Every lock guards a cache or a single slot that can be rebuilt from disk.
//! Poisoned guards are recovered and logged.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// The shared state a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockSite {
    ResourceCache,
    RangeSlot,
    HelpDirectory,
    ActivePresentation,
    SourceBuild,
}

impl LockSite {
    fn name(self) -> &'static str {
        match self {
            LockSite::ResourceCache => "resource_cache",
            LockSite::RangeSlot => "range_slot",
            LockSite::HelpDirectory => "help_directory",
            LockSite::ActivePresentation => "active_presentation",
            LockSite::SourceBuild => "source_build",
        }
    }

    /// What a reader should expect after recovering the guard.
    fn recovery(self) -> &'static str {
        match self {
            LockSite::ResourceCache => "entries are complete texts; a missing one reloads",
            LockSite::RangeSlot => "slot is revalidated against path and mtime",
            LockSite::HelpDirectory | LockSite::ActivePresentation => {
                "slot keeps the last directory written"
            }
            LockSite::SourceBuild => "previous build ended without its completion event",
        }
    }
}

pub(crate) fn read<'a, T>(
    lock: &'a RwLock<T>,
    site: LockSite,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), site, "read", op)
}

pub(crate) fn write<'a, T>(
    lock: &'a RwLock<T>,
    site: LockSite,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), site, "write", op)
}

pub(crate) fn exclusive<'a, T>(
    lock: &'a Mutex<T>,
    site: LockSite,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), site, "exclusive", op)
}

fn recover<G>(result: LockResult<G>, site: LockSite, access: &'static str, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "infra::lock",
            op,
            site = site.name(),
            access,
            result = "poisoned_recovered",
            recovery = site.recovery(),
            "Recovered from poisoned lock"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{panic, sync::Arc, thread};

    #[test]
    fn poisoned_slot_keeps_its_value() {
        let slot = Arc::new(RwLock::new(Some("deck")));
        let poisoner = Arc::clone(&slot);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write().expect("first writer");
            panic!("request handler panicked");
        })
        .join();
        assert!(slot.is_poisoned());

        assert_eq!(*read(&slot, LockSite::ActivePresentation, "directory"), Some("deck"));
        *write(&slot, LockSite::ActivePresentation, "deactivate") = None;
        assert_eq!(*read(&slot, LockSite::ActivePresentation, "directory"), None);
    }

    #[test]
    fn poisoned_mutex_is_still_exclusive() {
        let counter = Arc::new(Mutex::new(0u32));
        let poisoner = Arc::clone(&counter);
        let _ = panic::catch_unwind(move || {
            let _guard = poisoner.lock().expect("first lock");
            panic!("build panicked");
        });

        *exclusive(&counter, LockSite::SourceBuild, "build") += 1;
        assert_eq!(*exclusive(&counter, LockSite::SourceBuild, "build"), 1);
    }
}
