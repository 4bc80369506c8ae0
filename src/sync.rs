use core::cell::RefCell;

use critical_section::Mutex as CsMutex;

/// Critical-section-guarded interior mutability shared between the edge
/// interrupt handler and the foreground `tick`/`request` path.
///
/// Built on the portable `critical-section` crate rather than an
/// architecture-specific `cli`/`sti` pair, so the link engine compiles
/// for any target that has registered a `critical-section` implementation.
pub struct IrqMutex<T> {
    inner: CsMutex<RefCell<T>>,
}

impl<T> IrqMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: CsMutex::new(RefCell::new(value)),
        }
    }

    /// Runs `f` with exclusive access to the guarded value. Must not be
    /// called reentrantly from within another `with` on the same mutex.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let mut guard = cell.borrow_mut();
            f(&mut guard)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_gives_exclusive_mutable_access() {
        let m = IrqMutex::new(0u32);
        m.with(|v| *v += 1);
        m.with(|v| *v += 1);
        assert_eq!(m.with(|v| *v), 2);
    }
}
