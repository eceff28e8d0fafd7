use std::sync::Arc;
use tokio::sync::watch;

use crate::controller::PacerState;

/// Scoped ownership of the controller's `Busy` state.
///
/// Acquiring flips `Idle` to `Busy` in one step; dropping the guard flips it
/// back, whichever way the owning task exits.
pub(crate) struct BusyGuard {
    state: Arc<watch::Sender<PacerState>>,
}

impl BusyGuard {
    pub(crate) fn try_acquire(state: &Arc<watch::Sender<PacerState>>) -> Option<Self> {
        let acquired = state.send_if_modified(|current| match current {
            PacerState::Idle => {
                *current = PacerState::Busy;
                true
            }
            PacerState::Busy => false,
        });
        acquired.then(|| Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.state.send_replace(PacerState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let (tx, _rx) = watch::channel(PacerState::Idle);
        let state = Arc::new(tx);

        let guard = BusyGuard::try_acquire(&state).unwrap();
        assert_eq!(*state.borrow(), PacerState::Busy);
        assert!(BusyGuard::try_acquire(&state).is_none());

        drop(guard);
        assert_eq!(*state.borrow(), PacerState::Idle);
        assert!(BusyGuard::try_acquire(&state).is_some());
    }

    #[test]
    fn released_on_panic() {
        let (tx, _rx) = watch::channel(PacerState::Idle);
        let state = Arc::new(tx);

        let held = Arc::clone(&state);
        let result = std::thread::spawn(move || {
            let _guard = BusyGuard::try_acquire(&held).unwrap();
            panic!("inference blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(*state.borrow(), PacerState::Idle);
    }
}
