/// What the input device is being held for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceUse {
    Recording,
    /// Level preview; never writes files
    Monitoring,
}

/// Outcome of a successful [`DeviceSession::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The device was free
    Fresh,
    /// Already held for the same use
    AlreadyHeld,
    /// Taken over from a lower-priority holder, which must be torn down
    Preempted(DeviceUse),
}

/// Single-owner arbitration of the input device.
///
/// Recording wins over monitoring: acquiring for recording preempts a
/// preview, while a preview cannot start during a recording.
#[derive(Debug, Default)]
pub struct DeviceSession {
    holder: Option<DeviceUse>,
}

impl DeviceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the device; on conflict returns the current holder.
    pub fn acquire(&mut self, kind: DeviceUse) -> Result<Acquisition, DeviceUse> {
        match (self.holder, kind) {
            (None, _) => {
                self.holder = Some(kind);
                Ok(Acquisition::Fresh)
            }
            (Some(held), wanted) if held == wanted => Ok(Acquisition::AlreadyHeld),
            (Some(DeviceUse::Monitoring), DeviceUse::Recording) => {
                self.holder = Some(DeviceUse::Recording);
                Ok(Acquisition::Preempted(DeviceUse::Monitoring))
            }
            (Some(held), _) => Err(held),
        }
    }

    /// Give the device up if `kind` holds it; returns whether it did.
    pub fn release(&mut self, kind: DeviceUse) -> bool {
        if self.holder == Some(kind) {
            self.holder = None;
            true
        } else {
            false
        }
    }

    pub fn holder(&self) -> Option<DeviceUse> {
        self.holder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_preempts_monitoring() {
        let mut session = DeviceSession::new();

        assert_eq!(session.acquire(DeviceUse::Monitoring), Ok(Acquisition::Fresh));
        assert_eq!(
            session.acquire(DeviceUse::Recording),
            Ok(Acquisition::Preempted(DeviceUse::Monitoring))
        );
        assert_eq!(session.holder(), Some(DeviceUse::Recording));
    }

    #[test]
    fn test_monitoring_rejected_while_recording() {
        let mut session = DeviceSession::new();
        session.acquire(DeviceUse::Recording).unwrap();

        assert_eq!(session.acquire(DeviceUse::Monitoring), Err(DeviceUse::Recording));
        assert_eq!(session.holder(), Some(DeviceUse::Recording));
    }

    #[test]
    fn test_release_only_by_holder() {
        let mut session = DeviceSession::new();
        session.acquire(DeviceUse::Recording).unwrap();

        assert!(!session.release(DeviceUse::Monitoring));
        assert!(session.release(DeviceUse::Recording));
        assert_eq!(session.holder(), None);
        assert!(!session.release(DeviceUse::Recording));
    }

    #[test]
    fn test_reacquire_same_use() {
        let mut session = DeviceSession::new();
        session.acquire(DeviceUse::Monitoring).unwrap();

        assert_eq!(session.acquire(DeviceUse::Monitoring), Ok(Acquisition::AlreadyHeld));
    }
}
