use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::host::ViewerId;
use crate::model::Look;

static WANTED_LOOK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_wanted_look_poison_once(operation: &'static str) {
    if WANTED_LOOK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "wanted-look lock poisoned; recovered inner value");
    }
}

/// Orientation the runtime is currently commanding, per viewer. An entry
/// exists exactly while the viewer has a live session. Shared with the
/// network-side suppressor.
#[derive(Clone, Debug, Default)]
pub struct WantedLookHandle {
    table: Arc<RwLock<HashMap<ViewerId, Look>>>,
}

impl WantedLookHandle {
    pub fn get(&self, viewer: ViewerId) -> Option<Look> {
        self.read().get(&viewer).copied()
    }

    pub fn contains(&self, viewer: ViewerId) -> bool {
        self.read().contains_key(&viewer)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn set(&self, viewer: ViewerId, look: Look) {
        self.write().insert(viewer, look);
    }

    pub(crate) fn remove(&self, viewer: ViewerId) -> Option<Look> {
        self.write().remove(&viewer)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ViewerId, Look>> {
        match self.table.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_wanted_look_poison_once("read");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ViewerId, Look>> {
        match self.table.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_wanted_look_poison_once("write");
                poisoned.into_inner()
            }
        }
    }
}

/// A client-originated orientation change, as delivered by the network layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LookPacket {
    pub viewer: ViewerId,
    pub look: Look,
    cancelled: bool,
}

impl LookPacket {
    pub fn new(viewer: ViewerId, look: Look) -> Self {
        Self {
            viewer,
            look,
            cancelled: false,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookVerdict {
    PassThrough,
    Suppressed,
}

/// Re-application request marshalled from the network thread to the tick
/// thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookCorrection {
    pub viewer: ViewerId,
    pub look: Look,
}

pub(crate) fn correction_channel() -> (Sender<LookCorrection>, Receiver<LookCorrection>) {
    unbounded()
}

/// Network-thread half of look enforcement. Cheap to clone; `Send + Sync`.
#[derive(Clone, Debug)]
pub struct LookInputSuppressor {
    wanted: WantedLookHandle,
    corrections: Sender<LookCorrection>,
}

impl LookInputSuppressor {
    pub(crate) fn new(wanted: WantedLookHandle, corrections: Sender<LookCorrection>) -> Self {
        Self {
            wanted,
            corrections,
        }
    }

    /// Viewers without a session pass through untouched. Otherwise the packet
    /// is cancelled and a correction is queued for the next tick; this never
    /// blocks.
    pub fn on_look_packet(&self, packet: &mut LookPacket) -> LookVerdict {
        let Some(look) = self.wanted.get(packet.viewer) else {
            return LookVerdict::PassThrough;
        };
        packet.cancel();
        if self
            .corrections
            .send(LookCorrection {
                viewer: packet.viewer,
                look,
            })
            .is_err()
        {
            debug!(viewer = packet.viewer.0, "look_correction_dropped");
        }
        LookVerdict::Suppressed
    }
}
