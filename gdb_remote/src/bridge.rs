use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::target::{BreakpointListener, CpuDebug, ListenerId};

/// Handle the CPU side uses to report breakpoint hits to the stub.
///
/// Hits are queued; the stub replays each one as a stop notification the next
/// time it is entered. This keeps the CPU free to call the notifier from inside
/// its own execution loop, on any thread.
#[derive(Debug, Clone)]
pub struct BreakpointNotifier {
    sender: Sender<u64>,
}

impl BreakpointNotifier {
    pub fn on_breakpoint(&self, address: u64) {
        if self.sender.send(address).is_err() {
            log::debug!("breakpoint at {:#x} hit after the stub went away", address);
        }
    }

    pub fn into_listener(self) -> BreakpointListener {
        Box::new(move |address| self.on_breakpoint(address))
    }
}

pub(crate) struct BreakpointBridge {
    notifier: BreakpointNotifier,
    hits: Receiver<u64>,
    listener: Option<ListenerId>,
}

impl BreakpointBridge {
    /// Registers the stub's listener with `target`.
    pub fn attach<T: CpuDebug>(target: &mut T) -> Self {
        let (sender, hits) = mpsc::channel();
        let notifier = BreakpointNotifier { sender };
        let listener = target.add_breakpoint_listener(notifier.clone().into_listener());
        log::trace!("registered breakpoint listener {:?}", listener);
        Self {
            notifier,
            hits,
            listener: Some(listener),
        }
    }

    pub fn detach<T: CpuDebug>(&mut self, target: &mut T) {
        if let Some(listener) = self.listener.take() {
            target.remove_breakpoint_listener(listener);
            log::trace!("removed breakpoint listener {:?}", listener);
        }
    }

    pub fn notifier(&self) -> BreakpointNotifier {
        self.notifier.clone()
    }

    pub fn next_hit(&self) -> Option<u64> {
        match self.hits.try_recv() {
            Ok(address) => Some(address),
            // the bridge holds a sender itself, so the channel never disconnects
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat_target::FlatTarget;
    use crate::target::BreakpointKind;

    #[test]
    fn hits_are_queued_in_order() {
        let mut target = FlatTarget::new(0, 0x100);
        let mut bridge = BreakpointBridge::attach(&mut target);

        target.add_breakpoint(0x10, BreakpointKind::Software);
        target.add_breakpoint(0x20, BreakpointKind::Hardware);
        assert_eq!(target.run(0x100), Some(0x10));
        assert_eq!(target.run(0x100), Some(0x20));

        assert_eq!(bridge.next_hit(), Some(0x10));
        assert_eq!(bridge.next_hit(), Some(0x20));
        assert_eq!(bridge.next_hit(), None);

        bridge.detach(&mut target);
        target.set_program_counter(0);
        assert_eq!(target.run(0x100), Some(0x10));
        assert_eq!(bridge.next_hit(), None);
    }

    #[test]
    fn notifier_can_cross_threads() {
        let mut target = FlatTarget::new(0, 0x10);
        let bridge = BreakpointBridge::attach(&mut target);
        let notifier = bridge.notifier();
        std::thread::spawn(move || notifier.on_breakpoint(0x1234))
            .join()
            .unwrap();
        assert_eq!(bridge.next_hit(), Some(0x1234));
    }
}
