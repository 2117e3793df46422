// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use crate::types::LldpdResult;

/// The lower layer that puts LLDPDU frames on the wire.  Frames are fully
/// formed ethernet frames, and the port is identified by the index the agent
/// assigned it.  Send failures are reported but never retried.
pub trait Transport: Send {
    fn send(&mut self, port_index: u32, frame: &[u8]) -> LldpdResult<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;
    use crate::errors::LldpdError;

    /// Captures every frame handed to it, so tests can inspect what the
    /// agent sent.
    #[derive(Clone, Default)]
    pub struct Recorder {
        frames: Arc<Mutex<Vec<(u32, Vec<u8>)>>>,
        failing: Arc<AtomicBool>,
    }

    impl Recorder {
        pub fn frames(&self) -> Vec<(u32, Vec<u8>)> {
            self.frames.lock().unwrap().clone()
        }

        /// Make all subsequent sends fail
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl Transport for Recorder {
        fn send(&mut self, port_index: u32, frame: &[u8]) -> LldpdResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(LldpdError::Transport("link is gone".into()));
            }
            self.frames.lock().unwrap().push((port_index, frame.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn test_recorder() {
        let mut recorder = Recorder::default();
        let shared = recorder.clone();
        recorder.send(1, &[1, 2, 3]).unwrap();
        shared.set_failing(true);
        assert!(recorder.send(2, &[4]).is_err());
        assert_eq!(shared.frames(), vec![(1, vec![1, 2, 3])]);
    }
}
