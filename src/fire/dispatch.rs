//! Listener registry and event fan-out for the [`Fire`](super::Fire)
//! session.
//!
//! Dispatch runs on the MIDI reader thread. To keep listener code free to
//! call back into the session (e.g. to remove itself), the registry lock is
//! only held while snapshotting the matching listeners, never while any of
//! them runs.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Button, Event, Rotary};

/// Identifies a registered listener so it can be removed again.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ListenerHandle(u64);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum EventKey {
    Global,
    Pad(u8),
    Button(Button),
    RotaryTurn(Rotary),
    RotaryTouch(Rotary),
}

fn key_of(event: &Event) -> Option<EventKey> {
    match *event {
        Event::PadPressed { index, .. } | Event::PadReleased { index } => Some(EventKey::Pad(index)),
        Event::ButtonPressed { button } | Event::ButtonReleased { button } => {
            Some(EventKey::Button(button))
        }
        Event::RotaryTurned { rotary, .. } => Some(EventKey::RotaryTurn(rotary)),
        Event::RotaryTouched { rotary, .. } => Some(EventKey::RotaryTouch(rotary)),
        // SysEx only reaches global listeners
        Event::Sysex(_) => None,
    }
}

pub(crate) type SharedCallback = Arc<Mutex<dyn FnMut(&Event) + Send>>;

pub(crate) fn shared_callback(callback: impl FnMut(&Event) + Send + 'static) -> SharedCallback {
    Arc::new(Mutex::new(callback))
}

pub(crate) struct Dispatcher {
    listeners: HashMap<EventKey, Vec<(ListenerHandle, SharedCallback)>>,
    next_handle: u64,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_handle: 0,
        }
    }

    pub(crate) fn add(
        &mut self,
        key: EventKey,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> ListenerHandle {
        self.add_shared(key, shared_callback(callback))
    }

    /// Register an already-shared callback, e.g. one listener attached to
    /// several keys. Every registration gets its own handle.
    pub(crate) fn add_shared(&mut self, key: EventKey, callback: SharedCallback) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;
        self.listeners.entry(key).or_default().push((handle, callback));
        handle
    }

    /// Remove a registration. Returns whether the handle was still known.
    pub(crate) fn remove(&mut self, handle: ListenerHandle) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, entries| {
            entries.retain(|(entry_handle, _)| {
                let keep = *entry_handle != handle;
                removed |= !keep;
                keep
            });
            !entries.is_empty()
        });
        removed
    }

    /// All listeners an event should reach: global ones first, then the
    /// per-key ones, each group in registration order.
    fn snapshot(&self, event: &Event) -> Vec<SharedCallback> {
        let mut callbacks = Vec::new();
        for key in std::iter::once(EventKey::Global).chain(key_of(event)) {
            if let Some(entries) = self.listeners.get(&key) {
                callbacks.extend(entries.iter().map(|(_, callback)| Arc::clone(callback)));
            }
        }
        callbacks
    }
}

/// Deliver one event to every matching listener.
///
/// The snapshot is taken up front, so listeners added or removed while the
/// event is being delivered only affect future events. A panicking listener
/// is logged and skipped; the remaining listeners still run.
pub(crate) fn dispatch(dispatcher: &Mutex<Dispatcher>, event: &Event) {
    let callbacks = dispatcher
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .snapshot(event);

    for callback in callbacks {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            callback(event);
        }));
        if result.is_err() {
            log::error!("A listener panicked while handling {:?}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(index: u8) -> Event {
        Event::PadPressed {
            index,
            velocity: 100,
        }
    }

    fn recording_listener(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> SharedCallback {
        let log = Arc::clone(log);
        shared_callback(move |_: &Event| log.lock().unwrap().push(tag))
    }

    #[test]
    fn global_listeners_run_before_specific_ones_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Mutex::new(Dispatcher::new());
        {
            let mut registry = dispatcher.lock().unwrap();
            registry.add_shared(EventKey::Pad(3), recording_listener(&log, "pad a"));
            registry.add_shared(EventKey::Global, recording_listener(&log, "global a"));
            registry.add_shared(EventKey::Pad(3), recording_listener(&log, "pad b"));
            registry.add_shared(EventKey::Global, recording_listener(&log, "global b"));
            registry.add_shared(EventKey::Pad(4), recording_listener(&log, "other pad"));
        }

        dispatch(&dispatcher, &press(3));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["global a", "global b", "pad a", "pad b"]
        );
    }

    #[test]
    fn sysex_reaches_only_global_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Mutex::new(Dispatcher::new());
        {
            let mut registry = dispatcher.lock().unwrap();
            registry.add_shared(EventKey::Global, recording_listener(&log, "global"));
            registry.add_shared(EventKey::Pad(0), recording_listener(&log, "pad"));
        }

        dispatch(&dispatcher, &Event::Sysex(vec![0xF0, 0xF7]));

        assert_eq!(*log.lock().unwrap(), vec!["global"]);
    }

    #[test]
    fn a_panicking_listener_does_not_stop_the_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Mutex::new(Dispatcher::new());
        {
            let mut registry = dispatcher.lock().unwrap();
            registry.add(EventKey::Global, |_| panic!("listener bug"));
            registry.add_shared(EventKey::Global, recording_listener(&log, "survivor"));
        }

        dispatch(&dispatcher, &press(0));
        dispatch(&dispatcher, &press(0));

        assert_eq!(*log.lock().unwrap(), vec!["survivor", "survivor"]);
    }

    #[test]
    fn removal_during_dispatch_only_affects_future_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new()));

        let victim = dispatcher
            .lock()
            .unwrap()
            .add_shared(EventKey::Global, recording_listener(&log, "victim"));

        // registered after the victim, removes it mid-dispatch
        let remover_dispatcher = Arc::clone(&dispatcher);
        dispatcher.lock().unwrap().add(EventKey::Global, move |_| {
            remover_dispatcher.lock().unwrap().remove(victim);
        });

        // first dispatch: victim was in the snapshot and still ran
        dispatch(&dispatcher, &press(0));
        assert_eq!(*log.lock().unwrap(), vec!["victim"]);

        // second dispatch: it's gone
        dispatch(&dispatcher, &press(0));
        assert_eq!(*log.lock().unwrap(), vec!["victim"]);
    }

    #[test]
    fn remove_reports_whether_the_handle_was_known() {
        let mut registry = Dispatcher::new();
        let handle = registry.add(EventKey::Button(Button::Play), |_| {});

        assert!(registry.remove(handle));
        assert!(!registry.remove(handle));
    }

    #[test]
    fn one_shared_listener_across_several_keys() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Mutex::new(Dispatcher::new());

        let shared = recording_listener(&log, "shared");
        let handles: Vec<ListenerHandle> = {
            let mut registry = dispatcher.lock().unwrap();
            [0u8, 1, 2]
                .iter()
                .map(|&index| registry.add_shared(EventKey::Pad(index), Arc::clone(&shared)))
                .collect()
        };
        assert_eq!(handles.len(), 3);

        dispatch(&dispatcher, &press(0));
        dispatch(&dispatcher, &press(2));
        dispatch(&dispatcher, &press(5));

        assert_eq!(*log.lock().unwrap(), vec!["shared", "shared"]);

        // removing one registration leaves the others attached
        assert!(dispatcher.lock().unwrap().remove(handles[0]));
        dispatch(&dispatcher, &press(0));
        dispatch(&dispatcher, &press(2));
        assert_eq!(*log.lock().unwrap(), vec!["shared", "shared", "shared"]);
    }

    #[test]
    fn turn_and_touch_listeners_are_independent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Mutex::new(Dispatcher::new());
        {
            let mut registry = dispatcher.lock().unwrap();
            registry.add_shared(
                EventKey::RotaryTurn(Rotary::Volume),
                recording_listener(&log, "turn"),
            );
            registry.add_shared(
                EventKey::RotaryTouch(Rotary::Volume),
                recording_listener(&log, "touch"),
            );
        }

        dispatch(
            &dispatcher,
            &Event::RotaryTurned {
                rotary: Rotary::Volume,
                direction: crate::Direction::Increment,
                velocity: 1,
            },
        );
        assert_eq!(*log.lock().unwrap(), vec!["turn"]);

        dispatch(
            &dispatcher,
            &Event::RotaryTouched {
                rotary: Rotary::Volume,
                pressed: true,
            },
        );
        assert_eq!(*log.lock().unwrap(), vec!["turn", "touch"]);
    }
}
