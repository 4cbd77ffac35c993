//! Pooled contact and trigger callbacks
//!
//! Callbacks are filled while the backend reports touch changes, queued,
//! and executed in arrival order once the step has finished. Executed
//! callbacks go back to their pool.

use std::sync::Arc;

use drift_core::EntityId;
use tracing::error;

use crate::backend::ContactPoint;
use crate::handle::{ActorHandle, ContactEvent, ContactSlot, TriggerEvent, TriggerSlot};
use crate::pool::{Pool, Poolable};
use crate::slots::ActorSlots;
use crate::ActorId;

/// Identity of the other participant, as seen by a listener
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub tag: Option<Arc<str>>,
    pub player_id: Option<EntityId>,
}

impl Payload {
    pub(crate) fn of<B: Copy>(handle: &ActorHandle<B>) -> Self {
        Self {
            tag: handle.tag.clone(),
            player_id: handle.player_id,
        }
    }
}

/// One contact dispatch: a start or end for up to two participants
#[derive(Debug, Default)]
pub struct ContactCallback {
    start: bool,
    targets: [Option<ActorId>; 2],
    payloads: [Payload; 2],
    contacts: Vec<ContactPoint>,
}

impl Poolable for ContactCallback {
    fn reset(&mut self) {
        self.start = false;
        self.targets = [None, None];
        self.payloads = Default::default();
        self.contacts.clear();
    }
}

impl ContactCallback {
    pub fn is_start(&self) -> bool {
        self.start
    }

    pub fn targets(&self) -> [Option<ActorId>; 2] {
        self.targets
    }

    pub fn contacts(&self) -> &[ContactPoint] {
        &self.contacts
    }

    pub(crate) fn set_target(&mut self, side: usize, target: ActorId, other: Payload) {
        self.targets[side] = Some(target);
        self.payloads[side] = other;
    }

    pub(crate) fn add_contacts(&mut self, points: &[ContactPoint]) {
        self.contacts.extend_from_slice(points);
    }

    fn has_targets(&self) -> bool {
        self.targets.iter().any(Option::is_some)
    }

    fn exec<B: Copy>(&self, actors: &mut ActorSlots<ActorHandle<B>>) {
        let slot = if self.start {
            ContactSlot::Start
        } else {
            ContactSlot::End
        };
        for (target, payload) in self.targets.iter().zip(&self.payloads) {
            let Some(target) = *target else { continue };
            let Some(handle) = actors.get_mut(target) else {
                continue;
            };
            let Some(listener) = handle.contact_listener(slot).as_mut() else {
                continue;
            };
            let event = ContactEvent {
                tag: payload.tag.as_deref(),
                player_id: payload.player_id,
                contacts: &self.contacts,
            };
            if let Err(err) = listener(&event) {
                error!(actor = %target, start = self.start, "contact listener failed: {err:#}");
            }
        }
    }
}

/// One trigger dispatch for the trigger's owner
#[derive(Debug, Default)]
pub struct TriggerCallback {
    enter: bool,
    target: Option<ActorId>,
    payload: Payload,
}

impl Poolable for TriggerCallback {
    fn reset(&mut self) {
        self.enter = false;
        self.target = None;
        self.payload = Payload::default();
    }
}

impl TriggerCallback {
    pub fn is_enter(&self) -> bool {
        self.enter
    }

    pub fn target(&self) -> Option<ActorId> {
        self.target
    }

    pub(crate) fn set_target(&mut self, target: ActorId, other: Payload) {
        self.target = Some(target);
        self.payload = other;
    }

    fn exec<B: Copy>(&self, actors: &mut ActorSlots<ActorHandle<B>>) {
        let Some(target) = self.target else { return };
        let Some(handle) = actors.get_mut(target) else {
            return;
        };
        let slot = if self.enter {
            TriggerSlot::Enter
        } else {
            TriggerSlot::Leave
        };
        let Some(listener) = handle.trigger_listener(slot).as_mut() else {
            return;
        };
        let event = TriggerEvent {
            tag: self.payload.tag.as_deref(),
            player_id: self.payload.player_id,
        };
        if let Err(err) = listener(&event) {
            error!(actor = %target, enter = self.enter, "trigger listener failed: {err:#}");
        }
    }
}

/// Callback pools and the FIFO queues drained after each step
#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    contact_pool: Pool<ContactCallback>,
    trigger_pool: Pool<TriggerCallback>,
    contact_queue: Vec<ContactCallback>,
    trigger_queue: Vec<TriggerCallback>,
}

impl Dispatcher {
    pub fn contact(&mut self, start: bool) -> ContactCallback {
        let mut cb = self.contact_pool.acquire();
        cb.start = start;
        cb
    }

    pub fn trigger(&mut self, enter: bool) -> TriggerCallback {
        let mut cb = self.trigger_pool.acquire();
        cb.enter = enter;
        cb
    }

    /// Queue a filled callback; callbacks with nobody to notify go straight
    /// back to the pool.
    pub fn queue_contact(&mut self, cb: ContactCallback) {
        if cb.has_targets() {
            self.contact_queue.push(cb);
        } else {
            self.contact_pool.release(cb);
        }
    }

    pub fn queue_trigger(&mut self, cb: TriggerCallback) {
        if cb.target.is_some() {
            self.trigger_queue.push(cb);
        } else {
            self.trigger_pool.release(cb);
        }
    }

    /// Execute a contact callback immediately, outside the step
    pub fn run_contact<B: Copy>(
        &mut self,
        cb: ContactCallback,
        actors: &mut ActorSlots<ActorHandle<B>>,
    ) {
        cb.exec(actors);
        self.contact_pool.release(cb);
    }

    pub fn run_trigger<B: Copy>(
        &mut self,
        cb: TriggerCallback,
        actors: &mut ActorSlots<ActorHandle<B>>,
    ) {
        cb.exec(actors);
        self.trigger_pool.release(cb);
    }

    /// Execute queued contacts, then queued triggers, in arrival order
    pub fn flush<B: Copy>(&mut self, actors: &mut ActorSlots<ActorHandle<B>>) {
        let Self {
            contact_pool,
            trigger_pool,
            contact_queue,
            trigger_queue,
        } = self;
        for cb in contact_queue.drain(..) {
            cb.exec(actors);
            contact_pool.release(cb);
        }
        for cb in trigger_queue.drain(..) {
            cb.exec(actors);
            trigger_pool.release(cb);
        }
    }

    pub fn pending(&self) -> usize {
        self.contact_queue.len() + self.trigger_queue.len()
    }

    /// Callbacks ever allocated, contacts and triggers
    pub fn created(&self) -> (usize, usize) {
        (self.contact_pool.created(), self.trigger_pool.created())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BodyKind;
    use crate::handle::ActorDesc;
    use drift_core::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording_actor(log: &Log, name: &'static str) -> ActorHandle<u32> {
        let start_log = log.clone();
        let end_log = log.clone();
        let desc = ActorDesc::new()
            .tag(name)
            .on_contact_start(move |e| {
                start_log
                    .borrow_mut()
                    .push(format!("{name} start {:?} {}", e.tag, e.contacts.len()));
                Ok(())
            })
            .on_contact_end(move |e| {
                end_log.borrow_mut().push(format!("{name} end {:?}", e.tag));
                Ok(())
            });
        ActorHandle::new(0, BodyKind::Dynamic, desc, None)
    }

    #[test]
    fn flush_runs_in_fifo_order_and_recycles() {
        let log: Log = Default::default();
        let mut actors = ActorSlots::new();
        let a = actors.insert(recording_actor(&log, "a"));
        let b = actors.insert(recording_actor(&log, "b"));
        let mut dispatcher = Dispatcher::default();

        let mut cb = dispatcher.contact(true);
        cb.contacts.push(ContactPoint {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            impulse: Vec3::Y,
        });
        cb.set_target(0, a, Payload { tag: Some("b".into()), player_id: None });
        cb.set_target(1, b, Payload { tag: Some("a".into()), player_id: None });
        dispatcher.queue_contact(cb);

        let mut cb = dispatcher.contact(false);
        cb.set_target(0, a, Payload { tag: Some("b".into()), player_id: None });
        dispatcher.queue_contact(cb);

        assert_eq!(dispatcher.pending(), 2);
        dispatcher.flush(&mut actors);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(
            *log.borrow(),
            vec![
                "a start Some(\"b\") 1".to_string(),
                "b start Some(\"a\") 1".to_string(),
                "a end Some(\"b\")".to_string(),
            ]
        );

        // warm pool: the next callbacks reuse the two already created
        let cb = dispatcher.contact(true);
        dispatcher.queue_contact(cb);
        let cb = dispatcher.contact(true);
        dispatcher.queue_contact(cb);
        assert_eq!(dispatcher.created(), (2, 0));
    }

    #[test]
    fn failing_listener_does_not_stop_others() {
        let log: Log = Default::default();
        let mut actors = ActorSlots::new();
        let failing = actors.insert(ActorHandle::new(
            0u32,
            BodyKind::Dynamic,
            ActorDesc::new().on_trigger_enter(|_| anyhow::bail!("boom")),
            None,
        ));
        let ok_log = log.clone();
        let ok = actors.insert(ActorHandle::new(
            1u32,
            BodyKind::Static,
            ActorDesc::new().on_trigger_enter(move |e| {
                ok_log.borrow_mut().push(format!("enter {:?}", e.tag));
                Ok(())
            }),
            None,
        ));
        let mut dispatcher = Dispatcher::default();
        for target in [failing, ok] {
            let mut cb = dispatcher.trigger(true);
            cb.set_target(target, Payload { tag: Some("player".into()), player_id: None });
            dispatcher.queue_trigger(cb);
        }
        dispatcher.flush(&mut actors);
        assert_eq!(*log.borrow(), vec!["enter Some(\"player\")".to_string()]);
    }

    #[test]
    fn untargeted_callbacks_are_not_queued() {
        let mut dispatcher = Dispatcher::default();
        let cb = dispatcher.contact(true);
        dispatcher.queue_contact(cb);
        assert_eq!(dispatcher.pending(), 0);
    }
}
