//! # Event Bus
//!
//! A small typed publish/subscribe channel. Components that publish events
//! (tree updaters, the saver) own an [`EventBus`] as a field.
//!
//! Listeners are shared `Rc<RefCell<_>>` handles. Emission is synchronous:
//! every listener runs to completion, in subscription order, before
//! `emit` returns. A listener error stops the emission and is returned to
//! the publisher.
//!
//! Each emission passes a context value alongside the event; tree updaters
//! pass the tree they just mutated so listeners can inspect it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use wed_dom::NodeId;

use crate::errors::EditorResult;

pub trait Listener<E, C: ?Sized = ()> {
    fn on_event(&mut self, event: &E, ctx: &C) -> EditorResult<()>;
}

/// Adapts a closure into a [`Listener`].
pub struct FnListener<F>(pub F);

impl<E, C: ?Sized, F> Listener<E, C> for FnListener<F>
where
    F: FnMut(&E, &C) -> EditorResult<()>,
{
    fn on_event(&mut self, event: &E, ctx: &C) -> EditorResult<()> {
        (self.0)(event, ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type SharedListener<E, C> = Rc<RefCell<dyn Listener<E, C>>>;

pub struct EventBus<E, C: ?Sized = ()> {
    next_id: u64,
    listeners: Vec<(ListenerId, SharedListener<E, C>)>,
}

impl<E, C: ?Sized> EventBus<E, C> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe<L>(&mut self, listener: Rc<RefCell<L>>) -> ListenerId
    where
        L: Listener<E, C> + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        let listener: SharedListener<E, C> = listener;
        self.listeners.push((id, listener));
        id
    }

    pub fn subscribe_fn<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&E, &C) -> EditorResult<()> + 'static,
        E: 'static,
        C: 'static,
    {
        self.subscribe(Rc::new(RefCell::new(FnListener(f))))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&self, event: &E, ctx: &C) -> EditorResult<()> {
        let listeners: Vec<SharedListener<E, C>> =
            self.listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
        for listener in listeners {
            listener.borrow_mut().on_event(event, ctx)?;
        }
        Ok(())
    }
}

impl<E, C: ?Sized> Default for EventBus<E, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, C: ?Sized> fmt::Debug for EventBus<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Notifications published by a tree updater. Every primitive event is
/// followed by a [`TreeEvent::Changed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum TreeEvent {
    InsertNodeAt {
        parent: NodeId,
        index: usize,
        node: NodeId,
    },
    SetTextNodeValue {
        node: NodeId,
        value: String,
        old_value: String,
    },
    /// Emitted while the node is still attached.
    BeforeDeleteNode { node: NodeId },
    DeleteNode { node: NodeId, former_parent: NodeId },
    SetAttributeNs {
        node: NodeId,
        ns: String,
        attribute: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    Changed,
}

impl TreeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TreeEvent::InsertNodeAt { .. } => "insertNodeAt",
            TreeEvent::SetTextNodeValue { .. } => "setTextNodeValue",
            TreeEvent::BeforeDeleteNode { .. } => "beforeDeleteNode",
            TreeEvent::DeleteNode { .. } => "deleteNode",
            TreeEvent::SetAttributeNs { .. } => "setAttributeNS",
            TreeEvent::Changed => "changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EditorError;

    #[test]
    fn test_emit_in_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus: EventBus<u32> = EventBus::new();
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            bus.subscribe_fn(move |ev: &u32, _: &()| {
                seen.borrow_mut().push(format!("{}{}", tag, ev));
                Ok(())
            });
        }
        bus.emit(&1, &()).unwrap();
        assert_eq!(*seen.borrow(), vec!["a1", "b1"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut bus: EventBus<()> = EventBus::new();
        let c = Rc::clone(&count);
        let id = bus.subscribe_fn(move |_: &(), _: &()| {
            *c.borrow_mut() += 1;
            Ok(())
        });
        bus.emit(&(), &()).unwrap();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&(), &()).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_listener_error_stops_emission() {
        let mut bus: EventBus<()> = EventBus::new();
        let reached = Rc::new(RefCell::new(false));
        bus.subscribe_fn(|_: &(), _: &()| Err(EditorError::NoCaret));
        let r = Rc::clone(&reached);
        bus.subscribe_fn(move |_: &(), _: &()| {
            *r.borrow_mut() = true;
            Ok(())
        });
        assert!(bus.emit(&(), &()).is_err());
        assert!(!*reached.borrow());
    }
}
