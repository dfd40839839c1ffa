//! # Undo Recorder
//!
//! Listens to the data tree updater and turns every primitive event into an
//! undo entry. Entries address nodes by path so they stay valid after the
//! nodes they were recorded against are replaced by equivalent copies.
//!
//! Deletions are captured on `BeforeDeleteNode`, while the node still sits
//! in its parent and its path and index can be read.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;
use wed_dom::{NodeId, NodeSnapshot, Tree};

use crate::errors::EditorResult;
use crate::events::{Listener, TreeEvent};
use crate::guard::{Reentrancy, ReentrancyGuard};
use crate::tree_updater::TreeUpdater;
use crate::undo_stack::{EntryState, UndoEntry, UndoError, UndoList};

pub type SharedUndoList = Rc<RefCell<UndoList<TreeUpdater>>>;

fn resolve(updater: &TreeUpdater, path: &str) -> EditorResult<NodeId> {
    updater
        .path_to_node(path)?
        .ok_or_else(|| UndoError::PathNotFound(path.to_string()).into())
}

fn child_at(updater: &TreeUpdater, parent_path: &str, index: usize) -> EditorResult<NodeId> {
    let parent = resolve(updater, parent_path)?;
    updater
        .tree()
        .child(parent, index)
        .ok_or_else(|| UndoError::PathNotFound(format!("{}/{}", parent_path, index)).into())
}

#[derive(Debug)]
pub struct InsertNodeAtUndo {
    parent_path: String,
    index: usize,
    /// Copy of the node taken when it is undone, reinserted on redo.
    node: Option<NodeSnapshot>,
    state: EntryState,
}

impl UndoEntry<TreeUpdater> for InsertNodeAtUndo {
    fn undo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        self.state.begin_undo("InsertNodeAtUndo")?;
        let node = child_at(updater, &self.parent_path, self.index)?;
        self.node = Some(updater.tree().snapshot(node)?);
        updater.delete_node(node)
    }

    fn redo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        self.state.begin_redo("InsertNodeAtUndo")?;
        let parent = resolve(updater, &self.parent_path)?;
        let snapshot = self.node.take().ok_or(UndoError::RedoTwice("InsertNodeAtUndo".into()))?;
        let node = updater.scratch().materialize(&snapshot)?;
        updater.insert_node_at(parent, self.index, node)
    }

    fn description(&self) -> &str {
        "InsertNodeAtUndo"
    }
}

#[derive(Debug)]
pub struct SetTextNodeValueUndo {
    node_path: String,
    value: String,
    old_value: String,
}

impl UndoEntry<TreeUpdater> for SetTextNodeValueUndo {
    fn undo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        let node = resolve(updater, &self.node_path)?;
        updater.set_text_node_value(node, &self.old_value)
    }

    fn redo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        let node = resolve(updater, &self.node_path)?;
        updater.set_text_node_value(node, &self.value)
    }

    fn description(&self) -> &str {
        "SetTextNodeValueUndo"
    }
}

#[derive(Debug)]
pub struct DeleteNodeUndo {
    parent_path: String,
    index: usize,
    /// Copy of the deleted node; absent while the deletion is undone.
    node: Option<NodeSnapshot>,
    state: EntryState,
}

impl UndoEntry<TreeUpdater> for DeleteNodeUndo {
    fn undo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        self.state.begin_undo("DeleteNodeUndo")?;
        let parent = resolve(updater, &self.parent_path)?;
        let snapshot = self.node.take().ok_or(UndoError::UndoTwice("DeleteNodeUndo".into()))?;
        let node = updater.scratch().materialize(&snapshot)?;
        updater.insert_node_at(parent, self.index, node)
    }

    fn redo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        self.state.begin_redo("DeleteNodeUndo")?;
        let node = child_at(updater, &self.parent_path, self.index)?;
        self.node = Some(updater.tree().snapshot(node)?);
        updater.delete_node(node)
    }

    fn description(&self) -> &str {
        "DeleteNodeUndo"
    }
}

#[derive(Debug)]
pub struct SetAttributeNsUndo {
    node_path: String,
    ns: String,
    attribute: String,
    old_value: Option<String>,
    new_value: Option<String>,
}

impl UndoEntry<TreeUpdater> for SetAttributeNsUndo {
    fn undo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        let node = resolve(updater, &self.node_path)?;
        updater.set_attribute_ns(node, &self.ns, &self.attribute, self.old_value.as_deref())
    }

    fn redo(&mut self, updater: &mut TreeUpdater) -> EditorResult<()> {
        let node = resolve(updater, &self.node_path)?;
        updater.set_attribute_ns(node, &self.ns, &self.attribute, self.new_value.as_deref())
    }

    fn description(&self) -> &str {
        "SetAttributeNsUndo"
    }
}

/// Records undo entries for primitive events on the data tree.
#[derive(Debug)]
pub struct UndoRecorder {
    list: SharedUndoList,
    suppressed: Reentrancy,
}

impl UndoRecorder {
    pub fn new(list: SharedUndoList) -> Self {
        Self {
            list,
            suppressed: Reentrancy::new(),
        }
    }

    /// Stop recording until the returned guard is dropped. Used while undo
    /// or redo replays entries. Suppressing twice is a caller bug.
    pub fn suppress(&self) -> EditorResult<ReentrancyGuard> {
        self.suppressed
            .try_enter()
            .ok_or_else(|| UndoError::SpuriousSuppress.into())
    }

    /// Handle that can be cloned out so the recorder need not be borrowed
    /// while a replay runs.
    pub fn suppression(&self) -> Reentrancy {
        self.suppressed.clone()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.is_held()
    }

    fn entry_for(event: &TreeEvent, tree: &Tree) -> EditorResult<Option<Box<dyn UndoEntry<TreeUpdater>>>> {
        let entry: Box<dyn UndoEntry<TreeUpdater>> = match event {
            TreeEvent::InsertNodeAt { parent, index, .. } => Box::new(InsertNodeAtUndo {
                parent_path: tree.node_to_path(*parent)?,
                index: *index,
                node: None,
                state: EntryState::Done,
            }),
            TreeEvent::SetTextNodeValue { node, value, old_value } => Box::new(SetTextNodeValueUndo {
                node_path: tree.node_to_path(*node)?,
                value: value.clone(),
                old_value: old_value.clone(),
            }),
            TreeEvent::BeforeDeleteNode { node } => {
                let parent = tree.parent(*node).ok_or(wed_dom::DomError::NoParent)?;
                Box::new(DeleteNodeUndo {
                    parent_path: tree.node_to_path(parent)?,
                    index: tree.index_of(*node).unwrap_or(0),
                    node: Some(tree.snapshot(*node)?),
                    state: EntryState::Done,
                })
            }
            TreeEvent::SetAttributeNs {
                node,
                ns,
                attribute,
                old_value,
                new_value,
            } => Box::new(SetAttributeNsUndo {
                node_path: tree.node_to_path(*node)?,
                ns: ns.clone(),
                attribute: attribute.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            }),
            TreeEvent::DeleteNode { .. } | TreeEvent::Changed => return Ok(None),
        };
        Ok(Some(entry))
    }
}

impl Listener<TreeEvent, Tree> for UndoRecorder {
    fn on_event(&mut self, event: &TreeEvent, tree: &Tree) -> EditorResult<()> {
        if self.suppressed.is_held() {
            return Ok(());
        }
        if let Some(entry) = Self::entry_for(event, tree)? {
            trace!(entry = entry.description(), "recording undo");
            self.list.borrow_mut().record(entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo_stack::UndoGroup;
    use wed_dom::xml;

    fn setup(source: &str) -> (TreeUpdater, SharedUndoList, Rc<RefCell<UndoRecorder>>) {
        let mut updater = TreeUpdater::new(xml::parse(source).unwrap());
        let list: SharedUndoList = Rc::new(RefCell::new(UndoList::new()));
        let recorder = Rc::new(RefCell::new(UndoRecorder::new(Rc::clone(&list))));
        updater.subscribe(Rc::clone(&recorder));
        (updater, list, recorder)
    }

    fn content(u: &TreeUpdater) -> String {
        xml::inner_xml(u.tree(), u.tree().root())
    }

    fn undo(u: &mut TreeUpdater, list: &SharedUndoList, recorder: &Rc<RefCell<UndoRecorder>>) {
        let _guard = recorder.borrow().suppress().unwrap();
        list.borrow_mut().undo(u).unwrap();
    }

    fn redo(u: &mut TreeUpdater, list: &SharedUndoList, recorder: &Rc<RefCell<UndoRecorder>>) {
        let _guard = recorder.borrow().suppress().unwrap();
        list.borrow_mut().redo(u).unwrap();
    }

    #[test]
    fn test_undo_redo_insert() {
        let (mut u, list, rec) = setup("<doc><p>ab</p></doc>");
        let before = content(&u);
        let doc = u.path_to_node("0").unwrap().unwrap();
        let q = u.scratch().create_element("q").unwrap();
        u.insert_node_at(doc, 1, q).unwrap();
        let after = content(&u);

        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), before);
        redo(&mut u, &list, &rec);
        assert_eq!(content(&u), after);
    }

    #[test]
    fn test_undo_redo_delete() {
        let (mut u, list, rec) = setup("<doc><p a=\"1\">ab<b>c</b></p></doc>");
        let before = content(&u);
        let p = u.path_to_node("0/0").unwrap().unwrap();
        u.delete_node(p).unwrap();
        assert_eq!(content(&u), "<doc/>");

        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), before);
        redo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc/>");
    }

    #[test]
    fn test_undo_redo_text_value() {
        let (mut u, list, rec) = setup("<doc>ab</doc>");
        let text = u.path_to_node("0/0").unwrap().unwrap();
        u.set_text_node_value(text, "abc").unwrap();
        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc>ab</doc>");
        redo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc>abc</doc>");
    }

    #[test]
    fn test_undo_attribute_change() {
        let (mut u, list, rec) = setup("<doc/>");
        let doc = u.path_to_node("0").unwrap().unwrap();
        u.set_attribute(doc, "n", Some("1")).unwrap();
        u.set_attribute(doc, "n", Some("2")).unwrap();
        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc n=\"1\"/>");
        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc/>");
    }

    #[test]
    fn test_group_reverts_both_insertions() {
        let (mut u, list, rec) = setup("<doc/>");
        let doc = u.path_to_node("0").unwrap().unwrap();
        list.borrow_mut().start_group(UndoGroup::new("two"));
        let a = u.scratch().create_element("a").unwrap();
        u.insert_node_at(doc, 0, a).unwrap();
        let b = u.scratch().create_element("b").unwrap();
        u.insert_node_at(doc, 1, b).unwrap();
        list.borrow_mut().end_group().unwrap();

        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc/>");
        assert!(!list.borrow().can_undo());
        redo(&mut u, &list, &rec);
        assert_eq!(content(&u), "<doc><a/><b/></doc>");
    }

    #[test]
    fn test_compound_operation_undoes_exactly() {
        let (mut u, list, rec) = setup("<doc><p>ab<b>cd</b>ef</p></doc>");
        let before = content(&u);
        let p = u.path_to_node("0/0").unwrap().unwrap();
        let cd = u.path_to_node("0/0/1/0").unwrap().unwrap();
        let loc = wed_dom::DLoc::make(u.tree(), cd, 1).unwrap();
        list.borrow_mut().start_group(UndoGroup::new("split"));
        u.split_at(p, loc).unwrap();
        list.borrow_mut().end_group().unwrap();
        let after = content(&u);

        undo(&mut u, &list, &rec);
        assert_eq!(content(&u), before);
        redo(&mut u, &list, &rec);
        assert_eq!(content(&u), after);
    }

    #[test]
    fn test_suppression_is_scoped_and_exclusive() {
        let (mut u, list, rec) = setup("<doc>ab</doc>");
        let text = u.path_to_node("0/0").unwrap().unwrap();
        {
            let _guard = rec.borrow().suppress().unwrap();
            assert!(rec.borrow().suppress().is_err());
            u.set_text_node_value(text, "x").unwrap();
        }
        assert!(list.borrow().is_empty());
        u.set_text_node_value(text, "y").unwrap();
        assert_eq!(list.borrow().len(), 1);
    }
}
