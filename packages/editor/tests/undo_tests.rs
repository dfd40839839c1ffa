//! Undo and redo over mixed edits
//!
//! This tests:
//! - Undoing everything restores the original document exactly
//! - Redoing everything restores the edited document exactly
//! - The GUI tree matches a freshly built one after every step

mod common;

use common::{content, data_loc, editor};
use wed_dom::{xml, DLoc};
use wed_editor::transformation::{self, FnTransformation};
use wed_editor::{Direction, Editor, EditorError, TransformationData, TransformationError};

const SOURCE: &str = "<doc><p>abcd</p><p>ef</p></doc>";

fn gui_xml(editor: &Editor) -> String {
    let gui = editor.gui();
    xml::inner_xml(gui.tree(), gui.root())
}

/// The GUI an editor would build from scratch for the current data.
fn fresh_gui_xml(editor: &Editor) -> String {
    let (fresh, _) = common::editor(&content(editor));
    gui_xml(&fresh)
}

fn assert_mirror_consistent(editor: &Editor) {
    assert_eq!(gui_xml(editor), fresh_gui_xml(editor));
    let data = editor.data_tree();
    let gui = editor.gui();
    for node in data.descendants(data.root()) {
        if data.is_attribute(node) {
            continue;
        }
        let mirrored = gui.mirror().to_gui(node);
        assert!(mirrored.is_some(), "{:?} has no GUI counterpart", data.node_to_path(node));
        if data.is_text(node) {
            assert_eq!(gui.tree().text(mirrored.unwrap()), data.text(node));
        }
    }
}

fn wrap_selection_end(editor: &mut Editor, data: &TransformationData) -> Result<(), TransformationError> {
    let caret = editor.get_data_caret(false)?.ok_or(EditorError::NoCaret)?;
    let name = data.name.as_deref().unwrap_or("hi");
    let el = transformation::wrap_text_in_element(
        editor.data_updater_mut(),
        caret.node,
        caret.offset,
        caret.offset + 1,
        "",
        name,
        &[("rend", "b")],
    )?;
    let loc = DLoc::make(editor.data_tree(), el, 1)?;
    editor.set_data_caret(loc, false)?;
    Ok(())
}

fn edit(editor: &mut Editor) -> Vec<String> {
    let mut states = vec![content(editor)];

    editor.set_data_caret(data_loc(editor, "0/0/0", 4), false).unwrap();
    editor.type_text("xy").unwrap();
    states.push(content(editor));

    editor.set_data_caret(data_loc(editor, "0/0/0", 1), false).unwrap();
    let wrap = FnTransformation::new("wrap", "Wrap in <name>", wrap_selection_end);
    editor
        .fire_transformation(&wrap, &TransformationData::default().with_name("hi"))
        .unwrap();
    states.push(content(editor));

    let second = data_loc(editor, "0/1", 0).node;
    let merge = FnTransformation::new(
        "merge-with-previous",
        "Merge <name> with previous",
        |editor: &mut Editor, data: &TransformationData| {
            let node = data.node.ok_or(EditorError::NoCaret)?;
            transformation::merge_with_previous_homogeneous_sibling(editor, node)?;
            Ok(())
        },
    );
    editor
        .fire_transformation(&merge, &TransformationData::for_node(second).with_name("p"))
        .unwrap();
    states.push(content(editor));

    editor.set_data_caret(data_loc(editor, "0/0/0", 1), false).unwrap();
    editor.delete_char(Direction::Backward).unwrap();
    states.push(content(editor));

    states
}

#[test]
fn test_edits_produce_expected_documents() {
    let (mut editor, _) = editor(SOURCE);
    let states = edit(&mut editor);
    assert_eq!(
        states,
        vec![
            "<doc><p>abcd</p><p>ef</p></doc>",
            "<doc><p>abcdxy</p><p>ef</p></doc>",
            r#"<doc><p>a<hi rend="b">b</hi>cdxy</p><p>ef</p></doc>"#,
            r#"<doc><p>a<hi rend="b">b</hi>cdxyef</p></doc>"#,
            r#"<doc><p><hi rend="b">b</hi>cdxyef</p></doc>"#,
        ]
    );
}

#[test]
fn test_undo_and_redo_walk_every_state() {
    let (mut editor, _) = editor(SOURCE);
    let states = edit(&mut editor);
    assert_mirror_consistent(&editor);

    for expected in states.iter().rev().skip(1) {
        assert!(editor.undo().unwrap().is_some());
        assert_eq!(&content(&editor), expected);
        assert_mirror_consistent(&editor);
    }
    assert!(!editor.can_undo());
    assert_eq!(editor.undo().unwrap(), None);

    for expected in states.iter().skip(1) {
        assert!(editor.redo().unwrap().is_some());
        assert_eq!(&content(&editor), expected);
        assert_mirror_consistent(&editor);
    }
    assert!(!editor.can_redo());
}

#[test]
fn test_new_edit_discards_redo() {
    let (mut editor, _) = editor(SOURCE);
    edit(&mut editor);
    editor.undo().unwrap();
    editor.undo().unwrap();
    assert!(editor.can_redo());

    editor.set_data_caret(data_loc(&editor, "0/1/0", 0), false).unwrap();
    editor.type_text("z").unwrap();
    assert!(!editor.can_redo());
    assert_eq!(content(&editor), r#"<doc><p>a<hi rend="b">b</hi>cdxy</p><p>zef</p></doc>"#);

    editor.undo().unwrap();
    assert_eq!(content(&editor), r#"<doc><p>a<hi rend="b">b</hi>cdxy</p><p>ef</p></doc>"#);
    assert_mirror_consistent(&editor);
}

#[test]
fn test_undo_description_tracks_history() {
    let (mut editor, _) = editor(SOURCE);
    edit(&mut editor);
    let undo = editor.undo_list();

    assert_eq!(undo.borrow().undo_description(), Some("Delete"));
    editor.undo().unwrap();
    assert_eq!(undo.borrow().undo_description(), Some("Undo Merge p with previous"));
    assert_eq!(undo.borrow().redo_description(), Some("Delete"));
    editor.undo().unwrap();
    assert_eq!(undo.borrow().undo_description(), Some("Undo Wrap in hi"));
}
