//! Shared fixtures for integration tests.
//!
//! `GridLayout` renders a GUI tree on a fixed grid: every character is a
//! 10x20 cell, spans flow inline and each `div` starts on a new line.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use wed_dom::{xml, DLoc, NodeId, Tree};
use wed_editor::{Editor, EditorOptions, GenericMode, Layout, Rect, SaveBackend, SaveError, SaveKind};

pub const CELL_WIDTH: f64 = 10.0;
pub const CELL_HEIGHT: f64 = 20.0;

enum Item {
    Char { text: NodeId, index: usize, rect: Rect },
    Enter { el: NodeId, pen: Rect },
}

#[derive(Debug, Default)]
pub struct GridLayout;

impl GridLayout {
    fn items(&self, gui: &Tree) -> Vec<Item> {
        let mut items = Vec::new();
        let mut pen = (0usize, 0usize);
        walk(gui, gui.root(), &mut pen, &mut items);
        items
    }
}

fn cell(line: usize, col: usize) -> Rect {
    let left = col as f64 * CELL_WIDTH;
    let top = line as f64 * CELL_HEIGHT;
    Rect::new(left, top, left + CELL_WIDTH, top + CELL_HEIGHT)
}

fn walk(gui: &Tree, node: NodeId, pen: &mut (usize, usize), items: &mut Vec<Item>) {
    if gui.is_text(node) {
        for index in 0..gui.length(node) {
            items.push(Item::Char {
                text: node,
                index,
                rect: cell(pen.0, pen.1),
            });
            pen.1 += 1;
        }
        return;
    }
    let block = gui.name(node) == Some("div");
    if block && pen.1 > 0 {
        *pen = (pen.0 + 1, 0);
    }
    let at = cell(pen.0, pen.1);
    items.push(Item::Enter {
        el: node,
        pen: Rect::new(at.left, at.top, at.left, at.bottom),
    });
    for &child in gui.children(node) {
        walk(gui, child, pen, items);
    }
    if block && pen.1 > 0 {
        *pen = (pen.0 + 1, 0);
    }
}

impl Layout for GridLayout {
    fn element_at_point(&self, gui: &Tree, x: f64, y: f64) -> Option<NodeId> {
        let items = self.items(gui);
        let depth = |el: NodeId| gui.ancestors(el).count();
        let hit = items
            .iter()
            .filter_map(|item| match item {
                Item::Enter { el, .. } => Some(*el),
                Item::Char { .. } => None,
            })
            .filter(|&el| {
                self.client_rects(gui, el)
                    .iter()
                    .any(|r| r.distances(x, y) == (0.0, 0.0))
            })
            .max_by_key(|&el| depth(el));
        let lines = items
            .iter()
            .filter_map(|item| match item {
                Item::Char { rect, .. } => Some(rect.bottom),
                Item::Enter { .. } => None,
            })
            .fold(0.0, f64::max);
        hit.or_else(|| (y >= 0.0 && y < lines).then(|| gui.root()))
    }

    fn client_rects(&self, gui: &Tree, node: NodeId) -> Vec<Rect> {
        let items = self.items(gui);
        let mut lines: Vec<Rect> = Vec::new();
        for item in &items {
            if let Item::Char { text, rect, .. } = item {
                if !gui.contains(node, *text) {
                    continue;
                }
                match lines.iter_mut().find(|line| line.top == rect.top) {
                    Some(line) => {
                        line.left = line.left.min(rect.left);
                        line.right = line.right.max(rect.right);
                    }
                    None => lines.push(*rect),
                }
            }
        }
        if lines.is_empty() {
            let pen = items.iter().find_map(|item| match item {
                Item::Enter { el, pen } if *el == node => Some(*pen),
                _ => None,
            });
            lines.extend(pen);
        }
        lines
    }

    fn char_rect(&self, gui: &Tree, text: NodeId, index: usize) -> Option<Rect> {
        self.items(gui).into_iter().find_map(|item| match item {
            Item::Char { text: t, index: i, rect } if t == text && i == index => Some(rect),
            _ => None,
        })
    }
}

/// Backend that keeps what it was given.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub saved: Vec<(String, SaveKind)>,
    pub recovered: Vec<String>,
    pub fail_with: Option<SaveError>,
}

pub type SharedBackend = Rc<RefCell<MemoryBackend>>;

/// Handle through which a test inspects a backend owned by a saver.
pub struct BackendHandle(pub SharedBackend);

impl SaveBackend for BackendHandle {
    fn save(&mut self, data: &str, kind: SaveKind) -> Result<(), SaveError> {
        let mut backend = self.0.borrow_mut();
        if let Some(err) = backend.fail_with.clone() {
            return Err(err);
        }
        backend.saved.push((data.to_string(), kind));
        Ok(())
    }

    fn recover(&mut self, data: &str) -> Result<(), SaveError> {
        self.0.borrow_mut().recovered.push(data.to_string());
        Ok(())
    }
}

/// Route editor logs to the test harness; run with `--nocapture` to see
/// them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn editor_with(source: &str, options: EditorOptions) -> (Editor, SharedBackend) {
    init_tracing();
    let backend: SharedBackend = Rc::default();
    let editor = Editor::new(
        xml::parse(source).unwrap(),
        Rc::new(GenericMode),
        Box::new(BackendHandle(Rc::clone(&backend))),
        options,
    )
    .unwrap();
    (editor, backend)
}

pub fn editor(source: &str) -> (Editor, SharedBackend) {
    editor_with(source, EditorOptions::default())
}

pub fn content(editor: &Editor) -> String {
    xml::inner_xml(editor.data_tree(), editor.data_tree().root())
}

pub fn data_loc(editor: &Editor, path: &str, offset: usize) -> DLoc {
    let node = editor.data_tree().path_to_node(path).unwrap().unwrap();
    DLoc::make(editor.data_tree(), node, offset).unwrap()
}

pub fn data_caret(editor: &Editor) -> Option<(String, usize)> {
    editor
        .get_data_caret(false)
        .unwrap()
        .map(|loc| (editor.data_tree().node_to_path(loc.node).unwrap(), loc.offset))
}
