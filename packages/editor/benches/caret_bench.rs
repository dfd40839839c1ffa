use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wed_dom::{xml, DLoc};
use wed_editor::caret::{self, CaretContext};
use wed_editor::{Editor, EditorOptions, GenericMode, SaveBackend, SaveError, SaveKind};

struct DiscardBackend;

impl SaveBackend for DiscardBackend {
    fn save(&mut self, _data: &str, _kind: SaveKind) -> Result<(), SaveError> {
        Ok(())
    }

    fn recover(&mut self, _data: &str) -> Result<(), SaveError> {
        Ok(())
    }
}

fn document(paragraphs: usize) -> String {
    let mut source = String::from("<doc>");
    for i in 0..paragraphs {
        source.push_str(&format!("<p>para {} <hi rend=\"b\">bold</hi> tail</p>", i));
    }
    source.push_str("</doc>");
    source
}

fn editor(source: &str) -> Editor {
    Editor::new(
        xml::parse(source).unwrap(),
        Rc::new(GenericMode),
        Box::new(DiscardBackend),
        EditorOptions::default(),
    )
    .unwrap()
}

fn walk_right(c: &mut Criterion) {
    let editor = editor(&document(50));
    let gui = editor.gui();
    let collapse = |_: &wed_dom::Tree, _: wed_dom::NodeId| true;
    let ctx = CaretContext::new(&gui, editor.data_tree(), &collapse);
    let start = DLoc::make(gui.tree(), gui.root(), 0).unwrap();

    c.bench_function("position_right_whole_document", |b| {
        b.iter(|| {
            let mut pos = start;
            let mut steps = 0usize;
            while let Some(next) = caret::position_right(&ctx, &pos) {
                pos = next;
                steps += 1;
            }
            black_box(steps)
        })
    });
}

fn map_locations(c: &mut Criterion) {
    let editor = editor(&document(50));
    let text = editor.data_tree().path_to_node("0/25/0").unwrap().unwrap();
    let loc = DLoc::make(editor.data_tree(), text, 3).unwrap();

    c.bench_function("data_to_gui_and_back", |b| {
        b.iter(|| {
            let gui_loc = editor.from_data_location(black_box(&loc)).unwrap();
            editor.to_data_location(&gui_loc, false).unwrap()
        })
    });
}

fn typing(c: &mut Criterion) {
    c.bench_function("type_and_undo", |b| {
        b.iter(|| {
            let mut editor = editor(&document(10));
            let text = editor.data_tree().path_to_node("0/5/0").unwrap().unwrap();
            let loc = DLoc::make(editor.data_tree(), text, 2).unwrap();
            editor.set_data_caret(loc, false).unwrap();
            for ch in ["a", "b", "c", "d"] {
                editor.type_text(ch).unwrap();
            }
            editor.undo().unwrap()
        })
    });
}

criterion_group!(benches, walk_right, map_locations, typing);
criterion_main!(benches);
