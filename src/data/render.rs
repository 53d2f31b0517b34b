//! Render the live heap as a Graphviz graph.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;

use dot_writer::{Attributes, DotWriter};
use maud::PreEscaped;

use super::bitset::BitSet;
use super::{FunctionBody, Object, Storage, Value};
use crate::error::Result;

fn node_for_value(v: Value) -> String {
    format!(r#"<{v}>"#)
}

/// Cell text for a value: immediates inline, heap values by handle.
fn cell_text(store: &Storage, v: Value) -> String {
    match v.ptr() {
        Some(_) => format!("{v}"),
        None => store.display(v),
    }
}

fn single_value(v: impl std::fmt::Display) -> PreEscaped<String> {
    maud::html!(tr { td colspan="2" { (v) } })
}

/// Render one object; returns the heap values it points to.
fn render_node(
    store: &Storage,
    graph: &mut dot_writer::Scope,
    it: Value,
    object: &Object,
) -> Vec<Value> {
    let mut edges = Vec::new();
    let mut port_for = |port: String, v: Value| {
        if v.ptr().is_some() {
            edges.push((port, v));
        }
    };

    let value: PreEscaped<String> = match object {
        Object::Cons(c) => {
            port_for("car".to_owned(), c.car);
            port_for("cdr".to_owned(), c.cdr);
            maud::html!(tr {
                td port="car" { (cell_text(store, c.car)) }
                td port="cdr" { (cell_text(store, c.cdr)) }
            })
        }
        Object::String(s) => single_value(format!("{:?}", String::from_utf8_lossy(s.as_slice()))),
        Object::Symbol(_) => single_value(store.display(it)),
        Object::Vector(v) => {
            for (i, &item) in v.as_slice().iter().enumerate() {
                port_for(format!("port{i}"), item);
            }
            maud::html! {
                @for (i, &item) in v.as_slice().iter().enumerate() {
                    tr {
                        td { (i) }
                        td port=(format!("port{i}")) { (cell_text(store, item)) }
                    }
                }
            }
        }
        Object::Table(t) => {
            for (i, (k, v)) in t.entries().enumerate() {
                port_for(format!("key{i}"), k);
                port_for(format!("value{i}"), v);
            }
            maud::html! {
                @for (i, (k, v)) in t.entries().enumerate() {
                    tr {
                        td port=(format!("key{i}")) { (cell_text(store, k)) }
                        td port=(format!("value{i}")) { (cell_text(store, v)) }
                    }
                }
            }
        }
        Object::Function(f) => {
            let kind = match &f.body {
                FunctionBody::Builtin(_) => "builtin",
                FunctionBody::Compiled { .. } => "closure",
            };
            if let FunctionBody::Compiled { captures, .. } = &f.body {
                for (i, &c) in captures.iter().enumerate() {
                    port_for(format!("port{i}"), c);
                }
            }
            maud::html! {
                tr { td { (kind) } td { (cell_text(store, f.name)) " / " (f.arity) } }
                @if let FunctionBody::Compiled { captures, .. } = &f.body {
                    @for (i, &c) in captures.iter().enumerate() {
                        tr {
                            td { (i) }
                            td port=(format!("port{i}")) { (cell_text(store, c)) }
                        }
                    }
                }
            }
        }
    };

    let mut node = graph.node_named(node_for_value(it));
    node.set_shape(dot_writer::Shape::None);
    node.set_html(&format!(
        "<{}>",
        maud::html!(
            table {
                tr { td border="0" colspan="2" { (it) } }
                (value)
            }
        )
        .into_string()
    ));
    let ports: Vec<_> = edges
        .iter()
        .map(|(port, target)| (node.id().port(port), *target))
        .collect();
    std::mem::drop(node);

    // After completing the node, make the outbound edges.
    ports
        .into_iter()
        .map(|(port, target)| {
            graph.edge(port, node_for_value(target));
            target
        })
        .collect()
}

/// Render every object reachable from the roots into Graphviz DOT source.
pub fn render_store(store: &Storage) -> Result<Vec<u8>> {
    let roots: Vec<Value> = store.roots.borrow().values().collect();
    let mut visited = BitSet::new();
    let mut outbuf = Vec::new();
    {
        let mut writer = DotWriter::from(&mut outbuf);
        let mut graph = writer.digraph();
        graph.node_attributes().set_font("monospace");

        let mut node = graph.node_named("roots");
        node.set_shape(dot_writer::Shape::None);
        node.set_html(&format!(
            "<{}>",
            maud::html!(table {
                tr { td border="0" { b { "roots" } } }
                @for (i, &r) in roots.iter().enumerate() {
                    tr { td port=(format!("root{i}")) { (cell_text(store, r)) } }
                }
            })
            .into_string()
        ));
        let ports: Vec<_> = roots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.ptr().is_some())
            .map(|(i, &r)| (node.id().port(&format!("root{i}")), r))
            .collect();
        std::mem::drop(node);

        let mut queue = VecDeque::new();
        for (port, r) in ports {
            graph.edge(port, node_for_value(r));
            queue.push_back(r);
        }

        while let Some(it) = queue.pop_front() {
            let Some(p) = it.ptr() else { continue };
            if visited.get(p.idx()) {
                continue;
            }
            visited.set(p.idx());
            let heap = store.heap();
            let object = heap.object(it)?.clone();
            std::mem::drop(heap);
            let next = render_node(store, &mut graph, it, &object);
            queue.extend(next);
        }
    }
    tracing::debug!("rendered {} reachable objects", visited.count());
    Ok(outbuf)
}

/// Write DOT source to a file that outlives the process; returns its path.
pub fn save_graph(dot: &[u8]) -> std::io::Result<PathBuf> {
    let mut f = tempfile::NamedTempFile::new()?;
    f.write_all(dot)?;
    let (_, pathbuf) = f.keep()?;
    tracing::info!("DOT source in {}", pathbuf.display());
    Ok(pathbuf)
}
