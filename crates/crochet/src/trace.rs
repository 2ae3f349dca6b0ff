//! Tagged tracing for hook-call monitoring.
//!
//! [`TagTracer`] is a small, self-contained trace fan-out used by
//! [`PluginManager::enable_tracing`](crate::manager::PluginManager::enable_tracing):
//! messages are emitted through [`TagTracerSub`] handles carrying a chain of
//! tags, rendered with the tracer's current indent, written to an optional
//! writer sink, and offered to processors registered per tag chain. It is
//! independent of the `tracing` crate, which this library uses for its own
//! diagnostics; hosts wire the writer sink wherever they want trace output
//! to go.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Writer sink receiving rendered trace messages.
pub type TraceWriter = Box<dyn FnMut(&str) + Send>;

/// Processor invoked with the tag chain and raw arguments of each message
/// emitted under its registered tags.
pub type TraceProcessor = Arc<dyn Fn(&[String], &[Value]) + Send + Sync>;

struct TracerState {
    indent: usize,
    writer: Option<TraceWriter>,
    processors: HashMap<Vec<String>, TraceProcessor>,
}

/// Root of a tag-tracing tree: owns the writer sink, the indent level, and
/// the processor registry.
pub struct TagTracer {
    state: Mutex<TracerState>,
}

impl TagTracer {
    /// Creates a new tracer with no writer, no processors, and indent 0.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TracerState {
                indent: 0,
                writer: None,
                processors: HashMap::new(),
            }),
        })
    }

    /// Returns a sub-tracer tagged with `name`.
    pub fn get(self: &Arc<Self>, name: impl Into<String>) -> TagTracerSub {
        TagTracerSub {
            root: Arc::clone(self),
            tags: vec![name.into()],
        }
    }

    /// Installs (or clears) the writer sink.
    pub fn set_writer(&self, writer: Option<TraceWriter>) {
        self.state.lock().writer = writer;
    }

    /// Registers a processor for a `:`-separated tag chain.
    pub fn set_processor(
        &self,
        tags: &str,
        processor: impl Fn(&[String], &[Value]) + Send + Sync + 'static,
    ) {
        let tags: Vec<String> = tags.split(':').map(str::to_string).collect();
        self.state.lock().processors.insert(tags, Arc::new(processor));
    }

    /// Current indent level.
    pub fn indent(&self) -> usize {
        self.state.lock().indent
    }

    /// Increases the indent by one level.
    pub fn push_indent(&self) {
        self.state.lock().indent += 1;
    }

    /// Decreases the indent by one level (never below zero).
    pub fn pop_indent(&self) {
        let mut state = self.state.lock();
        state.indent = state.indent.saturating_sub(1);
    }

    fn process_message(&self, tags: &[String], args: &[Value]) {
        let processor = {
            let mut state = self.state.lock();
            let indent = state.indent;
            if !args.is_empty()
                && let Some(writer) = state.writer.as_mut()
            {
                let message = format_message(indent, tags, args);
                writer(&message);
            }
            state.processors.get(tags).cloned()
        };
        if let Some(processor) = processor {
            processor(tags, args);
        }
    }
}

impl fmt::Debug for TagTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TagTracer")
            .field("indent", &state.indent)
            .field("has_writer", &state.writer.is_some())
            .field("processors", &state.processors.len())
            .finish()
    }
}

/// A handle emitting messages under a fixed tag chain.
#[derive(Clone)]
pub struct TagTracerSub {
    root: Arc<TagTracer>,
    tags: Vec<String>,
}

impl TagTracerSub {
    /// Returns a sub-tracer with `name` appended to the tag chain.
    pub fn get(&self, name: impl Into<String>) -> TagTracerSub {
        let mut tags = self.tags.clone();
        tags.push(name.into());
        TagTracerSub {
            root: Arc::clone(&self.root),
            tags,
        }
    }

    /// Emits a message.
    ///
    /// Arguments are rendered space-separated; when the final argument is
    /// an object its entries become indented `key: value` continuation
    /// lines instead.
    pub fn emit(&self, args: &[Value]) {
        self.root.process_message(&self.tags, args);
    }

    /// The root tracer this handle belongs to.
    pub fn root(&self) -> &Arc<TagTracer> {
        &self.root
    }

    /// The tag chain of this handle.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl fmt::Debug for TagTracerSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTracerSub")
            .field("tags", &self.tags)
            .finish()
    }
}

/// Renders a value the way trace output wants it: strings bare, everything
/// else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_message(indent: usize, tags: &[String], args: &[Value]) -> String {
    let (args, extra) = match args.split_last() {
        Some((Value::Object(map), rest)) => (rest, Some(map)),
        _ => (args, None),
    };
    let content = args
        .iter()
        .map(display_value)
        .collect::<Vec<_>>()
        .join(" ");
    let pad = "  ".repeat(indent);
    let mut message = format!("{pad}{content} [{}]\n", tags.join(":"));
    if let Some(extra) = extra {
        for (name, value) in extra {
            message.push_str(&format!("{pad}    {name}: {}\n", display_value(value)));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn capture(tracer: &Arc<TagTracer>) -> Arc<Mutex<String>> {
        let buffer = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buffer);
        tracer.set_writer(Some(Box::new(move |message| {
            sink.lock().push_str(message);
        })));
        buffer
    }

    #[test]
    fn test_basic_message_format() {
        let tracer = TagTracer::new();
        let buffer = capture(&tracer);

        tracer.get("pluginmanage").emit(&[json!("hello")]);
        assert_eq!(*buffer.lock(), "hello [pluginmanage]\n");
    }

    #[test]
    fn test_indent_and_tag_chain() {
        let tracer = TagTracer::new();
        let buffer = capture(&tracer);

        let hook = tracer.get("pluginmanage").get("hook");
        tracer.push_indent();
        hook.emit(&[json!("setup")]);
        tracer.pop_indent();
        hook.emit(&[json!("done")]);

        assert_eq!(
            *buffer.lock(),
            "  setup [pluginmanage:hook]\ndone [pluginmanage:hook]\n"
        );
        assert_eq!(tracer.indent(), 0);
    }

    #[test]
    fn test_trailing_object_becomes_continuation_lines() {
        let tracer = TagTracer::new();
        let buffer = capture(&tracer);

        tracer
            .get("hook")
            .emit(&[json!("myhook"), json!({ "a": 1, "b": "two" })]);

        assert_eq!(*buffer.lock(), "myhook [hook]\n    a: 1\n    b: two\n");
    }

    #[test]
    fn test_pop_indent_saturates_at_zero() {
        let tracer = TagTracer::new();
        tracer.pop_indent();
        assert_eq!(tracer.indent(), 0);
    }

    #[test]
    fn test_processor_receives_tags_and_args() {
        let tracer = TagTracer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        tracer.set_processor("a:b", move |tags, args| {
            assert_eq!(tags, ["a", "b"]);
            assert_eq!(args, [json!(1)]);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        tracer.get("a").get("b").emit(&[json!(1)]);
        tracer.get("a").emit(&[json!(1)]); // different chain: not processed
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_args_skip_writer() {
        let tracer = TagTracer::new();
        let buffer = capture(&tracer);
        tracer.get("quiet").emit(&[]);
        assert!(buffer.lock().is_empty());
    }
}
