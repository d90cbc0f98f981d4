use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Function, Tera};
use thiserror::Error;

use crate::consts::{MAX_FIXED_POINT_ITERATIONS, TEMPLATE_GLOB};

/// Failure modes of the Template Engine.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to load templates from {0}: {1}")]
    Load(String, tera::Error),
    #[error("template {0} not found")]
    NotFound(String),
    #[error("template {0} failed to execute: {1}")]
    Execution(String, tera::Error),
    #[error("template did not reach a fixed point within {0} iterations")]
    Divergence(usize),
}

/// Process-scoped `name -> accumulated fragments` table exposed to templates
/// through the `store(name, value)` helper. Templates use it to stash output
/// during one rendering pass and splice it back in during a later pass.
#[derive(Debug, Default, Clone)]
pub struct Storage(Arc<Mutex<HashMap<String, Vec<String>>>>);

impl Storage {
    fn new() -> Self {
        Self::default()
    }

    /// Clear all accumulated fragments. Called at the start of every `generateArtifacts`.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn append(&self, name: &str, value: &str) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_owned())
            .or_default()
            .push(value.to_owned());
    }
}

/// Loads a directory of text templates once and renders them against a
/// context mapping of string to value, with support for iterative
/// re-rendering to a fixed point.
///
/// The underlying `Tera` instance is shared behind a lock so that the
/// `templateToString` helper can recursively render a sibling template from
/// within another template's execution.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Mutex<Tera>>,
    storage: Storage,
    /// Serializes `generate_artifacts` calls: the shared `storage` table is
    /// cleared at the start of a generation pass, so two concurrent passes
    /// (e.g. an App reconcile and an Instance reconcile racing on the same
    /// engine) would otherwise corrupt each other's accumulated fragments.
    generation_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TemplateEngine {
    /// Scan `dir` for template files and parse them all. An empty/missing
    /// directory yields an engine with no templates rather than an error.
    pub fn load(dir: &str) -> Result<Self, TemplateError> {
        let glob = format!("{}/{TEMPLATE_GLOB}", dir.trim_end_matches('/'));
        let tera = match Tera::new(&glob) {
            Ok(tera) => tera,
            Err(err) if matches!(err.kind, tera::ErrorKind::Msg(ref m) if m.contains("glob")) => {
                Tera::default()
            }
            Err(err) => return Err(TemplateError::Load(dir.to_owned(), err)),
        };
        let storage = Storage::new();
        let tera = Arc::new(Mutex::new(tera));
        Self::register_functions(&tera, &storage);
        Ok(Self {
            tera,
            storage,
            generation_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Shared handle to the storage table, so callers can `clear()` it
    /// between `generateArtifacts` invocations.
    pub fn storage(&self) -> Storage {
        self.storage.clone()
    }

    /// The lock a caller must hold for the duration of one `generateArtifacts`
    /// call, serializing access to the shared `storage` table.
    pub fn generation_lock(&self) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.generation_lock)
    }

    fn register_functions(tera: &Arc<Mutex<Tera>>, storage: &Storage) {
        let mut guard = tera.lock().unwrap_or_else(|e| e.into_inner());
        guard.register_function("store", StoreFn(storage.clone()));
        guard.register_function("get", GetFn);
        guard.register_function("templateToString", TemplateToStringFn(Arc::clone(tera)));
    }

    /// Render the named template against `context`.
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String, TemplateError> {
        let ctx = Context::from_serialize(context)
            .map_err(|err| TemplateError::Execution(name.to_owned(), err))?;
        let guard = self.tera.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.get_template_names().any(|n| n == name) {
            return Err(TemplateError::NotFound(name.to_owned()));
        }
        guard
            .render(name, &ctx)
            .map_err(|err| TemplateError::Execution(name.to_owned(), err))
    }

    /// Parse `text` as an anonymous template and execute it against `context`.
    pub fn re_render<T: Serialize>(&self, text: &str, context: &T) -> Result<String, TemplateError> {
        let ctx = Context::from_serialize(context)
            .map_err(|err| TemplateError::Execution("<rerender>".to_owned(), err))?;
        let mut guard = self.tera.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .render_str(text, &ctx)
            .map_err(|err| TemplateError::Execution("<rerender>".to_owned(), err))
    }

    /// `render`, then repeatedly `reRender` until two consecutive outputs are
    /// byte-identical, bounded by `MAX_FIXED_POINT_ITERATIONS`.
    pub fn render_to_fixed_point<T: Serialize>(
        &self,
        name: &str,
        context: &T,
    ) -> Result<String, TemplateError> {
        let mut current = self.render(name, context)?;
        for _ in 0..MAX_FIXED_POINT_ITERATIONS {
            let next = self.re_render(&current, context)?;
            if next == current {
                return Ok(current);
            }
            current = next;
        }
        Err(TemplateError::Divergence(MAX_FIXED_POINT_ITERATIONS))
    }
}

/// `store(name, value)`: append `value` to the named fragment list and
/// return it unchanged, so templates can use it inline (`{{ store(name=..., value=...) }}`).
struct StoreFn(Storage);

impl Function for StoreFn {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("store() requires a `name` argument"))?;
        let value = args
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("store() requires a `value` argument"))?;
        self.0.append(name, value);
        Ok(Value::String(value.to_owned()))
    }
}

/// `get(url)`: fetch JSON into a mapping. Network failures return `null`
/// rather than aborting the render, matching the reference implementation.
struct GetFn;

impl Function for GetFn {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("get() requires a `url` argument"))?;
        Ok(blocking_fetch_json(url).unwrap_or(Value::Null))
    }
}

/// `templateToString(name, data)`: render a sibling template against an
/// arbitrary `data` value, returning its output as a string.
struct TemplateToStringFn(Arc<Mutex<Tera>>);

impl Function for TemplateToStringFn {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("templateToString() requires a `name` argument"))?;
        let data = args
            .get("data")
            .cloned()
            .ok_or_else(|| tera::Error::msg("templateToString() requires a `data` argument"))?;
        let ctx = Context::from_value(data)?;
        let guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let rendered = guard.render(name, &ctx)?;
        Ok(Value::String(rendered))
    }
}

/// Synchronous JSON fetch used only by the `get()` template helper: Tera's
/// `Function` trait is not async, so this runs on the blocking `reqwest` client.
fn blocking_fetch_json(url: &str) -> Option<Value> {
    reqwest::blocking::get(url).ok()?.json().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_template(dir: &std::path::Path, name: &str, content: &str) {
        let path = dir.join(name);
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn render_executes_named_template() {
        let dir = tempdir();
        write_template(dir.path(), "hello.tmpl", "hello {{ name }}");
        let engine = TemplateEngine::load(dir.path().to_str().unwrap()).unwrap();
        let mut ctx = std::collections::HashMap::new();
        ctx.insert("name".to_owned(), "world".to_owned());
        assert_eq!(engine.render("hello.tmpl", &ctx).unwrap(), "hello world");
    }

    #[test]
    fn render_missing_template_is_not_found() {
        let dir = tempdir();
        let engine = TemplateEngine::load(dir.path().to_str().unwrap()).unwrap();
        let ctx: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        assert!(matches!(
            engine.render("nope.tmpl", &ctx),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn render_to_fixed_point_settles_when_no_further_substitution_occurs() {
        let dir = tempdir();
        write_template(dir.path(), "flat.tmpl", "static text, no placeholders");
        let engine = TemplateEngine::load(dir.path().to_str().unwrap()).unwrap();
        let ctx: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        assert_eq!(
            engine.render_to_fixed_point("flat.tmpl", &ctx).unwrap(),
            "static text, no placeholders"
        );
    }

    #[test]
    fn store_accumulates_fragments_across_renders() {
        let dir = tempdir();
        write_template(
            dir.path(),
            "accum.tmpl",
            "{{ store(name=\"frag\", value=\"a\") }}",
        );
        let engine = TemplateEngine::load(dir.path().to_str().unwrap()).unwrap();
        let ctx: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        assert_eq!(engine.render("accum.tmpl", &ctx).unwrap(), "a");
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }
}
