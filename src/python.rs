use indexmap::IndexMap;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple};

use crate::context::RenderContext;
use crate::env::{Environment, Options};
use crate::error::{ParseError, RenderError, TemplateError};
use crate::tag::TagDefinition;
use crate::value::Value;

impl From<ParseError> for PyErr {
    fn from(err: ParseError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

impl From<RenderError> for PyErr {
    fn from(err: RenderError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

impl From<TemplateError> for PyErr {
    fn from(err: TemplateError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

#[pyclass(name = "Environment", unsendable)]
pub struct PyEnvironment {
    inner: Environment,
}

#[pymethods]
impl PyEnvironment {
    #[new]
    #[pyo3(signature = (autoescape=true))]
    fn new(autoescape: bool) -> Self {
        Self {
            inner: Environment::with_options(Options { autoescape }),
        }
    }

    #[pyo3(signature = (name, node_name=None, end=true, custom_parser=true))]
    fn add_tag(&mut self, name: &str, node_name: Option<&str>, end: bool, custom_parser: bool) -> PyResult<()> {
        if name.is_empty() {
            return Err(PyValueError::new_err("tag name must not be empty"));
        }
        let mut definition = TagDefinition::new(name)
            .with_end(end)
            .with_custom_parser(custom_parser);
        if let Some(node_name) = node_name {
            definition = definition.with_node_name(node_name);
        }
        self.inner.add_extension(definition);
        Ok(())
    }

    #[pyo3(signature = (template, locals=None))]
    fn render_string(&self, template: &str, locals: Option<&PyDict>) -> PyResult<String> {
        let mut ctx = to_context(locals)?;
        Ok(self.inner.render_str(template, &mut ctx)?)
    }

    /// Render only an attribute list, e.g. `class="a" "checked"`.
    #[pyo3(signature = (attributes, locals=None))]
    fn render_attributes(&self, attributes: &str, locals: Option<&PyDict>) -> PyResult<String> {
        let ctx = to_context(locals)?;
        Ok(self.inner.render_attributes(attributes, &ctx)?)
    }
}

#[pyfunction]
#[pyo3(name = "escape")]
fn escape_html(text: &str) -> String {
    crate::escape::escape(text)
}

fn to_context(locals: Option<&PyDict>) -> PyResult<RenderContext> {
    let mut ctx = RenderContext::new();
    if let Some(locals) = locals {
        for (key, value) in locals {
            ctx.set(key.str()?.to_str()?, to_value(value)?);
        }
    }
    Ok(ctx)
}

fn to_value(obj: &PyAny) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    // before int, bool is a subclass of it
    if let Ok(b) = obj.downcast::<PyBool>() {
        return Ok(Value::Bool(b.is_true()));
    }
    if obj.is_instance_of::<PyLong>() {
        return Ok(Value::Number(obj.extract::<f64>()?));
    }
    if let Ok(f) = obj.downcast::<PyFloat>() {
        return Ok(Value::Number(f.value()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Value::String(s.to_str()?.to_string()));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return Ok(Value::Array(list.iter().map(to_value).collect::<PyResult<_>>()?));
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return Ok(Value::Array(tuple.iter().map(to_value).collect::<PyResult<_>>()?));
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut map = IndexMap::new();
        for (key, value) in dict {
            map.insert(key.str()?.to_str()?.to_string(), to_value(value)?);
        }
        return Ok(Value::Object(map));
    }
    Ok(Value::String(obj.str()?.to_str()?.to_string()))
}

#[pymodule]
fn attr_tag(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyEnvironment>()?;
    m.add_function(wrap_pyfunction!(escape_html, m)?)?;
    Ok(())
}
