use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;

use crate::value::Value;

/// State shared by the whole render call tree: the template locals, plus a
/// typed side channel through which a tag hands data to the tags rendered
/// inside its body.
#[derive(Debug, Default)]
pub struct RenderContext {
    locals: IndexMap<String, Value>,
    provided: HashMap<TypeId, Box<dyn Any>>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locals(locals: IndexMap<String, Value>) -> Self {
        Self {
            locals,
            provided: HashMap::new(),
        }
    }

    /// Value of a local variable, `Undefined` when it is not set.
    pub fn lookup(&self, name: &str) -> Value {
        self.locals.get(name).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(name.into(), value.into());
    }

    pub fn locals(&self) -> &IndexMap<String, Value> {
        &self.locals
    }

    /// Make `value` visible to `f` and everything it renders.
    ///
    /// Whatever was provided under the same type before is restored once `f`
    /// returns, whether it succeeded, failed or panicked.
    pub fn provide<T: Any, R>(&mut self, value: T, f: impl FnOnce(&mut RenderContext) -> R) -> R {
        let key = TypeId::of::<T>();
        let previous = self.provided.insert(key, Box::new(value));
        let mut scope = Scope {
            ctx: self,
            key,
            previous,
        };
        f(&mut *scope)
    }

    /// The innermost value of type `T` provided by an enclosing tag.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.provided
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RenderContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::with_locals(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

struct Scope<'a> {
    ctx: &'a mut RenderContext,
    key: TypeId,
    previous: Option<Box<dyn Any>>,
}

impl Deref for Scope<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &RenderContext {
        self.ctx
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut RenderContext {
        self.ctx
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                self.ctx.provided.insert(self.key, previous);
            }
            None => {
                self.ctx.provided.remove(&self.key);
            }
        }
    }
}
