use crate::ast::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A lexical scope and, through its parent link, the whole chain above it.
///
/// Cloning an `Environment` shares the scope. Closures hold clones of the
/// scope they were created in, so a `set!` through any holder is visible to
/// all of them.
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

struct Scope {
    bindings: RefCell<HashMap<Rc<str>, Value>>,
    parent: Option<Environment>,
}

impl Environment {
    /// Create an empty scope with no parent
    pub fn root() -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// Create a child scope of `parent` binding `params` to `args`
    /// positionally. The caller has already checked that the counts match.
    pub fn new<I>(params: &[Rc<str>], args: I, parent: &Environment) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let bindings = params.iter().cloned().zip(args).collect();
        Environment(Rc::new(Scope {
            bindings: RefCell::new(bindings),
            parent: Some(parent.clone()),
        }))
    }

    /// Value bound to `name` in this exact scope
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.bindings.borrow().get(name).cloned()
    }

    /// Bind or rebind `name` in this exact scope
    pub fn set(&self, name: impl Into<Rc<str>>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Nearest scope in the chain that binds `name`
    pub fn find(&self, name: &str) -> Option<&Environment> {
        let mut scope = self;
        loop {
            if scope.0.bindings.borrow().contains_key(name) {
                return Some(scope);
            }
            scope = scope.0.parent.as_ref()?;
        }
    }

    /// Value of `name` as seen from this scope
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.find(name)?.get(name)
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Every binding visible from this scope, inner bindings shadowing outer
    /// ones, sorted by name.
    pub fn bindings(&self) -> Vec<(Rc<str>, Value)> {
        let mut visible: HashMap<Rc<str>, Value> = HashMap::new();
        let mut scope = Some(self);
        while let Some(env) = scope {
            for (name, value) in env.0.bindings.borrow().iter() {
                visible
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            scope = env.parent();
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Drop every binding of this scope.
    ///
    /// A closure stored in the scope it captured keeps that scope alive
    /// forever; clearing is how an owner breaks such cycles on teardown.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.0.bindings.borrow_mut());
        drop(drained);
    }

    /// Whether both handles denote the same scope
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::root()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut scope = self.parent();
        while let Some(env) = scope {
            depth += 1;
            scope = env.parent();
        }
        write!(
            f,
            "Environment({} bindings, depth {depth})",
            self.0.bindings.borrow().len()
        )
    }
}
