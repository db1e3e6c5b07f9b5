//! Links compiled units into a cumulative symbol space.

use crate::error::LinkError;
use crate::lower::lower_function;
use kalei_value::chunk::Chunk;
use kalei_value::ir::Module;
use kalei_value::object::{Address, CompiledFn, NativeFn};
use kalei_value::Value;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::rc::Rc;
use tracing::debug;

/// Identifies a module added to the [`Jit`], to remove it later.
pub type ModuleKey = usize;

/// Holds the code of every linked module and resolves symbols across them.
///
/// When several modules define the same name, the most recently added definition wins. Host
/// functions registered with [`Jit::add_native`] are used when no compiled definition exists.
#[derive(Default)]
pub struct Jit {
    /// Compiled functions by address. Removed modules leave `None` behind so addresses stay stable.
    code: Vec<Option<Rc<CompiledFn>>>,
    natives: Vec<NativeFn>,
    native_symbols: HashMap<String, usize>,
    /// Compiled definitions of each name, oldest first.
    symbols: HashMap<String, Vec<(ModuleKey, usize)>>,
    /// Functions added by each module.
    modules: HashMap<ModuleKey, Vec<(String, usize)>>,
    next_key: ModuleKey,
    dump_bytecode: bool,
}

impl Jit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print the bytecode of every linked function to stderr.
    pub fn set_dump_bytecode(&mut self, dump_bytecode: bool) {
        self.dump_bytecode = dump_bytecode;
    }

    /// Registers a host function. Replaces a previous host function of the same name.
    pub fn add_native(&mut self, native: NativeFn) {
        match self.native_symbols.get(&native.ident) {
            Some(&index) => self.natives[index] = native,
            None => {
                self.native_symbols
                    .insert(native.ident.clone(), self.natives.len());
                self.natives.push(native);
            }
        }
    }

    pub fn add_native_fn(
        &mut self,
        name: &str,
        arity: u8,
        func: impl Fn(&[Value]) -> Value + 'static,
    ) {
        self.add_native(NativeFn::new(name, arity, func));
    }

    /// Resolves `name` to the newest compiled definition, or to a host function.
    pub fn find_symbol(&self, name: &str) -> Option<Address> {
        self.symbols
            .get(name)
            .and_then(|defs| defs.last())
            .map(|&(_, index)| Address::Compiled(index))
            .or_else(|| self.native_symbols.get(name).map(|&index| Address::Native(index)))
    }

    pub fn compiled(&self, index: usize) -> Option<&Rc<CompiledFn>> {
        self.code.get(index).and_then(Option::as_ref)
    }

    pub fn native(&self, index: usize) -> Option<&NativeFn> {
        self.natives.get(index)
    }

    /// Number of arguments the function at `address` takes, if it is loaded.
    pub fn arity_of(&self, address: Address) -> Option<usize> {
        match address {
            Address::Compiled(index) => self.compiled(index).map(|func| func.arity as usize),
            Address::Native(index) => self.native(index).map(|func| func.arity as usize),
        }
    }

    /// Lowers and links every definition of `module`.
    ///
    /// Imports resolve against the module's own definitions, then previously linked modules, then
    /// host functions. An import found nowhere is left for the VM to resolve when it is called, so
    /// a later module can still define it. Nothing is added if any function fails to lower or if
    /// a resolved import has the wrong arity.
    pub fn add_module(&mut self, module: &Module) -> Result<ModuleKey, LinkError> {
        let base = self.code.len();
        let mut chunks: Vec<(Chunk, u8)> = Vec::new();
        let mut local: HashMap<&str, (Address, usize)> = HashMap::new();
        for (offset, function) in module.definitions().enumerate() {
            let arity = u8::try_from(function.arity()).map_err(|_| LinkError::FunctionTooLarge {
                name: function.name.clone(),
            })?;
            let chunk = lower_function(function)?;
            local.insert(
                &function.name,
                (Address::Compiled(base + offset), function.arity()),
            );
            chunks.push((chunk, arity));
        }

        let mut linked = Vec::with_capacity(chunks.len());
        for (chunk, arity) in chunks {
            let mut imports = Vec::with_capacity(chunk.imports.len());
            for import in &chunk.imports {
                let resolved = local.get(import.name.as_str()).copied().or_else(|| {
                    let address = self.find_symbol(&import.name)?;
                    Some((address, self.arity_of(address)?))
                });
                let (address, expected) = match resolved {
                    Some(resolved) => resolved,
                    None => {
                        debug!(symbol = %import.name, function = %chunk.name, "deferred import");
                        imports.push(None);
                        continue;
                    }
                };
                if expected != import.arity as usize {
                    return Err(LinkError::ArityMismatch {
                        name: import.name.clone(),
                        expected,
                        found: import.arity as usize,
                    });
                }
                imports.push(Some(address));
            }
            linked.push(CompiledFn {
                ident: chunk.name.clone(),
                arity,
                chunk,
                imports,
            });
        }

        let key = self.next_key;
        self.next_key += 1;
        let mut defined = Vec::with_capacity(linked.len());
        for function in linked {
            let index = self.code.len();
            if self.dump_bytecode {
                eprintln!("{}", function.chunk);
            }
            self.symbols
                .entry(function.ident.clone())
                .or_default()
                .push((key, index));
            defined.push((function.ident.clone(), index));
            self.code.push(Some(Rc::new(function)));
        }
        debug!(key, module = module.name(), functions = defined.len(), "linked module");
        self.modules.insert(key, defined);
        Ok(key)
    }

    /// Frees the code and symbols of a module. Returns `false` if `key` is unknown.
    pub fn remove_module(&mut self, key: ModuleKey) -> bool {
        let defined = match self.modules.remove(&key) {
            Some(defined) => defined,
            None => return false,
        };
        for (name, index) in defined {
            self.code[index] = None;
            if let Some(defs) = self.symbols.get_mut(&name) {
                defs.retain(|&(owner, _)| owner != key);
                if defs.is_empty() {
                    self.symbols.remove(&name);
                }
            }
        }
        debug!(key, "removed module");
        true
    }

    /// Number of modules currently linked.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}
