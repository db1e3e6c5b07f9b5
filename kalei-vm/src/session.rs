//! Statement-by-statement compilation and execution.

use crate::codegen::{codegen_prototype, Codegen};
use crate::error::SessionError;
use crate::jit::Jit;
use crate::registry::PrototypeRegistry;
use crate::vm::{Vm, DEFAULT_MAX_CALL_DEPTH};
use kalei_parser::ast::{self, Item, Prototype, ANON_FN_NAME};
use kalei_passes::PassManager;
use kalei_value::ir::Module;
use kalei_value::Value;
use std::mem;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run the optimization passes over every generated function.
    pub optimize: bool,
    /// Print the bytecode of every linked function to stderr.
    pub dump_bytecode: bool,
    /// Nested calls allowed before execution fails with a stack overflow.
    pub max_call_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            dump_bytecode: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Compiles and runs top-level items one at a time.
///
/// Every item is generated into its own compilation unit. Definitions stay resident in the JIT
/// after their unit is retired; later units reach them through the prototype registry.
pub struct Session {
    options: SessionOptions,
    jit: Jit,
    registry: PrototypeRegistry,
    passes: PassManager,
    /// The open compilation unit.
    module: Module,
    units: usize,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let mut jit = Jit::new();
        jit.set_dump_bytecode(options.dump_bytecode);
        Self {
            options,
            jit,
            registry: PrototypeRegistry::new(),
            passes: passes_for(options.optimize),
            module: Module::new("unit0"),
            units: 1,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn registry(&self) -> &PrototypeRegistry {
        &self.registry
    }

    /// Registers a host function that `extern` declarations can bind to.
    pub fn add_native(
        &mut self,
        name: &str,
        arity: u8,
        func: impl Fn(&[Value]) -> Value + 'static,
    ) {
        self.jit.add_native_fn(name, arity, func);
    }

    fn new_unit(&mut self) -> Module {
        let module = Module::new(format!("unit{}", self.units));
        self.units += 1;
        module
    }

    /// Replaces the open unit with a fresh one and returns the old one.
    fn retire_unit(&mut self) -> Module {
        let fresh = self.new_unit();
        mem::replace(&mut self.module, fresh)
    }

    /// Evaluates every item, returning the values of the top-level expressions that succeeded.
    pub fn evaluate(&mut self, items: &[Item]) -> Vec<Value> {
        let mut results = Vec::new();
        for item in items {
            match self.eval_item(item) {
                Ok(Some(value)) => results.push(value),
                Ok(None) => {}
                Err(err) => warn!(item = item.name(), "{}", err),
            }
        }
        results
    }

    /// Compiles one item and, if it is a top-level expression, runs it.
    #[instrument(skip(self, item), fields(item = item.name()))]
    pub fn eval_item(&mut self, item: &Item) -> Result<Option<Value>, SessionError> {
        match item {
            Item::Function(func) if func.proto.is_anonymous() => {
                self.eval_expression(func).map(Some)
            }
            Item::Function(func) => self.eval_definition(func).map(|()| None),
            Item::Extern(proto) => {
                self.eval_extern(proto);
                Ok(None)
            }
        }
    }

    fn eval_expression(&mut self, func: &ast::Function) -> Result<Value, SessionError> {
        if let Err(err) =
            Codegen::codegen_function(&mut self.module, &self.registry, &self.passes, func)
        {
            self.retire_unit();
            return Err(err.into());
        }

        let unit = self.retire_unit();
        let key = self.jit.add_module(&unit)?;
        let address = match self.jit.find_symbol(ANON_FN_NAME) {
            Some(address) => address,
            None => panic!("`{}` is missing after linking {}", ANON_FN_NAME, unit.name()),
        };
        let result = Vm::new(&self.jit, self.options.max_call_depth).call(address, &[]);
        self.jit.remove_module(key);
        debug!(unit = unit.name(), "retired unit");
        Ok(result?)
    }

    fn eval_definition(&mut self, func: &ast::Function) -> Result<(), SessionError> {
        if let Err(err) =
            Codegen::codegen_function(&mut self.module, &self.registry, &self.passes, func)
        {
            self.retire_unit();
            return Err(err.into());
        }

        let previous = self.registry.insert(func.proto.clone());
        let unit = self.retire_unit();
        if let Err(err) = self.jit.add_module(&unit) {
            self.registry.rollback(&func.proto.name, previous);
            return Err(err.into());
        }
        debug!(unit = unit.name(), "retired unit");
        Ok(())
    }

    fn eval_extern(&mut self, proto: &Prototype) {
        self.registry.insert(proto.clone());
        codegen_prototype(&mut self.module, proto);
    }

    /// Prints the IR of every item without running anything.
    ///
    /// Items that fail to generate print `Error during compilation`. `debug` skips optimization.
    pub fn assembly(&mut self, items: &[Item], debug: bool) -> String {
        let passes = passes_for(self.options.optimize && !debug);
        let mut output = String::new();
        for item in items {
            let mut unit = self.new_unit();
            match item {
                Item::Function(func) => {
                    match Codegen::codegen_function(&mut unit, &self.registry, &passes, func) {
                        Ok(()) => {
                            if !func.proto.is_anonymous() {
                                self.registry.insert(func.proto.clone());
                            }
                            if let Some(function) = unit.get_function(&func.proto.name) {
                                output.push_str(&function.to_string());
                            }
                        }
                        Err(err) => {
                            warn!(item = item.name(), "{}", err);
                            output.push_str("Error during compilation\n");
                        }
                    }
                }
                Item::Extern(proto) => {
                    self.registry.insert(proto.clone());
                    codegen_prototype(&mut unit, proto);
                    if let Some(function) = unit.get_function(&proto.name) {
                        output.push_str(&function.to_string());
                    }
                }
            }
        }
        output
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

fn passes_for(optimize: bool) -> PassManager {
    if optimize {
        PassManager::with_default_passes()
    } else {
        PassManager::new()
    }
}
