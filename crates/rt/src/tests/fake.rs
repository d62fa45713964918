//! A minimal `CoreEngine` double: no decoder, no interpreter, just enough
//! bookkeeping to let the instantiation and canonical-ABI tests exercise the
//! real resolution/lowering code paths without a real core-Wasm engine.
//!
//! Since there is no bytecode to interpret, a fake module's behavior is
//! named directly in its `CoreModuleDef::bytes` as a short UTF-8 tag (e.g.
//! `b"identity"`), parsed back out in `instantiate_core_module`. Every fake
//! module exposes the same export shape: an optional func at `"run"`, a
//! `"memory"` export, and a bump-allocator `"realloc"` export — whichever of
//! those a test's core-instantiate args actually wire up is up to the
//! `Definition` under test.

use crate::core_iface::{
    CoreEngine, CoreExternRef, CoreFuncRef, CoreFuncTypeHandle, CoreGlobalRef, CoreImportBinding,
    CoreInstanceHandle, CoreMemoryRef, CoreTableRef,
};
use std::cell::RefCell;
use std::rc::Rc;
use weave_ir::{CoreFuncType, CoreGlobalType, CoreMemoryType, CoreModuleDef, CoreTableType, Limits};

#[derive(Clone)]
enum FuncBehavior {
    Identity,
    UppercaseEcho,
    CallImport { import_index: usize, arg: u64 },
    AppendToLog,
    BumpCounter,
    RecordPostReturn,
    None,
}

struct FakeInstance {
    func: FuncBehavior,
    imports: Vec<CoreImportBinding>,
    memory: RefCell<Vec<u8>>,
    bump: RefCell<u32>,
    /// The module's own declared signature, kept around so `func_type`/
    /// `memory_type`/etc. can hand back the actual declared type for a
    /// handle instead of a placeholder — real type-checking (§4.1/§4.3)
    /// needs to see what this instance's exports were actually declared as.
    ty: weave_ir::CoreModuleType,
}

pub struct FakeCoreEngine {
    instances: Vec<FakeInstance>,
    pub teardown_log: Rc<RefCell<Vec<u64>>>,
    pub call_log: Rc<RefCell<Vec<u64>>>,
    pub start_counter: Rc<RefCell<u32>>,
    pub post_return_counter: Rc<RefCell<u32>>,
    pub instantiate_count: Rc<RefCell<u32>>,
}

impl FakeCoreEngine {
    pub fn new() -> Self {
        FakeCoreEngine {
            instances: Vec::new(),
            teardown_log: Rc::new(RefCell::new(Vec::new())),
            call_log: Rc::new(RefCell::new(Vec::new())),
            start_counter: Rc::new(RefCell::new(0)),
            post_return_counter: Rc::new(RefCell::new(0)),
            instantiate_count: Rc::new(RefCell::new(0)),
        }
    }

    fn inst(&self, h: CoreInstanceHandle) -> &FakeInstance {
        &self.instances[h.0 as usize]
    }

    fn declared_export(&self, instance: CoreInstanceHandle, name: &str) -> Option<&weave_ir::CoreExternType> {
        self.inst(instance).ty.exports.iter().find(|(n, _)| n == name).map(|(_, ty)| ty)
    }

    fn parse_behavior(tag: &str) -> FuncBehavior {
        if tag == "identity" {
            FuncBehavior::Identity
        } else if tag == "uppercase_echo" {
            FuncBehavior::UppercaseEcho
        } else if let Some(rest) = tag.strip_prefix("call_import:") {
            let import_index: usize = rest.parse().expect("test tag carries a valid import index");
            FuncBehavior::CallImport { import_index, arg: 42 }
        } else if tag == "append_log" {
            FuncBehavior::AppendToLog
        } else if tag == "bump_counter" {
            FuncBehavior::BumpCounter
        } else if tag == "record_post_return" {
            FuncBehavior::RecordPostReturn
        } else {
            FuncBehavior::None
        }
    }
}

/// Build a throwaway `CoreModuleDef` whose `bytes` carry `tag`, the fake
/// dispatch key, alongside the type every fake test gives its modules
/// (callers fill in only the parts they actually exercise).
pub fn module_def(tag: &str, ty: weave_ir::CoreModuleType) -> CoreModuleDef {
    CoreModuleDef { bytes: std::sync::Arc::from(tag.as_bytes()), ty }
}

/// Encode which instance and which of its two possible funcs (`run` = 0,
/// `realloc` = 1) a `CoreFuncTypeHandle` stands for, so `func_type` can look
/// the real declared signature back up without the trait needing a fuller
/// ref type. Test-double plumbing only — a real core engine would key this
/// off its own signature table.
fn func_type_handle(instance: CoreInstanceHandle, which: u32) -> CoreFuncTypeHandle {
    CoreFuncTypeHandle(instance.0 as u32 * 2 + which)
}

fn decode_func_type_handle(handle: CoreFuncTypeHandle) -> (CoreInstanceHandle, u32) {
    (CoreInstanceHandle((handle.0 / 2) as u64), handle.0 % 2)
}

impl CoreEngine for FakeCoreEngine {
    fn instantiate_core_module(
        &mut self,
        module: &CoreModuleDef,
        imports: &[CoreImportBinding],
    ) -> anyhow::Result<CoreInstanceHandle> {
        *self.instantiate_count.borrow_mut() += 1;
        let tag = std::str::from_utf8(&module.bytes).unwrap_or("");
        let func = Self::parse_behavior(tag);
        self.instances.push(FakeInstance {
            func,
            imports: imports.to_vec(),
            memory: RefCell::new(vec![0u8; 1 << 16]),
            bump: RefCell::new(0),
            ty: module.ty.clone(),
        });
        Ok(CoreInstanceHandle((self.instances.len() - 1) as u64))
    }

    fn deinstantiate_core_module(&mut self, handle: CoreInstanceHandle) -> anyhow::Result<()> {
        self.teardown_log.borrow_mut().push(handle.0);
        Ok(())
    }

    fn get_export(&self, instance: CoreInstanceHandle, name: &str) -> Option<CoreExternRef> {
        let inst = self.inst(instance);
        match name {
            "run" if !matches!(inst.func, FuncBehavior::None) => {
                Some(CoreExternRef::Func(CoreFuncRef { instance, export_index: 0, ty: func_type_handle(instance, 0) }))
            }
            "memory" => Some(CoreExternRef::Memory(CoreMemoryRef { instance, export_index: 0 })),
            "realloc" => Some(CoreExternRef::Func(CoreFuncRef { instance, export_index: 1, ty: func_type_handle(instance, 1) })),
            _ => None,
        }
    }

    fn func_type(&self, handle: CoreFuncTypeHandle) -> CoreFuncType {
        let (instance, which) = decode_func_type_handle(handle);
        let name = if which == 0 { "run" } else { "realloc" };
        self.declared_export(instance, name)
            .and_then(|ext| match ext {
                weave_ir::CoreExternType::Func(f) => Some(f.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn memory_type(&self, mem: CoreMemoryRef) -> CoreMemoryType {
        self.declared_export(mem.instance, "memory")
            .and_then(|ext| match ext {
                weave_ir::CoreExternType::Memory(m) => Some(*m),
                _ => None,
            })
            .unwrap_or(CoreMemoryType { limits: Limits { min: 1, max: None }, shared: false, memory64: false })
    }

    fn table_type(&self, table: CoreTableRef) -> CoreTableType {
        self.declared_export(table.instance, "table")
            .and_then(|ext| match ext {
                weave_ir::CoreExternType::Table(t) => Some(*t),
                _ => None,
            })
            .unwrap_or(CoreTableType { element: weave_ir::CoreValType::FuncRef, limits: Limits { min: 0, max: None } })
    }

    fn global_type(&self, global: CoreGlobalRef) -> CoreGlobalType {
        self.declared_export(global.instance, "global")
            .and_then(|ext| match ext {
                weave_ir::CoreExternType::Global(g) => Some(*g),
                _ => None,
            })
            .unwrap_or(CoreGlobalType { value_type: weave_ir::CoreValType::I32, mutable: false })
    }

    fn call_wasm(&mut self, func: CoreFuncRef, args: &[u64]) -> anyhow::Result<Vec<u64>> {
        // export_index 1 is always the bump-allocator realloc, regardless
        // of the instance's own func behavior.
        if func.export_index == 1 {
            let inst = self.inst(func.instance);
            let new_size = args[3] as u32;
            let mut bump = inst.bump.borrow_mut();
            let ptr = *bump;
            *bump += new_size;
            return Ok(vec![ptr as u64]);
        }

        let behavior = self.inst(func.instance).func.clone();
        match behavior {
            FuncBehavior::Identity => Ok(vec![args[0]]),
            FuncBehavior::UppercaseEcho => {
                let ptr = args[0] as u32;
                let len = args[1] as u32;
                let inst = self.inst(func.instance);
                let s = {
                    let mem = inst.memory.borrow();
                    std::str::from_utf8(&mem[ptr as usize..(ptr + len) as usize])?.to_uppercase()
                };
                let new_ptr = {
                    let mut bump = inst.bump.borrow_mut();
                    let p = *bump;
                    *bump += s.len() as u32;
                    p
                };
                inst.memory.borrow_mut()[new_ptr as usize..new_ptr as usize + s.len()].copy_from_slice(s.as_bytes());
                Ok(vec![new_ptr as u64, s.len() as u64])
            }
            FuncBehavior::CallImport { import_index, arg } => {
                let target = self.inst(func.instance).imports[import_index].clone();
                let target_func = match target.item {
                    CoreExternRef::Func(f) => f,
                    _ => anyhow::bail!("import is not a func"),
                };
                let result = self.call_wasm(target_func, &[arg])?;
                Ok(result)
            }
            FuncBehavior::AppendToLog => {
                self.call_log.borrow_mut().push(args[0]);
                Ok(vec![args[0]])
            }
            FuncBehavior::BumpCounter => {
                *self.start_counter.borrow_mut() += 1;
                Ok(vec![])
            }
            FuncBehavior::RecordPostReturn => {
                *self.post_return_counter.borrow_mut() += 1;
                Ok(vec![])
            }
            FuncBehavior::None => anyhow::bail!("this instance has no callable func"),
        }
    }

    fn read_memory(&self, memory: CoreMemoryRef, offset: u32, len: u32) -> anyhow::Result<Vec<u8>> {
        let inst = self.inst(memory.instance);
        Ok(inst.memory.borrow()[offset as usize..(offset + len) as usize].to_vec())
    }

    fn write_memory(&mut self, memory: CoreMemoryRef, offset: u32, bytes: &[u8]) -> anyhow::Result<()> {
        let inst = self.inst(memory.instance);
        inst.memory.borrow_mut()[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_global(&self, _global: CoreGlobalRef) -> anyhow::Result<u64> {
        Ok(0)
    }
}
