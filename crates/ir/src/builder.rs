//! # IR Builder
//!
//! The construction interface the translation collaborator drives: one
//! factory per instruction kind, all appending to a current insertion block.
//! The builder owns the module and the scope stack and registers the runtime
//! interface before any source construct is translated.
//!
//! Factories check operand types on the way in. A mismatch (storing a float
//! through an i32 pointer, branching on a non-boolean) is a defect in the
//! translator, not a source-program error, and panics immediately.

use crate::instruction::{BinaryOp, CastOp, CmpOp, InstData, InstKind};
use crate::types::TypeKind;
use crate::{runtime, BlockId, FunctionId, InstId, Module, Scopes, TypeId, Value};

/// Builds a module one instruction at a time. See the module docs.
#[derive(Debug)]
pub struct Builder {
    module: Module,
    scopes: Scopes,
    func: Option<FunctionId>,
    block: Option<BlockId>,
}

impl Builder {
    pub fn new() -> Self {
        let mut module = Module::new();
        let mut scopes = Scopes::new();
        runtime::install(&mut module, &mut scopes);
        Self {
            module,
            scopes,
            func: None,
            block: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Direct module access for globals, constants, and extra blocks.
    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }

    /// Hands the finished module to the caller.
    pub fn finish(self) -> Module {
        self.module
    }

    // ------------------------------------------------------------------
    // Position management
    // ------------------------------------------------------------------

    /// Creates a function with an entry block, binds its name in the current
    /// scope, and makes the entry the insertion block.
    pub fn begin_function(
        &mut self,
        name: &str,
        ret: TypeId,
        params: &[(Option<&str>, TypeId)],
    ) -> FunctionId {
        let func = self.module.create_function(name, ret, params);
        self.scopes.define_func(name, func);
        let entry = self.module.create_block(func, Some("entry"));
        self.func = Some(func);
        self.block = Some(entry);
        func
    }

    /// The argument values of a function, in declaration order.
    pub fn arg_values(&self, func: FunctionId) -> Vec<Value> {
        self.module
            .func(func)
            .args()
            .iter()
            .map(|&a| Value::Arg(a))
            .collect()
    }

    /// Creates a detached-from-flow block in the current function.
    pub fn create_block(&mut self, name: Option<&str>) -> BlockId {
        let func = self
            .func
            .unwrap_or_else(|| panic!("creating a block outside a function"));
        self.module.create_block(func, name)
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    // ------------------------------------------------------------------
    // Constants
    // ------------------------------------------------------------------

    pub fn const_i32(&mut self, value: i32) -> Value {
        Value::Const(self.module.const_i32(value))
    }

    pub fn const_float(&mut self, value: f32) -> Value {
        Value::Const(self.module.const_float(value))
    }

    pub fn const_bool(&mut self, value: bool) -> Value {
        Value::Const(self.module.const_bool(value))
    }

    // ------------------------------------------------------------------
    // Instruction factories
    // ------------------------------------------------------------------

    /// Integer or float arithmetic; both operands must share one scalar
    /// type, and shifts are integer-only.
    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.module.value_type(lhs);
        let rhs_ty = self.module.value_type(rhs);
        assert!(
            ty == rhs_ty,
            "binary operand types differ: {:?} vs {:?}",
            self.module.types.kind(ty),
            self.module.types.kind(rhs_ty)
        );
        if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
            assert!(self.module.types.is_int(ty), "shift on non-integer type");
        } else {
            assert!(
                self.module.types.is_int(ty) || self.module.types.is_float(ty),
                "arithmetic on non-scalar type"
            );
        }
        self.append(InstData::new(InstKind::Binary(op), ty, [lhs, rhs]))
    }

    /// Comparison producing an i1.
    pub fn cmp(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> Value {
        let lhs_ty = self.module.value_type(lhs);
        let rhs_ty = self.module.value_type(rhs);
        assert!(lhs_ty == rhs_ty, "comparison operand types differ");
        let ty = self.module.types.bool();
        self.append(InstData::new(InstKind::Cmp(op), ty, [lhs, rhs]))
    }

    /// Reserves a stack slot; the result is a pointer to `ty`.
    pub fn alloca(&mut self, ty: TypeId) -> Value {
        let ptr = self.module.types.pointer(ty);
        self.append(InstData::new(InstKind::Alloca, ptr, []))
    }

    pub fn load(&mut self, address: Value) -> Value {
        let addr_ty = self.module.value_type(address);
        let ty = self
            .module
            .types
            .pointee(addr_ty)
            .unwrap_or_else(|| panic!("load through non-pointer"));
        self.append(InstData::new(InstKind::Load, ty, [address]))
    }

    pub fn store(&mut self, value: Value, address: Value) -> InstId {
        let addr_ty = self.module.value_type(address);
        let pointee = self
            .module
            .types
            .pointee(addr_ty)
            .unwrap_or_else(|| panic!("store through non-pointer"));
        let value_ty = self.module.value_type(value);
        assert!(
            value_ty == pointee,
            "store value type {:?} does not match pointee {:?}",
            self.module.types.kind(value_ty),
            self.module.types.kind(pointee)
        );
        let void = self.module.types.void();
        let inst = InstData::new(InstKind::Store, void, [value, address]);
        self.append_id(inst)
    }

    /// Address computation. The first index displaces the base pointer
    /// without changing its type (array-typed parameters decay to such
    /// pointers); each further index steps one array dimension of the
    /// pointee. The result points at the stepped-to type.
    pub fn gep(&mut self, base: Value, indices: &[Value]) -> Value {
        assert!(!indices.is_empty(), "address computation without indices");
        let base_ty = self.module.value_type(base);
        let mut pointee = self
            .module
            .types
            .pointee(base_ty)
            .unwrap_or_else(|| panic!("address computation on non-pointer"));
        for &index in indices {
            let index_ty = self.module.value_type(index);
            assert!(self.module.types.is_int(index_ty), "non-integer index");
        }
        for _ in &indices[1..] {
            pointee = self
                .module
                .types
                .element(pointee)
                .unwrap_or_else(|| panic!("indexing into non-array type"));
        }
        let ty = self.module.types.pointer(pointee);
        let operands = std::iter::once(base).chain(indices.iter().copied());
        self.append(InstData::new(InstKind::GetElementPtr, ty, operands))
    }

    pub fn cast(&mut self, op: CastOp, value: Value) -> Value {
        let from = self.module.value_type(value);
        let types = &self.module.types;
        let ty = match op {
            CastOp::Zext => {
                assert!(from == types.bool(), "zext source must be i1");
                types.i32()
            }
            CastOp::IntToFloat => {
                assert!(from == types.i32(), "int-to-float source must be i32");
                types.float()
            }
            CastOp::FloatToInt => {
                assert!(types.is_float(from), "float-to-int source must be float");
                types.i32()
            }
        };
        self.append(InstData::new(InstKind::Cast(op), ty, [value]))
    }

    /// Calls a declared or defined function, checking the fixed part of the
    /// signature. The result value is meaningful only for non-void callees.
    pub fn call(&mut self, func: FunctionId, args: &[Value]) -> Value {
        let fn_ty = self.module.func(func).ty;
        let ret = self.module.types.result_of(fn_ty);
        {
            let (params, variadic) = self.module.types.params_of(fn_ty);
            if variadic {
                assert!(args.len() >= params.len(), "too few arguments");
            } else {
                assert!(args.len() == params.len(), "argument count mismatch");
            }
        }
        let (params, _) = self.module.types.params_of(fn_ty);
        let params: Vec<TypeId> = params.to_vec();
        for (i, &param) in params.iter().enumerate() {
            let arg_ty = self.module.value_type(args[i]);
            assert!(
                arg_ty == param,
                "argument {i} type mismatch calling '{}'",
                self.module.func(func).name
            );
        }
        let operands = std::iter::once(Value::Func(func)).chain(args.iter().copied());
        self.append(InstData::new(InstKind::Call, ret, operands))
    }

    /// Introduces a merge point. The phi is placed after any existing phis
    /// at the front of the current block.
    pub fn phi(&mut self, ty: TypeId, incoming: &[(Value, BlockId)]) -> Value {
        let mut operands = Vec::with_capacity(incoming.len() * 2);
        for &(value, block) in incoming {
            assert!(
                self.module.value_type(value) == ty,
                "phi incoming value type mismatch"
            );
            operands.push(value);
            operands.push(Value::Block(block));
        }
        let inst = self.module.create_inst(InstData::new(InstKind::Phi, ty, operands));
        let block = self.insertion_block();
        let pos = self
            .module
            .block(block)
            .insts()
            .iter()
            .take_while(|&&i| matches!(self.module.inst(i).kind, InstKind::Phi))
            .count();
        self.module.insert_inst(block, pos, inst);
        Value::Inst(inst)
    }

    pub fn jump(&mut self, target: BlockId) -> InstId {
        let void = self.module.types.void();
        self.append_id(InstData::new(InstKind::Jump, void, [Value::Block(target)]))
    }

    pub fn branch(&mut self, cond: Value, then_bb: BlockId, else_bb: BlockId) -> InstId {
        let cond_ty = self.module.value_type(cond);
        assert!(cond_ty == self.module.types.bool(), "branch condition must be i1");
        let void = self.module.types.void();
        self.append_id(InstData::new(
            InstKind::Branch,
            void,
            [cond, Value::Block(then_bb), Value::Block(else_bb)],
        ))
    }

    pub fn ret(&mut self, value: Option<Value>) -> InstId {
        let func = self
            .func
            .unwrap_or_else(|| panic!("return outside a function"));
        let expected = self.module.types.result_of(self.module.func(func).ty);
        let void = self.module.types.void();
        match value {
            Some(v) => {
                assert!(
                    self.module.value_type(v) == expected,
                    "return value type mismatch in '{}'",
                    self.module.func(func).name
                );
                self.append_id(InstData::new(InstKind::Ret, void, [v]))
            }
            None => {
                assert!(
                    expected == void,
                    "missing return value in '{}'",
                    self.module.func(func).name
                );
                self.append_id(InstData::new(InstKind::Ret, void, []))
            }
        }
    }

    fn append(&mut self, data: InstData) -> Value {
        Value::Inst(self.append_id(data))
    }

    fn append_id(&mut self, data: InstData) -> InstId {
        let block = self.insertion_block();
        let inst = self.module.create_inst(data);
        self.module.push_inst(block, inst);
        inst
    }

    fn insertion_block(&self) -> BlockId {
        self.block
            .unwrap_or_else(|| panic!("no insertion block selected"))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand used by translation for the common scalar types.
impl Builder {
    pub fn i32_type(&self) -> TypeId {
        self.module.types.i32()
    }

    pub fn float_type(&self) -> TypeId {
        self.module.types.float()
    }

    pub fn void_type(&self) -> TypeId {
        self.module.types.void()
    }

    pub fn array_type(&mut self, elem: TypeId, len: usize) -> TypeId {
        self.module.types.array(elem, len)
    }

    pub fn type_kind(&self, ty: TypeId) -> &TypeKind {
        self.module.types.kind(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BinaryOp, CmpOp};

    #[test]
    fn builds_a_small_function_with_control_flow() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("max", i32_ty, &[(Some("a"), i32_ty), (Some("b"), i32_ty)]);
        let args = b.arg_values(func);
        let then_bb = b.create_block(Some("then"));
        let else_bb = b.create_block(Some("else"));

        let cond = b.cmp(CmpOp::Gt, args[0], args[1]);
        b.branch(cond, then_bb, else_bb);
        b.switch_to_block(then_bb);
        b.ret(Some(args[0]));
        b.switch_to_block(else_bb);
        b.ret(Some(args[1]));

        let module = b.finish();
        let entry = module.func(func).entry();
        assert_eq!(module.block(entry).succs(), &[then_bb, else_bb]);
        assert_eq!(module.block(then_bb).preds(), &[entry]);
        assert_eq!(module.func(func).blocks().len(), 3);
    }

    #[test]
    fn locals_round_trip_through_memory() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        b.begin_function("f", i32_ty, &[]);
        let slot = b.alloca(i32_ty);
        let five = b.const_i32(5);
        b.store(five, slot);
        let loaded = b.load(slot);
        let doubled = b.binary(BinaryOp::Add, loaded, loaded);
        b.ret(Some(doubled));

        let module = b.finish();
        let slot_ty = module.value_type(slot);
        assert_eq!(module.types.pointee(slot_ty), Some(i32_ty));
        assert_eq!(module.value_type(loaded), i32_ty);
    }

    #[test]
    fn address_computation_steps_array_dimensions() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let row = b.array_type(i32_ty, 4);
        let grid = b.array_type(row, 3);
        b.begin_function("f", i32_ty, &[]);
        let base = b.alloca(grid);
        let zero = b.const_i32(0);
        let two = b.const_i32(2);

        // One step per trailing index: [3 x [4 x i32]]* -> [4 x i32]* -> i32*
        let row_ptr = b.gep(base, &[zero, zero]);
        let cell_ptr = b.gep(row_ptr, &[zero, two]);
        let row_ty = b.module().value_type(row_ptr);
        let cell_ty = b.module().value_type(cell_ptr);
        assert_eq!(b.module().types.pointee(row_ty), Some(row));
        assert_eq!(b.module().types.pointee(cell_ty), Some(i32_ty));

        // Both dimensions in a single computation
        let direct = b.gep(base, &[zero, zero, two]);
        assert_eq!(b.module().value_type(direct), cell_ty);

        // A decayed parameter is displaced by its first index only
        let row_ptr_ty = b.module().value_type(row_ptr);
        let g = b.begin_function("g", i32_ty, &[(Some("a"), row_ptr_ty)]);
        let a = b.arg_values(g)[0];
        let elem = b.gep(a, &[two, zero]);
        let elem_ty = b.module().value_type(elem);
        assert_eq!(b.module().types.pointee(elem_ty), Some(i32_ty));
    }

    #[test]
    #[should_panic(expected = "does not match pointee")]
    fn store_type_mismatch_is_fatal() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        b.begin_function("f", i32_ty, &[]);
        let slot = b.alloca(i32_ty);
        let half = b.const_float(0.5);
        b.store(half, slot);
    }

    #[test]
    fn runtime_functions_are_callable_immediately() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        b.begin_function("main", i32_ty, &[]);
        let getint = b.scopes().find_func("getint").unwrap();
        let v = b.call(getint, &[]);
        let putint = b.scopes().find_func("putint").unwrap();
        b.call(putint, &[v]);
        let zero = b.const_i32(0);
        b.ret(Some(zero));

        let module = b.finish();
        assert_eq!(module.value_type(v), i32_ty);
    }
}
