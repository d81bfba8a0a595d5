//! # Textual Rendering
//!
//! Renders a module to a deterministic, assembly-like text: one line per
//! global, `declare` lines for external functions, and a `define` body with
//! one label plus indented instruction lines per block. The output is meant
//! for golden-file tests and debugging, not for parsing back.
//!
//! Within a function, named arguments and blocks keep their names; every
//! other value and block is numbered in one sequence, arguments first, then
//! blocks and results in layout order.

use std::fmt;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::instruction::InstKind;
use crate::module::{ConstKind, Initializer};
use crate::types::TypeKind;
use crate::{indent_str, FunctionId, InstId, Module, TypeId, TypeStore, Value};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for id in self.global_ids() {
            let data = self.global(id);
            writeln!(
                f,
                "@{} = global {} {}",
                data.name,
                type_str(&self.types, data.ty),
                init_str(&self.types, &data.init)
            )?;
            wrote = true;
        }
        for func in self.functions() {
            if wrote {
                writeln!(f)?;
            }
            write_function(self, func, f)?;
            wrote = true;
        }
        Ok(())
    }
}

/// The textual spelling of a type.
pub fn type_str(types: &TypeStore, ty: TypeId) -> String {
    match types.kind(ty) {
        TypeKind::Void => "void".to_string(),
        TypeKind::Label => "label".to_string(),
        TypeKind::Int(bits) => format!("i{bits}"),
        TypeKind::Float => "float".to_string(),
        TypeKind::Pointer(p) => format!("{}*", type_str(types, *p)),
        TypeKind::Array { elem, len } => format!("[{} x {}]", len, type_str(types, *elem)),
        TypeKind::Function {
            ret,
            params,
            variadic,
        } => {
            let params = params
                .iter()
                .map(|&p| type_str(types, p))
                .chain(variadic.then(|| "...".to_string()))
                .join(", ");
            format!("{} ({})", type_str(types, *ret), params)
        }
    }
}

fn init_str(types: &TypeStore, init: &Initializer) -> String {
    match init {
        Initializer::Zero => "zeroinitializer".to_string(),
        Initializer::Int(v) => v.to_string(),
        Initializer::Float(v) => format!("{v:?}"),
        Initializer::Array(elems) => {
            let body = elems.iter().map(|e| elem_init_str(types, e)).join(", ");
            format!("[{body}]")
        }
    }
}

fn elem_init_str(types: &TypeStore, init: &Initializer) -> String {
    match init {
        Initializer::Int(v) => format!("i32 {v}"),
        Initializer::Float(v) => format!("float {v:?}"),
        Initializer::Zero => "zeroinitializer".to_string(),
        Initializer::Array(_) => init_str(types, init),
    }
}

fn write_function(
    module: &Module,
    func: FunctionId,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let data = module.func(func);
    let types = &module.types;
    let ret = types.result_of(data.ty);
    if data.external {
        let (params, variadic) = types.params_of(data.ty);
        let params = params
            .iter()
            .map(|&p| type_str(types, p))
            .chain(variadic.then(|| "...".to_string()))
            .join(", ");
        return writeln!(
            f,
            "declare {} @{}({})",
            type_str(types, ret),
            data.name,
            params
        );
    }

    let names = assign_names(module, func);
    let params = data
        .args()
        .iter()
        .map(|&a| {
            format!(
                "{} %{}",
                type_str(types, module.arg(a).ty),
                names[&Value::Arg(a)]
            )
        })
        .join(", ");
    writeln!(
        f,
        "define {} @{}({}) {{",
        type_str(types, ret),
        data.name,
        params
    )?;
    for (i, &block) in data.blocks().iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        writeln!(f, "{}:", names[&Value::Block(block)])?;
        for &inst in module.block(block).insts() {
            writeln!(f, "{}{}", indent_str(1), inst_str(module, inst, &names))?;
        }
    }
    writeln!(f, "}}")
}

/// Numbers the unnamed entities of one function: arguments first, then
/// blocks and instruction results in layout order. Named arguments and
/// blocks keep their names and consume no number.
fn assign_names(module: &Module, func: FunctionId) -> FxHashMap<Value, String> {
    let mut names = FxHashMap::default();
    let mut counter = 0usize;
    let mut next = move || {
        let n = counter.to_string();
        counter += 1;
        n
    };

    let data = module.func(func);
    for &arg in data.args() {
        let name = match &module.arg(arg).name {
            Some(n) => n.clone(),
            None => next(),
        };
        names.insert(Value::Arg(arg), name);
    }
    for &block in data.blocks() {
        let name = match &module.block(block).name {
            Some(n) => n.clone(),
            None => next(),
        };
        names.insert(Value::Block(block), name);
        for &inst in module.block(block).insts() {
            if module.inst(inst).produces_value(&module.types) {
                names.insert(Value::Inst(inst), next());
            }
        }
    }
    names
}

fn value_str(module: &Module, names: &FxHashMap<Value, String>, value: Value) -> String {
    match value {
        Value::Inst(_) | Value::Arg(_) | Value::Block(_) => {
            let name = names
                .get(&value)
                .unwrap_or_else(|| panic!("rendering a value from another function: {value:?}"));
            format!("%{name}")
        }
        Value::Const(id) => match module.constant(id).kind {
            ConstKind::Int(v) => v.to_string(),
            ConstKind::Float(v) => format!("{v:?}"),
            ConstKind::Zero => "zeroinitializer".to_string(),
        },
        Value::Global(id) => format!("@{}", module.global(id).name),
        Value::Func(id) => format!("@{}", module.func(id).name),
    }
}

fn typed_value_str(module: &Module, names: &FxHashMap<Value, String>, value: Value) -> String {
    format!(
        "{} {}",
        type_str(&module.types, module.value_type(value)),
        value_str(module, names, value)
    )
}

fn inst_str(module: &Module, inst: InstId, names: &FxHashMap<Value, String>) -> String {
    let data = module.inst(inst);
    let types = &module.types;
    let val = |v: Value| value_str(module, names, v);
    let result = || format!("%{}", names[&Value::Inst(inst)]);

    match data.kind {
        InstKind::Binary(op) => {
            let mnemonic = if types.is_float(data.ty) {
                op.float_mnemonic()
                    .unwrap_or_else(|| panic!("float shift instruction"))
            } else {
                op.mnemonic()
            };
            format!(
                "{} = {} {} {}, {}",
                result(),
                mnemonic,
                type_str(types, data.ty),
                val(data.operands()[0]),
                val(data.operands()[1])
            )
        }
        InstKind::Cmp(op) => {
            let operand_ty = module.value_type(data.operands()[0]);
            let (inst_name, pred) = if types.is_float(operand_ty) {
                ("fcmp", op.float_mnemonic())
            } else {
                ("icmp", op.mnemonic())
            };
            format!(
                "{} = {} {} {} {}, {}",
                result(),
                inst_name,
                pred,
                type_str(types, operand_ty),
                val(data.operands()[0]),
                val(data.operands()[1])
            )
        }
        InstKind::Alloca => {
            let slot = types
                .pointee(data.ty)
                .unwrap_or_else(|| panic!("alloca with non-pointer result"));
            format!("{} = alloca {}", result(), type_str(types, slot))
        }
        InstKind::Load => {
            let addr = data.load_address();
            format!(
                "{} = load {}, {}",
                result(),
                type_str(types, data.ty),
                typed_value_str(module, names, addr)
            )
        }
        InstKind::Store => {
            let (value, addr) = data.store_parts();
            format!(
                "store {}, {}",
                typed_value_str(module, names, value),
                typed_value_str(module, names, addr)
            )
        }
        InstKind::GetElementPtr => {
            let base = data.operands()[0];
            let base_ty = module.value_type(base);
            let pointee = types
                .pointee(base_ty)
                .unwrap_or_else(|| panic!("address computation on non-pointer"));
            let indices = data.operands()[1..]
                .iter()
                .map(|&idx| typed_value_str(module, names, idx))
                .join(", ");
            format!(
                "{} = getelementptr {}, {}, {}",
                result(),
                type_str(types, pointee),
                typed_value_str(module, names, base),
                indices
            )
        }
        InstKind::Cast(op) => {
            let from = data.operands()[0];
            format!(
                "{} = {} {} to {}",
                result(),
                op.mnemonic(),
                typed_value_str(module, names, from),
                type_str(types, data.ty)
            )
        }
        InstKind::Call => {
            let args = data
                .call_args()
                .iter()
                .map(|&a| typed_value_str(module, names, a))
                .join(", ");
            let callee = val(data.callee());
            if data.produces_value(types) {
                format!(
                    "{} = call {} {}({})",
                    result(),
                    type_str(types, data.ty),
                    callee,
                    args
                )
            } else {
                format!("call void {callee}({args})")
            }
        }
        InstKind::Phi => {
            let incoming = data
                .phi_incoming()
                .map(|(v, b)| format!("[ {}, {} ]", val(v), val(Value::Block(b))))
                .join(", ");
            format!(
                "{} = phi {} {}",
                result(),
                type_str(types, data.ty),
                incoming
            )
        }
        InstKind::Jump => format!("br label {}", val(Value::Block(data.jump_target()))),
        InstKind::Branch => {
            let (cond, then_bb, else_bb) = data.branch_parts();
            format!(
                "br i1 {}, label {}, label {}",
                val(cond),
                val(Value::Block(then_bb)),
                val(Value::Block(else_bb))
            )
        }
        InstKind::Ret => match data.ret_value() {
            Some(v) => format!("ret {}", typed_value_str(module, names, v)),
            None => "ret void".to_string(),
        },
    }
}
