//! # Runtime Interface
//!
//! The fixed set of externally linked routines every translated program can
//! call: scalar and array I/O, formatted output, timing, and the block
//! memory intrinsics the translator emits for aggregate initialization.
//! They are declared in the module and bound in the outermost scope before
//! translation begins.

use crate::{Module, Scopes, TypeId};

/// Declares the runtime routines in `module` and binds each name in the
/// outermost layer of `scopes`.
pub fn install(module: &mut Module, scopes: &mut Scopes) {
    let void = module.types.void();
    let i32_ty = module.types.i32();
    let float = module.types.float();
    let i32_ptr = module.types.pointer(i32_ty);
    let float_ptr = module.types.pointer(float);
    let i8_ty = module.types.i8();
    let i8_ptr = module.types.pointer(i8_ty);

    let mut declare = |module: &mut Module, name: &str, ret: TypeId, params: Vec<TypeId>| {
        let ty = module.types.function(ret, params);
        let func = module.declare_function(name, ty);
        scopes.define_func(name, func);
    };

    declare(module, "getint", i32_ty, vec![]);
    declare(module, "getch", i32_ty, vec![]);
    declare(module, "getfloat", float, vec![]);
    declare(module, "getarray", i32_ty, vec![i32_ptr]);
    declare(module, "getfarray", i32_ty, vec![float_ptr]);
    declare(module, "putint", void, vec![i32_ty]);
    declare(module, "putch", void, vec![i32_ty]);
    declare(module, "putfloat", void, vec![float]);
    declare(module, "putarray", void, vec![i32_ty, i32_ptr]);
    declare(module, "putfarray", void, vec![i32_ty, float_ptr]);
    declare(module, "starttime", void, vec![]);
    declare(module, "stoptime", void, vec![]);
    declare(module, "memcpy", void, vec![i32_ptr, i32_ptr, i32_ty]);
    declare(module, "memclr", void, vec![i32_ptr, i32_ty]);
    declare(module, "memset", void, vec![i32_ptr, i32_ty, i32_ty]);

    // Formatted output takes a string and a variable tail
    let putf_ty = module.types.variadic_function(void, vec![i8_ptr]);
    let putf = module.declare_function("putf", putf_ty);
    scopes.define_func("putf", putf);
}
