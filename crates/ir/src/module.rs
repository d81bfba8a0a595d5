//! # Module
//!
//! The module is the arena owner of everything in the IR: types, constants,
//! globals, functions, blocks, instructions, and arguments all live in
//! per-kind tables indexed by typed ids. Removed entities leave a tombstone
//! behind; touching a stale id panics instead of reading freed memory, so a
//! pass holding an outdated handle fails fast at the first access.
//!
//! All graph rewriting goes through this type. The mutators maintain two
//! structural invariants continuously:
//!
//! - **Use-def symmetry**: `inst.operands[i] == v` exactly when `v`'s use
//!   list contains `Use { user: inst, index: i }`.
//! - **Edge consistency**: a block's successor list mirrors the target slots
//!   of its terminator, one entry per slot, and every successor entry is
//!   matched by a predecessor entry on the other side.
//!
//! The use-def operations only rewire edges; they never allocate new
//! instructions.

use index_vec::IndexVec;
use rustc_hash::FxHashMap;

use crate::instruction::InstKind;
use crate::{
    ArgData, ArgId, BlockData, BlockId, ConstId, FunctionData, FunctionId, GlobalId, InstData,
    InstId, TypeId, TypeStore, Use, Value,
};

/// An interned constant.
#[derive(Debug, Clone)]
pub struct ConstData {
    pub ty: TypeId,
    pub kind: ConstKind,
    pub(crate) uses: Vec<Use>,
}

impl ConstData {
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// The integer payload, or None for float and zero constants.
    pub const fn as_int(&self) -> Option<i64> {
        match self.kind {
            ConstKind::Int(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f32> {
        match self.kind {
            ConstKind::Float(v) => Some(v),
            _ => None,
        }
    }
}

/// The payload of a constant. Two constants with the same type and payload
/// are the same [`ConstId`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstKind {
    Int(i64),
    Float(f32),
    /// All-zero value of an aggregate type
    Zero,
}

/// Interning key; floats are keyed by bit pattern so that interning has
/// identity semantics (0.0 and -0.0 are distinct constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(i64),
    Float(u32),
    Zero,
}

impl ConstKind {
    fn key(self) -> ConstKey {
        match self {
            Self::Int(v) => ConstKey::Int(v),
            Self::Float(v) => ConstKey::Float(v.to_bits()),
            Self::Zero => ConstKey::Zero,
        }
    }
}

/// A module-level variable. The value of `Value::Global` is the variable's
/// address, so its value type is a pointer to `ty`.
#[derive(Debug, Clone)]
pub struct GlobalData {
    pub name: String,
    /// The stored type
    pub ty: TypeId,
    /// Pointer to `ty`, the type of the global used as an operand
    pub ptr_ty: TypeId,
    pub init: Initializer,
    pub(crate) uses: Vec<Use>,
}

impl GlobalData {
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

/// A static initializer for a global.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    /// Zero-filled storage
    Zero,
    Int(i64),
    Float(f32),
    Array(Vec<Initializer>),
}

/// The arena owner of the whole IR. See the module-level docs for the
/// invariants the mutators maintain.
#[derive(Debug, Clone)]
pub struct Module {
    pub types: TypeStore,
    funcs: IndexVec<FunctionId, Option<FunctionData>>,
    blocks: IndexVec<BlockId, Option<BlockData>>,
    insts: IndexVec<InstId, Option<InstData>>,
    args: IndexVec<ArgId, Option<ArgData>>,
    consts: IndexVec<ConstId, ConstData>,
    globals: IndexVec<GlobalId, GlobalData>,
    interned_consts: FxHashMap<(TypeId, ConstKey), ConstId>,
    func_names: FxHashMap<String, FunctionId>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            types: TypeStore::new(),
            funcs: IndexVec::new(),
            blocks: IndexVec::new(),
            insts: IndexVec::new(),
            args: IndexVec::new(),
            consts: IndexVec::new(),
            globals: IndexVec::new(),
            interned_consts: FxHashMap::default(),
            func_names: FxHashMap::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors. Tombstoned ids are a contract violation and panic.
    // ------------------------------------------------------------------

    pub fn func(&self, id: FunctionId) -> &FunctionData {
        self.funcs[id]
            .as_ref()
            .unwrap_or_else(|| panic!("access to removed function {id:?}"))
    }

    pub(crate) fn func_mut(&mut self, id: FunctionId) -> &mut FunctionData {
        self.funcs[id]
            .as_mut()
            .unwrap_or_else(|| panic!("access to removed function {id:?}"))
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        self.blocks[id]
            .as_ref()
            .unwrap_or_else(|| panic!("access to removed block {id:?}"))
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        self.blocks[id]
            .as_mut()
            .unwrap_or_else(|| panic!("access to removed block {id:?}"))
    }

    pub fn inst(&self, id: InstId) -> &InstData {
        self.insts[id]
            .as_ref()
            .unwrap_or_else(|| panic!("access to removed instruction {id:?}"))
    }

    pub(crate) fn inst_mut(&mut self, id: InstId) -> &mut InstData {
        self.insts[id]
            .as_mut()
            .unwrap_or_else(|| panic!("access to removed instruction {id:?}"))
    }

    pub fn arg(&self, id: ArgId) -> &ArgData {
        self.args[id]
            .as_ref()
            .unwrap_or_else(|| panic!("access to removed argument {id:?}"))
    }

    pub fn constant(&self, id: ConstId) -> &ConstData {
        &self.consts[id]
    }

    pub fn global(&self, id: GlobalId) -> &GlobalData {
        &self.globals[id]
    }

    /// Live functions in creation order.
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.funcs
            .iter_enumerated()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalId> + '_ {
        self.globals.iter_enumerated().map(|(id, _)| id)
    }

    pub fn func_by_name(&self, name: &str) -> Option<FunctionId> {
        self.func_names.get(name).copied()
    }

    /// The type of any value.
    pub fn value_type(&self, value: Value) -> TypeId {
        match value {
            Value::Inst(id) => self.inst(id).ty,
            Value::Arg(id) => self.arg(id).ty,
            Value::Const(id) => self.constant(id).ty,
            Value::Global(id) => self.global(id).ptr_ty,
            Value::Func(id) => self.func(id).ty,
            Value::Block(_) => self.types.label(),
        }
    }

    /// Current users of a value, one record per operand slot.
    pub fn uses_of(&self, value: Value) -> &[Use] {
        match value {
            Value::Inst(id) => &self.inst(id).uses,
            Value::Arg(id) => &self.arg(id).uses,
            Value::Const(id) => &self.constant(id).uses,
            Value::Global(id) => &self.global(id).uses,
            Value::Func(id) => &self.func(id).uses,
            Value::Block(id) => &self.block(id).uses,
        }
    }

    // ------------------------------------------------------------------
    // Entity creation
    // ------------------------------------------------------------------

    /// Creates a defined function with the given result and parameter types.
    /// The body starts empty; the first block created for it is the entry.
    pub fn create_function(
        &mut self,
        name: &str,
        ret: TypeId,
        params: &[(Option<&str>, TypeId)],
    ) -> FunctionId {
        let param_tys = params.iter().map(|&(_, ty)| ty).collect();
        let ty = self.types.function(ret, param_tys);
        let id = self.register_function(name, ty, false);
        for (index, &(pname, pty)) in params.iter().enumerate() {
            let arg = self
                .args
                .push(Some(ArgData::new(pname.map(String::from), pty, id, index)));
            self.func_mut(id).args.push(arg);
        }
        id
    }

    /// Declares an external function with a prebuilt function type. External
    /// functions have no body and no argument values.
    pub fn declare_function(&mut self, name: &str, ty: TypeId) -> FunctionId {
        self.register_function(name, ty, true)
    }

    fn register_function(&mut self, name: &str, ty: TypeId, external: bool) -> FunctionId {
        assert!(
            !self.func_names.contains_key(name),
            "duplicate function name '{name}'"
        );
        let id = self
            .funcs
            .push(Some(FunctionData::new(name.to_string(), ty, external)));
        self.func_names.insert(name.to_string(), id);
        id
    }

    /// Creates an empty block at the end of the function's block list.
    pub fn create_block(&mut self, func: FunctionId, name: Option<&str>) -> BlockId {
        assert!(
            !self.func(func).external,
            "adding a block to external function '{}'",
            self.func(func).name
        );
        let id = self
            .blocks
            .push(Some(BlockData::new(func, name.map(String::from))));
        self.func_mut(func).blocks.push(id);
        id
    }

    /// Registers an instruction in the arena and wires a use record for each
    /// of its operand slots. The instruction starts detached; insert it with
    /// one of the sequence mutators.
    pub fn create_inst(&mut self, data: InstData) -> InstId {
        debug_assert!(data.parent.is_none() && data.uses.is_empty());
        let operands: Vec<Value> = data.operands.iter().copied().collect();
        let id = self.insts.push(Some(data));
        for (index, value) in operands.into_iter().enumerate() {
            self.link_use(value, Use::new(id, index));
        }
        id
    }

    pub fn const_int(&mut self, ty: TypeId, value: i64) -> ConstId {
        self.intern_const(ty, ConstKind::Int(value))
    }

    pub fn const_i32(&mut self, value: i32) -> ConstId {
        let ty = self.types.i32();
        self.const_int(ty, i64::from(value))
    }

    pub fn const_bool(&mut self, value: bool) -> ConstId {
        let ty = self.types.bool();
        self.const_int(ty, i64::from(value))
    }

    pub fn const_float(&mut self, value: f32) -> ConstId {
        let ty = self.types.float();
        self.intern_const(ty, ConstKind::Float(value))
    }

    pub fn const_zero(&mut self, ty: TypeId) -> ConstId {
        self.intern_const(ty, ConstKind::Zero)
    }

    fn intern_const(&mut self, ty: TypeId, kind: ConstKind) -> ConstId {
        let key = (ty, kind.key());
        if let Some(&id) = self.interned_consts.get(&key) {
            return id;
        }
        let id = self.consts.push(ConstData {
            ty,
            kind,
            uses: Vec::new(),
        });
        self.interned_consts.insert(key, id);
        id
    }

    pub fn create_global(&mut self, name: &str, ty: TypeId, init: Initializer) -> GlobalId {
        let ptr_ty = self.types.pointer(ty);
        self.globals.push(GlobalData {
            name: name.to_string(),
            ty,
            ptr_ty,
            init,
            uses: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Use-def operations
    // ------------------------------------------------------------------

    /// Redirects one operand slot to a new value, moving the slot's use
    /// record from the old value's list to the new one's. Rewiring a target
    /// slot of an inserted terminator also updates the CFG edges.
    pub fn set_operand(&mut self, user: InstId, index: usize, value: Value) {
        let inst = self.inst(user);
        let old = inst.operands[index];
        if old == value {
            return;
        }
        let edge_slot = inst.parent.is_some() && is_target_slot(inst.kind, index);
        if edge_slot {
            self.unwire_edges(user);
        }
        self.unlink_use(old, Use::new(user, index));
        self.inst_mut(user).operands[index] = value;
        self.link_use(value, Use::new(user, index));
        if edge_slot {
            self.wire_edges(user);
        }
    }

    /// Redirects every current use of `old` to `new`. Afterwards `old`'s use
    /// list is empty; callers inspecting it after this call see no users.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        assert!(old != new, "replacing a value with itself");
        let records = std::mem::take(self.uses_vec_mut(old));
        for record in records {
            let inst = self.inst(record.user);
            debug_assert!(
                inst.operands[record.index] == old,
                "use record out of sync with operand slot"
            );
            let edge_slot = inst.parent.is_some() && is_target_slot(inst.kind, record.index);
            if edge_slot {
                self.unwire_edges(record.user);
            }
            self.inst_mut(record.user).operands[record.index] = new;
            self.link_use(new, record);
            if edge_slot {
                self.wire_edges(record.user);
            }
        }
    }

    /// Removes one use record from a value's list. Returns false if the
    /// record is not present, so double-removal is detectable rather than
    /// corrupting the list.
    pub fn remove_use(&mut self, value: Value, record: Use) -> bool {
        match self.try_uses_vec_mut(value) {
            Some(uses) => match uses.iter().position(|u| *u == record) {
                Some(at) => {
                    uses.remove(at);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    fn link_use(&mut self, value: Value, record: Use) {
        self.uses_vec_mut(value).push(record);
    }

    /// Unlinks a use record, tolerating an already-removed definition.
    /// Tolerance is only reachable while purging unreachable regions, where
    /// mutually referencing entities are torn down in arbitrary order.
    fn unlink_use(&mut self, value: Value, record: Use) {
        if let Some(uses) = self.try_uses_vec_mut(value) {
            let at = uses
                .iter()
                .position(|u| *u == record)
                .unwrap_or_else(|| panic!("use record {record:?} missing from {value:?}"));
            uses.remove(at);
        }
    }

    fn uses_vec_mut(&mut self, value: Value) -> &mut Vec<Use> {
        self.try_uses_vec_mut(value)
            .unwrap_or_else(|| panic!("access to removed value {value:?}"))
    }

    fn try_uses_vec_mut(&mut self, value: Value) -> Option<&mut Vec<Use>> {
        match value {
            Value::Inst(id) => self.insts[id].as_mut().map(|d| &mut d.uses),
            Value::Arg(id) => self.args[id].as_mut().map(|d| &mut d.uses),
            Value::Const(id) => Some(&mut self.consts[id].uses),
            Value::Global(id) => Some(&mut self.globals[id].uses),
            Value::Func(id) => self.funcs[id].as_mut().map(|d| &mut d.uses),
            Value::Block(id) => self.blocks[id].as_mut().map(|d| &mut d.uses),
        }
    }

    // ------------------------------------------------------------------
    // Instruction sequence mutators
    // ------------------------------------------------------------------

    /// Inserts a free instruction at `pos` in the block. Terminators must
    /// land in last position of an unterminated block; non-terminators may
    /// not be placed after the terminator.
    pub fn insert_inst(&mut self, block: BlockId, pos: usize, inst: InstId) {
        assert!(
            self.inst(inst).parent.is_none(),
            "instruction {inst:?} is already inserted"
        );
        let len = self.block(block).insts.len();
        let terminated = self.terminator(block).is_some();
        if self.inst(inst).is_terminator() {
            assert!(
                !terminated && pos == len,
                "terminator must be the last instruction of an unterminated block"
            );
        } else {
            assert!(pos <= len, "insertion position {pos} out of bounds");
            assert!(
                !(terminated && pos == len),
                "inserting past the terminator"
            );
        }
        self.block_mut(block).insts.insert(pos, inst);
        self.inst_mut(inst).parent = Some(block);
        if self.inst(inst).is_terminator() {
            self.wire_edges(inst);
        }
    }

    /// Appends to the end of the block.
    pub fn push_inst(&mut self, block: BlockId, inst: InstId) {
        let pos = self.block(block).insts.len();
        self.insert_inst(block, pos, inst);
    }

    /// Inserts at the front of the block (phi placement).
    pub fn prepend_inst(&mut self, block: BlockId, inst: InstId) {
        self.insert_inst(block, 0, inst);
    }

    /// Inserts just before the block's terminator.
    ///
    /// # Panics
    /// Panics if the block has no terminator.
    pub fn insert_before_terminator(&mut self, block: BlockId, inst: InstId) {
        assert!(
            self.terminator(block).is_some(),
            "block {block:?} has no terminator"
        );
        let pos = self.block(block).insts.len() - 1;
        self.insert_inst(block, pos, inst);
    }

    /// Inserts just before another instruction, which must itself be
    /// inserted.
    pub fn insert_before(&mut self, before: InstId, inst: InstId) {
        let (block, pos) = self
            .position(before)
            .unwrap_or_else(|| panic!("instruction {before:?} is not inserted"));
        self.insert_inst(block, pos, inst);
    }

    /// The block and index an instruction currently occupies.
    pub fn position(&self, inst: InstId) -> Option<(BlockId, usize)> {
        let block = self.inst(inst).parent?;
        let pos = self
            .block(block)
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or_else(|| panic!("instruction {inst:?} missing from its parent block"));
        Some((block, pos))
    }

    /// The block's terminator: its last instruction, and only if that is a
    /// jump, branch, or return. A block still under construction has none.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = self.block(block).last_inst()?;
        self.inst(last).is_terminator().then_some(last)
    }

    /// Removes an instruction from its block without touching its operand
    /// or result uses, so it can be re-inserted elsewhere. Detaching a
    /// terminator severs the block's CFG edges.
    pub fn detach_inst(&mut self, inst: InstId) {
        let (block, pos) = self
            .position(inst)
            .unwrap_or_else(|| panic!("detaching free instruction {inst:?}"));
        if self.inst(inst).is_terminator() {
            self.unwire_edges(inst);
        }
        self.block_mut(block).insts.remove(pos);
        self.inst_mut(inst).parent = None;
    }

    /// Deletes an instruction: detaches it if inserted, severs its operand
    /// uses, and tombstones its slot.
    ///
    /// # Panics
    /// Panics if the instruction's result still has users; replace those
    /// first (see [`Self::replace_inst`]).
    pub fn remove_inst(&mut self, inst: InstId) {
        if self.inst(inst).parent.is_some() {
            self.detach_inst(inst);
        }
        assert!(
            self.inst(inst).uses.is_empty(),
            "removing instruction {inst:?} that still has users"
        );
        let operands: Vec<Value> = self.inst(inst).operands.iter().copied().collect();
        for (index, value) in operands.into_iter().enumerate() {
            self.unlink_use(value, Use::new(inst, index));
        }
        self.insts[inst] = None;
    }

    /// Redirects all uses of an instruction's result to `new`, then deletes
    /// the instruction.
    pub fn replace_inst(&mut self, inst: InstId, new: Value) {
        self.replace_all_uses(Value::Inst(inst), new);
        self.remove_inst(inst);
    }

    /// Deletes a set of instructions in one sweep.
    ///
    /// Unlike [`Self::remove_inst`], the set may reference itself in cycles
    /// (dead phis around a loop feed each other); the caller guarantees
    /// every user of a member is itself a member. Inserted members are
    /// detached from their blocks first.
    pub fn remove_insts(&mut self, dead: &[InstId]) {
        for &inst in dead {
            if self.inst(inst).parent.is_some() {
                self.detach_inst(inst);
            }
        }
        for &inst in dead {
            let operands: Vec<Value> = self.inst(inst).operands.iter().copied().collect();
            for (index, value) in operands.into_iter().enumerate() {
                self.unlink_use(value, Use::new(inst, index));
            }
        }
        for &inst in dead {
            assert!(
                self.inst(inst).uses.is_empty(),
                "removing instruction {inst:?} that still has users"
            );
            self.insts[inst] = None;
        }
    }

    /// Removes one incoming (value, block) pair from a phi. When the same
    /// predecessor reaches the phi through two edges there is one pair per
    /// edge; a single call removes a single pair. Returns false if no pair
    /// matches.
    pub fn remove_phi_incoming(&mut self, phi: InstId, pred: BlockId) -> bool {
        assert!(
            matches!(self.inst(phi).kind, InstKind::Phi),
            "remove_phi_incoming on {:?}",
            self.inst(phi).kind
        );
        let slot = self
            .inst(phi)
            .operands
            .iter()
            .skip(1)
            .step_by(2)
            .position(|v| *v == Value::Block(pred))
            .map(|pair| pair * 2);
        match slot {
            Some(at) => {
                self.remove_operand_pair(phi, at);
                true
            }
            None => false,
        }
    }

    /// Appends one incoming (value, block) pair to a phi.
    pub fn add_phi_incoming(&mut self, phi: InstId, value: Value, pred: BlockId) {
        assert!(
            matches!(self.inst(phi).kind, InstKind::Phi),
            "add_phi_incoming on {:?}",
            self.inst(phi).kind
        );
        let at = self.inst(phi).operands.len();
        self.inst_mut(phi).operands.push(value);
        self.inst_mut(phi).operands.push(Value::Block(pred));
        self.link_use(value, Use::new(phi, at));
        self.link_use(Value::Block(pred), Use::new(phi, at + 1));
    }

    /// Removes operand slots `at` and `at + 1`, shifting later slots left
    /// and renumbering their use records.
    fn remove_operand_pair(&mut self, user: InstId, at: usize) {
        let operands: Vec<Value> = self.inst(user).operands.iter().copied().collect();
        self.unlink_use(operands[at], Use::new(user, at));
        self.unlink_use(operands[at + 1], Use::new(user, at + 1));
        for (index, &value) in operands.iter().enumerate().skip(at + 2) {
            let uses = self.uses_vec_mut(value);
            let record = uses
                .iter_mut()
                .find(|u| u.user == user && u.index == index)
                .unwrap_or_else(|| panic!("use record out of sync while renumbering"));
            record.index = index - 2;
        }
        self.inst_mut(user).operands.drain(at..at + 2);
    }

    // ------------------------------------------------------------------
    // Block and function mutators
    // ------------------------------------------------------------------

    /// Splits a block in two, moving the instructions from `at` onward
    /// (terminator included) into a fresh block placed right after it in the
    /// function's layout. Phis in the moved terminator's targets are
    /// rewritten to name the new block as their incoming predecessor. The
    /// original block is left unterminated; the caller supplies its new
    /// terminator.
    pub fn split_block(&mut self, block: BlockId, at: usize) -> BlockId {
        let func = self.block(block).function;
        let new = self
            .blocks
            .push(Some(BlockData::new(func, None)));
        let layout = self
            .func(func)
            .blocks
            .iter()
            .position(|&b| b == block)
            .unwrap_or_else(|| panic!("block {block:?} missing from its function"));
        self.func_mut(func).blocks.insert(layout + 1, new);

        let len = self.block(block).insts.len();
        let moving_term = self.terminator(block).filter(|_| at < len);
        if let Some(term) = moving_term {
            self.unwire_edges(term);
        }
        let moved = self.block_mut(block).insts.split_off(at);
        for &inst in &moved {
            self.inst_mut(inst).parent = Some(new);
        }
        self.block_mut(new).insts = moved;
        if let Some(term) = moving_term {
            self.wire_edges(term);
            self.retarget_phis(term, block, new);
        }
        new
    }

    /// After a terminator changes source block, phis in its targets must
    /// name the new source as their incoming block.
    fn retarget_phis(&mut self, term: InstId, old: BlockId, new: BlockId) {
        let targets = self.inst(term).successor_targets();
        for target in targets {
            let phis: Vec<InstId> = self
                .block(target)
                .insts
                .iter()
                .copied()
                .filter(|&i| matches!(self.inst(i).kind, InstKind::Phi))
                .collect();
            for phi in phis {
                let slots: Vec<usize> = self
                    .inst(phi)
                    .operands
                    .iter()
                    .enumerate()
                    .skip(1)
                    .step_by(2)
                    .filter(|&(_, v)| *v == Value::Block(old))
                    .map(|(i, _)| i)
                    .collect();
                for slot in slots {
                    self.set_operand(phi, slot, Value::Block(new));
                }
            }
        }
    }

    /// Deletes a block and every instruction in it.
    ///
    /// The block itself must have no remaining users (no terminator targets
    /// it, no phi names it). Results produced inside the block may still be
    /// referenced by instructions in other blocks being purged in the same
    /// batch; such references die with their owners, and any that survive by
    /// mistake panic at the next arena access.
    pub fn remove_block(&mut self, block: BlockId) {
        assert!(
            self.block(block).uses.is_empty(),
            "removing block {block:?} that is still referenced"
        );
        let insts = std::mem::take(&mut self.block_mut(block).insts);
        for &inst in insts.iter().rev() {
            if self.inst(inst).is_terminator() {
                self.unwire_edges(inst);
            }
            let operands: Vec<Value> = self.inst(inst).operands.iter().copied().collect();
            for (index, value) in operands.into_iter().enumerate() {
                self.unlink_use(value, Use::new(inst, index));
            }
            self.insts[inst] = None;
        }
        debug_assert!(self.block(block).preds.is_empty());
        let func = self.block(block).function;
        self.func_mut(func).blocks.retain(|&b| b != block);
        self.blocks[block] = None;
    }

    /// Deletes a set of mutually unreachable blocks in one sweep.
    ///
    /// Unlike [`Self::remove_block`], the set may contain cycles and
    /// cross-references (a dead loop still branches among its own members);
    /// the caller guarantees no live block branches into the set and no live
    /// phi names a member. References between members die together.
    pub fn remove_blocks(&mut self, dead: &[BlockId]) {
        for &block in dead {
            let insts = std::mem::take(&mut self.block_mut(block).insts);
            for &inst in insts.iter().rev() {
                if self.inst(inst).is_terminator() {
                    self.unwire_edges(inst);
                }
                let operands: Vec<Value> = self.inst(inst).operands.iter().copied().collect();
                for (index, value) in operands.into_iter().enumerate() {
                    self.unlink_use(value, Use::new(inst, index));
                }
                self.insts[inst] = None;
            }
        }
        for &block in dead {
            debug_assert!(
                self.block(block)
                    .uses
                    .iter()
                    .all(|u| self.insts[u.user].is_none()),
                "live reference into removed block {block:?}"
            );
            debug_assert!(self.block(block).preds.is_empty());
            let func = self.block(block).function;
            self.func_mut(func).blocks.retain(|&b| b != block);
            self.blocks[block] = None;
        }
    }

    /// Deletes a function and its entire body.
    ///
    /// # Panics
    /// Panics if the function still has call sites.
    pub fn remove_function(&mut self, func: FunctionId) {
        assert!(
            self.func(func).uses.is_empty(),
            "removing function '{}' that is still called",
            self.func(func).name
        );
        let blocks = std::mem::take(&mut self.func_mut(func).blocks);
        for &block in &blocks {
            let insts = std::mem::take(&mut self.block_mut(block).insts);
            for &inst in insts.iter().rev() {
                if self.inst(inst).is_terminator() {
                    self.unwire_edges(inst);
                }
                let operands: Vec<Value> = self.inst(inst).operands.iter().copied().collect();
                for (index, value) in operands.into_iter().enumerate() {
                    self.unlink_use(value, Use::new(inst, index));
                }
                self.insts[inst] = None;
            }
        }
        for &block in &blocks {
            self.blocks[block] = None;
        }
        let args = std::mem::take(&mut self.func_mut(func).args);
        for arg in args {
            self.args[arg] = None;
        }
        let name = self.func(func).name.clone();
        self.func_names.remove(&name);
        self.funcs[func] = None;
    }

    // ------------------------------------------------------------------
    // CFG edge bookkeeping
    // ------------------------------------------------------------------

    /// Records the edges of an inserted terminator: the parent's successor
    /// list becomes the terminator's targets in slot order, and each target
    /// gains one predecessor entry.
    fn wire_edges(&mut self, term: InstId) {
        let parent = self
            .inst(term)
            .parent
            .unwrap_or_else(|| panic!("wiring edges of a free terminator"));
        let targets = self.inst(term).successor_targets();
        debug_assert!(self.block(parent).succs.is_empty());
        self.block_mut(parent).succs = targets.to_vec();
        for target in targets {
            self.block_mut(target).preds.push(parent);
        }
    }

    /// Severs the edges previously recorded for an inserted terminator.
    fn unwire_edges(&mut self, term: InstId) {
        let parent = self
            .inst(term)
            .parent
            .unwrap_or_else(|| panic!("unwiring edges of a free terminator"));
        let succs = std::mem::take(&mut self.block_mut(parent).succs);
        for target in succs {
            if let Some(data) = self.blocks[target].as_mut() {
                let at = data
                    .preds
                    .iter()
                    .position(|&p| p == parent)
                    .unwrap_or_else(|| panic!("predecessor edge missing from {target:?}"));
                data.preds.remove(at);
            }
        }
    }
}

/// True if operand `index` of `kind` is a branch target (a CFG edge), as
/// opposed to a phi incoming block or a data operand.
const fn is_target_slot(kind: InstKind, index: usize) -> bool {
    match kind {
        InstKind::Jump => index == 0,
        InstKind::Branch => index == 1 || index == 2,
        _ => false,
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::BinaryOp;

    fn test_func(module: &mut Module) -> (FunctionId, BlockId) {
        let i32_ty = module.types.i32();
        let func = module.create_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let entry = module.create_block(func, Some("entry"));
        (func, entry)
    }

    fn add(module: &mut Module, lhs: Value, rhs: Value) -> InstId {
        let ty = module.types.i32();
        module.create_inst(InstData::new(InstKind::Binary(BinaryOp::Add), ty, [lhs, rhs]))
    }

    #[test]
    fn operand_slots_and_use_records_stay_in_bijection() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let x = Value::Arg(module.func(func).args()[0]);
        let one = Value::Const(module.const_i32(1));

        let a = add(&mut module, x, one);
        module.push_inst(entry, a);
        assert_eq!(module.uses_of(x), &[Use::new(a, 0)]);
        assert_eq!(module.uses_of(one), &[Use::new(a, 1)]);

        let two = Value::Const(module.const_i32(2));
        module.set_operand(a, 1, two);
        assert_eq!(module.uses_of(one), &[]);
        assert_eq!(module.uses_of(two), &[Use::new(a, 1)]);
        assert_eq!(module.inst(a).operands(), &[x, two]);
    }

    #[test]
    fn replace_all_uses_empties_the_old_list() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let x = Value::Arg(module.func(func).args()[0]);
        let one = Value::Const(module.const_i32(1));

        let a = add(&mut module, x, one);
        let b = add(&mut module, Value::Inst(a), Value::Inst(a));
        module.push_inst(entry, a);
        module.push_inst(entry, b);
        assert_eq!(module.uses_of(Value::Inst(a)).len(), 2);

        module.replace_all_uses(Value::Inst(a), x);
        assert!(module.uses_of(Value::Inst(a)).is_empty());
        assert_eq!(module.inst(b).operands(), &[x, x]);
        // x now carries the slots a held, at the same indices
        assert!(module.uses_of(x).contains(&Use::new(b, 0)));
        assert!(module.uses_of(x).contains(&Use::new(b, 1)));
    }

    #[test]
    fn remove_use_defends_against_double_removal() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let x = Value::Arg(module.func(func).args()[0]);
        let one = Value::Const(module.const_i32(1));
        let a = add(&mut module, x, one);
        module.push_inst(entry, a);

        assert!(module.remove_use(one, Use::new(a, 1)));
        assert!(!module.remove_use(one, Use::new(a, 1)));
    }

    #[test]
    #[should_panic(expected = "already inserted")]
    fn double_insertion_is_fatal() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let x = Value::Arg(module.func(func).args()[0]);
        let a = add(&mut module, x, x);
        module.push_inst(entry, a);
        module.push_inst(entry, a);
    }

    #[test]
    #[should_panic(expected = "still has users")]
    fn removing_a_used_instruction_is_fatal() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let x = Value::Arg(module.func(func).args()[0]);
        let a = add(&mut module, x, x);
        let b = add(&mut module, Value::Inst(a), x);
        module.push_inst(entry, a);
        module.push_inst(entry, b);
        module.remove_inst(a);
    }

    #[test]
    fn branch_edges_follow_terminator_lifecycle() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let then_bb = module.create_block(func, Some("then"));
        let else_bb = module.create_block(func, Some("else"));
        let cond = Value::Const(module.const_bool(true));
        let void = module.types.void();

        let br = module.create_inst(InstData::new(
            InstKind::Branch,
            void,
            [cond, Value::Block(then_bb), Value::Block(else_bb)],
        ));
        // Edges appear only on insertion
        assert!(module.block(entry).succs().is_empty());
        module.push_inst(entry, br);
        assert_eq!(module.block(entry).succs(), &[then_bb, else_bb]);
        assert_eq!(module.block(then_bb).preds(), &[entry]);
        assert_eq!(module.block(else_bb).preds(), &[entry]);
        assert_eq!(module.terminator(entry), Some(br));

        // Retargeting a target slot moves the edge
        module.set_operand(br, 1, Value::Block(else_bb));
        assert_eq!(module.block(entry).succs(), &[else_bb, else_bb]);
        assert!(module.block(then_bb).preds().is_empty());
        assert_eq!(module.block(else_bb).preds(), &[entry, entry]);

        // Detaching severs them again
        module.detach_inst(br);
        assert!(module.block(entry).succs().is_empty());
        assert!(module.block(else_bb).preds().is_empty());
        assert_eq!(module.terminator(entry), None);
    }

    #[test]
    fn duplicate_targets_keep_one_edge_per_slot() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let target = module.create_block(func, None);
        let cond = Value::Const(module.const_bool(false));
        let void = module.types.void();
        let br = module.create_inst(InstData::new(
            InstKind::Branch,
            void,
            [cond, Value::Block(target), Value::Block(target)],
        ));
        module.push_inst(entry, br);
        assert_eq!(module.block(entry).succs(), &[target, target]);
        assert_eq!(module.block(target).preds(), &[entry, entry]);
    }

    #[test]
    #[should_panic(expected = "terminator must be the last instruction")]
    fn second_terminator_is_rejected() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let target = module.create_block(func, None);
        let void = module.types.void();
        let j1 = module.create_inst(InstData::new(InstKind::Jump, void, [Value::Block(target)]));
        let j2 = module.create_inst(InstData::new(InstKind::Jump, void, [Value::Block(target)]));
        module.push_inst(entry, j1);
        module.push_inst(entry, j2);
    }

    #[test]
    fn phi_incoming_removal_renumbers_later_slots() {
        let mut module = Module::new();
        let (func, merge) = test_func(&mut module);
        let p1 = module.create_block(func, None);
        let p2 = module.create_block(func, None);
        let p3 = module.create_block(func, None);
        let ty = module.types.i32();
        let c1 = Value::Const(module.const_i32(1));
        let c2 = Value::Const(module.const_i32(2));
        let c3 = Value::Const(module.const_i32(3));

        let phi = module.create_inst(InstData::new(
            InstKind::Phi,
            ty,
            [
                c1,
                Value::Block(p1),
                c2,
                Value::Block(p2),
                c3,
                Value::Block(p3),
            ],
        ));
        module.push_inst(merge, phi);

        assert!(module.remove_phi_incoming(phi, p2));
        assert_eq!(
            module.inst(phi).operands(),
            &[c1, Value::Block(p1), c3, Value::Block(p3)]
        );
        // The shifted pair's use records moved with it
        assert_eq!(module.uses_of(c3), &[Use::new(phi, 2)]);
        assert_eq!(module.uses_of(Value::Block(p3)), &[Use::new(phi, 3)]);
        assert!(!module.remove_phi_incoming(phi, p2));
    }

    #[test]
    fn split_block_moves_tail_and_rewires_phis() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let merge = module.create_block(func, Some("merge"));
        let x = Value::Arg(module.func(func).args()[0]);
        let ty = module.types.i32();
        let void = module.types.void();

        let a = add(&mut module, x, x);
        let b = add(&mut module, Value::Inst(a), x);
        let jump = module.create_inst(InstData::new(InstKind::Jump, void, [Value::Block(merge)]));
        module.push_inst(entry, a);
        module.push_inst(entry, b);
        module.push_inst(entry, jump);

        let phi = module.create_inst(InstData::new(
            InstKind::Phi,
            ty,
            [Value::Inst(b), Value::Block(entry)],
        ));
        module.push_inst(merge, phi);

        let tail = module.split_block(entry, 1);
        assert_eq!(module.block(entry).insts(), &[a]);
        assert_eq!(module.block(tail).insts(), &[b, jump]);
        assert_eq!(module.inst(b).parent(), Some(tail));
        // The edge into merge now starts at the tail block
        assert_eq!(module.block(merge).preds(), &[tail]);
        assert!(module.block(entry).succs().is_empty());
        assert_eq!(module.terminator(entry), None);
        // The phi follows the edge
        assert_eq!(
            module.inst(phi).operands(),
            &[Value::Inst(b), Value::Block(tail)]
        );
        // Layout keeps the tail right after the original block
        assert_eq!(module.func(func).blocks(), &[entry, tail, merge]);
    }

    #[test]
    fn removing_a_function_releases_its_name() {
        let mut module = Module::new();
        let (func, entry) = test_func(&mut module);
        let x = Value::Arg(module.func(func).args()[0]);
        let void = module.types.void();
        let ret = module.create_inst(InstData::new(InstKind::Ret, void, [x]));
        module.push_inst(entry, ret);

        assert_eq!(module.func_by_name("f"), Some(func));
        module.remove_function(func);
        assert_eq!(module.func_by_name("f"), None);
        assert_eq!(module.functions().count(), 0);
    }
}
