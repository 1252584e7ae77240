//! Ordered op stack

use super::{OpDefinition, OpInitContext, OpRunContext, RetargetOp};
use crate::error::{RetargetError, Result};
use crate::retarget_log::RetargetLog;

struct OpSlot {
    op: Box<dyn RetargetOp>,
    /// False until `initialize_all` succeeds for this op; inert ops are skipped by `run_all`.
    ready: bool,
}

/// Post-process ops, evaluated in insertion order.
pub struct OpStack {
    ops: Vec<OpSlot>,
}

impl OpStack {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Create a builder for fluent API
    pub fn builder() -> OpStackBuilder {
        OpStackBuilder::new()
    }

    pub fn from_definitions(definitions: &[OpDefinition]) -> Self {
        let mut stack = Self::new();
        for definition in definitions {
            stack.push(definition.build());
        }
        stack
    }

    /// Append an op to the end of the stack
    pub fn push(&mut self, op: Box<dyn RetargetOp>) {
        self.ops.push(OpSlot { op, ready: false });
    }

    /// Remove an op by name, returning it
    pub fn remove(&mut self, name: &str) -> Result<Box<dyn RetargetOp>> {
        let index = self.index_of(name)?;
        Ok(self.ops.remove(index).op)
    }

    /// Move an op to a new position, shifting the ops in between
    pub fn move_op(&mut self, name: &str, new_index: usize) -> Result<()> {
        let index = self.index_of(name)?;
        let slot = self.ops.remove(index);
        let new_index = new_index.min(self.ops.len());
        self.ops.insert(new_index, slot);
        Ok(())
    }

    /// Enable an op
    pub fn enable(&mut self, name: &str) -> Result<()> {
        let index = self.index_of(name)?;
        self.ops[index].op.set_enabled(true);
        Ok(())
    }

    /// Disable an op
    pub fn disable(&mut self, name: &str) -> Result<()> {
        let index = self.index_of(name)?;
        self.ops[index].op.set_enabled(false);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Names of all ops, in evaluation order
    pub fn names(&self) -> Vec<&str> {
        self.ops.iter().map(|slot| slot.op.name()).collect()
    }

    /// Whether the named op initialized successfully
    pub fn is_ready(&self, name: &str) -> bool {
        self.ops
            .iter()
            .any(|slot| slot.ready && slot.op.name() == name)
    }

    /// Initialize every op, marking the ones that fail as inert
    pub fn initialize_all(&mut self, ctx: &OpInitContext, log: &mut RetargetLog) {
        for slot in &mut self.ops {
            slot.ready = slot.op.initialize(ctx, log);
            if !slot.ready {
                log.warn(format!(
                    "Retarget op, {}, failed to initialize and will be skipped",
                    slot.op.name()
                ));
            }
        }
    }

    /// Run all enabled, initialized ops
    pub fn run_all(&mut self, ctx: &mut OpRunContext) {
        for slot in &mut self.ops {
            if slot.ready && slot.op.is_enabled() {
                slot.op.run(ctx);
            }
        }
    }

    /// Get an op by name
    pub fn get(&self, name: &str) -> Option<&dyn RetargetOp> {
        self.ops
            .iter()
            .find(|slot| slot.op.name() == name)
            .map(|slot| &*slot.op)
    }

    /// Get a mutable reference to a specific op by type
    pub fn get_typed_mut<T: RetargetOp + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.ops
            .iter_mut()
            .find(|slot| slot.op.name() == name)
            .and_then(|slot| slot.op.as_any_mut().downcast_mut::<T>())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.ops
            .iter()
            .position(|slot| slot.op.name() == name)
            .ok_or_else(|| RetargetError::Op(format!("Op '{}' not found", name)))
    }
}

impl Default for OpStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for OpStack
pub struct OpStackBuilder {
    ops: Vec<Box<dyn RetargetOp>>,
}

impl OpStackBuilder {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Add an op to the stack
    pub fn with_op(mut self, op: impl RetargetOp + 'static) -> Self {
        self.ops.push(Box::new(op));
        self
    }

    pub fn build(self) -> OpStack {
        let mut stack = OpStack::new();
        for op in self.ops {
            stack.push(op);
        }
        stack
    }
}

impl Default for OpStackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::test_support::skeletons;
    use crate::ops::{CurveRemapOp, PinBoneOp, RootMotionGeneratorOp};

    fn stack() -> OpStack {
        OpStack::builder()
            .with_op(PinBoneOp::new("pin"))
            .with_op(CurveRemapOp::new("curves").with_remap("a", "b"))
            .with_op(CurveRemapOp::new("empty"))
            .build()
    }

    #[test]
    fn test_insertion_order_and_move() {
        let mut stack = stack();
        assert_eq!(stack.names(), vec!["pin", "curves", "empty"]);

        stack.move_op("empty", 0).unwrap();
        assert_eq!(stack.names(), vec!["empty", "pin", "curves"]);

        stack.move_op("empty", 99).unwrap();
        assert_eq!(stack.names(), vec!["pin", "curves", "empty"]);

        let removed = stack.remove("pin").unwrap();
        assert_eq!(removed.name(), "pin");
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_unknown_op_is_an_error() {
        let mut stack = stack();
        assert!(matches!(stack.enable("missing"), Err(RetargetError::Op(_))));
        assert!(stack.remove("missing").is_err());
        assert!(stack.move_op("missing", 0).is_err());
    }

    #[test]
    fn test_enable_disable_and_typed_access() {
        let mut stack = stack();
        stack.disable("curves").unwrap();
        assert!(!stack.get("curves").unwrap().is_enabled());
        stack.enable("curves").unwrap();
        assert!(stack.get("curves").unwrap().is_enabled());

        let curves = stack.get_typed_mut::<CurveRemapOp>("curves").unwrap();
        curves.copy_unmapped_curves = false;
        assert!(stack.get_typed_mut::<PinBoneOp>("curves").is_none());
    }

    #[test]
    fn test_every_op_kind_honours_disable() {
        let mut stack = stack();
        stack.push(Box::new(RootMotionGeneratorOp::new("root_motion", "root", "root", "pelvis")));
        let names: Vec<String> = stack.names().iter().map(|n| n.to_string()).collect();

        for name in &names {
            stack.disable(name).unwrap();
            assert!(!stack.get(name).unwrap().is_enabled(), "{name} ignored disable");
            stack.enable(name).unwrap();
            assert!(stack.get(name).unwrap().is_enabled());
        }
    }

    #[test]
    fn test_failed_initialize_marks_op_inert() {
        let (source, target) = skeletons(100.0, 100.0);
        let mut stack = stack();
        let mut log = RetargetLog::new("test");
        stack.initialize_all(
            &OpInitContext {
                source_skeleton: &source,
                target_skeleton: &target,
            },
            &mut log,
        );

        assert!(stack.is_ready("pin"));
        assert!(stack.is_ready("curves"));
        assert!(!stack.is_ready("empty"));
        assert!(log.warning_count() >= 1);
    }
}
