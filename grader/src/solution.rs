use std::rc::Rc;

use graderlib::signature::{Interface, MethodSignature, Type};
use gradervm::{
    instantiate, Contract, Instance, InstantiationError, InvocationError, LoadedType,
    MethodHandle, Value,
};

pub const SOLUTION_INTERFACE: &str = "Solution";

/// Returned by the fallback for every input.
pub const FALLBACK_SENTINEL: i64 = 0;

/// `Solution.solution(Int) -> Int`
pub fn solution_interface() -> Interface {
    Interface::new(
        SOLUTION_INTERFACE,
        vec![MethodSignature::new("solution", vec![Type::Int], Type::Int)],
    )
}

/// The capability every graded unit exposes.
pub trait Solution {
    fn solution(&self, n: i64) -> Result<i64, InvocationError>;

    /// Results of a fallback are never counted as correct.
    fn is_fallback(&self) -> bool {
        false
    }
}

/// A compiled unit bound to the `Solution` contract.
#[derive(Debug)]
pub struct CompiledSolution {
    instance: Instance,
    handle: MethodHandle,
}

impl CompiledSolution {
    pub fn class(&self) -> &Rc<LoadedType> {
        self.instance.class()
    }
}

impl Contract for CompiledSolution {
    fn interface() -> Interface {
        solution_interface()
    }

    fn adapt(instance: Instance, mut handles: Vec<MethodHandle>) -> Self {
        // one handle per interface method
        let handle = handles.swap_remove(0);
        Self { instance, handle }
    }
}

impl Solution for CompiledSolution {
    fn solution(&self, n: i64) -> Result<i64, InvocationError> {
        let res = self.handle.invoke(&self.instance, vec![Value::Int(n)])?;
        res.as_int().ok_or(InvocationError::BadReturn {
            expected: Type::Int,
            found: res.typ(),
        })
    }
}

/// Stands in for a unit that failed to compile or instantiate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSolution;

impl Solution for FallbackSolution {
    fn solution(&self, _n: i64) -> Result<i64, InvocationError> {
        Ok(FALLBACK_SENTINEL)
    }

    fn is_fallback(&self) -> bool {
        true
    }
}

pub fn instantiate_solution(class: &Rc<LoadedType>) -> Result<CompiledSolution, InstantiationError> {
    instantiate::<CompiledSolution>(class)
}
