pub mod compiler;
pub mod grader;
pub mod harness;
pub mod solution;

pub use compiler::{CompiledUnit, SourceCompiler};
pub use grader::{Grade, Grader, GraderConfig, Submission, REFERENCE_FRAGMENT, SOLUTION_TEMPLATE};
pub use harness::{Harness, Outcome, ParseVectorError, Report, TestVector, Verdict, REFERENCE_VECTORS};
pub use solution::{
    instantiate_solution, solution_interface, CompiledSolution, FallbackSolution, Solution,
    FALLBACK_SENTINEL,
};
