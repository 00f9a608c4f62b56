pub mod analysis;
pub mod ast;
pub mod cli;
pub mod driver;
pub mod errors;
pub mod frame;
pub mod program;
pub mod runtime;
pub mod stdlib;
pub mod values;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export the main surface
pub use analysis::{analyze_function, AsyncFunctionAnalysis};
pub use errors::{ErrorInfo, ProgramError};
pub use frame::{FrameState, ResumableFrame};
pub use program::{link, LinkedProgram, Program};
pub use runtime::Runtime;
pub use values::Val;
