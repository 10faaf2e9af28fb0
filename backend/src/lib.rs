#[macro_use]
extern crate log;

pub mod emit;
pub mod passes;
mod run;

pub use run::{emit_design, run_backend};

/// Shorthand macro to return a new
/// [`TypedError`](laminar_core::error::TypedError)
///
/// Allows expressing
///
/// ```no_run
/// # use anyhow::anyhow;
/// # use laminar_core::error::{TypedError, TypedResult, CompileError};
/// # fn main() -> TypedResult<()>{
/// let extra_info = "problem";
/// let problem = anyhow!("a {extra_info} description");
/// return Err(TypedError::new(CompileError::Structural, problem));
/// # }
/// ```
///
/// as a more compact
///
/// ```no_run
/// # use laminar_core::error::TypedResult;
/// # use laminar_backend::problem;
/// # fn main() -> TypedResult<()>{
/// # let extra_info = "problem";
/// problem!(Structural, "a {extra_info} description");
/// # }
/// ```
#[macro_export]
macro_rules! problem {
    ($typed_err: expr, $($tail:tt)*) => {{
        #[allow(unused_imports)]
        use ::laminar_core::error::CompileError::*;
        let problem = ::anyhow::anyhow!($($tail)*);
        return ::laminar_core::error::TypedResult::Err(
            ::laminar_core::error::TypedError::new($typed_err, problem)
        );
    }};
}

#[cfg(test)]
mod test {
    use anyhow::anyhow;
    use laminar_core::error::{CompileError, TypedError, TypedResult};

    fn problem_manual() -> TypedResult<()> {
        let extra_info = "problem";
        let problem = anyhow!("a {extra_info} description");
        return Err(TypedError::new(CompileError::Structural, problem));
    }

    fn problem_macro() -> TypedResult<()> {
        let extra_info = "problem";
        problem!(Structural, "a {extra_info} description");
    }

    #[test]
    fn problem() {
        assert_eq!(
            problem_manual().unwrap_err().to_string(),
            problem_macro().unwrap_err().to_string()
        );
    }
}
