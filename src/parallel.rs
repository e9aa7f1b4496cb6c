//! Optional rayon parallelism for batch correction.
//!
//! A single correction is sequential array arithmetic. The only parallel
//! boundary in this crate is "one call per signal", which [`correct_batch`]
//! exploits. With the `parallel` feature (on by default) those calls run on
//! the rayon pool; without it they run one after another.
//!
//! [`correct_batch`]: crate::correction::correct_batch

/// Iterate a slice by reference, in parallel when the `parallel` feature is
/// enabled.
///
/// The caller needs `rayon::iter::ParallelIterator` in scope under the
/// feature so that `map`/`collect` resolve to the parallel adaptors.
///
/// ```ignore
/// use crate::slice_maybe_parallel;
/// #[cfg(feature = "parallel")]
/// use rayon::iter::ParallelIterator;
///
/// let lengths: Vec<usize> = slice_maybe_parallel!(signals)
///     .map(|s| s.len())
///     .collect();
/// ```
#[macro_export]
macro_rules! slice_maybe_parallel {
    ($expr:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            $expr.par_iter()
        }
        #[cfg(not(feature = "parallel"))]
        {
            $expr.iter()
        }
    }};
}

pub use slice_maybe_parallel;
