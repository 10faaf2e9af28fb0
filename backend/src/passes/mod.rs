//! Graph rewriting passes run before emission
//!
//! The passes mutate the design in place: FIFO insertion materializes the
//! partition boundaries, absorption folds adjacent delays into FIFO state,
//! the reshape step restores the block-multiple invariant and merging
//! collapses compatible FIFOs per partition pair. After the passes the
//! graph is read-only to the emitters.
pub mod absorption;
pub mod insertion;
pub mod merge;
