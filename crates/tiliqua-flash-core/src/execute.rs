//! Running a plan against a device
//!
//! Backends implement [`OperationExecutor`]. Operations are handed over
//! strictly in order, one at a time, and execution stops at the first
//! failure. Nothing is rolled back: a device left after a failed or
//! interrupted run must be flashed again from the start.

use core::fmt;

use log::{debug, error};

use crate::ops::FlashOperation;

/// A backend that can perform write operations
pub trait OperationExecutor {
    /// Backend error type
    type Error;

    /// Perform one write
    ///
    /// The device must be reset after the write unless
    /// [`FlashOperation::suppress_reset`] is set.
    fn execute(&mut self, op: &FlashOperation) -> Result<(), Self::Error>;
}

impl<T: OperationExecutor + ?Sized> OperationExecutor for &mut T {
    type Error = T::Error;

    fn execute(&mut self, op: &FlashOperation) -> Result<(), Self::Error> {
        (**self).execute(op)
    }
}

/// Callback for progress reporting while executing a plan
pub trait FlashProgress {
    /// Called once before the first operation
    fn starting(&mut self, _operations: usize, _total_bytes: usize) {}

    /// Called before each operation
    fn operation(&mut self, _index: usize, _op: &FlashOperation) {}

    /// Called after each operation completes
    fn operation_done(&mut self, _index: usize, _op: &FlashOperation) {}

    /// Called once after the last operation completes
    fn complete(&mut self) {}
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {}

/// An operation that failed, and why
#[derive(Debug)]
pub struct ExecuteError<E> {
    /// Position of the failed operation in the list
    pub index: usize,
    /// Flash offset of the failed operation
    pub offset: u32,
    /// Backend error
    pub source: E,
}

impl<E: fmt::Display> fmt::Display for ExecuteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation {} (offset 0x{:x}) failed: {}",
            self.index, self.offset, self.source
        )
    }
}

#[cfg(feature = "std")]
impl<E: std::error::Error + 'static> std::error::Error for ExecuteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Run `operations` in order on `executor`
pub fn execute<X, P>(
    operations: &[FlashOperation],
    executor: &mut X,
    progress: &mut P,
) -> Result<(), ExecuteError<X::Error>>
where
    X: OperationExecutor + ?Sized,
    P: FlashProgress + ?Sized,
{
    let total_bytes = operations.iter().map(FlashOperation::len).sum();
    progress.starting(operations.len(), total_bytes);

    for (index, op) in operations.iter().enumerate() {
        debug!("[{}/{}] {}", index + 1, operations.len(), op);
        progress.operation(index, op);
        executor.execute(op).map_err(|source| {
            error!("Write to 0x{:x} failed, device is partially written", op.offset);
            ExecuteError {
                index,
                offset: op.offset,
                source,
            }
        })?;
        progress.operation_done(index, op);
    }

    progress.complete();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{apply_reset_policy, Encoding, Payload};
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    struct Recorder {
        offsets: Vec<u32>,
        fail_at: Option<u32>,
    }

    impl OperationExecutor for Recorder {
        type Error = &'static str;

        fn execute(&mut self, op: &FlashOperation) -> Result<(), Self::Error> {
            if self.fail_at == Some(op.offset) {
                return Err("cable unplugged");
            }
            self.offsets.push(op.offset);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counter {
        started: usize,
        done: usize,
        complete: bool,
    }

    impl FlashProgress for Counter {
        fn operation(&mut self, _index: usize, _op: &FlashOperation) {
            self.started += 1;
        }
        fn operation_done(&mut self, _index: usize, _op: &FlashOperation) {
            self.done += 1;
        }
        fn complete(&mut self) {
            self.complete = true;
        }
    }

    fn ops() -> Vec<FlashOperation> {
        let ops = [0x10_0000, 0x19_0000, 0x1F_0000]
            .into_iter()
            .map(|offset| FlashOperation {
                payload: Payload::Generated {
                    label: "x".to_string(),
                    data: vec![0; 4],
                },
                offset,
                encoding: Encoding::Raw,
                suppress_reset: false,
            })
            .collect();
        apply_reset_policy(ops)
    }

    #[test]
    fn test_executes_in_order() {
        let mut recorder = Recorder {
            offsets: Vec::new(),
            fail_at: None,
        };
        let mut progress = Counter::default();
        execute(&ops(), &mut recorder, &mut progress).unwrap();
        assert_eq!(recorder.offsets, [0x10_0000, 0x19_0000, 0x1F_0000]);
        assert_eq!((progress.started, progress.done), (3, 3));
        assert!(progress.complete);
    }

    #[test]
    fn test_stops_at_first_failure() {
        let mut recorder = Recorder {
            offsets: Vec::new(),
            fail_at: Some(0x19_0000),
        };
        let mut progress = Counter::default();
        let err = execute(&ops(), &mut recorder, &mut progress).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.offset, 0x19_0000);
        assert_eq!(
            err.to_string(),
            "operation 1 (offset 0x190000) failed: cable unplugged"
        );
        assert_eq!(recorder.offsets, [0x10_0000]);
        assert_eq!((progress.started, progress.done), (2, 1));
        assert!(!progress.complete);
    }
}
