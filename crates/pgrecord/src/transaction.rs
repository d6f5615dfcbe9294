//! Scoped transactions.
//!
//! [`Executor::begin_transaction`](crate::Executor::begin_transaction) and
//! [`Executor::end_transaction`](crate::Executor::end_transaction) can be
//! called directly. For the common "run this block atomically" case, use the
//! [`transaction!`](crate::transaction) macro.
//!
//! # Example
//!
//! ```ignore
//! use pgrecord::{OrmResult, transaction};
//!
//! # async fn demo(exec: std::sync::Arc<pgrecord::Executor>) -> OrmResult<()> {
//! transaction!(exec, {
//!     let mut from = ACCOUNTS.record(&exec);
//!     from.set("id", 1).set("balance", 900);
//!     from.update().await?;
//!
//!     let mut to = ACCOUNTS.record(&exec);
//!     to.set("id", 2).set("balance", 1100);
//!     to.update().await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

/// Runs the given block inside a transaction on an executor.
///
/// - Begins via `begin_transaction`; if that fails the block is not run and
///   `OrmError::TransactionMisuse` is returned.
/// - An `Err` from the block is recorded on the executor, so the transaction
///   rolls back, and is then returned unchanged.
/// - An `Ok` block commits unless an error was recorded while it ran (for
///   example a statement that failed and was ignored); a rollback in that
///   case surfaces as `OrmError::Statement`.
///
/// The block must evaluate to `pgrecord::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($exec:expr, $body:block) => {{
        let __pgrecord_exec: &$crate::Executor = &*$exec;
        if !__pgrecord_exec.begin_transaction().await {
            Err($crate::OrmError::TransactionMisuse(
                __pgrecord_exec
                    .last_error()
                    .unwrap_or_else(|| "could not begin transaction".to_string()),
            ))
        } else {
            let __pgrecord_tx_body_result: $crate::OrmResult<_> = async { $body }.await;
            if let Err(error) = &__pgrecord_tx_body_result {
                __pgrecord_exec.record_error(error.to_string());
            }
            let __pgrecord_committed = __pgrecord_exec.end_transaction().await;
            match __pgrecord_tx_body_result {
                Ok(value) if __pgrecord_committed => Ok(value),
                Ok(_) => Err($crate::OrmError::Statement(
                    __pgrecord_exec
                        .last_error()
                        .unwrap_or_else(|| "transaction rolled back".to_string()),
                )),
                Err(error) => Err(error),
            }
        }
    }};
}
