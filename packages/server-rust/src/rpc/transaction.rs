//! Transaction guard around handler invocation.
//!
//! Every procedure call runs between `begin` and `commit`/`rollback` on its
//! own session. Once the call settles the session must report no open
//! transaction; a leaked transaction would otherwise bleed into whatever
//! request next reuses the pooled connection.

use std::future::Future;

use anyhow::{anyhow, Context as _};
use tracing::{error, warn};

use super::procedure::ProcedureError;
use crate::traits::Session;

/// Runs `f` inside a transaction on `session`.
///
/// * `Ok` from `f` commits, `Err` rolls back and is returned unchanged.
/// * Failures to begin, commit or roll back become
///   [`ProcedureError::Unhandled`].
/// * If the session still reports an open transaction afterwards, it is
///   rolled back and the call fails with [`ProcedureError::Unhandled`],
///   even when `f` succeeded.
///
/// # Errors
///
/// See above.
pub async fn run_in_transaction<T, F, Fut>(session: &dyn Session, f: F) -> Result<T, ProcedureError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ProcedureError>>,
{
    session
        .begin()
        .await
        .context("failed to begin transaction")?;

    let result = f().await;

    let settled = match &result {
        Ok(_) => session.commit().await.context("failed to commit transaction"),
        Err(err) => {
            if let ProcedureError::Unhandled(cause) = err {
                warn!(error = %cause, "procedure failed, rolling back");
            }
            session
                .rollback()
                .await
                .context("failed to roll back transaction")
        }
    };

    if session.is_active() {
        error!("transaction still active after procedure returned, forcing rollback");
        if let Err(e) = session.rollback().await {
            error!(error = ?e, "rollback of leaked transaction failed");
        }
        return Err(ProcedureError::Unhandled(anyhow!(
            "transaction still active after the procedure returned"
        )));
    }

    settled?;
    result
}
