//! Batched writes against a [`PersonStore`].
//!
//! Updates are point writes by row id; the first failure aborts the run.
//! Inserts are attempted a batch at a time. A batch the store rejects is
//! retried row by row so one bad row cannot sink its neighbours, and the run
//! only fails if every row of a batch fails.

use orbits_core::{person::Person, store::PersonStore};

use crate::error::{BoxError, Error, Result};

/// One row that could not be inserted, even on its own.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InsertFailure {
  pub contact_identifier: String,
  pub reason:             String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
  pub inserted: usize,
  pub failures: Vec<InsertFailure>,
}

/// Write every update, `batch_size` rows at a time. Returns the number of
/// rows written.
pub async fn apply_updates<S: PersonStore>(
  store: &S,
  updates: Vec<Person>,
  batch_size: usize,
) -> Result<usize> {
  let batch_size = batch_size.max(1);
  let total_batches = updates.len().div_ceil(batch_size);
  let mut written = 0;

  for (i, batch) in updates.chunks(batch_size).enumerate() {
    for row in batch {
      store
        .update_person(row.clone())
        .await
        .map_err(Error::store)?;
      written += 1;
    }
    tracing::debug!(batch = i + 1, total_batches, rows = batch.len(), "updated batch");
  }

  Ok(written)
}

/// Insert rows `batch_size` at a time, falling back to single-row inserts
/// for any batch the store rejects.
pub async fn apply_inserts<S: PersonStore>(
  store: &S,
  inserts: Vec<Person>,
  batch_size: usize,
) -> Result<InsertOutcome> {
  let batch_size = batch_size.max(1);
  let total_batches = inserts.len().div_ceil(batch_size);
  let mut outcome = InsertOutcome::default();

  for (i, batch) in inserts.chunks(batch_size).enumerate() {
    let batch_no = i + 1;

    let bulk_err = match store.insert_persons(batch.to_vec()).await {
      Ok(()) => {
        outcome.inserted += batch.len();
        tracing::debug!(batch = batch_no, total_batches, rows = batch.len(), "inserted batch");
        continue;
      }
      Err(e) => e,
    };

    tracing::warn!(
      batch = batch_no,
      total_batches,
      error = %bulk_err,
      "batch insert failed, retrying rows individually"
    );

    let mut batch_inserted = 0;
    let mut last_err = None;
    for row in batch {
      match store.insert_persons(vec![row.clone()]).await {
        Ok(()) => batch_inserted += 1,
        Err(e) => {
          tracing::warn!(
            batch = batch_no,
            contact = %row.contact_identifier,
            error = %e,
            "row insert failed"
          );
          outcome.failures.push(InsertFailure {
            contact_identifier: row.contact_identifier.clone(),
            reason:             e.to_string(),
          });
          last_err = Some(e);
        }
      }
    }

    if batch_inserted == 0 {
      let source: BoxError = match last_err {
        Some(e) => Box::new(e),
        None => Box::new(bulk_err),
      };
      return Err(Error::InsertBatchFailed {
        batch: batch_no,
        inserted: outcome.inserted,
        source,
      });
    }
    outcome.inserted += batch_inserted;
  }

  Ok(outcome)
}

/// Insert rows `batch_size` at a time, letting the store skip rows whose key
/// is already taken. Returns the number of rows actually inserted.
pub async fn apply_inserts_ignoring_conflicts<S: PersonStore>(
  store: &S,
  inserts: Vec<Person>,
  batch_size: usize,
) -> Result<usize> {
  let batch_size = batch_size.max(1);
  let total_batches = inserts.len().div_ceil(batch_size);
  let mut inserted = 0;

  for (i, batch) in inserts.chunks(batch_size).enumerate() {
    let n = store
      .insert_persons_ignoring_conflicts(batch.to_vec())
      .await
      .map_err(Error::store)?;
    tracing::debug!(
      batch = i + 1,
      total_batches,
      rows = batch.len(),
      inserted = n,
      "inserted batch, ignoring conflicts"
    );
    inserted += n;
  }

  Ok(inserted)
}
