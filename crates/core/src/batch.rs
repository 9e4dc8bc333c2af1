//! Fetch → compute → persist over one or many won services.
//!
//! Ids are processed strictly one after another. In [`BatchMode::FailFast`]
//! the first fetch or persist failure aborts the whole batch; ids already
//! written stay written. [`BatchMode::Isolated`] records the failure against
//! the id and carries on.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::comp::{CompBreakdown, CompensationEngine};
use crate::domain::won_service::{WonService, WonServiceId};
use crate::errors::DomainError;

/// A won service as read from the system of record, plus the raw payload
/// that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct WonServiceSnapshot {
    pub service: WonService,
    pub raw: Value,
}

/// The two values written back after a calculation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompUpdate {
    pub total_comp: Decimal,
    pub explanation: String,
}

impl From<&CompBreakdown> for CompUpdate {
    fn from(breakdown: &CompBreakdown) -> Self {
        Self { total_comp: breakdown.total_comp, explanation: breakdown.explanation.clone() }
    }
}

#[async_trait]
pub trait WonServiceStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch(&self, id: &WonServiceId) -> Result<WonServiceSnapshot, Self::Error>;
    async fn persist(&self, id: &WonServiceId, update: &CompUpdate) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    #[default]
    FailFast,
    Isolated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeStatus {
    Updated,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStage {
    Fetch,
    Persist,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeOutcome {
    pub id: WonServiceId,
    pub status: RecomputeStatus,
    pub expected_comp: Option<Decimal>,
    pub breakdown: Option<CompBreakdown>,
    pub service_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecomputeOutcome {
    fn failed(id: WonServiceId, error: String) -> Self {
        Self {
            id,
            status: RecomputeStatus::Failed,
            expected_comp: None,
            breakdown: None,
            service_data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Error)]
#[error("won service `{id}` failed during {stage}: {source}")]
pub struct BatchError<E: std::error::Error + 'static> {
    pub id: WonServiceId,
    pub stage: BatchStage,
    #[source]
    pub source: E,
}

/// Validates raw ids, dropping repeats while keeping first-seen order.
pub fn parse_ids<S: AsRef<str>>(raw: &[S]) -> Result<Vec<WonServiceId>, DomainError> {
    if raw.is_empty() {
        return Err(DomainError::EmptyBatch);
    }

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let id = WonServiceId::parse(value.as_ref())?;
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }

    Ok(ids)
}

pub async fn recompute_one<S, E>(
    store: &S,
    engine: &E,
    id: &WonServiceId,
) -> Result<RecomputeOutcome, BatchError<S::Error>>
where
    S: WonServiceStore + ?Sized,
    E: CompensationEngine + ?Sized,
{
    let snapshot = store.fetch(id).await.map_err(|source| BatchError {
        id: id.clone(),
        stage: BatchStage::Fetch,
        source,
    })?;

    let breakdown = engine.calculate(&snapshot.service);

    store.persist(id, &CompUpdate::from(&breakdown)).await.map_err(|source| BatchError {
        id: id.clone(),
        stage: BatchStage::Persist,
        source,
    })?;

    info!(
        event_name = "comp.recompute.updated",
        won_service_id = %id,
        total_comp = %breakdown.total_comp,
        split = breakdown.has_new_slice(),
        "won service compensation updated"
    );

    Ok(RecomputeOutcome {
        id: id.clone(),
        status: RecomputeStatus::Updated,
        expected_comp: Some(breakdown.total_comp),
        breakdown: Some(breakdown),
        service_data: Some(snapshot.raw),
        error: None,
    })
}

pub async fn recompute_batch<S, E>(
    store: &S,
    engine: &E,
    ids: &[WonServiceId],
    mode: BatchMode,
) -> Result<Vec<RecomputeOutcome>, BatchError<S::Error>>
where
    S: WonServiceStore + ?Sized,
    E: CompensationEngine + ?Sized,
{
    let mut results = Vec::with_capacity(ids.len());

    for id in ids {
        match recompute_one(store, engine, id).await {
            Ok(outcome) => results.push(outcome),
            Err(error) if mode == BatchMode::Isolated => {
                warn!(
                    event_name = "comp.recompute.failed",
                    won_service_id = %id,
                    stage = %error.stage,
                    error = %error.source,
                    "won service recompute failed, continuing batch"
                );
                results.push(RecomputeOutcome::failed(id.clone(), error.source.to_string()));
            }
            Err(error) => {
                warn!(
                    event_name = "comp.recompute.aborted",
                    won_service_id = %id,
                    stage = %error.stage,
                    completed = results.len(),
                    "won service recompute failed, aborting batch"
                );
                return Err(error);
            }
        }
    }

    Ok(results)
}
