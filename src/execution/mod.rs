pub mod executor;
pub mod planner;
pub mod reconciler;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signal::{Side, TargetPrice};

// ---------------------------------------------------------------------------
// LegKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    Entry,
    Stop,
    Tp(u8),
}

impl LegKind {
    pub fn tag(&self) -> String {
        match self {
            LegKind::Entry => "entry".into(),
            LegKind::Stop => "stop".into(),
            LegKind::Tp(n) => format!("tp{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderLeg
// ---------------------------------------------------------------------------

/// One planned exchange order. Produced by the planner, consumed once by the
/// executor; never persisted on its own.
#[derive(Debug, Clone)]
pub struct OrderLeg {
    pub kind: LegKind,
    pub side: Side,
    pub size: Decimal,
    /// Limit price for a LIMIT entry. None for market entries and triggers.
    pub price: Option<Decimal>,
    /// Trigger for stop/TP legs. Percent targets stay unresolved until the
    /// entry fill price is known.
    pub trigger: Option<TargetPrice>,
    pub reduce_only: bool,
    pub client_tag: String,
}

// ---------------------------------------------------------------------------
// LegRecord / ExecutionReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Success,
    Error,
    Skipped,
}

impl LegStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegStatus::Success => "success",
            LegStatus::Error => "error",
            LegStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegRecord {
    pub kind: String,
    pub status: LegStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw exchange ack, kept opaque for later inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl LegRecord {
    pub fn success(kind: &LegKind, response: Value) -> Self {
        Self {
            kind: kind.tag(),
            status: LegStatus::Success,
            message: None,
            response: Some(response),
        }
    }

    pub fn error(kind: &LegKind, message: impl Into<String>, response: Option<Value>) -> Self {
        Self {
            kind: kind.tag(),
            status: LegStatus::Error,
            message: Some(message.into()),
            response,
        }
    }

    pub fn skipped(kind: &LegKind, message: impl Into<String>) -> Self {
        Self {
            kind: kind.tag(),
            status: LegStatus::Skipped,
            message: Some(message.into()),
            response: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub entry_filled: bool,
    pub fill_price: Option<Decimal>,
    pub legs: Vec<LegRecord>,
}
