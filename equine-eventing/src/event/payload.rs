//! 事件负载（EventPayload）
//!
//! 以带标签的联合体承载各业务模块的事件数据，每个变体对应一种事件类型，
//! 由所属模块维护其字段定义。未建模的事件通过 `Custom` 携带任意 JSON。
//!
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BREEDING_SCHEDULED: &str = "breeding_scheduled";
pub const PREGNANCY_CONFIRMED: &str = "pregnancy_confirmed";
pub const VACCINATION_DUE: &str = "vaccination_due";
pub const LAB_RESULT_READY: &str = "lab_result_ready";
pub const PRESCRIPTION_ISSUED: &str = "prescription_issued";
pub const INVOICE_REQUESTED: &str = "invoice_requested";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// 配种排期（breeding → clinic：安排配种前检查）
    BreedingScheduled {
        mare_id: String,
        stallion_id: Option<String>,
        scheduled_for: DateTime<Utc>,
    },
    /// 妊娠确认（breeding → clinic/stable：产前护理与厩舍安排）
    PregnancyConfirmed {
        mare_id: String,
        confirmed_on: NaiveDate,
        expected_foaling: Option<NaiveDate>,
    },
    VaccinationDue {
        horse_id: String,
        vaccine: String,
        due_on: NaiveDate,
    },
    LabResultReady {
        horse_id: String,
        sample_id: String,
        abnormal: bool,
    },
    PrescriptionIssued {
        horse_id: String,
        prescription_id: String,
        medication: String,
    },
    /// 计费请求，金额以最小货币单位表示
    InvoiceRequested {
        client_id: String,
        amount_cents: i64,
        currency: String,
    },
    Custom(Value),
}

impl EventPayload {
    /// 变体对应的标准事件类型；`Custom` 没有固定类型
    pub fn event_type(&self) -> Option<&'static str> {
        match self {
            EventPayload::BreedingScheduled { .. } => Some(BREEDING_SCHEDULED),
            EventPayload::PregnancyConfirmed { .. } => Some(PREGNANCY_CONFIRMED),
            EventPayload::VaccinationDue { .. } => Some(VACCINATION_DUE),
            EventPayload::LabResultReady { .. } => Some(LAB_RESULT_READY),
            EventPayload::PrescriptionIssued { .. } => Some(PRESCRIPTION_ISSUED),
            EventPayload::InvoiceRequested { .. } => Some(INVOICE_REQUESTED),
            EventPayload::Custom(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl From<Value> for EventPayload {
    fn from(value: Value) -> Self {
        EventPayload::Custom(value)
    }
}
